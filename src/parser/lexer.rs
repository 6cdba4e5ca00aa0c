//! Tokens of the loop mini-language.

use std::fmt;
use std::ops::Range;

use logos::Logos;

use crate::error::{Error, Result};

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    // === Keywords ===
    #[token("while")]
    While,
    #[token("return")]
    Return,

    // === Operators ===
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("=")]
    Assign,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,

    // === Delimiters ===
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(";")]
    Semi,
    /// Separates statements, like `;`.
    #[token("\n")]
    Newline,

    // === Literals ===
    /// Integer literal. Overflowing `u64` is a lex error.
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<u64>().ok())]
    Int(u64),

    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Token::While => "while",
            Token::Return => "return",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::Le => "<=",
            Token::Ge => ">=",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::Assign => "=",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::Semi => ";",
            Token::Newline => "newline",
            Token::Int(v) => return write!(f, "{v}"),
            Token::Float(v) => return write!(f, "{v:?}"),
            Token::Ident(name) => return write!(f, "{name}"),
        };
        write!(f, "{s}")
    }
}

/// Tokenize `source`, keeping each token's byte span.
pub fn tokenize(source: &str) -> Result<Vec<(Token, Range<usize>)>> {
    let mut tokens = Vec::new();
    for (tok, span) in Token::lexer(source).spanned() {
        match tok {
            Ok(tok) => tokens.push((tok, span)),
            Err(()) => {
                return Err(Error::Parse {
                    pos: span.start,
                    message: format!("unexpected input {:?}", &source[span]),
                })
            }
        }
    }
    Ok(tokens)
}

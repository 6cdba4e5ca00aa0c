//! Parser for the loop mini-language.
//!
//! ```text
//! program := stmt*            (each ended by `;`, a newline, `}` or end of input)
//! stmt    := IDENT '=' expr
//!          | IDENT '[' expr ']' '=' expr
//!          | 'while' expr '{' stmt* '}'
//!          | 'return' expr
//! expr    := sum (cmp sum)?
//! sum     := term (('+' | '-') term)*
//! term    := atom (('*' | '/') atom)*
//! atom    := INT | FLOAT | IDENT | IDENT '[' expr ']' | '(' expr ')'
//! ```
//!
//! Integer literals become `U64` values, float literals `F64`.

pub mod lexer;

use std::ops::Range;

use tracing::trace;

use crate::error::{Error, Result};
use crate::ir::{BinOp, Expr, Stmt};
use crate::types::Val;
use lexer::{tokenize, Token};

/// Turns template text into IR statements.
pub trait SourceParser {
    fn parse(&self, source: &str) -> Result<Vec<Stmt>>;
}

/// Recursive-descent parser for the mini-language.
#[derive(Debug, Clone, Copy, Default)]
pub struct MiniParser;

impl MiniParser {
    pub fn new() -> Self {
        MiniParser
    }
}

impl SourceParser for MiniParser {
    fn parse(&self, source: &str) -> Result<Vec<Stmt>> {
        let tokens = tokenize(source)?;
        trace!(count = tokens.len(), "tokenized template");
        let mut p = Parser {
            tokens,
            pos: 0,
            end: source.len(),
        };
        p.program()
    }
}

struct Parser {
    tokens: Vec<(Token, Range<usize>)>,
    pos: usize,
    /// Byte offset reported for errors at end of input.
    end: usize,
}

impl Parser {
    // ── Cursor ───────────────────────────────────────────────────────────────

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, span)| span.start)
            .unwrap_or(self.end)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Token) -> Result<()> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(self.error(&format!("`{tok}`")))
        }
    }

    fn error(&self, expected: &str) -> Error {
        let message = match self.peek() {
            Some(found) => format!("expected {expected}, found `{found}`"),
            None => format!("expected {expected}, found end of input"),
        };
        Error::Parse {
            pos: self.offset(),
            message,
        }
    }

    fn skip_separators(&mut self) {
        while self.eat(&Token::Semi) || self.eat(&Token::Newline) {}
    }

    /// Two statements on one line need a `;` between them.
    fn end_of_stmt(&self, in_block: bool) -> Result<()> {
        match self.peek() {
            None | Some(Token::Semi | Token::Newline) => Ok(()),
            Some(Token::RBrace) if in_block => Ok(()),
            _ => Err(self.error("`;` or a newline")),
        }
    }

    // ── Statements ───────────────────────────────────────────────────────────

    fn program(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            self.skip_separators();
            if self.peek().is_none() {
                return Ok(stmts);
            }
            stmts.push(self.stmt()?);
            self.end_of_stmt(false)?;
        }
    }

    fn block(&mut self) -> Result<Vec<Stmt>> {
        self.expect(Token::LBrace)?;
        let mut stmts = Vec::new();
        loop {
            self.skip_separators();
            if self.eat(&Token::RBrace) {
                return Ok(stmts);
            }
            if self.peek().is_none() {
                return Err(self.error("`}`"));
            }
            stmts.push(self.stmt()?);
            self.end_of_stmt(true)?;
        }
    }

    fn stmt(&mut self) -> Result<Stmt> {
        match self.peek() {
            Some(Token::While) => {
                self.bump();
                let cond = self.expr()?;
                while self.eat(&Token::Newline) {}
                let body = self.block()?;
                Ok(Stmt::While { cond, body })
            }
            Some(Token::Return) => {
                self.bump();
                Ok(Stmt::Return(self.expr()?))
            }
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.bump();
                if self.eat(&Token::LBracket) {
                    let index = self.expr()?;
                    self.expect(Token::RBracket)?;
                    self.expect(Token::Assign)?;
                    let value = self.expr()?;
                    Ok(Stmt::Store {
                        array: name,
                        index,
                        value,
                    })
                } else {
                    self.expect(Token::Assign)?;
                    Ok(Stmt::assign(name, self.expr()?))
                }
            }
            _ => Err(self.error("a statement")),
        }
    }

    // ── Expressions ──────────────────────────────────────────────────────────

    fn expr(&mut self) -> Result<Expr> {
        let lhs = self.sum()?;
        let op = match self.peek() {
            Some(Token::EqEq) => BinOp::Eq,
            Some(Token::NotEq) => BinOp::Ne,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Ge) => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.bump();
        let rhs = self.sum()?;
        Ok(Expr::binary(op, lhs, rhs))
    }

    fn sum(&mut self) -> Result<Expr> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.term()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn term(&mut self) -> Result<Expr> {
        let mut lhs = self.atom()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.atom()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn atom(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Int(v)) => {
                let v = *v;
                self.bump();
                Ok(Expr::Lit(Val::U64(v)))
            }
            Some(Token::Float(v)) => {
                let v = *v;
                self.bump();
                Ok(Expr::Lit(Val::F64(v)))
            }
            Some(Token::Ident(name)) if self.peek_at(1) == Some(&Token::LBracket) => {
                let name = name.clone();
                self.pos += 2;
                let index = self.expr()?;
                self.expect(Token::RBracket)?;
                Ok(Expr::index(name, index))
            }
            Some(Token::Ident(name)) => {
                let e = Expr::var(name.clone());
                self.bump();
                Ok(e)
            }
            Some(Token::LParen) => {
                self.bump();
                let e = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(e)
            }
            _ => Err(self.error("an expression")),
        }
    }
}

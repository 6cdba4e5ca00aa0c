use crate::types::{ScalarType, Val};
use std::fmt;

/// Binary operators of the IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    // ── Arithmetic ───────────────────────────────────────────────────────────
    Add,
    Sub,
    Mul,
    Div,

    // ── Comparisons ──────────────────────────────────────────────────────────
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
        }
    }

    pub fn is_comparison(self) -> bool {
        !matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div)
    }
}

/// An IR expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Lit(Val),
    Var(String),
    /// Static array literal. Only valid as the value of an assignment.
    StaticArray(ScalarType, Vec<Val>),
    /// Element read from a named array binding.
    Index { array: String, index: Box<Expr> },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn index(array: impl Into<String>, index: Expr) -> Self {
        Expr::Index {
            array: array.into(),
            index: Box::new(index),
        }
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// A static array of `len` copies of the element type's zero value.
    pub fn zeroed_array(elem: ScalarType, len: usize) -> Self {
        Expr::StaticArray(elem, vec![Val::default_for(elem); len])
    }
}

/// An IR statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Bind (or rebind) a name.
    Assign { name: String, value: Expr },
    /// `array[index] = value`.
    Store {
        array: String,
        index: Expr,
        value: Expr,
    },
    While { cond: Expr, body: Vec<Stmt> },
    /// Statements spliced in from a parsed source block. No new scope.
    Block(Vec<Stmt>),
    Return(Expr),
}

impl Stmt {
    pub fn assign(name: impl Into<String>, value: Expr) -> Self {
        Stmt::Assign {
            name: name.into(),
            value,
        }
    }

    /// Name bound by this statement, if it is an assignment.
    pub fn binding(&self) -> Option<&str> {
        match self {
            Stmt::Assign { name, .. } => Some(name),
            _ => None,
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        match self {
            Stmt::Assign { name, value } => writeln!(f, "{pad}{name} = {value}"),
            Stmt::Store {
                array,
                index,
                value,
            } => writeln!(f, "{pad}{array}[{index}] = {value}"),
            Stmt::While { cond, body } => {
                writeln!(f, "{pad}while {cond} {{")?;
                for s in body {
                    s.fmt_indented(f, depth + 1)?;
                }
                writeln!(f, "{pad}}}")
            }
            Stmt::Block(body) => {
                writeln!(f, "{pad}{{")?;
                for s in body {
                    s.fmt_indented(f, depth + 1)?;
                }
                writeln!(f, "{pad}}}")
            }
            Stmt::Return(e) => writeln!(f, "{pad}return {e}"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Lit(v) => write!(f, "{v}"),
            Expr::Var(name) => write!(f, "{name}"),
            Expr::StaticArray(elem, vals) => {
                write!(f, "[{}]{elem}{{", vals.len())?;
                for (i, v) in vals.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "}}")
            }
            Expr::Index { array, index } => write!(f, "{array}[{index}]"),
            Expr::Binary { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.symbol()),
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

/// An ordered IR program, handed to a [`Backend`](crate::compiler::Backend)
/// as a whole.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

impl Program {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Program { stmts }
    }

    /// Names bound by top-level assignments, in program order.
    pub fn bindings(&self) -> Vec<&str> {
        self.stmts.iter().filter_map(Stmt::binding).collect()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in &self.stmts {
            write!(f, "{s}")?;
        }
        Ok(())
    }
}

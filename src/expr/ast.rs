//! Abstract syntax tree for the expression language

use super::value::Value;

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Truthiness negation (`!` / `not`)
    Not,
    /// Numeric negation
    Neg,
}

/// An expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value
    Literal(Value),

    /// `$scope.seg1.seg2…` variable reference
    Variable { scope: String, path: Vec<String> },

    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },

    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// `target[index]` on a map (string key) or list (integer index)
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },

    /// Function call dispatched through the injected registry
    Call { name: String, args: Vec<Expr> },
}

impl Expr {
    /// Visit every call node, outermost first
    pub fn walk_calls(&self, visit: &mut impl FnMut(&str, &[Expr])) {
        match self {
            Self::Literal(_) | Self::Variable { .. } => {}
            Self::Unary { operand, .. } => operand.walk_calls(visit),
            Self::Binary { left, right, .. } => {
                left.walk_calls(visit);
                right.walk_calls(visit);
            }
            Self::Index { target, index } => {
                target.walk_calls(visit);
                index.walk_calls(visit);
            }
            Self::Call { name, args } => {
                visit(name, args);
                for arg in args {
                    arg.walk_calls(visit);
                }
            }
        }
    }
}

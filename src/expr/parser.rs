//! Recursive-descent parser for the sandboxed expression language
//!
//! Precedence, loosest first:
//! `or → and → not → comparison → addition → multiplication → unary(-) →
//! postfix(index) → primary`.
//!
//! Two guarantees are enforced here, before any evaluation:
//!
//! - scope names and identifiers in function position are checked against a
//!   fixed forbidden-name constant and rejected fail-closed;
//! - nesting depth is tracked with an explicit counter capped at
//!   [`MAX_DEPTH`], so worst-case interpreter cost is bounded independently
//!   of the host call stack.

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::error::{ExprError, ExprResult};
use super::token::{tokenize, SpannedToken, Token};
use super::value::Value;

/// Maximum expression nesting depth
pub const MAX_DEPTH: usize = 50;

/// Names rejected at parse time wherever they appear as a scope or in
/// function position. Names evoking code execution, reflection, or file
/// I/O; policy text containing them is refused before it can run.
pub const FORBIDDEN_NAMES: &[&str] = &[
    "import",
    "__import__",
    "exec",
    "eval",
    "compile",
    "open",
    "getattr",
    "setattr",
    "delattr",
    "globals",
    "locals",
    "vars",
    "dir",
    "__builtins__",
    "__class__",
    "__subclasses__",
    "__globals__",
    "__code__",
    "__bases__",
    "__mro__",
];

/// Parse expression source text into an AST
pub fn parse(source: &str) -> ExprResult<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens, FORBIDDEN_NAMES);
    let expr = parser.parse_expression()?;
    parser.expect_end()?;
    Ok(expr)
}

struct Parser<'a> {
    tokens: Vec<SpannedToken>,
    pos: usize,
    depth: usize,
    forbidden: &'a [&'a str],
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<SpannedToken>, forbidden: &'a [&'a str]) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            forbidden,
        }
    }

    fn peek(&self) -> Option<&SpannedToken> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<SpannedToken> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token, what: &str) -> ExprResult<()> {
        match self.advance() {
            Some(spanned) if &spanned.token == expected => Ok(()),
            Some(spanned) => Err(ExprError::UnexpectedToken {
                found: spanned.token.to_string(),
                expected: what.to_string(),
                pos: spanned.pos,
            }),
            None => Err(ExprError::UnexpectedEnd(what.to_string())),
        }
    }

    fn expect_end(&mut self) -> ExprResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(spanned) => Err(ExprError::UnexpectedToken {
                found: spanned.token.to_string(),
                expected: "end of expression".to_string(),
                pos: spanned.pos,
            }),
        }
    }

    fn check_allowed(&self, name: &str) -> ExprResult<()> {
        if self.forbidden.contains(&name) {
            return Err(ExprError::ForbiddenName(name.to_string()));
        }
        Ok(())
    }

    fn deepen(&mut self) -> ExprResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep { max: MAX_DEPTH });
        }
        Ok(())
    }

    /// Expression (re-)entry point; every re-entry through parentheses,
    /// index brackets, or call arguments deepens the counter. Unary
    /// operator chains deepen it too (see `parse_not`/`parse_unary`), so
    /// the cap holds before the host call stack is ever at risk.
    fn parse_expression(&mut self) -> ExprResult<Expr> {
        self.deepen()?;
        let expr = self.parse_or();
        self.depth -= 1;
        expr
    }

    fn parse_or(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(t) if t.token == Token::OrOr) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_not()?;
        while matches!(self.peek(), Some(t) if t.token == Token::AndAnd) {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> ExprResult<Expr> {
        if matches!(self.peek(), Some(t) if t.token == Token::Bang) {
            self.advance();
            // Unary chains recurse, so they count against the depth cap
            self.deepen()?;
            let operand = self.parse_not();
            self.depth -= 1;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand?),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ExprResult<Expr> {
        let left = self.parse_addition()?;
        let op = match self.peek().map(|t| &t.token) {
            Some(Token::EqEq) => BinaryOp::Eq,
            Some(Token::NotEq) => BinaryOp::Ne,
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Ge) => BinaryOp::Ge,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_addition()?;
        Ok(Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_addition(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_multiplication()?;
        loop {
            let op = match self.peek().map(|t| &t.token) {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplication()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplication(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().map(|t| &t.token) {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ExprResult<Expr> {
        if matches!(self.peek(), Some(t) if t.token == Token::Minus) {
            self.advance();
            self.deepen()?;
            let operand = self.parse_unary();
            self.depth -= 1;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand?),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> ExprResult<Expr> {
        let mut expr = self.parse_primary()?;
        while matches!(self.peek(), Some(t) if t.token == Token::LBracket) {
            self.advance();
            let index = self.parse_expression()?;
            self.expect(&Token::RBracket, "']'")?;
            expr = Expr::Index {
                target: Box::new(expr),
                index: Box::new(index),
            };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ExprResult<Expr> {
        let Some(spanned) = self.advance() else {
            return Err(ExprError::UnexpectedEnd("an expression".to_string()));
        };

        match spanned.token {
            Token::Int(n) => Ok(Expr::Literal(Value::Int(n))),
            Token::Float(x) => Ok(Expr::Literal(Value::Float(x))),
            Token::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            Token::Bool(b) => Ok(Expr::Literal(Value::Bool(b))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::Dollar => self.parse_variable(),
            Token::Ident(name) => {
                // Fail closed before looking for the call parenthesis, so a
                // bare forbidden identifier is rejected too.
                self.check_allowed(&name)?;
                self.parse_call(name, spanned.pos)
            }
            Token::LParen => {
                let inner = self.parse_expression()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            other => Err(ExprError::UnexpectedToken {
                found: other.to_string(),
                expected: "an expression".to_string(),
                pos: spanned.pos,
            }),
        }
    }

    /// `$scope.seg1.seg2…` — at least the scope name is required
    fn parse_variable(&mut self) -> ExprResult<Expr> {
        let scope = self.parse_ident("a scope name after '$'")?;
        self.check_allowed(&scope)?;

        let mut path = Vec::new();
        while matches!(self.peek(), Some(t) if t.token == Token::Dot) {
            self.advance();
            path.push(self.parse_ident("a path segment after '.'")?);
        }

        Ok(Expr::Variable { scope, path })
    }

    fn parse_ident(&mut self, what: &str) -> ExprResult<String> {
        match self.advance() {
            Some(SpannedToken {
                token: Token::Ident(name),
                ..
            }) => Ok(name),
            Some(spanned) => Err(ExprError::UnexpectedToken {
                found: spanned.token.to_string(),
                expected: what.to_string(),
                pos: spanned.pos,
            }),
            None => Err(ExprError::UnexpectedEnd(what.to_string())),
        }
    }

    fn parse_call(&mut self, name: String, pos: usize) -> ExprResult<Expr> {
        match self.peek() {
            Some(t) if t.token == Token::LParen => {}
            Some(t) => {
                return Err(ExprError::UnexpectedToken {
                    found: t.token.to_string(),
                    expected: "'(' after function name".to_string(),
                    pos: t.pos,
                })
            }
            None => {
                return Err(ExprError::UnexpectedToken {
                    found: name,
                    expected: "'(' after function name".to_string(),
                    pos,
                })
            }
        }
        self.advance();

        let mut args = Vec::new();
        if !matches!(self.peek(), Some(t) if t.token == Token::RParen) {
            loop {
                args.push(self.parse_expression()?);
                match self.peek() {
                    Some(t) if t.token == Token::Comma => {
                        self.advance();
                    }
                    _ => break,
                }
            }
        }
        self.expect(&Token::RParen, "')'")?;

        Ok(Expr::Call { name, args })
    }
}

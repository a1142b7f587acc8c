//! Hand-written tokenizer for the sandboxed expression language
//!
//! Produces a positioned token stream. Two-character operators (`==`, `!=`,
//! `<=`, `>=`, `&&`, `||`) use one character of lookahead; the word aliases
//! `and`/`or`/`not` are folded into their operator tokens during identifier
//! scanning. Fails closed with a positioned error on unterminated strings,
//! over-long string literals, and unrecognized characters.

use std::fmt;

use super::error::{ExprError, ExprResult};

/// Longest string literal the tokenizer accepts, in characters
pub const MAX_STRING_LENGTH: usize = 4096;

/// A lexical token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
    Ident(String),

    /// `$` scope sigil
    Dollar,
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    NotEq,

    AndAnd,
    OrOr,
    Bang,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{}", n),
            Self::Float(x) => write!(f, "{}", x),
            Self::Str(s) => write!(f, "\"{}\"", s),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Null => write!(f, "null"),
            Self::Ident(name) => write!(f, "{}", name),
            Self::Dollar => write!(f, "$"),
            Self::Dot => write!(f, "."),
            Self::LBracket => write!(f, "["),
            Self::RBracket => write!(f, "]"),
            Self::LParen => write!(f, "("),
            Self::RParen => write!(f, ")"),
            Self::Comma => write!(f, ","),
            Self::Plus => write!(f, "+"),
            Self::Minus => write!(f, "-"),
            Self::Star => write!(f, "*"),
            Self::Slash => write!(f, "/"),
            Self::Percent => write!(f, "%"),
            Self::Lt => write!(f, "<"),
            Self::Gt => write!(f, ">"),
            Self::Le => write!(f, "<="),
            Self::Ge => write!(f, ">="),
            Self::EqEq => write!(f, "=="),
            Self::NotEq => write!(f, "!="),
            Self::AndAnd => write!(f, "&&"),
            Self::OrOr => write!(f, "||"),
            Self::Bang => write!(f, "!"),
        }
    }
}

/// A token with its source position (character offset)
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub pos: usize,
}

/// Tokenize an expression source string
pub fn tokenize(source: &str) -> ExprResult<Vec<SpannedToken>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let pos = i;

        match ch {
            c if c.is_whitespace() => {
                i += 1;
            }
            '"' | '\'' => {
                let (literal, consumed) = scan_string(&chars, i)?;
                tokens.push(SpannedToken {
                    token: Token::Str(literal),
                    pos,
                });
                i += consumed;
            }
            c if c.is_ascii_digit() => {
                let (token, consumed) = scan_number(&chars, i);
                tokens.push(SpannedToken { token, pos });
                i += consumed;
            }
            c if c.is_alphabetic() || c == '_' => {
                let (token, consumed) = scan_word(&chars, i);
                tokens.push(SpannedToken { token, pos });
                i += consumed;
            }
            '$' => {
                tokens.push(SpannedToken {
                    token: Token::Dollar,
                    pos,
                });
                i += 1;
            }
            '.' => {
                tokens.push(SpannedToken {
                    token: Token::Dot,
                    pos,
                });
                i += 1;
            }
            '[' => {
                tokens.push(SpannedToken {
                    token: Token::LBracket,
                    pos,
                });
                i += 1;
            }
            ']' => {
                tokens.push(SpannedToken {
                    token: Token::RBracket,
                    pos,
                });
                i += 1;
            }
            '(' => {
                tokens.push(SpannedToken {
                    token: Token::LParen,
                    pos,
                });
                i += 1;
            }
            ')' => {
                tokens.push(SpannedToken {
                    token: Token::RParen,
                    pos,
                });
                i += 1;
            }
            ',' => {
                tokens.push(SpannedToken {
                    token: Token::Comma,
                    pos,
                });
                i += 1;
            }
            '+' => {
                tokens.push(SpannedToken {
                    token: Token::Plus,
                    pos,
                });
                i += 1;
            }
            '-' => {
                tokens.push(SpannedToken {
                    token: Token::Minus,
                    pos,
                });
                i += 1;
            }
            '*' => {
                tokens.push(SpannedToken {
                    token: Token::Star,
                    pos,
                });
                i += 1;
            }
            '/' => {
                tokens.push(SpannedToken {
                    token: Token::Slash,
                    pos,
                });
                i += 1;
            }
            '%' => {
                tokens.push(SpannedToken {
                    token: Token::Percent,
                    pos,
                });
                i += 1;
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(SpannedToken {
                        token: Token::Le,
                        pos,
                    });
                    i += 2;
                } else {
                    tokens.push(SpannedToken {
                        token: Token::Lt,
                        pos,
                    });
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(SpannedToken {
                        token: Token::Ge,
                        pos,
                    });
                    i += 2;
                } else {
                    tokens.push(SpannedToken {
                        token: Token::Gt,
                        pos,
                    });
                    i += 1;
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(SpannedToken {
                        token: Token::EqEq,
                        pos,
                    });
                    i += 2;
                } else {
                    // Assignment does not exist in this language
                    return Err(ExprError::UnexpectedChar { ch: '=', pos });
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(SpannedToken {
                        token: Token::NotEq,
                        pos,
                    });
                    i += 2;
                } else {
                    tokens.push(SpannedToken {
                        token: Token::Bang,
                        pos,
                    });
                    i += 1;
                }
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(SpannedToken {
                        token: Token::AndAnd,
                        pos,
                    });
                    i += 2;
                } else {
                    return Err(ExprError::UnexpectedChar { ch: '&', pos });
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(SpannedToken {
                        token: Token::OrOr,
                        pos,
                    });
                    i += 2;
                } else {
                    return Err(ExprError::UnexpectedChar { ch: '|', pos });
                }
            }
            other => {
                return Err(ExprError::UnexpectedChar { ch: other, pos });
            }
        }
    }

    Ok(tokens)
}

/// Scan a quoted string starting at the opening quote; returns the decoded
/// contents and the number of characters consumed including both quotes.
fn scan_string(chars: &[char], start: usize) -> ExprResult<(String, usize)> {
    let quote = chars[start];
    let mut literal = String::new();
    // The cap counts characters, not bytes; each loop pushes exactly one
    let mut length = 0;
    let mut i = start + 1;

    while i < chars.len() {
        let ch = chars[i];
        if ch == quote {
            return Ok((literal, i - start + 1));
        }
        if ch == '\\' {
            let Some(&escaped) = chars.get(i + 1) else {
                return Err(ExprError::UnterminatedString { pos: start });
            };
            literal.push(match escaped {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                // Unknown escapes keep the escaped character
                other => other,
            });
            i += 2;
        } else {
            literal.push(ch);
            i += 1;
        }
        length += 1;
        if length > MAX_STRING_LENGTH {
            return Err(ExprError::StringTooLong {
                pos: start,
                max: MAX_STRING_LENGTH,
            });
        }
    }

    Err(ExprError::UnterminatedString { pos: start })
}

/// Scan an integer or float literal
fn scan_number(chars: &[char], start: usize) -> (Token, usize) {
    let mut i = start;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }

    let mut is_float = false;
    // A dot followed by a digit continues the number; a bare dot is postfix
    // path access and stays untouched.
    if i < chars.len()
        && chars[i] == '.'
        && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit())
    {
        is_float = true;
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }

    let text: String = chars[start..i].iter().collect();
    let token = if is_float {
        Token::Float(text.parse().unwrap_or(0.0))
    } else {
        match text.parse::<i64>() {
            Ok(n) => Token::Int(n),
            // Out-of-range integer literal falls back to float
            Err(_) => Token::Float(text.parse().unwrap_or(0.0)),
        }
    };

    (token, i - start)
}

/// Scan an identifier or keyword (booleans, null, word operator aliases)
fn scan_word(chars: &[char], start: usize) -> (Token, usize) {
    let mut i = start;
    while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
        i += 1;
    }

    let word: String = chars[start..i].iter().collect();
    let token = match word.as_str() {
        "true" => Token::Bool(true),
        "false" => Token::Bool(false),
        "null" => Token::Null,
        "and" => Token::AndAnd,
        "or" => Token::OrOr,
        "not" => Token::Bang,
        _ => Token::Ident(word),
    };

    (token, i - start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("42"), vec![Token::Int(42)]);
        assert_eq!(kinds("3.25"), vec![Token::Float(3.25)]);
        // Trailing dot is path access, not part of the number
        assert_eq!(kinds("1.foo"), vec![
            Token::Int(1),
            Token::Dot,
            Token::Ident("foo".into())
        ]);
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(kinds(r#""hello""#), vec![Token::Str("hello".into())]);
        assert_eq!(kinds(r#"'it''s'"#), vec![
            Token::Str("it".into()),
            Token::Str("s".into())
        ]);
        assert_eq!(kinds(r#""a\nb\t\"c\"""#), vec![Token::Str("a\nb\t\"c\"".into())]);
        // Unknown escape keeps the character
        assert_eq!(kinds(r#""\q""#), vec![Token::Str("q".into())]);
    }

    #[test]
    fn test_unterminated_string_is_positioned() {
        let err = tokenize("1 + \"abc").unwrap_err();
        assert_eq!(err, ExprError::UnterminatedString { pos: 4 });
    }

    #[test]
    fn test_string_length_cap() {
        let source = format!("\"{}\"", "x".repeat(MAX_STRING_LENGTH + 1));
        let err = tokenize(&source).unwrap_err();
        assert!(matches!(err, ExprError::StringTooLong { pos: 0, .. }));
    }

    #[test]
    fn test_string_length_cap_counts_characters_not_bytes() {
        // 'é' is two bytes; exactly MAX characters must still tokenize
        let at_cap = format!("\"{}\"", "é".repeat(MAX_STRING_LENGTH));
        assert!(tokenize(&at_cap).is_ok());

        let over = format!("\"{}\"", "é".repeat(MAX_STRING_LENGTH + 1));
        let err = tokenize(&over).unwrap_err();
        assert!(matches!(err, ExprError::StringTooLong { pos: 0, .. }));
    }

    #[test]
    fn test_two_char_operators() {
        assert_eq!(
            kinds("a == b != c <= d >= e && f || g"),
            vec![
                Token::Ident("a".into()),
                Token::EqEq,
                Token::Ident("b".into()),
                Token::NotEq,
                Token::Ident("c".into()),
                Token::Le,
                Token::Ident("d".into()),
                Token::Ge,
                Token::Ident("e".into()),
                Token::AndAnd,
                Token::Ident("f".into()),
                Token::OrOr,
                Token::Ident("g".into()),
            ]
        );
    }

    #[test]
    fn test_word_aliases() {
        assert_eq!(kinds("a and b or not c"), vec![
            Token::Ident("a".into()),
            Token::AndAnd,
            Token::Ident("b".into()),
            Token::OrOr,
            Token::Bang,
            Token::Ident("c".into()),
        ]);
    }

    #[test]
    fn test_scope_path() {
        assert_eq!(kinds("$user.id"), vec![
            Token::Dollar,
            Token::Ident("user".into()),
            Token::Dot,
            Token::Ident("id".into()),
        ]);
    }

    #[test]
    fn test_unrecognized_characters() {
        assert_eq!(
            tokenize("a @ b").unwrap_err(),
            ExprError::UnexpectedChar { ch: '@', pos: 2 }
        );
        assert_eq!(
            tokenize("a = b").unwrap_err(),
            ExprError::UnexpectedChar { ch: '=', pos: 2 }
        );
        assert_eq!(
            tokenize("a & b").unwrap_err(),
            ExprError::UnexpectedChar { ch: '&', pos: 2 }
        );
    }

    proptest! {
        // The tokenizer must never panic, whatever the input
        #[test]
        fn tokenize_never_panics(source in ".*") {
            let _ = tokenize(&source);
        }
    }
}

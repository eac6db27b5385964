//! A small, side-effect-free expression language for scoring submissions.
//!
//! Predicates are evaluated purely against the entry point's source text,
//! bound to the single identifier `code`:
//!
//! ```text
//! return (code.includes('this.taxRate') && (code.includes('*') || code.includes('+')));
//! !code.matches('eval\\s*\\(') && code.length < 2000
//! ```
//!
//! Nothing in the language can reach the host: there are no assignments,
//! loops, calls other than the four string methods, or identifiers other
//! than `code`.

use regex::{Regex, RegexBuilder};
use thiserror::Error;

/// Longest predicate source accepted, in bytes.
pub const MAX_PREDICATE_LEN: usize = 4096;
/// Deepest nesting of parentheses and `!` accepted.
pub const MAX_NESTING_DEPTH: usize = 64;
/// Compiled-size ceiling for `code.matches(...)` patterns.
pub const REGEX_SIZE_LIMIT: usize = 1 << 20;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredicateError {
    #[error("predicate is {len} bytes, the limit is {limit}")]
    TooLong { len: usize, limit: usize },

    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("expected {expected} at offset {offset}, found {found}")]
    UnexpectedToken {
        expected: &'static str,
        found: String,
        offset: usize,
    },

    #[error("unexpected end of predicate, expected {0}")]
    UnexpectedEnd(&'static str),

    #[error("nesting exceeds {0} levels")]
    TooDeep(usize),

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("unknown member 'code.{0}'")]
    UnknownMember(String),

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("cannot compare {left} with {right}")]
    TypeMismatch {
        left: &'static str,
        right: &'static str,
    },

    #[error("expected a boolean, found a {0}")]
    NotBoolean(&'static str),
}

// ============================================================================
// LEXER
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Dot,
    Semicolon,
    Not,
    And,
    Or,
    Cmp(CmpOp),
    Number(f64),
    Str(String),
    Ident(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::Dot => "'.'".to_string(),
            Token::Semicolon => "';'".to_string(),
            Token::Not => "'!'".to_string(),
            Token::And => "'&&'".to_string(),
            Token::Or => "'||'".to_string(),
            Token::Cmp(op) => format!("'{}'", op.symbol()),
            Token::Number(n) => format!("number {}", n),
            Token::Str(s) => format!("string {:?}", s),
            Token::Ident(name) => format!("'{}'", name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "===",
            CmpOp::Ne => "!==",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, PredicateError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some((offset, ch)) = chars.next() {
        let token = match ch {
            c if c.is_whitespace() => continue,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '.' => Token::Dot,
            ';' => Token::Semicolon,
            '&' | '|' => {
                if chars.next_if(|&(_, next)| next == ch).is_none() {
                    return Err(PredicateError::UnexpectedChar { ch, offset });
                }
                if ch == '&' {
                    Token::And
                } else {
                    Token::Or
                }
            }
            '!' | '=' => {
                let negated = ch == '!';
                if chars.next_if(|&(_, next)| next == '=').is_none() {
                    if negated {
                        tokens.push((offset, Token::Not));
                        continue;
                    }
                    return Err(PredicateError::UnexpectedChar { ch, offset });
                }
                // `==` and `===` (and their negations) mean the same thing here.
                chars.next_if(|&(_, next)| next == '=');
                Token::Cmp(if negated { CmpOp::Ne } else { CmpOp::Eq })
            }
            '<' | '>' => {
                let inclusive = chars.next_if(|&(_, next)| next == '=').is_some();
                Token::Cmp(match (ch, inclusive) {
                    ('<', false) => CmpOp::Lt,
                    ('<', true) => CmpOp::Le,
                    ('>', false) => CmpOp::Gt,
                    _ => CmpOp::Ge,
                })
            }
            '\'' | '"' => Token::Str(lex_string(&mut chars, ch, offset)?),
            c if c.is_ascii_digit() => {
                let mut literal = String::from(c);
                while let Some((_, next)) = chars.next_if(|&(_, n)| n.is_ascii_digit() || n == '.') {
                    literal.push(next);
                }
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| PredicateError::InvalidNumber(literal.clone()))?;
                Token::Number(value)
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                let mut ident = String::from(c);
                while let Some((_, next)) =
                    chars.next_if(|&(_, n)| n.is_ascii_alphanumeric() || n == '_' || n == '$')
                {
                    ident.push(next);
                }
                Token::Ident(ident)
            }
            _ => return Err(PredicateError::UnexpectedChar { ch, offset }),
        };
        tokens.push((offset, token));
    }

    Ok(tokens)
}

fn lex_string(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    quote: char,
    start: usize,
) -> Result<String, PredicateError> {
    let mut value = String::new();
    loop {
        match chars.next() {
            None => return Err(PredicateError::UnterminatedString(start)),
            Some((_, c)) if c == quote => return Ok(value),
            Some((_, '\\')) => match chars.next() {
                None => return Err(PredicateError::UnterminatedString(start)),
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, 'r')) => value.push('\r'),
                Some((_, '0')) => value.push('\0'),
                // Unknown escapes stand for the character itself.
                Some((_, other)) => value.push(other),
            },
            Some((_, c)) => value.push(c),
        }
    }
}

// ============================================================================
// PARSER
// ============================================================================

#[derive(Debug, Clone)]
enum Expr {
    Bool(bool),
    Number(f64),
    Str(String),
    Length,
    Includes(String),
    StartsWith(String),
    EndsWith(String),
    Matches(Regex),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, token)| token)
    }

    fn next(&mut self) -> Option<(usize, Token)> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, what: &'static str) -> Result<(), PredicateError> {
        match self.next() {
            Some((_, token)) if token == expected => Ok(()),
            Some((offset, token)) => Err(PredicateError::UnexpectedToken {
                expected: what,
                found: token.describe(),
                offset,
            }),
            None => Err(PredicateError::UnexpectedEnd(what)),
        }
    }

    fn enter(&mut self) -> Result<(), PredicateError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(PredicateError::TooDeep(MAX_NESTING_DEPTH));
        }
        Ok(())
    }

    fn program(&mut self) -> Result<Expr, PredicateError> {
        if self.peek() == Some(&Token::Ident("return".to_string())) {
            self.pos += 1;
        }
        let expr = self.or()?;
        self.eat(&Token::Semicolon);
        match self.next() {
            None => Ok(expr),
            Some((offset, token)) => Err(PredicateError::UnexpectedToken {
                expected: "end of predicate",
                found: token.describe(),
                offset,
            }),
        }
    }

    fn or(&mut self) -> Result<Expr, PredicateError> {
        let mut left = self.and()?;
        while self.eat(&Token::Or) {
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, PredicateError> {
        let mut left = self.unary()?;
        while self.eat(&Token::And) {
            let right = self.unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, PredicateError> {
        if self.eat(&Token::Not) {
            self.enter()?;
            let operand = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, PredicateError> {
        let left = self.primary()?;
        if let Some(Token::Cmp(op)) = self.peek() {
            let op = *op;
            self.pos += 1;
            let right = self.primary()?;
            return Ok(Expr::Compare(op, Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn primary(&mut self) -> Result<Expr, PredicateError> {
        match self.next() {
            Some((_, Token::LParen)) => {
                self.enter()?;
                let inner = self.or()?;
                self.expect(Token::RParen, "')'")?;
                self.depth -= 1;
                Ok(inner)
            }
            Some((_, Token::Number(n))) => Ok(Expr::Number(n)),
            Some((_, Token::Str(s))) => Ok(Expr::Str(s)),
            Some((_, Token::Ident(name))) => match name.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "code" => self.member(),
                _ => Err(PredicateError::UnknownIdentifier(name)),
            },
            Some((offset, token)) => Err(PredicateError::UnexpectedToken {
                expected: "a value",
                found: token.describe(),
                offset,
            }),
            None => Err(PredicateError::UnexpectedEnd("a value")),
        }
    }

    fn member(&mut self) -> Result<Expr, PredicateError> {
        self.expect(Token::Dot, "'.' after 'code'")?;
        let name = match self.next() {
            Some((_, Token::Ident(name))) => name,
            Some((offset, token)) => {
                return Err(PredicateError::UnexpectedToken {
                    expected: "a member name",
                    found: token.describe(),
                    offset,
                })
            }
            None => return Err(PredicateError::UnexpectedEnd("a member name")),
        };

        if name == "length" {
            return Ok(Expr::Length);
        }
        if !matches!(name.as_str(), "includes" | "startsWith" | "endsWith" | "matches") {
            return Err(PredicateError::UnknownMember(name));
        }

        self.expect(Token::LParen, "'('")?;
        let argument = match self.next() {
            Some((_, Token::Str(s))) => s,
            Some((offset, token)) => {
                return Err(PredicateError::UnexpectedToken {
                    expected: "a string argument",
                    found: token.describe(),
                    offset,
                })
            }
            None => return Err(PredicateError::UnexpectedEnd("a string argument")),
        };
        self.expect(Token::RParen, "')'")?;

        Ok(match name.as_str() {
            "includes" => Expr::Includes(argument),
            "startsWith" => Expr::StartsWith(argument),
            "endsWith" => Expr::EndsWith(argument),
            _ => Expr::Matches(
                RegexBuilder::new(&argument)
                    .size_limit(REGEX_SIZE_LIMIT)
                    .build()
                    .map_err(|e| PredicateError::InvalidPattern(e.to_string()))?,
            ),
        })
    }
}

// ============================================================================
// EVALUATION
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Bool(bool),
    Number(f64),
    Str(String),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
        }
    }

    fn into_bool(self) -> Result<bool, PredicateError> {
        match self {
            Value::Bool(b) => Ok(b),
            other => Err(PredicateError::NotBoolean(other.type_name())),
        }
    }
}

/// A parsed predicate, ready to be evaluated against any number of sources.
#[derive(Debug, Clone)]
pub struct Predicate {
    expr: Expr,
}

impl Predicate {
    pub fn parse(source: &str) -> Result<Self, PredicateError> {
        if source.len() > MAX_PREDICATE_LEN {
            return Err(PredicateError::TooLong {
                len: source.len(),
                limit: MAX_PREDICATE_LEN,
            });
        }
        let mut parser = Parser {
            tokens: tokenize(source)?,
            pos: 0,
            depth: 0,
        };
        Ok(Self {
            expr: parser.program()?,
        })
    }

    /// Evaluate against `code`. The predicate must produce a boolean.
    pub fn evaluate(&self, code: &str) -> Result<bool, PredicateError> {
        eval(&self.expr, code)?.into_bool()
    }
}

fn eval(expr: &Expr, code: &str) -> Result<Value, PredicateError> {
    Ok(match expr {
        Expr::Bool(b) => Value::Bool(*b),
        Expr::Number(n) => Value::Number(*n),
        Expr::Str(s) => Value::Str(s.clone()),
        // Length in UTF-16 code units, as the submitted language counts it.
        Expr::Length => Value::Number(code.encode_utf16().count() as f64),
        Expr::Includes(needle) => Value::Bool(code.contains(needle.as_str())),
        Expr::StartsWith(prefix) => Value::Bool(code.starts_with(prefix.as_str())),
        Expr::EndsWith(suffix) => Value::Bool(code.ends_with(suffix.as_str())),
        Expr::Matches(re) => Value::Bool(re.is_match(code)),
        Expr::Not(inner) => Value::Bool(!eval(inner, code)?.into_bool()?),
        Expr::And(left, right) => {
            Value::Bool(eval(left, code)?.into_bool()? && eval(right, code)?.into_bool()?)
        }
        Expr::Or(left, right) => {
            Value::Bool(eval(left, code)?.into_bool()? || eval(right, code)?.into_bool()?)
        }
        Expr::Compare(op, left, right) => {
            Value::Bool(compare(*op, eval(left, code)?, eval(right, code)?)?)
        }
    })
}

fn compare(op: CmpOp, left: Value, right: Value) -> Result<bool, PredicateError> {
    use std::cmp::Ordering;

    let ordering = match (&left, &right) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) if matches!(op, CmpOp::Eq | CmpOp::Ne) => Some(a.cmp(b)),
        _ => {
            return Err(PredicateError::TypeMismatch {
                left: left.type_name(),
                right: right.type_name(),
            })
        }
    };

    // NaN compares false to everything, including itself.
    let Some(ordering) = ordering else {
        return Ok(op == CmpOp::Ne);
    };
    Ok(match op {
        CmpOp::Eq => ordering == Ordering::Equal,
        CmpOp::Ne => ordering != Ordering::Equal,
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::Ge => ordering != Ordering::Less,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVOICE: &str = r#"
class Invoice {
  constructor(items, taxRate) {
    this.items = items;
    this.taxRate = taxRate;
  }
  total() {
    const sum = this.items.reduce((a, b) => a + b.price, 0);
    return sum * (1 + this.taxRate);
  }
}
console.log(new Invoice([{ price: 10 }], 0.2).total());
"#;

    fn check(predicate: &str, code: &str) -> Result<bool, PredicateError> {
        Predicate::parse(predicate)?.evaluate(code)
    }

    #[test]
    fn test_includes_with_return_and_semicolon() {
        assert!(check("return code.includes('taxRate')", INVOICE).unwrap());
        assert!(check("return code.includes(\"taxRate\");", INVOICE).unwrap());
        assert!(!check("code.includes('discount')", INVOICE).unwrap());
    }

    #[test]
    fn test_grouped_boolean_logic() {
        let predicate =
            "return (code.includes('this.taxRate') && (code.includes('*') || code.includes('+')));";
        assert!(check(predicate, INVOICE).unwrap());
        assert!(!check(predicate, "const taxRate = 0.2;").unwrap());
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        assert!(check("true || false && false", "").unwrap());
        assert!(!check("(true || false) && false", "").unwrap());
    }

    #[test]
    fn test_negation_and_string_methods() {
        assert!(check("!code.includes('eval(')", INVOICE).unwrap());
        assert!(check("!!code.startsWith('\\nclass')", INVOICE).unwrap());
        assert!(check("code.endsWith('total());\\n')", INVOICE).unwrap());
    }

    #[test]
    fn test_matches_uses_regex() {
        assert!(check(r"code.matches('reduce\\(\\(a, b\\)')", INVOICE).unwrap());
        assert!(check(r"code.matches('^\\s*class\\s+\\w+')", INVOICE).unwrap());
        assert!(!check(r"code.matches('\\bfor\\s*\\(')", INVOICE).unwrap());
    }

    #[test]
    fn test_length_comparisons() {
        assert!(check("code.length > 10 && code.length <= 2000", INVOICE).unwrap());
        assert!(check("code.length === 3", "abc").unwrap());
        assert!(check("code.length == 2", "é!").unwrap());
        assert!(check("'abc' < 'abd'", "").unwrap());
        assert!(check("true !== false", "").unwrap());
    }

    #[test]
    fn test_mixed_type_comparison_is_an_error() {
        assert_eq!(
            check("code.length == '3'", "abc").unwrap_err(),
            PredicateError::TypeMismatch {
                left: "number",
                right: "string"
            }
        );
        assert!(matches!(
            check("true < false", ""),
            Err(PredicateError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_non_boolean_result_is_an_error() {
        assert_eq!(
            check("code.length", "abc").unwrap_err(),
            PredicateError::NotBoolean("number")
        );
        assert!(matches!(
            check("'yes' && true", ""),
            Err(PredicateError::NotBoolean("string"))
        ));
    }

    #[test]
    fn test_rejects_anything_outside_the_language() {
        for predicate in [
            "return code.includes('taxRate'",
            "process.exit(1)",
            "require('fs').readFileSync('/etc/passwd')",
            "code.toString()",
            "code.includes(1)",
            "code = 'x'",
            "code.includes('a') code.includes('b')",
            "while (true) {}",
            "`template`",
            "return",
            "'unterminated",
        ] {
            assert!(Predicate::parse(predicate).is_err(), "accepted {:?}", predicate);
        }
    }

    #[test]
    fn test_unknown_identifier_is_named() {
        assert_eq!(
            Predicate::parse("window.alert").unwrap_err(),
            PredicateError::UnknownIdentifier("window".to_string())
        );
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            Predicate::parse("code.matches('(')"),
            Err(PredicateError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_nesting_limit() {
        let ok = format!("{}true{}", "(".repeat(MAX_NESTING_DEPTH), ")".repeat(MAX_NESTING_DEPTH));
        assert!(check(&ok, "").unwrap());

        let deep = format!(
            "{}true{}",
            "(".repeat(MAX_NESTING_DEPTH + 1),
            ")".repeat(MAX_NESTING_DEPTH + 1)
        );
        assert_eq!(
            Predicate::parse(&deep).unwrap_err(),
            PredicateError::TooDeep(MAX_NESTING_DEPTH)
        );

        let negations = format!("{}true", "!".repeat(MAX_NESTING_DEPTH + 1));
        assert!(matches!(
            Predicate::parse(&negations),
            Err(PredicateError::TooDeep(_))
        ));
    }

    #[test]
    fn test_length_limit() {
        let long = format!("code.includes('{}')", "a".repeat(MAX_PREDICATE_LEN));
        assert!(matches!(
            Predicate::parse(&long),
            Err(PredicateError::TooLong { .. })
        ));
    }

    #[test]
    fn test_parsed_predicate_is_reusable() {
        let predicate = Predicate::parse("code.includes('x')").unwrap();
        assert!(predicate.evaluate("x").unwrap());
        assert!(!predicate.evaluate("y").unwrap());
    }
}

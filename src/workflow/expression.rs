//! Condition Expressions
//!
//! A small expression language used by switch steps and by `#{...}`
//! action parameters. Expressions are evaluated against the execution
//! context, the run's source value and the current output.
//!
//! ```text
//! expr    := operand (("==" | "!=") operand)?
//! operand := path | literal
//! path    := ("source" | "output" | "context") ("." ident | "[" index "]")*
//! literal := 'text' | "text" | number | true | false | null
//! ```
//!
//! `context.workflow` is the workflow name, any other `context.<key>`
//! reads a context attribute. Missing segments evaluate to `null`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::execution::context::ExecutionContext;

/// Value roots an expression path can start from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Root {
    Source,
    Output,
    Context,
}

/// One navigation step inside a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Field(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Path(Root, Vec<Segment>),
    Literal(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Equal,
    NotEqual,
}

/// A parsed expression. Keeps its source text for display and serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Expression {
    text: String,
    left: Operand,
    compare: Option<(Comparison, Operand)>,
}

impl Expression {
    /// Parses an expression.
    ///
    /// # Example
    ///
    /// ```
    /// use workflowlite::workflow::Expression;
    ///
    /// assert!(Expression::parse("output.kind == 'a'").is_ok());
    /// assert!(Expression::parse("output ==").is_err());
    /// ```
    pub fn parse(text: &str) -> Result<Self, String> {
        let tokens = tokenize(text)?;
        let mut parser = Parser { tokens, pos: 0 };

        let left = parser.operand()?;
        let compare = match parser.next() {
            None => None,
            Some(Token::Eq) => Some((Comparison::Equal, parser.operand()?)),
            Some(Token::Ne) => Some((Comparison::NotEqual, parser.operand()?)),
            Some(token) => return Err(format!("Unexpected {} in '{}'", token, text)),
        };

        if let Some(token) = parser.next() {
            return Err(format!("Unexpected {} in '{}'", token, text));
        }

        Ok(Self {
            text: text.trim().to_string(),
            left,
            compare,
        })
    }

    /// Returns the expression source text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Evaluates the expression.
    pub fn evaluate(&self, context: &dyn ExecutionContext, source: &Value, output: &Value) -> Value {
        let left = evaluate_operand(&self.left, context, source, output);

        match &self.compare {
            None => left,
            Some((op, right)) => {
                let right = evaluate_operand(right, context, source, output);
                let equal = left == right;
                Value::Bool(match op {
                    Comparison::Equal => equal,
                    Comparison::NotEqual => !equal,
                })
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl TryFrom<String> for Expression {
    type Error = String;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        Self::parse(&text)
    }
}

impl From<Expression> for String {
    fn from(expression: Expression) -> Self {
        expression.text
    }
}

/// Converts an evaluated value into the key used to pick a branch.
///
/// Strings map to themselves, scalars to their textual form and
/// anything else to compact JSON.
pub fn branch_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn evaluate_operand(
    operand: &Operand,
    context: &dyn ExecutionContext,
    source: &Value,
    output: &Value,
) -> Value {
    match operand {
        Operand::Literal(value) => value.clone(),
        Operand::Path(Root::Source, segments) => navigate(source, segments),
        Operand::Path(Root::Output, segments) => navigate(output, segments),
        Operand::Path(Root::Context, segments) => match segments.split_first() {
            None => Value::String(context.workflow_name().to_string()),
            Some((Segment::Field(key), rest)) if key == "workflow" => {
                navigate(&Value::String(context.workflow_name().to_string()), rest)
            }
            Some((Segment::Field(key), rest)) => match context.attribute(key) {
                Some(value) => navigate(&value, rest),
                None => Value::Null,
            },
            Some((Segment::Index(_), _)) => Value::Null,
        },
    }
}

fn navigate(value: &Value, segments: &[Segment]) -> Value {
    let mut current = value;
    for segment in segments {
        let next = match segment {
            Segment::Field(name) => current.get(name.as_str()),
            Segment::Index(index) => current.get(*index),
        };
        match next {
            Some(value) => current = value,
            None => return Value::Null,
        }
    }
    current.clone()
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(Value),
    Dot,
    LBracket,
    RBracket,
    Eq,
    Ne,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "'{}'", name),
            Token::Str(s) => write!(f, "string '{}'", s),
            Token::Number(n) => write!(f, "number {}", n),
            Token::Dot => write!(f, "'.'"),
            Token::LBracket => write!(f, "'['"),
            Token::RBracket => write!(f, "']'"),
            Token::Eq => write!(f, "'=='"),
            Token::Ne => write!(f, "'!='"),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '=' | '!' => {
                if chars.get(i + 1) != Some(&'=') {
                    return Err(format!("Expected '=' after '{}' in '{}'", c, text));
                }
                tokens.push(if c == '=' { Token::Eq } else { Token::Ne });
                i += 2;
            }
            '\'' | '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or_else(|| format!("Unterminated string in '{}'", text))?;
                tokens.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            c if c.is_ascii_digit() || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let number = serde_json::from_str::<serde_json::Number>(&literal)
                    .map_err(|_| format!("Invalid number '{}' in '{}'", literal, text))?;
                tokens.push(Token::Number(Value::Number(number)));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '-') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("Unexpected character '{}' in '{}'", other, text)),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn operand(&mut self) -> Result<Operand, String> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Operand::Literal(Value::String(s))),
            Some(Token::Number(n)) => Ok(Operand::Literal(n)),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Operand::Literal(Value::Bool(true))),
                "false" => Ok(Operand::Literal(Value::Bool(false))),
                "null" => Ok(Operand::Literal(Value::Null)),
                "source" => Ok(Operand::Path(Root::Source, self.segments()?)),
                "output" => Ok(Operand::Path(Root::Output, self.segments()?)),
                "context" => Ok(Operand::Path(Root::Context, self.segments()?)),
                other => Err(format!(
                    "Unknown root '{}' (expected source, output or context)",
                    other
                )),
            },
            Some(token) => Err(format!("Expected a value but found {}", token)),
            None => Err("Expected a value but the expression ended".to_string()),
        }
    }

    fn segments(&mut self) -> Result<Vec<Segment>, String> {
        let mut segments = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    match self.next() {
                        Some(Token::Ident(name)) => segments.push(Segment::Field(name)),
                        Some(token) => return Err(format!("Expected a field name after '.' but found {}", token)),
                        None => return Err("Expected a field name after '.'".to_string()),
                    }
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = match self.next() {
                        Some(Token::Number(Value::Number(n))) => n
                            .as_u64()
                            .map(|n| n as usize)
                            .ok_or_else(|| format!("Invalid index {}", n))?,
                        Some(Token::Str(key)) => {
                            self.expect_close()?;
                            segments.push(Segment::Field(key));
                            continue;
                        }
                        _ => return Err("Expected an index inside '[ ]'".to_string()),
                    };
                    self.expect_close()?;
                    segments.push(Segment::Index(index));
                }
                _ => return Ok(segments),
            }
        }
    }

    fn expect_close(&mut self) -> Result<(), String> {
        match self.next() {
            Some(Token::RBracket) => Ok(()),
            _ => Err("Expected ']'".to_string()),
        }
    }
}

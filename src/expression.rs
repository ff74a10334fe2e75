//! Grouping expressions.
//!
//! An expression is a dot-separated navigation path, optionally followed by a
//! single arithmetic operation against a numeric literal:
//!
//! ```text
//! year
//! date.year
//! account.owner().upper
//! date.year % 2
//! ```
//!
//! Each path segment is either a field (`year`) or a zero-argument method
//! call (`year()`). Nothing else is evaluated.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use tracing::trace;

use crate::config::Settings;
use crate::errors::{RollupError, RollupResult};
use crate::record::Record;
use crate::value::Value;

const IDENT: &str = r"[A-Za-z_][A-Za-z0-9_]*";

fn expression_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let segment = format!(r"{IDENT}(?:\(\))?");
        let pattern = format!(
            r"^\s*(?P<path>{segment}(?:\s*\.\s*{segment})*)\s*(?:(?P<op>[-+*/%])\s*(?P<lit>[-+]?\d+(?:\.\d+)?))?\s*$"
        );
        Regex::new(&pattern).expect("expression grammar is a valid regex")
    })
}

fn ident_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!("^{IDENT}$")).expect("identifier grammar is a valid regex"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl Operator {
    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(Self::Add),
            "-" => Some(Self::Sub),
            "*" => Some(Self::Mul),
            "/" => Some(Self::Div),
            "%" => Some(Self::Rem),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
        }
    }

    /// Apply the operator. `%` is floored: the result takes the sign of the divisor.
    pub fn apply(&self, lhs: &Value, rhs: &Value) -> Result<Value, String> {
        match (lhs, rhs) {
            (Value::Int(a), Value::Int(b)) => self.apply_int(*a, *b),
            _ => match (lhs.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => self.apply_float(a, b),
                _ => Err(format!(
                    "cannot apply '{}' to {} and {}",
                    self.symbol(),
                    lhs.type_name(),
                    rhs.type_name()
                )),
            },
        }
    }

    fn apply_int(&self, a: i64, b: i64) -> Result<Value, String> {
        let overflow = || format!("integer overflow in {a} {} {b}", self.symbol());
        match self {
            Self::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
            Self::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
            Self::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
            Self::Div => {
                if b == 0 {
                    return Err("division by zero".to_string());
                }
                Ok(Value::Float(a as f64 / b as f64))
            }
            Self::Rem => {
                if b == 0 {
                    return Err("modulo by zero".to_string());
                }
                let r = a.checked_rem(b).ok_or_else(overflow)?;
                if r != 0 && (r < 0) != (b < 0) {
                    Ok(Value::Int(r + b))
                } else {
                    Ok(Value::Int(r))
                }
            }
        }
    }

    fn apply_float(&self, a: f64, b: f64) -> Result<Value, String> {
        match self {
            Self::Add => Ok(Value::Float(a + b)),
            Self::Sub => Ok(Value::Float(a - b)),
            Self::Mul => Ok(Value::Float(a * b)),
            Self::Div if b == 0.0 => Err("division by zero".to_string()),
            Self::Div => Ok(Value::Float(a / b)),
            Self::Rem if b == 0.0 => Err("modulo by zero".to_string()),
            Self::Rem => {
                let r = a % b;
                if r != 0.0 && (r < 0.0) != (b < 0.0) {
                    Ok(Value::Float(r + b))
                } else {
                    Ok(Value::Float(r))
                }
            }
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One step of a navigation path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    /// `true` for `name()`, `false` for plain field access.
    pub call: bool,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.call {
            write!(f, "{}()", self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}

/// A parsed grouping expression, reusable across items and calls.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    path: Vec<Segment>,
    arithmetic: Option<(Operator, Value)>,
}

impl Expression {
    pub fn parse(source: &str) -> RollupResult<Self> {
        let invalid = |reason: &str| RollupError::InvalidExpression {
            expression: source.to_string(),
            reason: reason.to_string(),
        };
        if source.trim().is_empty() {
            return Err(invalid("empty expression"));
        }
        let caps = expression_regex().captures(source).ok_or_else(|| {
            invalid("expected a dotted field/method path optionally followed by one of + - * / % and a number")
        })?;

        let path = caps["path"]
            .split('.')
            .map(|raw| {
                let raw = raw.trim();
                match raw.strip_suffix("()") {
                    Some(name) => Segment {
                        name: name.to_string(),
                        call: true,
                    },
                    None => Segment {
                        name: raw.to_string(),
                        call: false,
                    },
                }
            })
            .collect();

        let arithmetic = match (caps.name("op"), caps.name("lit")) {
            (Some(op), Some(lit)) => {
                let op = Operator::from_symbol(op.as_str()).ok_or_else(|| invalid("unknown operator"))?;
                let literal = parse_literal(lit.as_str()).ok_or_else(|| invalid("invalid numeric literal"))?;
                Some((op, literal))
            }
            _ => None,
        };

        Ok(Self {
            source: source.trim().to_string(),
            path,
            arithmetic,
        })
    }

    /// Direct access to a single named field.
    pub fn field(name: &str) -> RollupResult<Self> {
        validate_field_name(name)?;
        Ok(Self {
            source: name.to_string(),
            path: vec![Segment {
                name: name.to_string(),
                call: false,
            }],
            arithmetic: None,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn path(&self) -> &[Segment] {
        &self.path
    }

    pub fn arithmetic(&self) -> Option<(Operator, &Value)> {
        self.arithmetic.as_ref().map(|(op, v)| (*op, v))
    }

    /// Evaluate against an item, propagating nulls.
    pub fn evaluate<R: Record + ?Sized>(&self, item: &R) -> RollupResult<Value> {
        self.evaluate_with(item, &Settings::default())
    }

    pub fn evaluate_with<R: Record + ?Sized>(&self, item: &R, settings: &Settings) -> RollupResult<Value> {
        let (first, rest) = self
            .path
            .split_first()
            .ok_or_else(|| self.evaluation_error("empty path"))?;

        let found = if first.call {
            item.method(&first.name)
        } else {
            item.field(&first.name)
        };
        let mut current = found.ok_or_else(|| RollupError::UnknownSegment {
            expression: self.source.clone(),
            segment: first.to_string(),
            target: std::any::type_name::<R>().to_string(),
        })?;

        for segment in rest {
            if current.is_null() {
                return self.null_intermediate(segment, settings);
            }
            current = current
                .navigate(&segment.name, segment.call)
                .ok_or_else(|| RollupError::UnknownSegment {
                    expression: self.source.clone(),
                    segment: segment.to_string(),
                    target: format!("{} {}", current.type_name(), current),
                })?;
        }

        if let Some((op, literal)) = &self.arithmetic {
            if current.is_null() {
                if settings.propagate_null {
                    return Ok(Value::Null);
                }
                return Err(self.evaluation_error(&format!("cannot apply '{op}' to null")));
            }
            current = op
                .apply(&current, literal)
                .map_err(|reason| self.evaluation_error(&reason))?;
        }

        trace!(expression = %self.source, value = %current, "evaluated");
        Ok(current)
    }

    fn null_intermediate(&self, segment: &Segment, settings: &Settings) -> RollupResult<Value> {
        if settings.propagate_null {
            Ok(Value::Null)
        } else {
            Err(self.evaluation_error(&format!("cannot access '{segment}' on null")))
        }
    }

    fn evaluation_error(&self, reason: &str) -> RollupError {
        RollupError::Evaluation {
            expression: self.source.clone(),
            reason: reason.to_string(),
        }
    }
}

impl FromStr for Expression {
    type Err = RollupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_literal(lit: &str) -> Option<Value> {
    if lit.contains('.') {
        lit.parse::<f64>().ok().map(Value::Float)
    } else {
        lit.parse::<i64>().ok().map(Value::Int)
    }
}

/// Check that `name` is a bare identifier usable as a simple field access.
pub(crate) fn validate_field_name(name: &str) -> RollupResult<()> {
    if ident_regex().is_match(name) {
        Ok(())
    } else {
        Err(RollupError::InvalidExpression {
            expression: name.to_string(),
            reason: "expected a plain field name".to_string(),
        })
    }
}

//! Typed values produced by the stylesheet evaluator.

use crate::color::Color;
use std::fmt;

/// A raster colorizer stop: a threshold value and its color.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stop {
    pub value: f64,
    pub color: Color,
}

/// A fully evaluated property or filter value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Num(f64),
    Percent(f64),
    Dimension(f64, String),
    Str(String),
    /// A bracketed attribute reference, stored with its brackets (`[name]`).
    Field(String),
    Url(String),
    Color(Color),
    List(Vec<Value>),
    Stop(Stop),
}

/// Arithmetic operators usable in property expressions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    pub(crate) fn symbol(self) -> char {
        match self {
            ArithOp::Add => '+',
            ArithOp::Sub => '-',
            ArithOp::Mul => '*',
            ArithOp::Div => '/',
        }
    }

    fn apply(self, a: f64, b: f64) -> Result<f64, String> {
        match self {
            ArithOp::Add => Ok(a + b),
            ArithOp::Sub => Ok(a - b),
            ArithOp::Mul => Ok(a * b),
            ArithOp::Div => {
                if b == 0.0 {
                    Err("division by zero".to_string())
                } else {
                    Ok(a / b)
                }
            }
        }
    }
}

impl Value {
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Value::Num(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Num(_) => "number",
            Value::Percent(_) => "percentage",
            Value::Dimension(..) => "dimension",
            Value::Str(_) => "string",
            Value::Field(_) => "field",
            Value::Url(_) => "url",
            Value::Color(_) => "color",
            Value::List(_) => "list",
            Value::Stop(_) => "stop",
        }
    }
}

/// Apply `op` to two values. Only compatible tag pairs are defined;
/// anything else is an evaluation-time type mismatch.
pub(crate) fn binop(op: ArithOp, a: &Value, b: &Value) -> Result<Value, String> {
    use Value::*;
    match (a, b) {
        (Num(x), Num(y)) => Ok(Num(op.apply(*x, *y)?)),
        (Percent(x), Percent(y)) => Ok(Percent(op.apply(*x, *y)?)),
        (Percent(x), Num(y)) => Ok(Percent(op.apply(*x, *y)?)),
        (Num(x), Percent(y)) => Ok(Percent(op.apply(*x, *y)?)),
        (Dimension(x, unit), Num(y)) => Ok(Dimension(op.apply(*x, *y)?, unit.clone())),
        (Num(x), Dimension(y, unit)) => Ok(Dimension(op.apply(*x, *y)?, unit.clone())),
        (Dimension(x, ua), Dimension(y, ub)) if ua == ub => {
            Ok(Dimension(op.apply(*x, *y)?, ua.clone()))
        }
        (Str(x), Str(y)) if op == ArithOp::Add => Ok(Str(format!("{x}{y}"))),
        _ => Err(format!(
            "operator {} not defined for {} and {}",
            op.symbol(),
            a.type_name(),
            b.type_name()
        )),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Num(v) => write!(f, "{v}"),
            Value::Percent(v) => write!(f, "{v}%"),
            Value::Dimension(v, unit) => write!(f, "{v}{unit}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Field(s) => write!(f, "{s}"),
            Value::Url(u) => write!(f, "url({u})"),
            Value::Color(c) => write!(f, "{c}"),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Stop(s) => write!(f, "stop({}, {})", s.value, s.color),
        }
    }
}

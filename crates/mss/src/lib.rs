//! MSS stylesheet compiler core.
//!
//! The pipeline: [`Decoder`] scans and parses one or more stylesheets,
//! `evaluate` resolves variables and expressions into an immutable
//! [`Mss`] block tree, and [`Mss::layer_rules`] runs the cascade
//! resolver to flatten it into ordered, renderer-ready rules per layer.
//!
//! The block tree is immutable after evaluation and can be shared
//! read-only across threads; every query allocates its own rule list.

pub mod color;
mod eval;
mod parser;
mod properties;
mod rule;
mod token;
mod value;
mod zoom;

pub use properties::{Key, Prefix, Properties};
pub use rule::{CompOp, Filter, Rule, Selector};
pub use value::{Stop, Value};
pub use zoom::{ZoomRange, ZOOM_LEVELS};

use std::fs;
use std::path::Path;

/// Errors produced while compiling a stylesheet.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("scan error at line {line}, column {column}: {message}")]
    Scan { line: usize, column: usize, message: String },
    #[error("parse error at line {line}, column {column}: {message}")]
    Parse { line: usize, column: usize, message: String },
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Evaluation failures: all abort the compile.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("undefined variable @{name} at line {line}, column {column}")]
    UndefinedVar { name: String, line: usize, column: usize },
    #[error("cyclic definition of variable @{name} at line {line}, column {column}")]
    Cycle { name: String, line: usize, column: usize },
    #[error("type mismatch at line {line}, column {column}: {message}")]
    TypeMismatch { line: usize, column: usize, message: String },
    #[error("{function}() expects {expected} arguments, got {got} (line {line}, column {column})")]
    Arity { function: String, expected: usize, got: usize, line: usize, column: usize },
    #[error("unknown function {name}() at line {line}, column {column}")]
    UnknownFunction { name: String, line: usize, column: usize },
}

/// Parses stylesheets and evaluates them into an [`Mss`].
///
/// The declaration index counter is scoped to the decoder, so separate
/// compiles are independent while declaration order is preserved across
/// all stylesheets of one compile.
#[derive(Default)]
pub struct Decoder {
    sheets: Vec<parser::Sheet>,
    next_index: u32,
}

impl Decoder {
    pub fn new() -> Decoder {
        Decoder::default()
    }

    pub fn parse_string(&mut self, src: &str) -> Result<(), Error> {
        let mut parser = parser::Parser::new(src, self.next_index);
        let sheet = parser.parse_sheet()?;
        self.next_index = parser.next_index();
        self.sheets.push(sheet);
        Ok(())
    }

    pub fn parse_file(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        let src = fs::read_to_string(path)?;
        self.parse_string(&src)
    }

    /// `@import` paths seen so far, in order.
    pub fn imports(&self) -> Vec<&str> {
        self.sheets
            .iter()
            .flat_map(|s| s.imports.iter().map(String::as_str))
            .collect()
    }

    /// Resolve variables and expressions into the immutable block tree.
    pub fn evaluate(self) -> Result<Mss, Error> {
        eval::evaluate_sheets(&self.sheets).map_err(Error::Eval)
    }
}

/// The evaluated block tree plus map-scope properties, queried by the
/// cascade resolver.
#[derive(Debug)]
pub struct Mss {
    pub(crate) root: Block,
    pub(crate) map_props: Properties,
}

/// One node of the evaluated tree: selectors, fully-reduced properties,
/// and nested blocks.
#[derive(Clone, Debug, Default)]
pub(crate) struct Block {
    pub selectors: Vec<Selector>,
    pub properties: Properties,
    pub blocks: Vec<Block>,
}

impl Mss {
    /// Properties declared in `Map { ... }` blocks.
    pub fn map_properties(&self) -> &Properties {
        &self.map_props
    }
}

//! Decoded instruction and operand types

use serde::{Deserialize, Serialize};

/// One typed argument to an instruction.
///
/// The literal text is preserved exactly as written; operands are resolved
/// to concrete values only at use time, so a `Variable` operand always
/// reflects the variable's current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// `[name]` — reference to a store variable
    Variable(String),
    /// bare numeric token
    Number(String),
    /// `"quoted string"` or a bare word
    Str(String),
}

impl Operand {
    /// The literal text, without classification
    pub fn raw_text(&self) -> &str {
        match self {
            Operand::Variable(s) | Operand::Number(s) | Operand::Str(s) => s,
        }
    }
}

/// A decoded source line. Built once at load time, immutable afterward.
///
/// A no-op still occupies a line slot so that line numbers and jump targets
/// stay stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub op: String,
    pub operands: Vec<Operand>,
    pub no_op: bool,
}

impl Instruction {
    /// Blank or unrecognized line
    pub fn no_op() -> Self {
        Instruction {
            op: String::new(),
            operands: Vec::new(),
            no_op: true,
        }
    }
}

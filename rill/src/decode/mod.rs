//! Instruction decoder
//!
//! Turns one raw source line into a structured instruction with typed
//! operands. Classification tries the variable pattern first, then numeric,
//! then quoted string, then falls back to a bare word treated as a raw
//! string. Text that matches none of these (an unterminated quote, an
//! unclosed bracket) is a `DecodeAmbiguity` error at load time.

mod instr;

pub use instr::{Instruction, Operand};

use crate::error::{Fault, Result, RunError};
use crate::ops::Registry;
use crate::program::LabelTable;
use logos::Logos;

/// Control-flow keywords handled directly by the engine, never dispatched
/// through the operator registry.
pub const RESERVED: [&str; 7] = ["def", "jmp", "jlt", "jgt", "jeq", "jne", "stp"];

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t]+")]
enum OperandToken {
    #[regex(r"\[[^\[\]]*\]", trim_delimiters)]
    Variable(String),

    #[regex(r#""[^"]*""#, trim_delimiters)]
    Quoted(String),

    // Same character set the numeric literal pattern has always accepted:
    // digits, '.', '-', 'e'. Ties against Bare go to Number.
    #[regex(r"[0-9.eE\-]+", |lex| lex.slice().to_owned(), priority = 5)]
    Number(String),

    #[regex(r#"[^ \t"\[][^ \t]*"#, |lex| lex.slice().to_owned(), priority = 2)]
    Bare(String),
}

fn trim_delimiters(lex: &mut logos::Lexer<OperandToken>) -> String {
    let s = lex.slice();
    s[1..s.len() - 1].to_owned()
}

/// Decode a single source line.
///
/// `ops` supplies the known operator names; a line whose operator is neither
/// registered nor reserved becomes an inert no-op rather than an error.
pub fn decode_line(line: &str, ops: &Registry) -> Result<Instruction> {
    let line = line.trim_start_matches([' ', '\t']);
    if line.is_empty() {
        return Ok(Instruction::no_op());
    }

    let Some((op, rest)) = line.split_once(' ') else {
        // the whole line is the operator name
        return Ok(Instruction {
            op: line.to_owned(),
            operands: Vec::new(),
            no_op: !ops.contains(line),
        });
    };

    if !ops.contains(op) && !RESERVED.contains(&op) {
        return Ok(Instruction {
            op: op.to_owned(),
            operands: Vec::new(),
            no_op: true,
        });
    }

    let mut operands = Vec::new();
    let mut lexer = OperandToken::lexer(rest);
    while let Some(token) = lexer.next() {
        match token {
            Ok(OperandToken::Variable(name)) => operands.push(Operand::Variable(name)),
            Ok(OperandToken::Number(text)) => operands.push(Operand::Number(text)),
            Ok(OperandToken::Quoted(text)) | Ok(OperandToken::Bare(text)) => {
                operands.push(Operand::Str(text))
            }
            Err(()) => return Err(RunError::decode_ambiguity(lexer.slice())),
        }
    }

    Ok(Instruction {
        op: op.to_owned(),
        operands,
        // reserved keywords bypass normal dispatch
        no_op: RESERVED.contains(&op),
    })
}

/// Decode a whole source file, registering `def` labels as they appear.
///
/// A label resolves to the line after its definition. Labels previously
/// owned by `file` are dropped first so reloading a program overwrites
/// cleanly.
pub fn decode_program(
    file: &str,
    source: &str,
    ops: &Registry,
    labels: &mut LabelTable,
) -> std::result::Result<Vec<Instruction>, Fault> {
    labels.drop_file(file);
    let mut instructions = Vec::new();
    for (index, line) in source.lines().enumerate() {
        let instruction =
            decode_line(line, ops).map_err(|e| Fault::new(file, index + 1, e))?;
        // a label resolves to the line after its definition; `def` with no
        // operand is inert
        if instruction.op == "def" {
            if let Some(operand) = instruction.operands.first() {
                labels
                    .define(operand.raw_text(), index + 1, file)
                    .map_err(|e| Fault::new(file, index + 1, e))?;
            }
        }
        instructions.push(instruction);
    }
    Ok(instructions)
}

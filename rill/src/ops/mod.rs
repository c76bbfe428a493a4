//! Built-in operator registry
//!
//! An explicit, statically-built mapping from operator name to handler,
//! assembled once at machine construction. Handlers mutate the machine's
//! store, may perform console I/O, and hand a control `Effect` back to the
//! engine; they never touch the call stack themselves.

use crate::decode::Instruction;
use crate::engine::Machine;
use crate::error::Result;
use crate::store::Value;
use std::collections::HashMap;

/// Operator handler
pub type Handler = fn(&mut Machine, &Instruction) -> Result<Effect>;

/// Control effect an operator hands back to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Fall through to the next line
    Proceed,
    /// Push a new frame at the named label
    Call(String),
    /// Pop the current frame
    Return,
    /// Terminate the whole program
    Halt,
}

/// Operator name -> handler
pub struct Registry {
    handlers: HashMap<&'static str, Handler>,
}

impl Registry {
    /// The full built-in catalog
    pub fn with_builtins() -> Self {
        let mut handlers: HashMap<&'static str, Handler> = HashMap::new();
        handlers.insert("prt", print);
        handlers.insert("inp", input);
        handlers.insert("var", assign);
        handlers.insert("lod", assign);
        handlers.insert("add", |m, i| arithmetic(m, i, |a, b| a + b));
        handlers.insert("sub", |m, i| arithmetic(m, i, |a, b| a - b));
        handlers.insert("mlt", |m, i| arithmetic(m, i, |a, b| a * b));
        handlers.insert("div", |m, i| arithmetic(m, i, |a, b| a / b));
        handlers.insert("inc", increment);
        handlers.insert("req", require);
        handlers.insert("cal", call);
        handlers.insert("rtn", ret);
        handlers.insert("end", end);
        Registry { handlers }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Handler> {
        self.handlers.get(name).copied()
    }
}

/// `prt a b ...` — resolved operand texts, joined; the `\n` escape becomes a
/// real newline with the continuation prefix.
fn print(machine: &mut Machine, instr: &Instruction) -> Result<Effect> {
    let mut text = String::from("> ");
    for index in 0..instr.operands.len() {
        let piece = machine.text_at_or_nul(instr, index)?;
        text.push_str(&piece.replace("\\n", "\n> "));
    }
    machine.write_line(&text)?;
    Ok(Effect::Proceed)
}

/// `inp [x]` — block for one console line, store as textual
fn input(machine: &mut Machine, instr: &Instruction) -> Result<Effect> {
    machine.write_prompt("< ")?;
    let line = machine.read_line()?;
    let name = machine.name_at(instr, 0)?.to_owned();
    machine
        .store_mut()
        .set_textual(&name, line.trim_end_matches(['\r', '\n']));
    Ok(Effect::Proceed)
}

/// `var [x] v` / `lod [x] v` — typed assignment of the resolved operand
fn assign(machine: &mut Machine, instr: &Instruction) -> Result<Effect> {
    let value = machine.value_at(instr, 1)?;
    let name = machine.name_at(instr, 0)?.to_owned();
    machine.store_mut().set(&name, value);
    Ok(Effect::Proceed)
}

fn arithmetic(
    machine: &mut Machine,
    instr: &Instruction,
    apply: fn(f64, f64) -> f64,
) -> Result<Effect> {
    let a = machine.number_at(instr, 1)?;
    let b = machine.number_at(instr, 2)?;
    let name = machine.name_at(instr, 0)?.to_owned();
    machine.store_mut().set(&name, Value::Num(apply(a, b)));
    Ok(Effect::Proceed)
}

/// `inc [x] n` — add operand 1 to the variable's current value
fn increment(machine: &mut Machine, instr: &Instruction) -> Result<Effect> {
    let current = machine.number_at(instr, 0)?;
    let delta = machine.number_at(instr, 1)?;
    let name = machine.name_at(instr, 0)?.to_owned();
    machine.store_mut().set(&name, Value::Num(current + delta));
    Ok(Effect::Proceed)
}

/// `req name` — load and decode an external program file
fn require(machine: &mut Machine, instr: &Instruction) -> Result<Effect> {
    let name = machine.text_at(instr, 0)?;
    machine.load_file(&name)?;
    Ok(Effect::Proceed)
}

/// `cal label` — nested execution context at the label
fn call(machine: &mut Machine, instr: &Instruction) -> Result<Effect> {
    let name = machine.name_at(instr, 0)?.to_owned();
    Ok(Effect::Call(name))
}

fn ret(_machine: &mut Machine, _instr: &Instruction) -> Result<Effect> {
    Ok(Effect::Return)
}

fn end(_machine: &mut Machine, _instr: &Instruction) -> Result<Effect> {
    Ok(Effect::Halt)
}

//! Loaded programs and the label table

use crate::decode::Instruction;
use crate::error::{Result, RunError};
use std::collections::HashMap;

/// A named jump target: the line after its `def`, in its owning file
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub line: usize,
    pub file: String,
}

/// Label name -> (line, owning file). Populated at decode time.
#[derive(Debug, Default)]
pub struct LabelTable {
    labels: HashMap<String, Label>,
}

impl LabelTable {
    pub fn new() -> Self {
        LabelTable {
            labels: HashMap::new(),
        }
    }

    /// Register a label. Names are unique across the whole program set;
    /// a second definition is an error.
    pub fn define(&mut self, name: &str, line: usize, file: &str) -> Result<()> {
        if self.labels.contains_key(name) {
            return Err(RunError::duplicate_label(name));
        }
        self.labels.insert(
            name.to_owned(),
            Label {
                line,
                file: file.to_owned(),
            },
        );
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<&Label> {
        self.labels
            .get(name)
            .ok_or_else(|| RunError::undefined_label(name))
    }

    /// Forget every label owned by `file` (called before a reload)
    pub fn drop_file(&mut self, file: &str) {
        self.labels.retain(|_, label| label.file != file);
    }

    /// Registered label names ("did you mean" hints)
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.labels.keys().map(String::as_str)
    }
}

/// A decoded source file: immutable instruction array plus the raw source
/// kept for diagnostics.
#[derive(Debug, Clone)]
pub struct ProgramUnit {
    pub name: String,
    pub source: String,
    pub instructions: Vec<Instruction>,
}

/// File stem -> decoded program. Loaded on demand, never unloaded;
/// re-loading an already-loaded name overwrites.
#[derive(Debug, Default)]
pub struct ProgramRegistry {
    units: HashMap<String, ProgramUnit>,
}

impl ProgramRegistry {
    pub fn new() -> Self {
        ProgramRegistry {
            units: HashMap::new(),
        }
    }

    pub fn insert(&mut self, unit: ProgramUnit) {
        self.units.insert(unit.name.clone(), unit);
    }

    pub fn get(&self, name: &str) -> Option<&ProgramUnit> {
        self.units.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }
}

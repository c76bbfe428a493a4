//! Runtime values and the variable store

use crate::error::{Result, RunError};
use std::collections::HashMap;

/// Magnitude at which rendering switches to scientific notation
const SCIENTIFIC_THRESHOLD: f64 = 2e9;

/// A typed runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Num(f64),
    Text(String),
}

impl Value {
    /// Render to display text.
    ///
    /// Numbers below the scientific threshold use grouped fixed-point with at
    /// most two decimals; above it, a two-decimal mantissa with a power of
    /// ten exponent.
    pub fn render(&self) -> String {
        match self {
            Value::Num(v) => render_number(*v),
            Value::Text(s) => s.clone(),
        }
    }

    /// Numeric view: non-numeric text coerces to NaN, never to an error
    pub fn as_number(&self) -> f64 {
        match self {
            Value::Num(v) => *v,
            Value::Text(s) => s.parse().unwrap_or(f64::NAN),
        }
    }
}

fn render_number(v: f64) -> String {
    if !v.is_finite() {
        return v.to_string();
    }
    if v < SCIENTIFIC_THRESHOLD {
        let cents = (v.abs() * 100.0).round() as i64;
        let whole = cents / 100;
        let frac = cents % 100;
        let mut out = String::new();
        if v < 0.0 && (whole != 0 || frac != 0) {
            out.push('-');
        }
        out.push_str(&group_thousands(whole));
        if frac != 0 {
            let digits = format!("{frac:02}");
            out.push('.');
            out.push_str(digits.trim_end_matches('0'));
        }
        out
    } else {
        let exp = v.log10().trunc() as i32;
        let mantissa = v / 10f64.powi(exp);
        format!("{mantissa:.2}e{exp}")
    }
}

fn group_thousands(n: i64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    let mut remaining = digits.len();
    for ch in digits.chars() {
        out.push(ch);
        remaining -= 1;
        if remaining > 0 && remaining % 3 == 0 {
            out.push(',');
        }
    }
    out
}

/// Variable store: global scope, lazy creation, type migration on
/// reassignment. Variables live for the machine's lifetime; there is no
/// deletion.
#[derive(Debug, Default)]
pub struct Store {
    vars: HashMap<String, Value>,
}

impl Store {
    pub fn new() -> Self {
        Store {
            vars: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Result<&Value> {
        self.vars
            .get(name)
            .ok_or_else(|| RunError::undefined_variable(name))
    }

    pub fn set_numeric(&mut self, name: &str, value: f64) {
        self.vars.insert(name.to_owned(), Value::Num(value));
    }

    pub fn set_textual(&mut self, name: &str, value: impl Into<String>) {
        self.vars.insert(name.to_owned(), Value::Text(value.into()));
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.vars.insert(name.to_owned(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Iterate bindings (REPL `:vars` listing)
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }

    /// Bound variable names ("did you mean" hints)
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }
}

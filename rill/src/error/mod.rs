//! Error types and reporting

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, RunError>;

/// Runtime or decode error
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RunError {
    #[error("undefined variable: {name}")]
    UndefinedVariable { name: String },

    #[error("undefined label: {name}")]
    UndefinedLabel { name: String },

    #[error("duplicate label: {name}")]
    DuplicateLabel { name: String },

    #[error("operand matches no literal pattern: {text:?}")]
    DecodeAmbiguity { text: String },

    #[error("missing source file: {path}")]
    MissingSourceFile { path: String },

    #[error("call depth exceeded {limit} frames")]
    StackExhaustion { limit: usize },

    #[error("jump target out of range: {target}")]
    BadJumpTarget { target: f64 },

    #[error("`{op}` is missing operand {index}")]
    MissingOperand { op: String, index: usize },

    #[error("failed to load program: {message}")]
    LoadFailed { message: String },

    #[error("IO error: {message}")]
    Io { message: String },
}

impl RunError {
    pub fn undefined_variable(name: impl Into<String>) -> Self {
        Self::UndefinedVariable { name: name.into() }
    }

    pub fn undefined_label(name: impl Into<String>) -> Self {
        Self::UndefinedLabel { name: name.into() }
    }

    pub fn duplicate_label(name: impl Into<String>) -> Self {
        Self::DuplicateLabel { name: name.into() }
    }

    pub fn decode_ambiguity(text: impl Into<String>) -> Self {
        Self::DecodeAmbiguity { text: text.into() }
    }

    pub fn missing_source_file(path: impl Into<String>) -> Self {
        Self::MissingSourceFile { path: path.into() }
    }

    pub fn stack_exhaustion(limit: usize) -> Self {
        Self::StackExhaustion { limit }
    }

    pub fn bad_jump_target(target: f64) -> Self {
        Self::BadJumpTarget { target }
    }

    pub fn missing_operand(op: impl Into<String>, index: usize) -> Self {
        Self::MissingOperand {
            op: op.into(),
            index,
        }
    }

    pub fn load_failed(message: impl Into<String>) -> Self {
        Self::LoadFailed {
            message: message.into(),
        }
    }

    pub fn io(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

/// A `RunError` pinned to the source line it was raised on.
///
/// Any error during execution aborts the whole program; the engine attaches
/// the owning file and the 1-based line before handing it to the driver.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("error on line {line} in `{file}`: {source}")]
pub struct Fault {
    pub file: String,
    /// 1-based source line
    pub line: usize,
    #[source]
    pub source: RunError,
}

impl Fault {
    pub fn new(file: impl Into<String>, line: usize, source: RunError) -> Self {
        Fault {
            file: file.into(),
            line,
            source,
        }
    }
}

/// Byte range of a 1-based line within `source`
fn line_range(source: &str, line: usize) -> std::ops::Range<usize> {
    let mut start = 0;
    for (index, text) in source.lines().enumerate() {
        let offset = text.as_ptr() as usize - source.as_ptr() as usize;
        if index + 1 == line {
            return offset..offset + text.len();
        }
        start = offset + text.len();
    }
    start..source.len()
}

/// Report a fault with ariadne, highlighting the offending line
pub fn report_fault(filename: &str, source: &str, fault: &Fault, hint: Option<&str>) {
    use ariadne::{Color, Label, Report, ReportKind, Source};

    let range = line_range(source, fault.line);
    let mut report = Report::build(ReportKind::Error, (filename, range.clone()))
        .with_message(format!("program aborted on line {}", fault.line))
        .with_label(
            Label::new((filename, range))
                .with_message(fault.source.to_string())
                .with_color(Color::Red),
        );
    if let Some(hint) = hint {
        report = report.with_help(hint);
    }
    let _ = report.finish().print((filename, Source::from(source)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undefined_variable_message() {
        let err = RunError::undefined_variable("x");
        assert_eq!(err.to_string(), "undefined variable: x");
    }

    #[test]
    fn test_fault_display() {
        let fault = Fault::new("main", 3, RunError::undefined_label("loop"));
        assert_eq!(
            fault.to_string(),
            "error on line 3 in `main`: undefined label: loop"
        );
    }

    #[test]
    fn test_fault_preserves_kind() {
        let fault = Fault::new("main", 1, RunError::stack_exhaustion(4096));
        assert_eq!(fault.source, RunError::StackExhaustion { limit: 4096 });
    }

    #[test]
    fn test_line_range_middle_line() {
        let source = "aa\nbbb\ncc";
        assert_eq!(line_range(source, 2), 3..6);
    }

    #[test]
    fn test_line_range_first_line() {
        let source = "prt \"hi\"\nend";
        assert_eq!(line_range(source, 1), 0..8);
    }

    #[test]
    fn test_line_range_past_end() {
        let source = "one\ntwo";
        let range = line_range(source, 9);
        assert_eq!(range.end, source.len());
    }

    #[test]
    fn test_io_constructor() {
        let err = RunError::io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "pipe closed",
        ));
        assert!(err.to_string().contains("pipe closed"));
    }
}

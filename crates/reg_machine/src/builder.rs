use alloc::collections::BTreeSet;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use thiserror_no_std::Error;

use crate::Value;
use crate::assembler::{COMMENT_MARKER, Instruction, LABEL_MARKER, Program};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuilderError {
    #[error("label `{0}` must be a single token without a trailing `:`")]
    InvalidLabel(String),
    #[error("label `{0}` is already defined")]
    DuplicateLabel(String),
}

/// Writes program text line by line.
///
/// Labels are given without their trailing `:` and are checked for
/// duplicates as they are added, so a built program never fails label
/// resolution. Label references inside instructions are not checked; an
/// undefined target is only an error if the jump is taken at run time.
#[derive(Clone, Debug, Default)]
pub struct ProgramBuilder {
    lines: Vec<String>,
    labels: BTreeSet<String>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(&mut self, name: &str) -> Result<&mut Self, BuilderError> {
        if name.is_empty()
            || name.contains(char::is_whitespace)
            || name.ends_with(LABEL_MARKER)
        {
            return Err(BuilderError::InvalidLabel(name.to_string()));
        }
        if !self.labels.insert(name.to_string()) {
            return Err(BuilderError::DuplicateLabel(name.to_string()));
        }
        self.lines.push(format!("{name}{LABEL_MARKER}"));
        Ok(self)
    }

    /// One `#` line per line of `text`.
    pub fn comment(&mut self, text: &str) -> &mut Self {
        if text.is_empty() {
            self.lines.push(COMMENT_MARKER.to_string());
        }
        for line in text.lines() {
            self.lines.push(format!("{COMMENT_MARKER} {line}"));
        }
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.lines.push(String::new());
        self
    }

    pub fn instruction(&mut self, instruction: Instruction<'_>) -> &mut Self {
        self.lines.push(instruction.to_string());
        self
    }

    pub fn instructions<'a, I>(&mut self, instructions: I) -> &mut Self
    where
        I: IntoIterator<Item = Instruction<'a>>,
    {
        for instruction in instructions {
            self.instruction(instruction);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Line number the next added line will have. Useful for computed
    /// jumps that write `insp` directly.
    pub fn next_line(&self) -> Value {
        Value::try_from(self.lines.len())
            .unwrap_or(Value::MAX)
            .saturating_add(1)
    }

    /// The text so far, lines joined with `\n`.
    pub fn source(&self) -> String {
        self.lines.join("\n")
    }

    pub fn finish(self) -> Program {
        Program::from_lines(self.lines)
    }
}

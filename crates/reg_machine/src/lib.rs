//! This crate implements a small register and stack machine that runs
//! programs written as plain text, one instruction per line:
//! ```text
//! lodi a 3
//! loop:
//! addi a -1
//! cmpi a 0
//! jmgt loop
//! halt
//! ```
//! The machine has four general registers (`a` to `d`) and the
//! instruction pointer `insp`, which holds the 1-based line number of the
//! next line to run. `insp` is an ordinary register, any instruction that
//! writes a register may write it and so jump anywhere.
//!
//! Labels are resolved once before the first step. Each step fetches the
//! line at `insp`, decodes it into an `Instruction` and executes it. Errors
//! never escape `run` or `step`; they are recorded in the machine status
//! and the partial state stays readable.

#![no_std]

#![cfg_attr(
    not(test),
    deny(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing,
        clippy::string_slice,
        clippy::arithmetic_side_effects,
        clippy::panicking_unwrap,
        clippy::out_of_bounds_indexing,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
    )
)]
#![cfg_attr(not(test), warn(clippy::missing_panics_doc))]

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;
use serde::Serialize;
use thiserror_no_std::Error;
use tracing::{debug, trace};
use variant_count::VariantCount;

use crate::assembler::{
    Condition, Instruction, LabelTable, Line, Mnemonic, Operand, decode_line, register, stack_depth,
};

pub mod assembler;
pub mod builder;

pub use crate::assembler::Program;


/// Every register, literal and stack slot holds one of these.
pub type Value = i64;

pub const DEFAULT_STEP_LIMIT: i64 = 100_000;

#[derive(VariantCount, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Register {
    A,
    B,
    C,
    D,
    Insp,
}

impl Register {
    pub const ALL: [Register; Register::VARIANT_COUNT] =
        [Register::A, Register::B, Register::C, Register::D, Register::Insp];

    pub fn name(self) -> &'static str {
        match self {
            Register::A => "a",
            Register::B => "b",
            Register::C => "c",
            Register::D => "d",
            Register::Insp => "insp",
        }
    }

    pub fn lookup(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|register| register.name() == token)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Registers {
    pub a: Value,
    pub b: Value,
    pub c: Value,
    pub d: Value,
    pub insp: Value,
}

impl Registers {
    pub fn get(&self, register: Register) -> Value {
        match register {
            Register::A => self.a,
            Register::B => self.b,
            Register::C => self.c,
            Register::D => self.d,
            Register::Insp => self.insp,
        }
    }

    fn get_mut(&mut self, register: Register) -> &mut Value {
        match register {
            Register::A => &mut self.a,
            Register::B => &mut self.b,
            Register::C => &mut self.c,
            Register::D => &mut self.d,
            Register::Insp => &mut self.insp,
        }
    }

    /// `(a, b, c, d, insp)`
    pub fn as_tuple(&self) -> (Value, Value, Value, Value, Value) {
        (self.a, self.b, self.c, self.d, self.insp)
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            a: 0,
            b: 0,
            c: 0,
            d: 0,
            insp: 1,
        }
    }
}

/// Result of the most recent comparison.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Flags {
    pub eq: bool,
    pub lt: bool,
    pub gt: bool,
}

impl Flags {
    pub fn compare(lhs: Value, rhs: Value) -> Self {
        let ordering = lhs.cmp(&rhs);
        Self {
            eq: ordering == Ordering::Equal,
            lt: ordering == Ordering::Less,
            gt: ordering == Ordering::Greater,
        }
    }

    pub fn holds(&self, condition: Condition) -> bool {
        match condition {
            Condition::Always => true,
            Condition::Equal => self.eq,
            Condition::Less => self.lt,
            Condition::Greater => self.gt,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    Setup,
    Decode,
    Arity,
    Reference,
    Underflow,
    Control,
    Resource,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MachineError {
    #[error("Duplicate label `{0}`")]
    DuplicateLabel(String),
    #[error("Unrecognized command `{0}`")]
    UnrecognizedCommand(String),
    #[error("Could not read `{0}` as an integer")]
    InvalidLiteral(String),
    #[error("Invalid number of arguments to `{mnemonic}` ({found} given), try `{usage}`")]
    WrongArgumentCount {
        mnemonic: Mnemonic,
        usage: &'static str,
        found: usize,
    },
    #[error("Unrecognized register `{0}`")]
    UnknownRegister(String),
    #[error("Unrecognized label `{0}`")]
    UnknownLabel(String),
    #[error("Attempted to `{0}` with an empty stack")]
    EmptyStack(Mnemonic),
    #[error("Stack index `{0}` is out of range")]
    StackIndexOutOfRange(String),
    #[error("Invalid instruction pointer value {0}")]
    InvalidInstructionPointer(Value),
    #[error("Program reached step limit of {0}")]
    StepLimitExceeded(u64),
}

impl MachineError {
    pub fn arity(mnemonic: Mnemonic, found: usize) -> Self {
        MachineError::WrongArgumentCount {
            mnemonic,
            usage: mnemonic.usage(),
            found,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            MachineError::DuplicateLabel(_) => ErrorClass::Setup,
            MachineError::UnrecognizedCommand(_) | MachineError::InvalidLiteral(_) => {
                ErrorClass::Decode
            }
            MachineError::WrongArgumentCount { .. } => ErrorClass::Arity,
            MachineError::UnknownRegister(_) | MachineError::UnknownLabel(_) => {
                ErrorClass::Reference
            }
            MachineError::EmptyStack(_) | MachineError::StackIndexOutOfRange(_) => {
                ErrorClass::Underflow
            }
            MachineError::InvalidInstructionPointer(_) => ErrorClass::Control,
            MachineError::StepLimitExceeded(_) => ErrorClass::Resource,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MachineConfig {
    /// Steps allowed before the run is stopped. Zero or less is unlimited.
    pub step_limit: i64,
}

impl MachineConfig {
    pub fn with_step_limit(mut self, step_limit: i64) -> Self {
        self.step_limit = step_limit;
        self
    }

    pub fn step_limit(&self) -> Option<u64> {
        u64::try_from(self.step_limit).ok().filter(|limit| *limit > 0)
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Running,
    Halted,
    Errored(MachineError),
}

impl Status {
    pub fn is_running(&self) -> bool {
        matches!(self, Status::Running)
    }

    pub fn kind(&self) -> StatusKind {
        match self {
            Status::Running => StatusKind::Running,
            Status::Halted => StatusKind::Halted,
            Status::Errored(_) => StatusKind::Errored,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Running,
    Halted,
    Errored,
}

/// Final machine state handed to whatever renders it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MachineReport {
    pub registers: Registers,
    pub flags: Flags,
    /// Top of the stack first.
    pub stack: Vec<Value>,
    pub steps: u64,
    pub status: StatusKind,
    pub error: Option<String>,
}

enum Flow {
    Continue,
    Halt,
}

/// Registers, flags and stack. Kept apart from the program so a decoded
/// line can borrow the program text while the core is mutated.
#[derive(Clone, Debug, Default)]
struct Core {
    registers: Registers,
    flags: Flags,
    stack: Vec<Value>,
}

impl Core {
    fn execute(&mut self, line: Line<'_>, labels: &LabelTable) -> Result<Flow, MachineError> {
        let instruction = match line {
            Line::Blank | Line::Comment | Line::Label(_) => {
                self.advance();
                return Ok(Flow::Continue);
            }
            Line::Instruction(instruction) => instruction,
        };

        match instruction {
            Instruction::Load { dst, src } => {
                let value = self.operand(src);
                *self.registers.get_mut(dst) = value;
            }
            Instruction::Arithmetic { op, dst, src } => {
                let rhs = self.operand(src);
                let register = self.registers.get_mut(dst);
                *register = op.apply(*register, rhs);
            }
            Instruction::Push(src) => {
                self.stack.push(self.registers.get(src));
            }
            Instruction::Pop(dst) => {
                let value = self
                    .stack
                    .pop()
                    .ok_or(MachineError::EmptyStack(Mnemonic::Pop))?;
                *self.registers.get_mut(dst) = value;
            }
            Instruction::Peek { dst, depth } => {
                let (dst, value) = self.peek(dst, depth)?;
                *self.registers.get_mut(dst) = value;
            }
            Instruction::Compare { lhs, rhs } => {
                self.flags = Flags::compare(self.registers.get(lhs), self.operand(rhs));
            }
            Instruction::Jump { condition, label } => {
                if self.flags.holds(condition) {
                    self.registers.insp = lookup_label(labels, label)?;
                    return Ok(Flow::Continue);
                }
            }
            Instruction::Call(label) => {
                let target = lookup_label(labels, label)?;
                self.stack.push(self.registers.insp);
                self.registers.insp = target;
                return Ok(Flow::Continue);
            }
            Instruction::Return => {
                let caller = self
                    .stack
                    .pop()
                    .ok_or(MachineError::EmptyStack(Mnemonic::Retn))?;
                self.registers.insp = caller.wrapping_add(1);
                return Ok(Flow::Continue);
            }
            Instruction::Halt => return Ok(Flow::Halt),
        }

        self.advance();
        Ok(Flow::Continue)
    }

    fn advance(&mut self) {
        self.registers.insp = self.registers.insp.wrapping_add(1);
    }

    fn operand(&self, operand: Operand) -> Value {
        match operand {
            Operand::Register(register) => self.registers.get(register),
            Operand::Immediate(value) => value,
        }
    }

    // Empty stack is reported before either operand is looked at.
    fn peek(&self, dst: &str, depth: &str) -> Result<(Register, Value), MachineError> {
        if self.stack.is_empty() {
            return Err(MachineError::EmptyStack(Mnemonic::Peek));
        }
        let value = self
            .stack
            .iter()
            .rev()
            .nth(stack_depth(depth)?)
            .copied()
            .ok_or_else(|| MachineError::StackIndexOutOfRange(depth.to_string()))?;
        Ok((register(dst)?, value))
    }
}

fn lookup_label(labels: &LabelTable, label: &str) -> Result<Value, MachineError> {
    labels
        .lookup(label)
        .ok_or_else(|| MachineError::UnknownLabel(label.to_string()))
}

/// One program execution. Build it, `run` it, read the accessors.
#[derive(Clone, Debug)]
pub struct Machine {
    program: Program,
    config: MachineConfig,
    core: Core,
    labels: Option<LabelTable>,
    steps: u64,
    status: Status,
}

impl Machine {
    pub fn new(program: Program, config: MachineConfig) -> Self {
        Self {
            program,
            config,
            core: Core::default(),
            labels: None,
            steps: 0,
            status: Status::Running,
        }
    }

    /// Builds the label table the first time it is called. A duplicate
    /// label errors the machine before anything runs.
    pub fn resolve_labels(&mut self) -> Option<&LabelTable> {
        if self.labels.is_none() && self.status.is_running() {
            match LabelTable::resolve(&self.program) {
                Ok(labels) => {
                    debug!(labels = labels.len(), "resolved labels");
                    self.labels = Some(labels);
                }
                Err(error) => {
                    self.fail(error);
                }
            }
        }
        self.labels.as_ref()
    }

    /// Steps until the machine halts or errors.
    pub fn run(&mut self) -> &Status {
        if self.resolve_labels().is_none() {
            return &self.status;
        }
        while self.status.is_running() {
            self.step();
        }
        &self.status
    }

    pub fn step(&mut self) -> &Status {
        if !self.status.is_running() || self.resolve_labels().is_none() {
            return &self.status;
        }

        if let Some(limit) = self.config.step_limit() {
            if self.steps >= limit {
                self.fail(MachineError::StepLimitExceeded(limit));
                return &self.status;
            }
        }

        let insp = self.core.registers.insp;
        let length = Value::try_from(self.program.len()).unwrap_or(Value::MAX);
        if insp > length {
            debug!(steps = self.steps, insp, "ran past the last line");
            self.status = Status::Halted;
            return &self.status;
        }
        if insp <= 0 {
            self.fail(MachineError::InvalidInstructionPointer(insp));
            return &self.status;
        }

        self.steps = self.steps.wrapping_add(1);
        let Some(text) = self.program.line(insp) else {
            self.fail(MachineError::InvalidInstructionPointer(insp));
            return &self.status;
        };
        trace!(step = self.steps, insp, line = text, "executing");

        let Some(labels) = self.labels.as_ref() else {
            return &self.status;
        };
        match decode_line(text).and_then(|line| self.core.execute(line, labels)) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Halt) => {
                debug!(steps = self.steps, insp, "halted");
                self.status = Status::Halted;
            }
            Err(error) => self.fail(error),
        }
        &self.status
    }

    fn fail(&mut self, error: MachineError) {
        debug!(steps = self.steps, insp = self.core.registers.insp, %error, "machine errored");
        self.status = Status::Errored(error);
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn labels(&self) -> Option<&LabelTable> {
        self.labels.as_ref()
    }

    pub fn registers(&self) -> Registers {
        self.core.registers
    }

    pub fn flags(&self) -> Flags {
        self.core.flags
    }

    /// Bottom of the stack first.
    pub fn stack(&self) -> &[Value] {
        &self.core.stack
    }

    /// Top of the stack first, the order a listing shows it in.
    pub fn stack_top_first(&self) -> impl Iterator<Item = Value> + '_ {
        self.core.stack.iter().rev().copied()
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn is_halted(&self) -> bool {
        matches!(self.status, Status::Halted)
    }

    pub fn is_errored(&self) -> bool {
        matches!(self.status, Status::Errored(_))
    }

    pub fn error(&self) -> Option<&MachineError> {
        match &self.status {
            Status::Errored(error) => Some(error),
            _ => None,
        }
    }

    /// Empty when no error was recorded.
    pub fn error_message(&self) -> String {
        self.error().map(ToString::to_string).unwrap_or_default()
    }

    pub fn report(&self) -> MachineReport {
        MachineReport {
            registers: self.registers(),
            flags: self.flags(),
            stack: self.stack_top_first().collect(),
            steps: self.steps,
            status: self.status.kind(),
            error: self.error().map(ToString::to_string),
        }
    }
}

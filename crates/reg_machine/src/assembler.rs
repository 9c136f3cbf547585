// Line model, label resolution and decoding for the textual instruction
// language. Nothing here executes anything; the engine in `lib.rs` asks for
// one decoded line at a time.

use alloc::collections::btree_map::{BTreeMap, Entry};
use alloc::string::{String, ToString};
use alloc::vec::Vec as AllocVec;
use core::fmt;
use core::str::SplitWhitespace;

use heapless::Vec;
use variant_count::VariantCount;

use crate::{MachineError, Register, Value};

/// The most operands any mnemonic takes. Longer lines are arity errors.
const MAX_OPERANDS: usize = 2;

pub const LABEL_MARKER: char = ':';
pub const COMMENT_MARKER: char = '#';

/// Raw program text, one entry per line. Line numbers are 1-based.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Program {
    lines: AllocVec<String>,
}

impl Program {
    pub fn parse(text: &str) -> Self {
        Self::from_lines(text.lines())
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Line `number` counting from 1, or `None` outside the program.
    pub fn line(&self, number: Value) -> Option<&str> {
        let index = usize::try_from(number).ok()?.checked_sub(1)?;
        self.lines.get(index).map(String::as_str)
    }
}

/// Label name to the line it is defined on.
///
/// A label line is exactly one token ending in `:`. The table key drops that
/// trailing marker so `loop:` is reachable as `jump loop`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelTable {
    targets: BTreeMap<String, Value>,
}

impl LabelTable {
    pub fn resolve(program: &Program) -> Result<Self, MachineError> {
        let mut targets = BTreeMap::new();
        for (line_number, line) in (1..).zip(program.lines()) {
            let Some(token) = label_token(line) else {
                continue;
            };
            let name = token.strip_suffix(LABEL_MARKER).unwrap_or(token);
            match targets.entry(name.to_string()) {
                Entry::Occupied(_) => return Err(MachineError::DuplicateLabel(token.to_string())),
                Entry::Vacant(slot) => {
                    slot.insert(line_number);
                }
            }
        }
        Ok(Self { targets })
    }

    /// Target line for a label reference. A reference spelled with the
    /// trailing marker (`jump loop:`) names the `loop:` line exactly and wins
    /// over a `loop::` line; otherwise the reference is the bare name.
    pub fn lookup(&self, reference: &str) -> Option<Value> {
        reference
            .strip_suffix(LABEL_MARKER)
            .and_then(|name| self.targets.get(name))
            .or_else(|| self.targets.get(reference))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Value)> {
        self.targets.iter().map(|(name, line)| (name.as_str(), *line))
    }
}

#[derive(VariantCount, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mnemonic {
    Lodi,
    Lodr,
    Addi,
    Addr,
    Muli,
    Mulr,
    Push,
    Pop,
    Peek,
    Jump,
    Cmpr,
    Cmpi,
    Jmeq,
    Jmlt,
    Jmgt,
    Call,
    Retn,
    Halt,
}

impl Mnemonic {
    pub const ALL: [Mnemonic; Mnemonic::VARIANT_COUNT] = [
        Mnemonic::Lodi,
        Mnemonic::Lodr,
        Mnemonic::Addi,
        Mnemonic::Addr,
        Mnemonic::Muli,
        Mnemonic::Mulr,
        Mnemonic::Push,
        Mnemonic::Pop,
        Mnemonic::Peek,
        Mnemonic::Jump,
        Mnemonic::Cmpr,
        Mnemonic::Cmpi,
        Mnemonic::Jmeq,
        Mnemonic::Jmlt,
        Mnemonic::Jmgt,
        Mnemonic::Call,
        Mnemonic::Retn,
        Mnemonic::Halt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Mnemonic::Lodi => "lodi",
            Mnemonic::Lodr => "lodr",
            Mnemonic::Addi => "addi",
            Mnemonic::Addr => "addr",
            Mnemonic::Muli => "muli",
            Mnemonic::Mulr => "mulr",
            Mnemonic::Push => "push",
            Mnemonic::Pop => "pop",
            Mnemonic::Peek => "peek",
            Mnemonic::Jump => "jump",
            Mnemonic::Cmpr => "cmpr",
            Mnemonic::Cmpi => "cmpi",
            Mnemonic::Jmeq => "jmeq",
            Mnemonic::Jmlt => "jmlt",
            Mnemonic::Jmgt => "jmgt",
            Mnemonic::Call => "call",
            Mnemonic::Retn => "retn",
            Mnemonic::Halt => "halt",
        }
    }

    /// How the instruction is written, shown in arity errors.
    pub fn usage(self) -> &'static str {
        match self {
            Mnemonic::Lodi => "lodi [register] [value]",
            Mnemonic::Lodr => "lodr [register] [register]",
            Mnemonic::Addi => "addi [register] [value]",
            Mnemonic::Addr => "addr [register] [register]",
            Mnemonic::Muli => "muli [register] [value]",
            Mnemonic::Mulr => "mulr [register] [register]",
            Mnemonic::Push => "push [register]",
            Mnemonic::Pop => "pop [register]",
            Mnemonic::Peek => "peek [register] [number]",
            Mnemonic::Jump => "jump [label]",
            Mnemonic::Cmpr => "cmpr [register] [register]",
            Mnemonic::Cmpi => "cmpi [register] [immediate]",
            Mnemonic::Jmeq => "jmeq [label]",
            Mnemonic::Jmlt => "jmlt [label]",
            Mnemonic::Jmgt => "jmgt [label]",
            Mnemonic::Call => "call [label]",
            Mnemonic::Retn => "retn",
            Mnemonic::Halt => "halt",
        }
    }

    /// Exact, case-sensitive match.
    pub fn lookup(token: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|mnemonic| mnemonic.as_str() == token)
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    Register(Register),
    Immediate(Value),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(register) => write!(f, "{register}"),
            Operand::Immediate(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Multiply,
}

impl ArithmeticOp {
    /// Two's-complement wrapping, the register width is fixed.
    pub fn apply(self, lhs: Value, rhs: Value) -> Value {
        match self {
            ArithmeticOp::Add => lhs.wrapping_add(rhs),
            ArithmeticOp::Multiply => lhs.wrapping_mul(rhs),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    Always,
    Equal,
    Less,
    Greater,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instruction<'a> {
    Load { dst: Register, src: Operand },
    Arithmetic { op: ArithmeticOp, dst: Register, src: Operand },
    Push(Register),
    Pop(Register),
    /// Operands stay raw. They are checked when the line runs, after the
    /// empty stack check.
    Peek { dst: &'a str, depth: &'a str },
    Compare { lhs: Register, rhs: Operand },
    Jump { condition: Condition, label: &'a str },
    Call(&'a str),
    Return,
    Halt,
}

impl Instruction<'_> {
    pub fn mnemonic(&self) -> Mnemonic {
        match self {
            Instruction::Load { src: Operand::Immediate(_), .. } => Mnemonic::Lodi,
            Instruction::Load { src: Operand::Register(_), .. } => Mnemonic::Lodr,
            Instruction::Arithmetic { op, src, .. } => match (op, src) {
                (ArithmeticOp::Add, Operand::Immediate(_)) => Mnemonic::Addi,
                (ArithmeticOp::Add, Operand::Register(_)) => Mnemonic::Addr,
                (ArithmeticOp::Multiply, Operand::Immediate(_)) => Mnemonic::Muli,
                (ArithmeticOp::Multiply, Operand::Register(_)) => Mnemonic::Mulr,
            },
            Instruction::Push(_) => Mnemonic::Push,
            Instruction::Pop(_) => Mnemonic::Pop,
            Instruction::Peek { .. } => Mnemonic::Peek,
            Instruction::Compare { rhs: Operand::Immediate(_), .. } => Mnemonic::Cmpi,
            Instruction::Compare { rhs: Operand::Register(_), .. } => Mnemonic::Cmpr,
            Instruction::Jump { condition, .. } => match condition {
                Condition::Always => Mnemonic::Jump,
                Condition::Equal => Mnemonic::Jmeq,
                Condition::Less => Mnemonic::Jmlt,
                Condition::Greater => Mnemonic::Jmgt,
            },
            Instruction::Call(_) => Mnemonic::Call,
            Instruction::Return => Mnemonic::Retn,
            Instruction::Halt => Mnemonic::Halt,
        }
    }
}

/// Renders the instruction in the syntax `decode_line` accepts.
impl fmt::Display for Instruction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = self.mnemonic();
        match self {
            Instruction::Load { dst, src } | Instruction::Arithmetic { dst, src, .. } => {
                write!(f, "{mnemonic} {dst} {src}")
            }
            Instruction::Push(register) | Instruction::Pop(register) => {
                write!(f, "{mnemonic} {register}")
            }
            Instruction::Peek { dst, depth } => write!(f, "{mnemonic} {dst} {depth}"),
            Instruction::Compare { lhs, rhs } => write!(f, "{mnemonic} {lhs} {rhs}"),
            Instruction::Jump { label, .. } | Instruction::Call(label) => {
                write!(f, "{mnemonic} {label}")
            }
            Instruction::Return | Instruction::Halt => write!(f, "{mnemonic}"),
        }
    }
}

/// One decoded source line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Line<'a> {
    Blank,
    Comment,
    Label(&'a str),
    Instruction(Instruction<'a>),
}

pub fn decode_line(text: &str) -> Result<Line<'_>, MachineError> {
    let mut words = text.split_whitespace();
    let Some(first) = words.next() else {
        return Ok(Line::Blank);
    };
    if first.starts_with(COMMENT_MARKER) {
        return Ok(Line::Comment);
    }
    if let Some(label) = label_token(text) {
        return Ok(Line::Label(label));
    }

    let mnemonic = Mnemonic::lookup(first)
        .ok_or_else(|| MachineError::UnrecognizedCommand(first.to_string()))?;
    // `halt` ignores whatever follows it.
    if mnemonic == Mnemonic::Halt {
        return Ok(Line::Instruction(Instruction::Halt));
    }

    let operands = collect_operands(mnemonic, words)?;
    let instruction = match (mnemonic, operands.as_slice()) {
        (Mnemonic::Lodi, [dst, value]) => Instruction::Load {
            dst: register(dst)?,
            src: immediate(value)?,
        },
        (Mnemonic::Lodr, [dst, src]) => Instruction::Load {
            dst: register(dst)?,
            src: Operand::Register(register(src)?),
        },
        (Mnemonic::Addi, [dst, value]) => Instruction::Arithmetic {
            op: ArithmeticOp::Add,
            dst: register(dst)?,
            src: immediate(value)?,
        },
        (Mnemonic::Addr, [dst, src]) => Instruction::Arithmetic {
            op: ArithmeticOp::Add,
            dst: register(dst)?,
            src: Operand::Register(register(src)?),
        },
        (Mnemonic::Muli, [dst, value]) => Instruction::Arithmetic {
            op: ArithmeticOp::Multiply,
            dst: register(dst)?,
            src: immediate(value)?,
        },
        (Mnemonic::Mulr, [dst, src]) => Instruction::Arithmetic {
            op: ArithmeticOp::Multiply,
            dst: register(dst)?,
            src: Operand::Register(register(src)?),
        },
        (Mnemonic::Push, [src]) => Instruction::Push(register(src)?),
        (Mnemonic::Pop, [dst]) => Instruction::Pop(register(dst)?),
        (Mnemonic::Peek, [dst, depth]) => Instruction::Peek { dst: *dst, depth: *depth },
        (Mnemonic::Cmpr, [lhs, rhs]) => Instruction::Compare {
            lhs: register(lhs)?,
            rhs: Operand::Register(register(rhs)?),
        },
        (Mnemonic::Cmpi, [lhs, value]) => Instruction::Compare {
            lhs: register(lhs)?,
            rhs: immediate(value)?,
        },
        (Mnemonic::Jump, [label]) => Instruction::Jump {
            condition: Condition::Always,
            label: *label,
        },
        (Mnemonic::Jmeq, [label]) => Instruction::Jump {
            condition: Condition::Equal,
            label: *label,
        },
        (Mnemonic::Jmlt, [label]) => Instruction::Jump {
            condition: Condition::Less,
            label: *label,
        },
        (Mnemonic::Jmgt, [label]) => Instruction::Jump {
            condition: Condition::Greater,
            label: *label,
        },
        (Mnemonic::Call, [label]) => Instruction::Call(*label),
        (Mnemonic::Retn, []) => Instruction::Return,
        (mnemonic, operands) => return Err(MachineError::arity(mnemonic, operands.len())),
    };
    Ok(Line::Instruction(instruction))
}

/// The single token of a label line, marker included.
pub fn label_token(line: &str) -> Option<&str> {
    let mut words = line.split_whitespace();
    let token = words.next()?;
    if words.next().is_some() || !token.ends_with(LABEL_MARKER) {
        return None;
    }
    Some(token)
}

fn collect_operands<'a>(
    mnemonic: Mnemonic,
    mut words: SplitWhitespace<'a>,
) -> Result<Vec<&'a str, MAX_OPERANDS>, MachineError> {
    let mut operands: Vec<&str, MAX_OPERANDS> = Vec::new();
    while let Some(word) = words.next() {
        if operands.push(word).is_err() {
            let found = MAX_OPERANDS.saturating_add(1).saturating_add(words.count());
            return Err(MachineError::arity(mnemonic, found));
        }
    }
    Ok(operands)
}

pub(crate) fn register(token: &str) -> Result<Register, MachineError> {
    Register::lookup(token).ok_or_else(|| MachineError::UnknownRegister(token.to_string()))
}

fn immediate(token: &str) -> Result<Operand, MachineError> {
    token
        .parse::<Value>()
        .map(Operand::Immediate)
        .map_err(|_| MachineError::InvalidLiteral(token.to_string()))
}

// Negative and non-numeric depths land in the same error as a depth past
// the bottom of the stack.
pub(crate) fn stack_depth(token: &str) -> Result<usize, MachineError> {
    token
        .parse::<usize>()
        .map_err(|_| MachineError::StackIndexOutOfRange(token.to_string()))
}

use std::fmt;

use super::{handler::CaptureHandler, set::Set};

/// Relative instruction offset, counted from the instruction carrying it.
pub type Offset = isize;

/// A single parsing machine instruction. Jumps are relative so that a
/// program can be spliced anywhere inside another one.
#[derive(Debug, Clone)]
pub enum Instruction {
    /// Match a single byte
    Byte(u8),
    /// Match a single byte from a set
    Set(Set),
    /// Match `n` of any byte
    Any(usize),
    /// Consume bytes while they are in the set, never fails
    Span(Set),
    Jump(Offset),
    /// Push a backtrack entry to the offset and continue on the next instruction
    Choice(Offset),
    /// Pop a backtrack entry and jump
    Commit(Offset),
    /// Update the top backtrack entry to the current state and jump
    PartialCommit(Offset),
    /// Pop a backtrack entry, restore its input position and jump
    BackCommit(Offset),
    /// Call to a rule not linked yet
    OpenCall(String),
    /// Push return address and jump
    Call(Offset),
    Return,
    Fail,
    /// Pop a backtrack entry and fail
    FailTwice,
    /// Stop matching without a value or an error
    GiveUp,
    OpenCapture {
        offset: usize,
        handler: Option<CaptureHandler>,
    },
    /// Close the nearest open capture
    CloseCapture {
        offset: usize,
    },
    /// Capture of the last `offset` bytes
    FullCapture {
        offset: usize,
        handler: Option<CaptureHandler>,
    },
    /// Capture of zero width
    EmptyCapture {
        offset: usize,
        handler: Option<CaptureHandler>,
    },
    End,
}

impl Instruction {
    /// Relative offset of jumping instructions
    pub fn offset(&self) -> Option<Offset> {
        use Instruction::*;

        match self {
            Jump(o) | Choice(o) | Commit(o) | PartialCommit(o) | BackCommit(o) | Call(o) => {
                Some(*o)
            }
            _ => None,
        }
    }

    /// Copy of this instruction with the relative offset replaced
    pub fn with_offset(&self, offset: Offset) -> Instruction {
        use Instruction::*;

        match self {
            Jump(_) => Jump(offset),
            Choice(_) => Choice(offset),
            Commit(_) => Commit(offset),
            PartialCommit(_) => PartialCommit(offset),
            BackCommit(_) => BackCommit(offset),
            Call(_) => Call(offset),
            op => op.clone(),
        }
    }

    /// Number of bytes consumed if this always consumes a fixed amount
    pub(crate) fn fixed_width(&self) -> Option<usize> {
        match self {
            Instruction::Byte(_) | Instruction::Set(_) => Some(1),
            Instruction::Any(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;

        fn handler(h: &Option<CaptureHandler>) -> &dyn fmt::Display {
            match h {
                Some(h) => h,
                None => &"simple",
            }
        }

        match self {
            Byte(b) => write!(f, "Byte {b:#04x}"),
            Set(set) => write!(f, "Set {set}"),
            Any(n) => write!(f, "Any x {n}"),
            Span(set) => write!(f, "Span {set}"),
            Jump(o) => write!(f, "Jump {o:+}"),
            Choice(o) => write!(f, "Choice {o:+}"),
            Commit(o) => write!(f, "Commit {o:+}"),
            PartialCommit(o) => write!(f, "PartialCommit {o:+}"),
            BackCommit(o) => write!(f, "BackCommit {o:+}"),
            OpenCall(name) => write!(f, "OpenCall {name:?}"),
            Call(o) => write!(f, "Call {o:+}"),
            Return => f.write_str("Return"),
            Fail => f.write_str("Fail"),
            FailTwice => f.write_str("FailTwice"),
            GiveUp => f.write_str("GiveUp"),
            OpenCapture { offset, handler: h } => {
                write!(f, "Capture open -{offset} ({})", handler(h))
            }
            CloseCapture { offset } => write!(f, "Capture close -{offset}"),
            FullCapture { offset, handler: h } => {
                write!(f, "Capture full -{offset} ({})", handler(h))
            }
            EmptyCapture { offset, handler: h } => {
                write!(f, "Capture empty -{offset} ({})", handler(h))
            }
            End => f.write_str("End"),
        }
    }
}

use thiserror::Error;

/// Errors raised while linking a grammar. These are programming errors in
/// the code building the grammar, not properties of any input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    #[error("Grammar start rule name is empty")]
    EmptyStart,

    #[error("Grammar rule name is empty")]
    EmptyRuleName,

    #[error("Grammar rule defined twice: {0:?}")]
    DuplicateRule(String),
}

/// Errors reported by capture handlers.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("String format index {index} out of range, {count} sub-captures available")]
    FormatIndex { index: usize, count: usize },

    #[error("Malformed string format index: {0:?}")]
    MalformedFormat(String),

    #[error("Function capture failed: {0}")]
    Function(anyhow::Error),
}

/// Conditions that abort a match.
#[derive(Error, Debug)]
pub enum Fault {
    #[error("No stack entry to backtrack to")]
    NoFallback,

    #[error("{op} with empty stack")]
    EmptyStack { op: &'static str },

    #[error("Invalid stack entry at {op}, expected {expected}")]
    UnexpectedEntry {
        op: &'static str,
        expected: &'static str,
    },

    #[error("Unresolved name: {0:?}")]
    Unresolved(String),

    #[error("Invalid jump or missing end instruction at {0}")]
    InvalidAddress(isize),

    #[error("Close capture without an open capture")]
    NoOpenCapture,

    #[error("Stack limit of {0} entries exceeded")]
    StackOverflow(usize),

    #[error("Repetition matched empty input and would never stop")]
    EmptyLoop,

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// A fault together with the input offset where the machine stopped.
#[derive(Error, Debug)]
#[error("{fault} (at input position {position})")]
pub struct MatchError {
    pub fault: Fault,
    pub position: usize,
    /// Furthest input position reached before the fault, including
    /// positions later backtracked from
    pub furthest: usize,
}

impl MatchError {
    pub(crate) fn new(fault: Fault, position: usize, furthest: usize) -> MatchError {
        MatchError {
            fault,
            position,
            furthest: furthest.max(position),
        }
    }

    /// Whether the pattern simply did not match, as opposed to a broken
    /// program or a failing capture handler.
    pub fn is_mismatch(&self) -> bool {
        matches!(self.fault, Fault::NoFallback)
    }
}

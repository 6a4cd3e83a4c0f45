//! Parsing expression grammar engine. Patterns are built with combinators,
//! compiled to a small instruction set and run on a backtracking parsing
//! machine producing capture values.

mod error;
mod parsing_machine;
mod value;

pub use error::{CaptureError, Fault, GrammarError, MatchError};
pub use parsing_machine::*;
pub use value::Value;

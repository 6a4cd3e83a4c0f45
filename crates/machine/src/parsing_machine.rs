mod captures;
mod compiler;
mod grammar;
mod handler;
mod op;
mod set;
mod stack;

pub use self::captures::CaptureResult;
pub use self::compiler::{Item, Pattern};
pub use self::handler::{CaptureFn, CaptureHandler};
pub use self::op::{Instruction, Offset};
pub use self::set::Set;

use crate::{
    parsing_machine::{
        captures::CaptureStack,
        stack::{Stack, StackEntry},
    },
    Fault, MatchError, Value,
};

// https://github.com/roberto-ieru/LPeg/blob/master/lpvm.c

/// Handler used by captures that do not specify one
static SIMPLE: CaptureHandler = CaptureHandler::Simple;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchConfig {
    /// Maximum number of backtrack and return entries
    pub max_stack: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        MatchConfig { max_stack: 100_000 }
    }
}

/// Result of a match that did not fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Value of the first top level capture
    pub value: Option<Value>,
    /// Input position where matching stopped
    pub end: usize,
    /// Furthest input position reached, including positions later
    /// backtracked from
    pub furthest: usize,
    /// Whether matching stopped at a give up instruction
    pub gave_up: bool,
}

impl Match {
    /// Whether the whole input of length `len` was consumed
    pub fn consumed_all(&self, len: usize) -> bool {
        self.end == len
    }
}

#[derive(Debug, PartialEq, Eq)]
enum State {
    Normal,
    Failure,
}

impl Pattern {
    /// Match the pattern against the start of `input`. Matching a prefix is
    /// a success, compare [`Match::end`] to the input length to check for a
    /// full match.
    pub fn matches<I: AsRef<[u8]> + ?Sized>(&self, input: &I) -> Result<Match, MatchError> {
        self.matches_with(input, &MatchConfig::default())
    }

    pub fn matches_with<I: AsRef<[u8]> + ?Sized>(
        &self,
        input: &I,
        config: &MatchConfig,
    ) -> Result<Match, MatchError> {
        let result = do_match(&self.ops, input.as_ref(), config);
        match &result {
            Ok(m) => log::debug!("Matched until {}, furthest {}", m.end, m.furthest),
            Err(e) => log::debug!("Match failed: {e}"),
        }
        result
    }
}

fn jump(program: &[Instruction], ip: usize, offset: Offset) -> Result<usize, Fault> {
    let target = ip as Offset + offset;
    match usize::try_from(target) {
        Ok(addr) if addr < program.len() => Ok(addr),
        _ => Err(Fault::InvalidAddress(target)),
    }
}

fn push(stack: &mut Stack, entry: StackEntry, config: &MatchConfig) -> Result<(), Fault> {
    if stack.len() >= config.max_stack {
        return Err(Fault::StackOverflow(config.max_stack));
    }

    stack.push(entry);
    Ok(())
}

/// Pop a backtrack entry returning its input position and capture level
fn pop_backtrack(stack: &mut Stack, op: &'static str) -> Result<(usize, usize), Fault> {
    match stack.pop() {
        Some(StackEntry::Backtrack { spos, caplevel, .. }) => Ok((spos, caplevel)),
        Some(StackEntry::Return { .. }) => Err(Fault::UnexpectedEntry {
            op,
            expected: "backtrack entry",
        }),
        None => Err(Fault::EmptyStack { op }),
    }
}

/// Close the nearest open capture at `end` and reduce it to a value
fn close_capture(captures: &mut CaptureStack, input: &[u8], end: usize) -> Result<(), Fault> {
    let (index, subcaps) = captures.close(end).ok_or(Fault::NoOpenCapture)?;
    let (start, end, handler) = captures.get(index).ok_or(Fault::NoOpenCapture)?;
    let value = handler.process(input, start, end, captures, subcaps)?;
    captures.set_value(index, value);
    Ok(())
}

fn do_match(
    program: &[Instruction],
    input: &[u8],
    config: &MatchConfig,
) -> Result<Match, MatchError> {
    use Instruction::*;

    let slen = input.len();
    // Instruction pointer
    let mut ip = 0;
    // Subject pointer
    let mut sp = 0;
    let mut furthest = 0;
    // State to indicate failure
    let mut state = State::Normal;
    // Stack for backtracking, choices, returns
    let mut stack = Stack::new();
    let mut captures = CaptureStack::new();

    macro_rules! abort {
        ($fault:expr) => {
            return Err(MatchError::new($fault, sp, furthest))
        };
    }

    macro_rules! fault {
        ($e:expr) => {
            match $e {
                Ok(v) => v,
                Err(fault) => abort!(fault),
            }
        };
    }

    loop {
        let Some(op) = program.get(ip) else {
            abort!(Fault::InvalidAddress(ip as Offset));
        };
        log::trace!("{ip:6}  {sp:6}  {op}");

        match op {
            Byte(b) => {
                if input.get(sp) == Some(b) {
                    ip += 1;
                    sp += 1;
                } else {
                    state = State::Failure;
                }
            }
            Set(set) => {
                if input.get(sp).map(|byte| set.has(*byte)).unwrap_or(false) {
                    ip += 1;
                    sp += 1;
                } else {
                    state = State::Failure;
                }
            }
            Any(n) => {
                if *n <= slen - sp {
                    ip += 1;
                    sp += n;
                } else {
                    state = State::Failure;
                }
            }
            Span(set) => {
                while input.get(sp).map(|byte| set.has(*byte)).unwrap_or(false) {
                    sp += 1;
                }
                ip += 1;
            }
            Jump(l) => {
                ip = fault!(jump(program, ip, *l));
            }
            Choice(l) => {
                let addr = fault!(jump(program, ip, *l));
                let entry = StackEntry::Backtrack {
                    addr,
                    spos: sp,
                    caplevel: captures.mark(),
                };
                fault!(push(&mut stack, entry, config));
                ip += 1;
            }
            OpenCall(name) => {
                abort!(Fault::Unresolved(name.clone()));
            }
            Call(l) => {
                let addr = fault!(jump(program, ip, *l));
                fault!(push(&mut stack, StackEntry::Return { addr: ip + 1 }, config));
                ip = addr;
            }
            Return => match stack.pop() {
                Some(StackEntry::Return { addr }) => ip = addr,
                Some(StackEntry::Backtrack { .. }) => abort!(Fault::UnexpectedEntry {
                    op: "return",
                    expected: "return address",
                }),
                None => abort!(Fault::EmptyStack { op: "return" }),
            },
            Commit(l) => {
                fault!(pop_backtrack(&mut stack, "commit"));
                ip = fault!(jump(program, ip, *l));
            }
            PartialCommit(l) => {
                match stack.last_mut() {
                    // Looping back without consuming anything repeats forever
                    Some(StackEntry::Backtrack { spos, .. }) if *l < 0 && *spos == sp => {
                        abort!(Fault::EmptyLoop);
                    }
                    Some(StackEntry::Backtrack { spos, caplevel, .. }) => {
                        *spos = sp;
                        *caplevel = captures.mark();
                    }
                    Some(StackEntry::Return { .. }) => abort!(Fault::UnexpectedEntry {
                        op: "partial commit",
                        expected: "backtrack entry",
                    }),
                    None => abort!(Fault::EmptyStack {
                        op: "partial commit"
                    }),
                }
                ip = fault!(jump(program, ip, *l));
            }
            BackCommit(l) => {
                let (spos, caplevel) = fault!(pop_backtrack(&mut stack, "back commit"));
                sp = spos;
                captures.rollback(caplevel);
                ip = fault!(jump(program, ip, *l));
            }
            Fail => {
                state = State::Failure;
            }
            FailTwice => {
                let (spos, caplevel) = fault!(pop_backtrack(&mut stack, "fail twice"));
                sp = spos;
                captures.rollback(caplevel);
                state = State::Failure;
            }
            GiveUp => {
                return Ok(Match {
                    value: None,
                    end: sp,
                    furthest: furthest.max(sp),
                    gave_up: true,
                });
            }
            OpenCapture { offset, handler } => {
                let handler = handler.as_ref().unwrap_or(&SIMPLE);
                captures.open(ip, sp.saturating_sub(*offset), handler);
                ip += 1;
            }
            CloseCapture { offset } => {
                fault!(close_capture(
                    &mut captures,
                    input,
                    sp.saturating_sub(*offset)
                ));
                ip += 1;
            }
            FullCapture { offset, handler } => {
                let handler = handler.as_ref().unwrap_or(&SIMPLE);
                captures.open(ip, sp.saturating_sub(*offset), handler);
                fault!(close_capture(&mut captures, input, sp));
                ip += 1;
            }
            EmptyCapture { offset, handler } => {
                let handler = handler.as_ref().unwrap_or(&SIMPLE);
                let at = sp.saturating_sub(*offset);
                captures.open(ip, at, handler);
                fault!(close_capture(&mut captures, input, at));
                ip += 1;
            }
            End => {
                let count = captures.len();
                let value = captures.pop(count).into_iter().next().map(|cap| cap.value);
                return Ok(Match {
                    value,
                    end: sp,
                    furthest: furthest.max(sp),
                    gave_up: false,
                });
            }
        }

        furthest = furthest.max(sp);

        // Recover from failure state
        while state != State::Normal {
            match stack.pop() {
                Some(StackEntry::Backtrack {
                    addr,
                    spos,
                    caplevel,
                }) => {
                    state = State::Normal;
                    ip = addr;
                    sp = spos;
                    captures.rollback(caplevel);
                }
                Some(StackEntry::Return { .. }) => {}
                None => abort!(Fault::NoFallback),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::seq;

    fn parens() -> Pattern {
        Pattern::grammar(
            "S",
            [
                ("S", Pattern::reference("A").capture_list()),
                (
                    "A",
                    seq![
                        Pattern::not_set("()").star(),
                        seq![Pattern::reference("B"), Pattern::not_set("()").star()].star(),
                    ]
                    .capture_simple(),
                ),
                ("B", seq!["(", Pattern::reference("A"), ")"]),
            ],
        )
    }

    #[test]
    fn parse_parens() {
        let p = parens();
        for s in ["x", "(x)", "a(b(c)d(e)f)g", ""] {
            let m = p.matches(s).unwrap();
            assert!(m.consumed_all(s.len()), "Failed to match whole input {s:?}");
        }

        let m = p.matches("a(b(c)d(e)f)g").unwrap();
        let expected: Vec<Value> = ["a(b(c)d(e)f)g", "b(c)d(e)f", "c", "e"]
            .into_iter()
            .map(Value::from)
            .collect();
        assert_eq!(m.value, Some(Value::List(expected)));
    }

    #[test]
    fn parse_unbalanced() {
        let m = parens().matches(")").unwrap();
        assert_eq!(m.end, 0);
        assert!(!m.consumed_all(1));

        let m = parens().matches("(a").unwrap();
        assert_eq!(m.end, 0);
        assert_eq!(m.furthest, 2);
    }

    #[test]
    fn mismatch_is_no_fallback() {
        let err = Pattern::literal("abc").matches("abd").unwrap_err();
        assert!(err.is_mismatch());
        assert_eq!(err.position, 2);

        // Furthest position survives backtracking out of the first choice
        let err = Pattern::alternative("abc", "x").matches("abd").unwrap_err();
        assert!(err.is_mismatch());
        assert_eq!(err.position, 0);
        assert_eq!(err.furthest, 2);
    }

    #[test]
    fn empty_loop_aborts() {
        let p = Pattern::literal("a").optional().star();
        let err = p.matches("aab").unwrap_err();
        assert!(matches!(err.fault, Fault::EmptyLoop));
        assert_eq!(err.position, 2);

        // Bounded repetition of an empty match terminates
        let p = Pattern::literal("a").optional().repeat(0, Some(3));
        assert_eq!(p.matches("aab").unwrap().end, 2);
    }

    #[test]
    fn give_up_stops() {
        let p = seq!["ab", Pattern::give_up(), "c"].capture_simple();
        let m = p.matches("abc").unwrap();
        assert!(m.gave_up);
        assert_eq!(m.value, None);
        assert_eq!(m.end, 2);
    }

    #[test]
    fn unresolved_reference() {
        let p = seq!["a", Pattern::reference("missing")];
        let err = p.matches("ab").unwrap_err();
        assert!(matches!(&err.fault, Fault::Unresolved(name) if name == "missing"));
        assert_eq!(err.position, 1);

        // Not reached, not an error
        let p = Pattern::alternative("a", Pattern::reference("missing"));
        assert_eq!(p.matches("a").unwrap().end, 1);
    }

    #[test]
    fn stack_discipline_faults() {
        let err = Pattern::from(Instruction::Return).matches("").unwrap_err();
        assert!(matches!(err.fault, Fault::EmptyStack { op: "return" }));

        let err = Pattern::from(Instruction::Commit(1)).matches("").unwrap_err();
        assert!(matches!(err.fault, Fault::EmptyStack { op: "commit" }));

        // Commit finding a return address
        let p = Pattern::grammar("S", [("S", seq![Instruction::Commit(1)])]);
        let err = p.matches("").unwrap_err();
        assert!(matches!(err.fault, Fault::UnexpectedEntry { op: "commit", .. }));

        // Return finding a backtrack entry
        let p = seq![Instruction::Choice(2), Instruction::Return];
        let err = p.matches("").unwrap_err();
        assert!(matches!(err.fault, Fault::UnexpectedEntry { op: "return", .. }));

        for (op, name) in [
            (Instruction::PartialCommit(1), "partial commit"),
            (Instruction::BackCommit(1), "back commit"),
            (Instruction::FailTwice, "fail twice"),
        ] {
            let err = Pattern::from(op.clone()).matches("").unwrap_err();
            assert!(
                matches!(err.fault, Fault::EmptyStack { op } if op == name),
                "{name}: {}",
                err.fault
            );

            // Finding the return address of the rule
            let p = Pattern::grammar("S", [("S", seq![op])]);
            let err = p.matches("").unwrap_err();
            assert!(
                matches!(err.fault, Fault::UnexpectedEntry { op, .. } if op == name),
                "{name}: {}",
                err.fault
            );
        }

        let err = Pattern::from(Instruction::Jump(10)).matches("").unwrap_err();
        assert!(matches!(err.fault, Fault::InvalidAddress(10)));
    }

    #[test]
    fn stack_limit() {
        let p = Pattern::grammar("S", [("S", seq!["a", Pattern::reference("S"), "b"])]);
        let config = MatchConfig { max_stack: 8 };
        let input = "a".repeat(20);
        let err = p.matches_with(&input, &config).unwrap_err();
        assert!(matches!(err.fault, Fault::StackOverflow(8)));
    }

    #[test]
    fn backtracking_rolls_back_captures() {
        let p = Pattern::alternative(
            seq![Pattern::literal("a").capture_simple(), "x"],
            seq![Pattern::literal("ab").capture_simple()],
        )
        .capture_list();
        let m = p.matches("ab").unwrap();
        assert_eq!(m.value, Some(Value::List(vec![Value::from("ab")])));
    }

    #[test]
    fn partial_commit_updates_captures() {
        let p = Pattern::set("ab")
            .capture_simple()
            .repeat(0, Some(3))
            .capture_list();
        let m = p.matches("abba").unwrap();
        assert_eq!(m.end, 3);
        let expected: Vec<Value> = ["a", "b", "b"].into_iter().map(Value::from).collect();
        assert_eq!(m.value, Some(Value::List(expected)));
    }
}

use std::fmt;

use crate::Value;

use super::{
    captures::CaptureResult,
    handler::CaptureHandler,
    op::{Instruction, Offset},
    set::Set,
};

// Read these if confused
// https://www.inf.puc-rio.br/~roberto/docs/peg.pdf
// https://www.inf.puc-rio.br/~roberto/docs/ry10-01.pdf

/// A compiled pattern. The last instruction is always `End`, and all jumps
/// are relative so a pattern can be spliced into any other program.
#[derive(Clone)]
pub struct Pattern {
    pub(crate) ops: Vec<Instruction>,
}

/// An element of a sequence.
///
/// Offsets of jumping instructions given as items count items, not
/// instructions: `Choice(3)` points to the third item after the choice.
/// They are translated to instruction offsets when the sequence is laid out.
#[derive(Debug, Clone)]
pub enum Item {
    Pattern(Pattern),
    Instruction(Instruction),
}

impl Item {
    /// Number of instructions this item occupies inside a sequence
    fn width(&self) -> usize {
        match self {
            Item::Pattern(p) => p.body().len(),
            Item::Instruction(_) => 1,
        }
    }
}

/// Build a sequence from patterns, instructions and values convertible to
/// patterns.
///
/// ```
/// use peg_machine::{seq, Pattern};
///
/// let digits = Pattern::range(b'0', b'9').repeat(1, None);
/// let pattern = seq!["v", digits, ".", 1];
/// assert!(pattern.matches("v12.x").unwrap().consumed_all(5));
/// ```
#[macro_export]
macro_rules! seq {
    ($($item:expr),* $(,)?) => {
        $crate::Pattern::sequence([$($crate::Item::from($item)),*])
    };
}

impl Pattern {
    /// Concatenate items into a single program.
    ///
    /// Patterns are copied as is since their jumps are relative to
    /// themselves. Jumping instructions given directly as items are
    /// rewritten to point at the start of the item they refer to.
    pub fn sequence<I>(items: I) -> Pattern
    where
        I: IntoIterator,
        I::Item: Into<Item>,
    {
        let items: Vec<Item> = items.into_iter().map(Into::into).collect();

        // Figure out where each item will be placed, the extra one is the
        // end of the sequence
        let mut starts = Vec::with_capacity(items.len() + 1);
        let mut size = 0;
        for item in &items {
            starts.push(size);
            size += item.width();
        }
        starts.push(size);

        let mut ops = Vec::with_capacity(size + 1);
        for (i, item) in items.into_iter().enumerate() {
            match item {
                Item::Pattern(mut p) => {
                    p.ops.pop();
                    ops.append(&mut p.ops);
                }
                Item::Instruction(op) => {
                    let pos = ops.len() as Offset;
                    let target = op
                        .offset()
                        .and_then(|offset| usize::try_from(i as Offset + offset).ok())
                        .and_then(|item| starts.get(item));

                    match target {
                        Some(target) => ops.push(op.with_offset(*target as Offset - pos)),
                        None => ops.push(op),
                    }
                }
            }
        }

        ops.push(Instruction::End);
        Pattern { ops }
    }

    /// Pattern that always succeeds without consuming anything
    pub fn succeed() -> Pattern {
        Pattern {
            ops: vec![Instruction::End],
        }
    }

    /// Pattern that always fails
    pub fn fail() -> Pattern {
        seq![Instruction::Fail]
    }

    /// Stop matching altogether, reporting neither a value nor an error
    pub fn give_up() -> Pattern {
        seq![Instruction::GiveUp]
    }

    /// Match `n` of any byte
    pub fn any(n: usize) -> Pattern {
        seq![Instruction::Any(n)]
    }

    /// Assert that at least `n` bytes remain, without consuming them
    pub fn at_least(n: usize) -> Pattern {
        Pattern::and(Pattern::any(n))
    }

    pub fn byte(b: u8) -> Pattern {
        seq![Instruction::Byte(b)]
    }

    /// Match the text literally
    pub fn literal(text: impl AsRef<[u8]>) -> Pattern {
        Pattern::sequence(text.as_ref().iter().map(|b| Instruction::Byte(*b)))
    }

    /// Match a byte from the set
    pub fn set(chars: impl AsRef<[u8]>) -> Pattern {
        seq![Instruction::Set(Set::from_bytes(chars.as_ref()))]
    }

    /// Match a byte not in the set
    pub fn not_set(chars: impl AsRef<[u8]>) -> Pattern {
        let mut set = Set::from_bytes(chars.as_ref());
        set.negate();
        seq![Instruction::Set(set)]
    }

    /// Match a byte between `lo` and `hi` inclusive
    pub fn range(lo: u8, hi: u8) -> Pattern {
        let mut set = Set::new();
        set.add_range(lo, hi);
        seq![Instruction::Set(set)]
    }

    /// Call to a grammar rule, resolved when a grammar defining `name` is
    /// built around this pattern
    pub fn reference(name: impl Into<String>) -> Pattern {
        seq![Instruction::OpenCall(name.into())]
    }

    /// Ordered choice: `p2` is tried only if `p1` fails.
    pub fn alternative(p1: impl Into<Pattern>, p2: impl Into<Pattern>) -> Pattern {
        let (p1, p2) = (p1.into(), p2.into());
        if p1.is_fail() {
            return p2;
        }
        if p1.is_succeed() || p2.is_fail() {
            return p1;
        }

        //     Choice L1
        //     <p1>
        //     Commit L2
        // L1: <p2>
        // L2: ...
        seq![
            Instruction::Choice(3),
            p1,
            Instruction::Commit(2),
            p2,
        ]
    }

    /// Ordered choice of all the alternatives, the first one matching wins
    pub fn or_all<I>(alternatives: I) -> Pattern
    where
        I: IntoIterator,
        I::IntoIter: DoubleEndedIterator,
        I::Item: Into<Pattern>,
    {
        alternatives
            .into_iter()
            .rev()
            .map(Into::into)
            .reduce(|rest, p| Pattern::alternative(p, rest))
            .unwrap_or_else(Pattern::fail)
    }

    pub fn or(self, other: impl Into<Pattern>) -> Pattern {
        Pattern::alternative(self, other)
    }

    /// Match this pattern from `min` to `max` times, `None` meaning no upper
    /// bound. When unbounded, an iteration that consumes nothing aborts the
    /// match with [`Fault::EmptyLoop`](crate::Fault::EmptyLoop).
    pub fn repeat(&self, min: usize, max: Option<usize>) -> Pattern {
        let mut items: Vec<Item> = Vec::new();
        for _ in 0..min {
            items.push(self.clone().into());
        }

        match max {
            None => {
                if let Some(set) = self.single_set() {
                    items.push(Instruction::Span(set).into());
                } else {
                    //     Choice L2
                    // L1: <p>
                    //     PartialCommit L1
                    // L2: ...
                    items.push(Instruction::Choice(3).into());
                    items.push(self.clone().into());
                    items.push(Instruction::PartialCommit(-1).into());
                }
            }
            Some(max) if max > min => {
                //     Choice L2
                //     <p>
                //     PartialCommit +1
                //     ... (max - min) times
                //     Commit +1
                // L2: ...
                let optional = max - min;
                items.push(Instruction::Choice(2 * optional as Offset + 2).into());
                for _ in 0..optional {
                    items.push(self.clone().into());
                    items.push(Instruction::PartialCommit(1).into());
                }
                items.push(Instruction::Commit(1).into());
            }
            Some(_) => {}
        }

        Pattern::sequence(items)
    }

    /// Zero or more
    pub fn star(&self) -> Pattern {
        self.repeat(0, None)
    }

    /// One or more
    pub fn plus(&self) -> Pattern {
        self.repeat(1, None)
    }

    pub fn optional(&self) -> Pattern {
        self.repeat(0, Some(1))
    }

    /// Negative look-ahead, succeeds without consuming if `p` does not match
    pub fn not(p: impl Into<Pattern>) -> Pattern {
        let p = p.into();
        if p.is_fail() {
            return Pattern::succeed();
        }

        //     Choice L1
        //     <p>
        //     FailTwice
        // L1: ...
        seq![Instruction::Choice(3), p, Instruction::FailTwice]
    }

    /// Positive look-ahead, succeeds without consuming if `p` matches
    pub fn and(p: impl Into<Pattern>) -> Pattern {
        let p = p.into();
        if p.is_succeed() || p.is_fail() {
            return p;
        }

        //     Choice L1
        //     <p>
        //     BackCommit L2
        // L1: Fail
        // L2: ...
        seq![
            Instruction::Choice(3),
            p,
            Instruction::BackCommit(2),
            Instruction::Fail,
        ]
    }

    /// Match this pattern unless `pred` matches at the same position
    pub fn except(self, pred: impl Into<Pattern>) -> Pattern {
        seq![Pattern::not(pred), self]
    }

    /// Capture the matched text
    pub fn capture_simple(self) -> Pattern {
        self.capture(None)
    }

    /// Capture the current input position
    pub fn capture_position() -> Pattern {
        seq![Instruction::EmptyCapture {
            offset: 0,
            handler: Some(CaptureHandler::Position),
        }]
    }

    /// Capture a constant value without consuming anything
    pub fn capture_constant(value: impl Into<Value>) -> Pattern {
        seq![Instruction::EmptyCapture {
            offset: 0,
            handler: Some(CaptureHandler::Constant(value.into())),
        }]
    }

    /// Capture a list of the sub-capture values
    pub fn capture_list(self) -> Pattern {
        self.capture(Some(CaptureHandler::List))
    }

    /// Capture the value returned by `f` called with the sub-captures
    pub fn capture_function<F>(self, f: F) -> Pattern
    where
        F: Fn(Vec<CaptureResult>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.capture(Some(CaptureHandler::function(f)))
    }

    /// Capture a string built from `format`, where `{N}` is replaced by the
    /// Nth sub-capture, `{{` by `{` and `{}` by `}`
    pub fn capture_formatted_string(self, format: impl Into<String>) -> Pattern {
        self.capture(Some(CaptureHandler::Format(format.into())))
    }

    /// Capture the matched text with sub-captures replaced by their values
    pub fn capture_substitution(self) -> Pattern {
        self.capture(Some(CaptureHandler::Substitution))
    }

    /// Capture this pattern with `handler`, `None` capturing the matched
    /// text
    pub fn capture(self, handler: Option<CaptureHandler>) -> Pattern {
        // Patterns consuming a fixed amount can be captured after the
        // fact with a single instruction
        if let Some(offset) = self.fixed_width() {
            return seq![self, Instruction::FullCapture { offset, handler }];
        }

        seq![
            Instruction::OpenCapture { offset: 0, handler },
            self,
            Instruction::CloseCapture { offset: 0 },
        ]
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.ops
    }

    /// Instructions without the terminating `End`
    fn body(&self) -> &[Instruction] {
        &self.ops[..self.ops.len() - 1]
    }

    pub(crate) fn is_fail(&self) -> bool {
        matches!(self.ops.first(), Some(Instruction::Fail))
    }

    pub(crate) fn is_succeed(&self) -> bool {
        self.ops.len() == 1
    }

    /// Set if this pattern matches exactly one byte from a set
    fn single_set(&self) -> Option<Set> {
        match self.body() {
            [Instruction::Set(set)] => Some(set.clone()),
            [Instruction::Byte(b)] => Some(Set::from_bytes(&[*b])),
            _ => None,
        }
    }

    /// Bytes consumed if the pattern always consumes the same amount and
    /// contains nothing but byte matching instructions
    fn fixed_width(&self) -> Option<usize> {
        let body = self.body();
        if body.is_empty() {
            return None;
        }

        body.iter().map(Instruction::fixed_width).sum()
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, op) in self.ops.iter().enumerate() {
            write!(f, "{i}: {op:?} ")?;

            writeln!(f)?;
        }

        Ok(())
    }
}

/// Program listing, one instruction per line
impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, op) in self.ops.iter().enumerate() {
            if i != 0 {
                writeln!(f)?;
            }
            write!(f, "{i:6}  {op}")?;
        }

        Ok(())
    }
}

impl From<&Pattern> for Pattern {
    fn from(p: &Pattern) -> Self {
        p.clone()
    }
}

/// `true` always succeeds, `false` always fails
impl From<bool> for Pattern {
    fn from(b: bool) -> Self {
        if b {
            Pattern::succeed()
        } else {
            Pattern::fail()
        }
    }
}

/// `n >= 0` matches `n` bytes, `n < 0` asserts that at least `-n` bytes
/// remain
impl From<i64> for Pattern {
    fn from(n: i64) -> Self {
        let count = usize::try_from(n.unsigned_abs()).unwrap_or(usize::MAX);
        if n >= 0 {
            Pattern::any(count)
        } else {
            Pattern::at_least(count)
        }
    }
}

impl From<i32> for Pattern {
    fn from(n: i32) -> Self {
        i64::from(n).into()
    }
}

impl From<usize> for Pattern {
    fn from(n: usize) -> Self {
        Pattern::any(n)
    }
}

impl From<&str> for Pattern {
    fn from(text: &str) -> Self {
        Pattern::literal(text)
    }
}

impl From<String> for Pattern {
    fn from(text: String) -> Self {
        Pattern::literal(text)
    }
}

impl From<Instruction> for Pattern {
    fn from(op: Instruction) -> Self {
        seq![op]
    }
}

impl From<Pattern> for Item {
    fn from(p: Pattern) -> Self {
        Item::Pattern(p)
    }
}

impl From<&Pattern> for Item {
    fn from(p: &Pattern) -> Self {
        Item::Pattern(p.clone())
    }
}

impl From<Instruction> for Item {
    fn from(op: Instruction) -> Self {
        Item::Instruction(op)
    }
}

impl From<bool> for Item {
    fn from(b: bool) -> Self {
        Item::Pattern(b.into())
    }
}

impl From<i32> for Item {
    fn from(n: i32) -> Self {
        Item::Pattern(n.into())
    }
}

impl From<i64> for Item {
    fn from(n: i64) -> Self {
        Item::Pattern(n.into())
    }
}

impl From<usize> for Item {
    fn from(n: usize) -> Self {
        Item::Pattern(n.into())
    }
}

impl From<&str> for Item {
    fn from(text: &str) -> Self {
        Item::Pattern(text.into())
    }
}

impl From<String> for Item {
    fn from(text: String) -> Self {
        Item::Pattern(text.into())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn offsets(p: &Pattern) -> Vec<Option<Offset>> {
        p.instructions().iter().map(Instruction::offset).collect()
    }

    #[test]
    fn sequence_translates_item_offsets() {
        let ab = Pattern::literal("ab");
        let p = seq![Instruction::Choice(3), &ab, Instruction::Commit(2), "c"];

        // Choice +4, Byte a, Byte b, Commit +2, Byte c, End
        assert_eq!(p.instructions().len(), 6);
        assert_eq!(
            offsets(&p),
            vec![Some(4), None, None, Some(2), None, None]
        );
    }

    #[test]
    fn sequence_keeps_pattern_offsets() {
        let inner = Pattern::alternative("a", "b");
        let p = seq!["xy", &inner];
        assert_eq!(offsets(&p)[2..], offsets(&inner)[..]);
    }

    #[test]
    fn sequence_out_of_range_offset_kept() {
        let p = seq![Instruction::Jump(7)];
        assert_eq!(offsets(&p), vec![Some(7), None]);
    }

    #[test]
    fn alternative_simplifies() {
        let a = Pattern::literal("a");
        assert_eq!(Pattern::alternative(false, &a).instructions().len(), 2);
        assert!(Pattern::alternative(true, &a).is_succeed());
        assert_eq!(Pattern::alternative(&a, false).instructions().len(), 2);
        assert!(Pattern::or_all(Vec::<Pattern>::new()).is_fail());
    }

    #[test]
    fn repeat_layout() {
        let p = Pattern::literal("ab");

        // Choice, a, b, PartialCommit, End
        let star = p.star();
        assert_eq!(offsets(&star), vec![Some(4), None, None, Some(-2), None]);

        // Choice, (a, b, PartialCommit) x 2, Commit, End
        let bounded = p.repeat(0, Some(2));
        assert_eq!(bounded.instructions().len(), 9);
        assert_eq!(offsets(&bounded)[0], Some(8));
        assert_eq!(offsets(&bounded)[3], Some(1));
        assert_eq!(offsets(&bounded)[7], Some(1));

        assert_eq!(p.repeat(2, Some(2)).instructions().len(), 5);
    }

    #[test]
    fn repeat_set_uses_span() {
        let star = Pattern::not_set("()").star();
        assert!(matches!(
            star.instructions(),
            [Instruction::Span(_), Instruction::End]
        ));
    }

    #[test]
    fn fixed_width_capture() {
        let p = Pattern::literal("abc").capture_simple();
        assert!(matches!(
            p.instructions()[3],
            Instruction::FullCapture {
                offset: 3,
                handler: None
            }
        ));

        let p = Pattern::literal("a").star().capture_list();
        assert!(matches!(
            p.instructions()[0],
            Instruction::OpenCapture { offset: 0, .. }
        ));
    }

    #[test]
    fn coercions() {
        assert!(Pattern::from(true).is_succeed());
        assert!(Pattern::from(false).is_fail());
        assert!(matches!(
            Pattern::from(3).instructions(),
            [Instruction::Any(3), Instruction::End]
        ));
        assert!(matches!(
            Pattern::from(-2).instructions()[0],
            Instruction::Choice(3)
        ));

        let width: usize = 2;
        let remaining: i64 = -4;
        let p = seq![width, remaining];
        assert!(matches!(
            p.instructions(),
            [Instruction::Any(2), Instruction::Choice(3), ..]
        ));
    }

    #[test]
    fn listing() {
        let p = Pattern::alternative("a", "b");
        let listing = p.to_string();
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "     0  Choice +3");
        assert_eq!(lines[4], "     4  End");
    }
}

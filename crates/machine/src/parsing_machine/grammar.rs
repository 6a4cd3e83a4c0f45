use rustc_hash::FxHashMap;

use crate::GrammarError;

use super::{
    compiler::Pattern,
    op::{Instruction, Offset},
};

impl Pattern {
    /// Link named rules into a single program starting from the rule
    /// `start`. References to names not defined here are left unresolved
    /// and fail the match if they are ever reached.
    ///
    /// # Panics
    ///
    /// If `start` or any rule name is empty, or a rule is defined twice.
    pub fn grammar<I, S>(start: &str, rules: I) -> Pattern
    where
        I: IntoIterator<Item = (S, Pattern)>,
        S: Into<String>,
    {
        match Pattern::try_grammar(start, rules) {
            Ok(p) => p,
            Err(e) => panic!("Invalid grammar: {e}"),
        }
    }

    pub fn try_grammar<I, S>(start: &str, rules: I) -> Result<Pattern, GrammarError>
    where
        I: IntoIterator<Item = (S, Pattern)>,
        S: Into<String>,
    {
        if start.is_empty() {
            return Err(GrammarError::EmptyStart);
        }

        // Figure out where each rule begins
        //     Call <start>
        //     Jump L1
        //     <rule 1>
        //     Return
        //     ...
        // L1: End
        let rules: Vec<(String, Pattern)> =
            rules.into_iter().map(|(n, p)| (n.into(), p)).collect();
        let mut rule_addrs: FxHashMap<&str, usize> = FxHashMap::default();
        let mut size = 2;
        for (name, p) in &rules {
            if name.is_empty() {
                return Err(GrammarError::EmptyRuleName);
            }

            if rule_addrs.insert(name.as_str(), size).is_some() {
                return Err(GrammarError::DuplicateRule(name.clone()));
            }

            size += p.ops.len();
        }

        let mut ops = Vec::with_capacity(size + 1);
        ops.push(Instruction::OpenCall(start.to_string()));
        ops.push(Instruction::Jump(size as Offset - 1));
        let mut returns = Vec::with_capacity(rules.len());
        for (_, p) in &rules {
            let body = &p.ops[..p.ops.len() - 1];
            ops.extend_from_slice(body);
            returns.push(ops.len());
            ops.push(Instruction::Return);
        }
        ops.push(Instruction::End);

        translate_callsites(&mut ops, &rule_addrs);
        optimize_tail_calls(&mut ops, &returns);

        log::debug!(
            "Linked grammar {start:?}: {} rules, {} instructions",
            rules.len(),
            ops.len()
        );

        Ok(Pattern { ops })
    }

    /// Resolve references to `name` in this pattern to `target`.
    /// Consider using a grammar instead.
    pub fn resolve(self, name: &str, target: Pattern) -> Pattern {
        const START: &str = "__start";
        Pattern::grammar(START, [(START.to_string(), self), (name.to_string(), target)])
    }
}

/// Replace open calls to rules defined in this grammar with relative calls
fn translate_callsites(ops: &mut [Instruction], rule_addrs: &FxHashMap<&str, usize>) {
    for i in 0..ops.len() {
        let Instruction::OpenCall(name) = &ops[i] else {
            continue;
        };

        if let Some(addr) = rule_addrs.get(name.as_str()) {
            ops[i] = Instruction::Call(*addr as Offset - i as Offset);
        }
    }
}

/// A rule ending in a call jumps to the called rule instead, which then
/// returns directly to the caller of this rule
fn optimize_tail_calls(ops: &mut [Instruction], returns: &[usize]) {
    for ret in returns {
        let Some(last) = ret.checked_sub(1) else {
            continue;
        };

        if let Instruction::Call(offset) = ops[last] {
            ops[last] = Instruction::Jump(offset);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{seq, Fault};

    #[test]
    fn layout_and_resolve() {
        let p = Pattern::grammar(
            "S",
            [
                ("S", seq!["a", Pattern::reference("B")]),
                ("B", Pattern::literal("b")),
            ],
        );
        let ops = p.instructions();

        // Call S, Jump End, a, Jump B, Return, b, Return, End
        assert_eq!(ops.len(), 8);
        assert!(matches!(ops[0], Instruction::Call(2)));
        assert!(matches!(ops[1], Instruction::Jump(6)));
        assert!(matches!(ops[3], Instruction::Jump(2)));
        assert!(matches!(ops[4], Instruction::Return));
        assert!(matches!(ops[7], Instruction::End));
    }

    #[test]
    fn unknown_references_stay_open() {
        let p = Pattern::grammar("S", [("S", Pattern::reference("missing"))]);
        assert!(matches!(
            &p.instructions()[2],
            Instruction::OpenCall(name) if name == "missing"
        ));

        let p = Pattern::grammar("nope", [("S", Pattern::literal("a"))]);
        assert!(matches!(&p.instructions()[0], Instruction::OpenCall(_)));

        let err = p.matches("a").unwrap_err();
        assert!(matches!(&err.fault, Fault::Unresolved(name) if name == "nope"));
        assert_eq!(err.position, 0);
    }

    #[test]
    fn invalid_names() {
        let rules = || [("S", Pattern::literal("a"))];
        assert_eq!(
            Pattern::try_grammar("", rules()).err(),
            Some(GrammarError::EmptyStart)
        );
        assert_eq!(
            Pattern::try_grammar("S", [("", Pattern::literal("a"))]).err(),
            Some(GrammarError::EmptyRuleName)
        );
        assert_eq!(
            Pattern::try_grammar("S", [("S", Pattern::succeed()), ("S", Pattern::fail())]).err(),
            Some(GrammarError::DuplicateRule("S".into()))
        );
    }

    #[test]
    #[should_panic(expected = "Invalid grammar")]
    fn empty_rule_name_panics() {
        Pattern::grammar("S", [("", Pattern::literal("a"))]);
    }
}

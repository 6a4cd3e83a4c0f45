pub(crate) type Stack = Vec<StackEntry>;

#[derive(Debug, Clone)]
pub(crate) enum StackEntry {
    Return {
        addr: usize,
    },
    Backtrack {
        addr: usize,
        spos: usize,
        caplevel: usize,
    },
}

use crate::Value;

use super::handler::CaptureHandler;

/// A reduced capture as seen by enclosing handlers and function captures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    pub start: usize,
    pub end: usize,
    pub value: Value,
}

#[derive(Debug)]
struct CaptureEntry<'p> {
    /// Instruction that opened this capture
    pc: usize,
    start: usize,
    /// None while the capture is still open
    end: Option<usize>,
    handler: &'p CaptureHandler,
    value: Option<Value>,
}

/// Captures in the order they were opened. Closing a capture reduces it to
/// a value, possibly consuming the captures opened after it.
#[derive(Debug, Default)]
pub(crate) struct CaptureStack<'p> {
    entries: Vec<CaptureEntry<'p>>,
}

impl<'p> CaptureStack<'p> {
    pub fn new() -> CaptureStack<'p> {
        CaptureStack {
            entries: Vec::new(),
        }
    }

    /// Open a new capture and return its index
    pub fn open(&mut self, pc: usize, start: usize, handler: &'p CaptureHandler) -> usize {
        self.entries.push(CaptureEntry {
            pc,
            start,
            end: None,
            handler,
            value: None,
        });
        self.entries.len() - 1
    }

    /// Close the closest open capture. Returns its index and the number of
    /// captures above it.
    pub fn close(&mut self, end: usize) -> Option<(usize, usize)> {
        let top = self.entries.len();
        let (i, entry) = self
            .entries
            .iter_mut()
            .enumerate()
            .rev()
            .find(|(_, entry)| entry.end.is_none())?;
        entry.end = Some(end);
        log::trace!("Close capture opened at {}: {}..{end}", entry.pc, entry.start);
        Some((i, top - i - 1))
    }

    /// Span and handler of the capture at `index`
    pub fn get(&self, index: usize) -> Option<(usize, usize, &'p CaptureHandler)> {
        let entry = self.entries.get(index)?;
        Some((entry.start, entry.end.unwrap_or(entry.start), entry.handler))
    }

    pub fn set_value(&mut self, index: usize, value: Value) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.value = Some(value);
        }
    }

    /// Pop and return the top `count` captures in the order they were opened
    pub fn pop(&mut self, count: usize) -> Vec<CaptureResult> {
        let at = self.entries.len().saturating_sub(count);
        self.entries
            .drain(at..)
            .map(|entry| CaptureResult {
                start: entry.start,
                end: entry.end.unwrap_or(entry.start),
                value: entry.value.unwrap_or_default(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn mark(&self) -> usize {
        self.entries.len()
    }

    pub fn rollback(&mut self, mark: usize) {
        self.entries.truncate(mark);
    }
}

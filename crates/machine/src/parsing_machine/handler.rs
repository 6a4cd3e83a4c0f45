use std::{fmt, sync::Arc};

use crate::{CaptureError, Value};

use super::captures::{CaptureResult, CaptureStack};

/// User supplied reduction for function captures.
pub type CaptureFn = Arc<dyn Fn(Vec<CaptureResult>) -> anyhow::Result<Value> + Send + Sync>;

/// How a closed capture is reduced into a value.
#[derive(Clone, Default)]
pub enum CaptureHandler {
    /// The matched text
    #[default]
    Simple,
    /// Start offset of the capture
    Position,
    Constant(Value),
    /// Values of all sub-captures
    List,
    Function(CaptureFn),
    /// Format string where `{N}` is replaced with the Nth sub-capture
    Format(String),
    /// Matched text where every sub-capture is replaced by its value
    Substitution,
}

impl CaptureHandler {
    pub fn function<F>(f: F) -> CaptureHandler
    where
        F: Fn(Vec<CaptureResult>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        CaptureHandler::Function(Arc::new(f))
    }

    /// Reduce the capture spanning `start..end`. The `subcaps` captures on
    /// top of the stack were opened inside this one, handlers that use them
    /// pop them off.
    pub(crate) fn process(
        &self,
        input: &[u8],
        start: usize,
        end: usize,
        captures: &mut CaptureStack,
        subcaps: usize,
    ) -> Result<Value, CaptureError> {
        use CaptureHandler::*;

        match self {
            Simple => Ok(text(input, start, end)),
            Position => Ok(Value::Int(start as i64)),
            Constant(value) => Ok(value.clone()),
            List => {
                let subs = captures.pop(subcaps);
                Ok(Value::List(subs.into_iter().map(|sub| sub.value).collect()))
            }
            Function(f) => {
                let subs = captures.pop(subcaps);
                f(subs).map_err(CaptureError::Function)
            }
            Format(format) => {
                let subs = captures.pop(subcaps);
                format_captures(format, &subs).map(Value::Str)
            }
            Substitution => {
                let subs = captures.pop(subcaps);
                Ok(Value::Str(substitute(input, start, end, &subs)))
            }
        }
    }
}

fn text(input: &[u8], start: usize, end: usize) -> Value {
    let bytes = input.get(start..end).unwrap_or_default();
    Value::Str(String::from_utf8_lossy(bytes).into_owned())
}

/// Replace `{N}` with the Nth sub-capture, `{{` with `{` and `{}` with `}`.
/// Any other `{` is copied as is.
fn format_captures(format: &str, subs: &[CaptureResult]) -> Result<String, CaptureError> {
    let mut result = String::with_capacity(format.len());
    let mut rest = format;

    while let Some(open) = rest.find('{') {
        result.push_str(&rest[..open]);
        let tail = &rest[open + 1..];

        if let Some(after) = tail.strip_prefix('{') {
            result.push('{');
            rest = after;
            continue;
        }

        if let Some(after) = tail.strip_prefix('}') {
            result.push('}');
            rest = after;
            continue;
        }

        let digits = tail.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 || !tail[digits..].starts_with('}') {
            result.push('{');
            rest = tail;
            continue;
        }

        let number = &tail[..digits];
        let index: usize = number
            .parse()
            .map_err(|_| CaptureError::MalformedFormat(number.to_string()))?;
        let sub = subs.get(index).ok_or(CaptureError::FormatIndex {
            index,
            count: subs.len(),
        })?;
        result.push_str(&sub.value.to_string());
        rest = &tail[digits + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

/// Copy `start..end` replacing the regions covered by sub-captures with their
/// values. A sub-capture nested inside an already replaced one is skipped.
fn substitute(input: &[u8], start: usize, end: usize, subs: &[CaptureResult]) -> String {
    let mut result = String::new();
    let mut pos = start;

    for sub in subs {
        if sub.start < pos {
            continue;
        }

        if let Some(gap) = input.get(pos..sub.start) {
            result.push_str(&String::from_utf8_lossy(gap));
        }
        result.push_str(&sub.value.to_string());
        pos = sub.end;
    }

    if pos < end {
        if let Some(gap) = input.get(pos..end) {
            result.push_str(&String::from_utf8_lossy(gap));
        }
    }

    result
}

impl fmt::Debug for CaptureHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for CaptureHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureHandler::Simple => f.write_str("simple"),
            CaptureHandler::Position => f.write_str("position"),
            CaptureHandler::Constant(value) => write!(f, "const({value})"),
            CaptureHandler::List => f.write_str("list"),
            CaptureHandler::Function(_) => f.write_str("function"),
            CaptureHandler::Format(format) => write!(f, "string({format:?})"),
            CaptureHandler::Substitution => f.write_str("subst"),
        }
    }
}

use tef_codec::{StackFrame, StackTrace};

/// Captures the caller's stack for events that ask for one.
///
/// Implementations return `(file, symbol)` pairs, outermost call first.
pub trait FrameProvider: Send + Sync {
    fn frames(&self) -> Vec<(String, String)>;
}

/// Captures nothing. Events that request a stack get an empty one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFrames;

impl FrameProvider for NoFrames {
    fn frames(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

impl<F> FrameProvider for F
where
    F: Fn() -> Vec<(String, String)> + Send + Sync,
{
    fn frames(&self) -> Vec<(String, String)> {
        self()
    }
}

pub(crate) fn capture(provider: &dyn FrameProvider) -> StackTrace {
    StackTrace::new(
        provider
            .frames()
            .into_iter()
            .map(|(file, symbol)| StackFrame::new(file, symbol))
            .collect(),
    )
}

//! Progress reporting and cancellation.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Receives `(fraction, message)` progress updates.
///
/// Returning [`ControlFlow::Break`] requests cancellation; the engine honours
/// it before starting the next page iteration or phase.
pub trait ProgressSink: Send {
    fn report(&mut self, fraction: f32, message: &str) -> ControlFlow<()>;
}

impl<F> ProgressSink for F
where
    F: FnMut(f32, &str) -> ControlFlow<()> + Send,
{
    fn report(&mut self, fraction: f32, message: &str) -> ControlFlow<()> {
        self(fraction, message)
    }
}

/// A shareable cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Engine-side handle combining an optional sink and an optional token.
pub struct Progress<'a> {
    sink: Option<&'a mut dyn ProgressSink>,
    token: Option<CancellationToken>,
    cancelled: bool,
}

impl<'a> Progress<'a> {
    pub fn new(sink: Option<&'a mut dyn ProgressSink>, token: Option<CancellationToken>) -> Self {
        Self {
            sink,
            token,
            cancelled: false,
        }
    }

    /// A handle that reports nowhere and never cancels.
    pub fn silent() -> Self {
        Self::new(None, None)
    }

    pub fn report(&mut self, fraction: f32, message: &str) {
        tracing::trace!(target: "progress", fraction, message);
        if let Some(sink) = self.sink.as_mut()
            && sink.report(fraction.clamp(0.0, 1.0), message).is_break()
        {
            self.cancelled = true;
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled || self.token.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

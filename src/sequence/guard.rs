//! Logged release for sequences handed out without another stage on top

use crate::merge::MergeResult;
use crate::observability::Logger;
use crate::result::Batch;

use super::drain::close_logged;
use super::pull::{exhausted, PullSequence};

/// Passes `inner` through unchanged and releases it exactly once, on close
/// or on drop, logging the outcome under `stage`.
pub struct ReleaseGuard<S: PullSequence> {
    inner: S,
    stage: &'static str,
    closed: bool,
    logger: Logger,
}

impl<S: PullSequence> ReleaseGuard<S> {
    pub fn new(inner: S, stage: &'static str, logger: Logger) -> Self {
        Self {
            inner,
            stage,
            closed: false,
            logger,
        }
    }

    fn release(&mut self) -> MergeResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        close_logged(&mut self.inner, self.stage, &self.logger)
    }
}

impl<S: PullSequence> PullSequence for ReleaseGuard<S> {
    fn has_more(&self) -> bool {
        !self.closed && self.inner.has_more()
    }

    fn get(&self) -> MergeResult<&Batch> {
        if self.closed {
            return Err(exhausted());
        }
        self.inner.get()
    }

    fn advance(&mut self) -> MergeResult<()> {
        self.inner.advance()
    }

    fn take(&mut self) -> MergeResult<Batch> {
        if self.closed {
            return Err(exhausted());
        }
        self.inner.take()
    }

    fn close(&mut self) -> MergeResult<()> {
        self.release()
    }
}

impl<S: PullSequence> Drop for ReleaseGuard<S> {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

use std::sync::{atomic::{AtomicBool, Ordering}, Arc};

use crate::error::{Result, TopicError};

/// Cooperative cancellation flag
/// Clone it into the thread that wants to stop a training run or a sweep and
/// call `cancel()`. Long-running loops poll it between iterations only, so a
/// cancelled run never leaves a half-updated model behind.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    /// テスト用: この反復数に達した check で自動的に停止要求を立てる
    #[cfg(test)]
    trip_at: Option<usize>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that cancels itself once `check` sees `iterations` completed
    #[cfg(test)]
    pub(crate) fn tripping_at(iterations: usize) -> Self {
        Self {
            trip_at: Some(iterations),
            ..Self::default()
        }
    }

    /// 停止要求を立てる (以降の check は全て Err)
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Returns `Cancelled` if a stop was requested
    ///
    /// # Arguments
    /// * `iterations` - iterations completed so far, reported in the error
    #[inline]
    pub fn check(&self, iterations: usize) -> Result<()> {
        self.trip(iterations);
        if self.is_cancelled() {
            return Err(TopicError::Cancelled { iterations });
        }
        Ok(())
    }
}

impl CancelToken {
    #[cfg(test)]
    fn trip(&self, iterations: usize) {
        if self.trip_at.map_or(false, |n| iterations >= n) {
            self.cancel();
        }
    }

    #[cfg(not(test))]
    #[inline(always)]
    fn trip(&self, _iterations: usize) {}
}

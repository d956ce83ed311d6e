use crate::util::format_call_duration;
use std::time::Duration;
use tokio::time::Instant;

/// Elapsed time since the call connected.
#[derive(Debug, Clone, Copy)]
pub struct CallClock {
    started_at: Instant,
    offset: Duration,
}

impl CallClock {
    pub fn start() -> Self {
        Self::resume_from(Duration::ZERO)
    }

    /// A clock that already shows `elapsed`, for resuming a call.
    pub fn resume_from(elapsed: Duration) -> Self {
        Self {
            started_at: Instant::now(),
            offset: elapsed,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.offset + self.started_at.elapsed()
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed().as_secs()
    }

    pub fn timestamp(&self) -> String {
        format_call_duration(self.elapsed_secs())
    }
}

impl Default for CallClock {
    fn default() -> Self {
        Self::start()
    }
}

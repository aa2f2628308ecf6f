use std::time::Instant;

/// Clock abstraction to enforce deterministic time sourcing in core paths.
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// System-backed clock; replaceable in tests or deterministic replay.
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

use std::time::Duration;

use crate::{timeout::TimeoutHandle, Instant};

/// Staleness of a query.
///
/// While `is_stale` is true no timer is pending and `turns_stale_at` is `None`.
#[derive(Debug)]
pub(crate) struct StaleState {
    pub(crate) is_stale: bool,
    pub(crate) turns_stale_at: Option<Instant>,
    pub(crate) duration: Option<Duration>,
    timer: Option<TimeoutHandle>,
}

impl StaleState {
    /// Queries start out stale so the first fetch runs.
    pub(crate) fn new() -> Self {
        Self {
            is_stale: true,
            turns_stale_at: None,
            duration: None,
            timer: None,
        }
    }

    pub(crate) fn mark_stale(&mut self) {
        self.clear_timer();
        self.is_stale = true;
        self.duration = None;
        self.turns_stale_at = None;
    }

    /// Fresh until something else marks it stale.
    pub(crate) fn mark_fresh(&mut self) {
        self.clear_timer();
        self.is_stale = false;
        self.duration = None;
        self.turns_stale_at = None;
    }

    /// Fresh for `duration`; `timer` must mark it stale on fire.
    pub(crate) fn fresh_for(&mut self, duration: Duration, timer: TimeoutHandle) {
        self.clear_timer();
        self.is_stale = false;
        self.duration = Some(duration);
        self.turns_stale_at = Some(Instant::now() + duration);
        self.timer = Some(timer);
    }

    fn clear_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.clear();
        }
    }
}

/// Last known-good value of a query, kept apart from the current fetch state.
///
/// `data` outlives `has_cached`: a cleared cache keeps the value around but it is no longer served.
#[derive(Debug)]
pub(crate) struct CacheState<V> {
    pub(crate) has_cached: bool,
    pub(crate) data: Option<V>,
    pub(crate) expires_at: Option<Instant>,
    pub(crate) duration: Option<Duration>,
    timer: Option<TimeoutHandle>,
}

impl<V> CacheState<V> {
    pub(crate) fn new() -> Self {
        Self {
            has_cached: false,
            data: None,
            expires_at: None,
            duration: None,
            timer: None,
        }
    }

    /// The cached value, if it may be served.
    pub(crate) fn cached(&self) -> Option<&V> {
        if self.has_cached {
            self.data.as_ref()
        } else {
            None
        }
    }

    /// Stores `data`. It expires after `expiry` when given, the timer must clear the cache on fire.
    pub(crate) fn store(&mut self, data: V, expiry: Option<(Duration, TimeoutHandle)>) {
        self.clear_timer();
        self.data = Some(data);
        self.has_cached = true;
        match expiry {
            Some((duration, timer)) => {
                self.duration = Some(duration);
                self.expires_at = Some(Instant::now() + duration);
                self.timer = Some(timer);
            }
            None => {
                self.duration = None;
                self.expires_at = None;
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.clear_timer();
        self.has_cached = false;
        self.duration = None;
        self.expires_at = None;
    }

    fn clear_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.clear();
        }
    }
}

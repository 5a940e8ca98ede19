use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use serde_derive::Serialize;
use thiserror::Error;

mod payload;
pub use payload::*;

mod poller;
pub use poller::*;

mod write_guard;
pub use write_guard::*;

mod writer;
pub use writer::*;

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(1500);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScanError {
    #[error("a tag write is already in progress")]
    WriteInProgress,
}

/// A tag was placed on the reader
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanEvent {
    pub tag_id: String,
    pub detected_at: DateTime<Utc>,
}

impl ScanEvent {
    pub fn new(tag_id: impl Into<String>) -> Self {
        Self {
            tag_id: tag_id.into(),
            detected_at: Utc::now(),
        }
    }
}

/// Turns the raw per-poll reading into at most one event per physical placement
#[derive(Debug)]
pub struct ScanState {
    present_tag_id: Option<String>,
    last_seen_at: Option<Instant>,
    absent_since: Option<Instant>,
    grace_period: Duration,
    write_suppressed: bool,
}

impl Default for ScanState {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_PERIOD)
    }
}

impl ScanState {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            present_tag_id: None,
            last_seen_at: None,
            absent_since: None,
            grace_period,
            write_suppressed: false,
        }
    }

    /// Feeds one poll reading. `now` must never go backwards between calls.
    pub fn process(&mut self, raw_tag_id: Option<&str>, now: Instant) -> Option<ScanEvent> {
        if self.write_suppressed {
            return None;
        }

        match raw_tag_id {
            Some(tag_id) if self.present_tag_id.as_deref() == Some(tag_id) => {
                self.last_seen_at = Some(now);
                if self.absent_since.take().is_some() {
                    trace!(tag_id, "tag back within grace period");
                }

                None
            }
            Some(tag_id) => {
                // A different id can only be read once the previous tag left the field,
                // so it replaces it immediately.
                if let Some(previous) = self.present_tag_id.replace(tag_id.to_owned()) {
                    debug!(tag_id, previous = %previous, "tag replaced");
                }

                self.last_seen_at = Some(now);
                self.absent_since = None;

                Some(ScanEvent::new(tag_id))
            }
            None => {
                if self.present_tag_id.is_none() {
                    return None;
                }

                match self.absent_since {
                    None => {
                        self.absent_since = Some(now);
                    }
                    Some(since) if now.saturating_duration_since(since) >= self.grace_period => {
                        if let Some(tag_id) = self.present_tag_id.take() {
                            debug!(tag_id = %tag_id, "tag removed");
                        }

                        self.absent_since = None;
                    }
                    Some(_) => {}
                }

                None
            }
        }
    }

    pub fn reset(&mut self) {
        self.present_tag_id = None;
        self.absent_since = None;
    }

    pub fn present_tag(&self) -> Option<&str> {
        self.present_tag_id.as_deref()
    }

    pub fn last_seen_at(&self) -> Option<Instant> {
        self.last_seen_at
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn is_write_suppressed(&self) -> bool {
        self.write_suppressed
    }

    pub fn begin_write(&mut self) -> Result<(), ScanError> {
        if self.write_suppressed {
            return Err(ScanError::WriteInProgress);
        }

        self.write_suppressed = true;
        Ok(())
    }

    /// Ends a write; the tag that was just written needs a fresh arrival to emit again
    pub fn end_write(&mut self, success: bool) {
        if !self.write_suppressed {
            warn!(success, "end_write without a matching begin_write");
        }

        self.write_suppressed = false;
        self.reset();
    }
}

/// Shared access to one reader's [ScanState]
///
/// The poll loop is the only caller of [ScanHandle::process]; the tag-writing flow only goes
/// through [ScanHandle::begin_write].
#[derive(Debug, Clone, Default)]
pub struct ScanHandle(Arc<Mutex<ScanState>>);

impl ScanHandle {
    pub fn new(state: ScanState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    fn lock(&self) -> MutexGuard<'_, ScanState> {
        // The state is always left consistent between statements, a poisoned lock is still usable
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn process(&self, raw_tag_id: Option<&str>, now: Instant) -> Option<ScanEvent> {
        self.lock().process(raw_tag_id, now)
    }

    pub fn reset(&self) {
        self.lock().reset();
    }

    pub fn present_tag(&self) -> Option<String> {
        self.lock().present_tag().map(str::to_owned)
    }

    pub fn is_write_suppressed(&self) -> bool {
        self.lock().is_write_suppressed()
    }

    pub fn begin_write(&self) -> Result<WriteGuard, ScanError> {
        if let Err(error) = self.lock().begin_write() {
            error!(error = %error, "tag write started while another one is active");
            return Err(error);
        }

        Ok(WriteGuard::new(self.clone()))
    }

    fn end_write(&self, success: bool) {
        self.lock().end_write(success);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(start: Instant, millis: u64) -> Instant {
        start + Duration::from_millis(millis)
    }

    #[test]
    fn constant_presence_emits_once() {
        let start = Instant::now();
        let mut state = ScanState::default();

        let events: Vec<_> = (0..50)
            .filter_map(|i| state.process(Some("A"), at(start, i * 100)))
            .collect();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tag_id, "A");
        assert_eq!(state.present_tag(), Some("A"));
    }

    #[test]
    fn reappearance_within_grace_period() {
        let start = Instant::now();
        let mut state = ScanState::default();

        assert!(state.process(Some("A"), start).is_some());
        assert!(state.process(None, at(start, 0)).is_none());
        assert!(state.process(None, at(start, 500)).is_none());
        assert!(state.process(None, at(start, 1000)).is_none());
        assert!(state.process(Some("A"), at(start, 1200)).is_none());
        assert_eq!(state.present_tag(), Some("A"));
    }

    #[test]
    fn reappearance_after_grace_period() {
        let start = Instant::now();
        let mut state = ScanState::default();

        assert!(state.process(Some("A"), start).is_some());
        for millis in [0, 500, 1000, 1600] {
            assert!(state.process(None, at(start, millis)).is_none());
        }
        assert_eq!(state.present_tag(), None);

        let event = state.process(Some("A"), at(start, 1700));
        assert_eq!(event.map(|e| e.tag_id), Some("A".to_owned()));
    }

    #[test]
    fn grace_window_restarts_after_reappearance() {
        let start = Instant::now();
        let mut state = ScanState::default();

        state.process(Some("A"), start);
        state.process(None, at(start, 100));
        state.process(Some("A"), at(start, 1000));
        // Absence measured from the second gap, not the first
        state.process(None, at(start, 1200));
        state.process(None, at(start, 2000));
        assert_eq!(state.present_tag(), Some("A"));
        assert!(state.process(Some("A"), at(start, 2100)).is_none());
    }

    #[test]
    fn removal_needs_a_poll_after_the_grace_period() {
        let start = Instant::now();
        let mut state = ScanState::default();

        state.process(Some("A"), start);
        state.process(None, at(start, 200));
        state.process(None, at(start, 1690));
        assert_eq!(state.present_tag(), Some("A"));
        state.process(None, at(start, 1700));
        assert_eq!(state.present_tag(), None);
    }

    #[test]
    fn different_tag_replaces_immediately() {
        let start = Instant::now();
        let mut state = ScanState::default();

        state.process(Some("A"), start);
        state.process(None, at(start, 100));
        let event = state.process(Some("B"), at(start, 200));

        assert_eq!(event.map(|e| e.tag_id), Some("B".to_owned()));
        assert_eq!(state.present_tag(), Some("B"));
    }

    #[test]
    fn nothing_present_and_nothing_read() {
        let mut state = ScanState::default();
        assert!(state.process(None, Instant::now()).is_none());
        assert_eq!(state.present_tag(), None);
    }

    #[test]
    fn suppression_blocks_events_and_freezes_presence() {
        let start = Instant::now();
        let mut state = ScanState::default();
        state.process(Some("A"), start);

        state.begin_write().unwrap();
        for (i, reading) in [None, Some("B"), Some("A"), None, None].iter().enumerate() {
            assert!(state.process(*reading, at(start, 1000 + i as u64 * 1000)).is_none());
            assert_eq!(state.present_tag(), Some("A"));
        }
    }

    #[test]
    fn end_write_requires_fresh_arrival() {
        let start = Instant::now();
        let mut state = ScanState::default();
        state.process(Some("A"), start);

        state.begin_write().unwrap();
        state.process(Some("A"), at(start, 500));
        state.end_write(true);

        let event = state.process(Some("A"), at(start, 600));
        assert_eq!(event.map(|e| e.tag_id), Some("A".to_owned()));
        assert!(state.process(Some("A"), at(start, 700)).is_none());
    }

    #[test]
    fn nested_begin_write_is_rejected() {
        let mut state = ScanState::default();
        state.begin_write().unwrap();
        assert_eq!(state.begin_write(), Err(ScanError::WriteInProgress));
        assert!(state.is_write_suppressed());
    }

    #[test]
    fn injected_grace_period() {
        let start = Instant::now();
        let mut state = ScanState::new(Duration::from_millis(100));

        state.process(Some("A"), start);
        state.process(None, at(start, 50));
        state.process(None, at(start, 150));
        assert!(state.process(Some("A"), at(start, 200)).is_some());
    }
}

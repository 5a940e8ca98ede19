use super::ScanHandle;

/// Keeps scan events suppressed while a tag is being written
///
/// Call [WriteGuard::finish] with the outcome of the write. A guard dropped without being
/// finished (early return, error propagation, panic) ends the write as failed, so suppression
/// can never leak.
#[must_use = "dropping the guard ends the write immediately"]
pub struct WriteGuard {
    handle: Option<ScanHandle>,
}

impl WriteGuard {
    pub(super) fn new(handle: ScanHandle) -> Self {
        debug!("tag write started, scan events suppressed");
        Self {
            handle: Some(handle),
        }
    }

    pub fn finish(mut self, success: bool) {
        self.end(success);
    }

    fn end(&mut self, success: bool) {
        if let Some(handle) = self.handle.take() {
            handle.end_write(success);
            debug!(success, "tag write ended, scan state reset");
        }
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        if self.handle.is_some() {
            warn!("tag write guard dropped before completion");
            self.end(false);
        }
    }
}

impl std::fmt::Debug for WriteGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteGuard")
            .field("active", &self.handle.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::super::{ScanError, ScanHandle};

    #[test]
    fn finish_resets_presence() {
        let handle = ScanHandle::default();
        let start = Instant::now();
        assert!(handle.process(Some("A"), start).is_some());

        let guard = handle.begin_write().unwrap();
        assert!(handle.is_write_suppressed());
        assert!(handle
            .process(Some("A"), start + Duration::from_millis(100))
            .is_none());
        guard.finish(true);

        assert!(!handle.is_write_suppressed());
        assert_eq!(handle.present_tag(), None);
        assert!(handle
            .process(Some("A"), start + Duration::from_millis(200))
            .is_some());
    }

    #[test]
    fn second_guard_is_rejected() {
        let handle = ScanHandle::default();
        let _guard = handle.begin_write().unwrap();

        assert_eq!(handle.begin_write().unwrap_err(), ScanError::WriteInProgress);
        assert!(handle.is_write_suppressed());
    }

    #[test]
    fn drop_ends_write() {
        let handle = ScanHandle::default();

        fn failing_write(handle: &ScanHandle) -> Result<(), &'static str> {
            let _guard = handle.begin_write().map_err(|_| "busy")?;
            Err("tag moved away")
        }

        assert!(failing_write(&handle).is_err());
        assert!(!handle.is_write_suppressed());
        assert!(handle.begin_write().is_ok());
    }

    #[test]
    fn panic_during_write_ends_write() {
        let handle = ScanHandle::default();

        let result = std::panic::catch_unwind({
            let handle = handle.clone();
            move || {
                let _guard = handle.begin_write().unwrap();
                panic!("reader exploded");
            }
        });

        assert!(result.is_err());
        assert!(!handle.is_write_suppressed());
    }
}

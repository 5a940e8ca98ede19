use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{ScanEvent, ScanHandle};

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("reader not available: {0}")]
    NotAvailable(String),
    #[error("tag write rejected at page {page}")]
    WriteRejected { page: u8 },
}

/// Blocking access to the NFC reader hardware
pub trait TagReader: Send {
    /// One passive-target poll: the id of the tag in the field, if any
    fn read_tag(&mut self) -> Result<Option<String>, ReaderError>;
}

impl<R: TagReader + ?Sized> TagReader for Box<R> {
    fn read_tag(&mut self) -> Result<Option<String>, ReaderError> {
        (**self).read_tag()
    }
}

/// Drives a [ScanHandle] from a [TagReader] on a dedicated blocking thread
pub struct Poller<R> {
    reader: R,
    scan: ScanHandle,
    tx: mpsc::Sender<ScanEvent>,
    interval: Duration,
    cancel: CancellationToken,
    notified_error: bool,
}

impl<R: TagReader> Poller<R> {
    pub fn new(
        reader: R,
        scan: ScanHandle,
        tx: mpsc::Sender<ScanEvent>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            reader,
            scan,
            tx,
            interval,
            cancel,
            notified_error: false,
        }
    }

    /// Runs one poll cycle. Returns `false` once the event consumer is gone.
    pub fn poll_once(&mut self, now: Instant) -> bool {
        let reading = match self.reader.read_tag() {
            Ok(reading) => {
                if std::mem::replace(&mut self.notified_error, false) {
                    info!("tag reader recovered");
                }

                reading
            }
            Err(error) => {
                // Skip the cycle entirely: the scan state stays frozen until the reader recovers
                if !std::mem::replace(&mut self.notified_error, true) {
                    error!(error = %error, "tag reader failed");
                }

                return true;
            }
        };

        if let Some(event) = self.scan.process(reading.as_deref(), now) {
            info!(tag_id = %event.tag_id, "tag arrived");

            if self.tx.blocking_send(event).is_err() {
                return false;
            }
        }

        true
    }

    /// Polls until cancelled. Must run outside of the async executor threads.
    pub fn run(mut self) {
        info!(interval = ?self.interval, "starting tag polling");

        while !self.cancel.is_cancelled() {
            if !self.poll_once(Instant::now()) {
                debug!("scan event receiver dropped");
                break;
            }

            std::thread::sleep(self.interval);
        }

        info!("stopped tag polling");
    }
}

impl<R: TagReader + 'static> Poller<R> {
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::task::spawn_blocking(move || self.run())
    }
}

/// Simulated reader: a tag rests on the reader for `dwell`, then the reader is empty for `gap`
///
/// Placements cycle through `tag_ids`. Reads are dropped every `flicker` polls while a tag is
/// present, to exercise the grace period the same way a real antenna does.
pub struct MockReader {
    tag_ids: Vec<String>,
    dwell: Duration,
    gap: Duration,
    flicker: Option<u32>,
    started: Instant,
    polls: u32,
}

impl MockReader {
    pub fn new(tag_ids: Vec<String>, dwell: Duration, gap: Duration) -> Self {
        Self {
            tag_ids,
            dwell,
            gap,
            flicker: Some(7),
            started: Instant::now(),
            polls: 0,
        }
    }

    pub fn without_flicker(mut self) -> Self {
        self.flicker = None;
        self
    }

    fn reading_at(&self, elapsed: Duration) -> Option<String> {
        if self.tag_ids.is_empty() {
            return None;
        }

        let period = self.dwell + self.gap;
        if period.is_zero() {
            return None;
        }

        let cycle = (elapsed.as_millis() / period.as_millis().max(1)) as usize;
        let offset = elapsed.as_millis() % period.as_millis().max(1);

        if offset < self.gap.as_millis() {
            None
        } else {
            Some(self.tag_ids[cycle % self.tag_ids.len()].clone())
        }
    }
}

impl TagReader for MockReader {
    fn read_tag(&mut self) -> Result<Option<String>, ReaderError> {
        self.polls = self.polls.wrapping_add(1);

        let reading = self.reading_at(self.started.elapsed());
        if reading.is_some() {
            if let Some(flicker) = self.flicker {
                if self.polls % flicker == 0 {
                    return Ok(None);
                }
            }
        }

        Ok(reading)
    }
}

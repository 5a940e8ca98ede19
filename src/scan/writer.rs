use thiserror::Error;

use super::{
    encode_payload, pages, PayloadError, ReaderError, ScanError, ScanHandle, TagPayload,
    FIRST_USER_PAGE, PAGE_SIZE,
};

/// Pages cleared before writing so stale records cannot be read back
const CLEARED_PAGES: u8 = 4;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error("reader error: {0}")]
    Reader(#[from] ReaderError),
}

/// Blocking page-level write access to the tag in the field
pub trait TagWriter: Send {
    fn write_page(&mut self, page: u8, data: [u8; PAGE_SIZE]) -> Result<(), ReaderError>;
}

/// Writes `payload` to the tag on the reader with scan events suppressed
///
/// Once this returns, the tag still resting on the reader is reported again as a fresh
/// arrival on the next poll.
#[instrument(skip(scan, writer))]
pub fn write_payload(
    scan: &ScanHandle,
    writer: &mut dyn TagWriter,
    payload: &TagPayload,
    capacity: usize,
) -> Result<(), WriteError> {
    let encoded = encode_payload(payload, capacity)?;
    let guard = scan.begin_write()?;

    for page in FIRST_USER_PAGE..FIRST_USER_PAGE + CLEARED_PAGES {
        writer.write_page(page, [0; PAGE_SIZE])?;
    }

    for (page, data) in (FIRST_USER_PAGE..).zip(pages(&encoded)) {
        writer.write_page(page, data)?;
    }

    guard.finish(true);
    info!(id = %payload.id, bytes = encoded.len(), "wrote tag payload");

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, time::Instant};

    use super::*;
    use crate::scan::decode_payload;

    #[derive(Default)]
    struct MemoryTag {
        pages: BTreeMap<u8, [u8; PAGE_SIZE]>,
        fail_at: Option<u8>,
    }

    impl TagWriter for MemoryTag {
        fn write_page(&mut self, page: u8, data: [u8; PAGE_SIZE]) -> Result<(), ReaderError> {
            if self.fail_at == Some(page) {
                return Err(ReaderError::WriteRejected { page });
            }

            self.pages.insert(page, data);
            Ok(())
        }
    }

    #[test]
    fn written_tag_reads_back_and_rearms() {
        let scan = ScanHandle::default();
        let start = Instant::now();
        assert!(scan.process(Some("04:A2"), start).is_some());

        let mut tag = MemoryTag::default();
        let payload = TagPayload::new("1A88256FB33855EEB831ED2569B135CF");
        write_payload(&scan, &mut tag, &payload, 144).unwrap();

        let memory: Vec<u8> = tag.pages.values().flatten().copied().collect();
        assert_eq!(decode_payload(&memory), Some(payload));

        assert!(!scan.is_write_suppressed());
        assert!(scan.process(Some("04:A2"), Instant::now()).is_some());
    }

    #[test]
    fn failed_write_releases_suppression() {
        let scan = ScanHandle::default();
        let mut tag = MemoryTag {
            fail_at: Some(5),
            ..Default::default()
        };

        let result = write_payload(&scan, &mut tag, &TagPayload::new("abc"), 144);

        assert!(matches!(
            result,
            Err(WriteError::Reader(ReaderError::WriteRejected { page: 5 }))
        ));
        assert!(!scan.is_write_suppressed());
    }

    #[test]
    fn oversized_payload_never_suppresses() {
        let scan = ScanHandle::default();
        let mut tag = MemoryTag::default();

        let result = write_payload(&scan, &mut tag, &TagPayload::new("x".repeat(300)), 144);

        assert!(matches!(result, Err(WriteError::Payload(_))));
        assert!(tag.pages.is_empty());
        assert!(!scan.is_write_suppressed());
    }

    #[test]
    fn concurrent_write_is_refused() {
        let scan = ScanHandle::default();
        let _guard = scan.begin_write().unwrap();
        let mut tag = MemoryTag::default();

        let result = write_payload(&scan, &mut tag, &TagPayload::new("abc"), 144);

        assert!(matches!(
            result,
            Err(WriteError::Scan(ScanError::WriteInProgress))
        ));
        assert!(tag.pages.is_empty());
    }
}

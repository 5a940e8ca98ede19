//! NDEF encoding of the JSON payload stored on the sample tags
//!
//! Tags hold a single well-known text record (`T`, language `en`) wrapped in an NDEF
//! message TLV, starting at user page 4.

use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

const TLV_NDEF_MESSAGE: u8 = 0x03;
const TLV_TERMINATOR: u8 = 0xFE;
/// MB | ME | SR, TNF = well-known
const RECORD_HEADER: u8 = 0xD1;
const RECORD_TYPE_TEXT: u8 = b'T';
/// UTF-8, two-byte language code
const TEXT_STATUS: u8 = 0x02;
const LANGUAGE: &[u8; 2] = b"en";

pub const PAGE_SIZE: usize = 4;
pub const FIRST_USER_PAGE: u8 = 4;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("error encoding payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("encoded payload is {size} bytes, the tag holds {capacity}")]
    TooLarge { size: usize, capacity: usize },
}

/// The compact journal reference written to each tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagPayload {
    /// Payload format version
    pub v: u32,
    /// Journal entry id
    pub id: String,
    /// Latitude, longitude
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<[f64; 2]>,
    /// Collection time, seconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

impl TagPayload {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            v: 1,
            id: id.into(),
            geo: None,
            ts: None,
        }
    }
}

/// Wraps `text` in a text record inside an NDEF message TLV
pub fn encode_text_record(text: &str) -> Vec<u8> {
    let text = text.as_bytes();
    let payload_len = 1 + LANGUAGE.len() + text.len();

    let mut record = Vec::with_capacity(payload_len + 4);
    // The short-record flag limits the payload length to one byte
    let header = if payload_len <= 0xFF {
        RECORD_HEADER
    } else {
        RECORD_HEADER & !0x10
    };
    record.push(header);
    record.push(1);
    if payload_len <= 0xFF {
        record.push(payload_len as u8);
    } else {
        record.extend_from_slice(&(payload_len as u32).to_be_bytes());
    }
    record.push(RECORD_TYPE_TEXT);
    record.push(TEXT_STATUS);
    record.extend_from_slice(LANGUAGE);
    record.extend_from_slice(text);

    let mut tlv = Vec::with_capacity(record.len() + 5);
    tlv.push(TLV_NDEF_MESSAGE);
    if record.len() < 0xFF {
        tlv.push(record.len() as u8);
    } else {
        tlv.push(0xFF);
        tlv.extend_from_slice(&(record.len() as u16).to_be_bytes());
    }
    tlv.extend_from_slice(&record);
    tlv.push(TLV_TERMINATOR);

    tlv
}

/// Encodes `payload` as compact JSON in a text record, checking it fits the tag
pub fn encode_payload(payload: &TagPayload, capacity: usize) -> Result<Vec<u8>, PayloadError> {
    let json = serde_json::to_string(payload)?;
    let encoded = encode_text_record(&json);

    if encoded.len() > capacity {
        return Err(PayloadError::TooLarge {
            size: encoded.len(),
            capacity,
        });
    }

    Ok(encoded)
}

/// Splits encoded data into zero-padded tag pages
pub fn pages(data: &[u8]) -> impl Iterator<Item = [u8; PAGE_SIZE]> + '_ {
    data.chunks(PAGE_SIZE).map(|chunk| {
        let mut page = [0u8; PAGE_SIZE];
        page[..chunk.len()].copy_from_slice(chunk);
        page
    })
}

/// Extracts the JSON payload from raw user memory
///
/// Tags written by older tools are not always valid NDEF, so this looks for the first JSON
/// object in the data rather than walking the TLV structure.
pub fn decode_payload(data: &[u8]) -> Option<TagPayload> {
    let start = data.iter().position(|&b| b == b'{')?;
    let end = start + data[start..].iter().position(|&b| b == b'}')? + 1;

    let text = String::from_utf8_lossy(&data[start..end]);
    match serde_json::from_str(&text) {
        Ok(payload) => Some(payload),
        Err(error) => {
            debug!(error = %error, "tag data is not a journal payload");
            None
        }
    }
}

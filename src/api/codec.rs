use std::marker::PhantomData;

use bytes::BytesMut;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

#[derive(Debug, Error)]
pub enum JsonLinesCodecError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line error: {0}")]
    Lines(#[from] LinesCodecError),
    #[error("error encoding JSON: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Newline-delimited JSON tokio codec
///
/// Malformed lines decode to `Err` items instead of failing the stream, so one bad request
/// does not end the session.
pub struct JsonLinesCodec<T> {
    /// Line parsing codec
    lines: LinesCodec,
    _item: PhantomData<fn() -> T>,
}

impl<T> JsonLinesCodec<T> {
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new(),
            _item: PhantomData,
        }
    }
}

impl<T> Default for JsonLinesCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> Decoder for JsonLinesCodec<T> {
    type Item = Result<T, serde_json::Error>;
    type Error = JsonLinesCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.lines.decode(src)? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return Ok(Some(serde_json::from_str(&line))),
                None => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.lines.decode_eof(src)? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return Ok(Some(serde_json::from_str(&line))),
                None => return Ok(None),
            }
        }
    }
}

impl<T, U: Serialize> Encoder<U> for JsonLinesCodec<T> {
    type Error = JsonLinesCodecError;

    fn encode(&mut self, item: U, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let encoded = serde_json::to_string(&item)?;
        self.lines.encode(encoded, dst).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{LedCommand, LedReply};

    #[test]
    fn decodes_lines_and_survives_garbage() {
        let mut codec = JsonLinesCodec::<LedCommand>::new();
        let mut src = BytesMut::from(
            &b"{\"command\":\"activity\"}\n\nnot json\n{\"command\":\"get_status\"}\n{\"comm"[..],
        );

        assert_eq!(
            codec.decode(&mut src).unwrap().unwrap().unwrap(),
            LedCommand::Activity
        );
        assert!(codec.decode(&mut src).unwrap().unwrap().is_err());
        assert_eq!(
            codec.decode(&mut src).unwrap().unwrap().unwrap(),
            LedCommand::GetStatus
        );
        assert!(codec.decode(&mut src).unwrap().is_none());
    }

    #[test]
    fn encodes_one_line_per_item() {
        let mut codec = JsonLinesCodec::<LedCommand>::new();
        let mut dst = BytesMut::new();

        codec.encode(LedReply::success(None), &mut dst).unwrap();
        codec.encode(LedReply::success(None), &mut dst).unwrap();

        assert_eq!(&dst[..], b"{\"success\":true}\n{\"success\":true}\n");
    }
}

//! Byte-source normalization and data-URI encoding.
//!
//! Attachment payloads reach adapters in several shapes: raw bytes already
//! in hand, base64 text from a JSON payload, an async byte stream being
//! downloaded, or a bare URL the platform expects the consumer to fetch
//! itself. `to_buffer` collapses the supported shapes into a single byte
//! vector; URLs are not fetched here and count as unsupported input.

use std::fmt;
use std::pin::Pin;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::AdapterError;

pub const DEFAULT_MIME: &str = "application/octet-stream";

/// A source of attachment bytes.
pub enum ByteSource {
    /// Bytes already materialized.
    Bytes(Vec<u8>),
    /// Base64-encoded text, as carried in JSON payloads.
    Base64(String),
    /// An async byte stream; must be read to the end.
    Stream(Pin<Box<dyn AsyncRead + Send>>),
    /// A remote URL. Fetching is the caller's business, so this is an
    /// unsupported input for buffer conversion.
    Url(String),
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Base64(s) => f.debug_tuple("Base64").field(&s.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Url(u) => f.debug_tuple("Url").field(u).finish(),
        }
    }
}

impl From<Vec<u8>> for ByteSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for ByteSource {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl From<crate::types::AttachmentData> for ByteSource {
    fn from(data: crate::types::AttachmentData) -> Self {
        match data {
            crate::types::AttachmentData::Bytes { bytes } => Self::Bytes(bytes),
            crate::types::AttachmentData::Base64 { text } => Self::Base64(text),
            crate::types::AttachmentData::Url { url } => Self::Url(url),
        }
    }
}

fn unsupported(
    platform: &str,
    what: &str,
    throw_on_unsupported: bool,
) -> Result<Option<Vec<u8>>, AdapterError> {
    if throw_on_unsupported {
        Err(AdapterError::validation(
            platform,
            format!("unsupported byte source: {what}"),
        ))
    } else {
        Ok(None)
    }
}

/// Normalize a byte source into a byte vector.
///
/// Returns `Ok(None)` for unsupported inputs when `throw_on_unsupported`
/// is false; otherwise unsupported inputs fail with a `Validation` error
/// attributed to `platform`.
pub async fn to_buffer(
    source: ByteSource,
    platform: &str,
    throw_on_unsupported: bool,
) -> Result<Option<Vec<u8>>, AdapterError> {
    match source {
        ByteSource::Bytes(bytes) => Ok(Some(bytes)),
        ByteSource::Base64(text) => decode_base64(&text, platform).map(Some),
        ByteSource::Stream(mut reader) => {
            let mut out = Vec::new();
            reader
                .read_to_end(&mut out)
                .await
                .map_err(|e| AdapterError::network(platform, e))?;
            Ok(Some(out))
        }
        ByteSource::Url(_) => unsupported(platform, "url", throw_on_unsupported),
    }
}

/// Synchronous variant of [`to_buffer`].
///
/// Streams require an async read and are rejected here in addition to the
/// inputs `to_buffer` rejects.
pub fn to_buffer_sync(
    source: ByteSource,
    platform: &str,
    throw_on_unsupported: bool,
) -> Result<Option<Vec<u8>>, AdapterError> {
    match source {
        ByteSource::Bytes(bytes) => Ok(Some(bytes)),
        ByteSource::Base64(text) => decode_base64(&text, platform).map(Some),
        ByteSource::Stream(_) => {
            unsupported(platform, "stream (requires async read)", throw_on_unsupported)
        }
        ByteSource::Url(_) => unsupported(platform, "url", throw_on_unsupported),
    }
}

fn decode_base64(text: &str, platform: &str) -> Result<Vec<u8>, AdapterError> {
    BASE64
        .decode(text.trim())
        .map_err(|e| AdapterError::validation(platform, format!("invalid base64 payload: {e}")))
}

/// Encode bytes as a `data:` URI.
///
/// `mime` defaults to `application/octet-stream`; empty input yields an
/// empty base64 body.
pub fn to_data_uri(bytes: &[u8], mime: Option<&str>) -> String {
    let mime = mime.unwrap_or(DEFAULT_MIME);
    format!("data:{mime};base64,{}", BASE64.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bytes_pass_through() {
        let data = b"\x00\x01\xfe\xff".to_vec();
        let out = to_buffer(ByteSource::Bytes(data.clone()), "slack", true)
            .await
            .unwrap();
        assert_eq!(out, Some(data.clone()));

        let out = to_buffer_sync(ByteSource::Bytes(data.clone()), "slack", true).unwrap();
        assert_eq!(out, Some(data));
    }

    #[tokio::test]
    async fn base64_decodes() {
        let out = to_buffer(ByteSource::Base64("aGVsbG8=".into()), "slack", true)
            .await
            .unwrap();
        assert_eq!(out, Some(b"hello".to_vec()));
    }

    #[test]
    fn invalid_base64_is_a_validation_error() {
        let err = to_buffer_sync(ByteSource::Base64("not base64!!".into()), "slack", true)
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(err.adapter, "slack");
    }

    #[tokio::test]
    async fn stream_reads_to_end() {
        let reader = std::io::Cursor::new(b"streamed bytes".to_vec());
        let out = to_buffer(ByteSource::Stream(Box::pin(reader)), "discord", true)
            .await
            .unwrap();
        assert_eq!(out, Some(b"streamed bytes".to_vec()));
    }

    #[test]
    fn sync_rejects_streams() {
        let reader = std::io::Cursor::new(Vec::new());
        let err =
            to_buffer_sync(ByteSource::Stream(Box::pin(reader)), "discord", true).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let reader = std::io::Cursor::new(Vec::new());
        let out = to_buffer_sync(ByteSource::Stream(Box::pin(reader)), "discord", false).unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn url_is_unsupported() {
        let err = to_buffer(
            ByteSource::Url("https://example.com/f.png".into()),
            "linear",
            true,
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(err.adapter, "linear");

        let out = to_buffer(
            ByteSource::Url("https://example.com/f.png".into()),
            "linear",
            false,
        )
        .await
        .unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn attachment_data_converts_to_a_byte_source() {
        use crate::types::AttachmentData;

        let source: ByteSource = AttachmentData::Base64 {
            text: "aGVsbG8=".into(),
        }
        .into();
        let out = to_buffer(source, "slack", true).await.unwrap();
        assert_eq!(out, Some(b"hello".to_vec()));

        let source: ByteSource = AttachmentData::Url {
            url: "https://example.com/f".into(),
        }
        .into();
        assert!(to_buffer(source, "slack", false).await.unwrap().is_none());
    }

    #[test]
    fn data_uri_hello() {
        assert_eq!(
            to_data_uri(b"hello", Some("text/plain")),
            "data:text/plain;base64,aGVsbG8="
        );
    }

    #[test]
    fn data_uri_empty_and_default_mime() {
        assert_eq!(
            to_data_uri(&[], None),
            "data:application/octet-stream;base64,"
        );
    }
}

//! `data:<mime>;base64,<payload>` handling.
//!
//! Images travel through the system as opaque data URI strings. This module only
//! splits them into the (mime type, payload) pair the Gemini API wants and joins
//! them back; the payload is never decoded except for CLI import/export.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DataUriError {
    #[error("not a data URI: missing ',' separator")]
    MissingSeparator,

    #[error("not a data URI: header must look like 'data:<mime>;base64'")]
    MalformedHeader,

    #[error("not a data URI: payload must be base64-encoded")]
    NotBase64,

    #[error("empty payload")]
    EmptyPayload,

    #[error("payload is not valid base64: {0}")]
    Base64(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime_type: String,
    /// Base64 payload, kept encoded.
    pub data: String,
}

impl DataUri {
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Split on the first ',', then require a `data:` scheme, a mime type and
    /// a `base64` parameter in the header.
    pub fn parse(uri: &str) -> Result<Self, DataUriError> {
        let (header, payload) = uri.split_once(',').ok_or(DataUriError::MissingSeparator)?;

        let header = header.trim();
        let params = match header.get(..5) {
            Some(scheme) if scheme.eq_ignore_ascii_case("data:") => &header[5..],
            _ => return Err(DataUriError::MalformedHeader),
        };

        let mut fields = params.split(';');
        let mime_type = fields
            .next()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or(DataUriError::MalformedHeader)?;

        if !fields.any(|f| f.trim().eq_ignore_ascii_case("base64")) {
            return Err(DataUriError::NotBase64);
        }

        if payload.trim().is_empty() {
            return Err(DataUriError::EmptyPayload);
        }

        Ok(Self::new(mime_type, payload.trim()))
    }

    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self::new(mime_type, STANDARD.encode(bytes))
    }

    pub fn decode(&self) -> Result<Vec<u8>, DataUriError> {
        STANDARD
            .decode(self.data.as_bytes())
            .map_err(|e| DataUriError::Base64(e.to_string()))
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

impl fmt::Display for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Guess an image mime type from a file extension.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

/// File extension to use when exporting an image of the given mime type.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

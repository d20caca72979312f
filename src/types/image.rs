//! Encoded image payloads
//!
//! Frames travel as base64 text. A payload may arrive bare or wrapped in a
//! `data:image/...;base64,` URI; either way it normalizes to the same bare
//! payload plus a MIME type.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::ImageError;

/// MIME type assumed for bare payloads
pub const DEFAULT_MIME: &str = "image/jpeg";

lazy_static! {
    static ref RE_IMAGE_DATA_URI: Regex =
        Regex::new(r"^data:(image/[A-Za-z0-9.+-]+);base64,").unwrap();
}

/// A still image as canonical base64 text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedImage {
    mime: String,
    payload: String,
}

impl EncodedImage {
    /// Encode raw bytes
    pub fn from_bytes(mime: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime: mime.into(),
            payload: STANDARD.encode(bytes),
        }
    }

    /// Normalize a bare base64 string or an image data URI.
    ///
    /// Only the prefix is removed; the payload itself is left untouched apart
    /// from surrounding whitespace.
    pub fn parse(input: &str) -> Result<Self, ImageError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ImageError::Empty);
        }

        let (mime, payload) = match RE_IMAGE_DATA_URI.captures(input) {
            Some(caps) => {
                let prefix_len = caps.get(0).map(|m| m.end()).unwrap_or(0);
                let mime = caps.get(1).map(|m| m.as_str()).unwrap_or(DEFAULT_MIME);
                (mime.to_ascii_lowercase(), &input[prefix_len..])
            }
            None if input.starts_with("data:") => {
                let head: String = input.chars().take(40).collect();
                return Err(ImageError::InvalidDataUri(head));
            }
            None => (DEFAULT_MIME.to_string(), input),
        };

        if payload.is_empty() {
            return Err(ImageError::Empty);
        }

        Ok(Self {
            mime,
            payload: payload.to_string(),
        })
    }

    /// Bare base64 payload, the canonical wire form
    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// `data:<mime>;base64,<payload>`
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.payload)
    }

    /// Decode the payload back to bytes
    pub fn decode(&self) -> Result<Vec<u8>, ImageError> {
        STANDARD
            .decode(self.payload.as_bytes())
            .map_err(|e| ImageError::InvalidBase64(e.to_string()))
    }

    /// SHA-256 of the payload text
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.payload.as_bytes());
        hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BYTES: &[u8] = b"\xff\xd8\xff\xe0 not really a jpeg \xff\xd9";

    #[test]
    fn test_prefix_and_bare_normalize_identically() {
        let bare = EncodedImage::from_bytes("image/jpeg", BYTES);
        let prefixed = EncodedImage::parse(&bare.to_data_uri()).unwrap();
        let reparsed = EncodedImage::parse(bare.payload()).unwrap();

        assert_eq!(prefixed.payload(), bare.payload());
        assert_eq!(reparsed.payload(), bare.payload());
        assert_eq!(prefixed.decode().unwrap(), BYTES);
    }

    #[test]
    fn test_mime_from_prefix() {
        let image = EncodedImage::parse("data:image/PNG;base64,iVBORw0KGgo=").unwrap();
        assert_eq!(image.mime(), "image/png");
        assert_eq!(image.payload(), "iVBORw0KGgo=");
    }

    #[test]
    fn test_bare_defaults_to_jpeg() {
        let image = EncodedImage::parse("  /9j/4AAQ  ").unwrap();
        assert_eq!(image.mime(), DEFAULT_MIME);
        assert_eq!(image.payload(), "/9j/4AAQ");
    }

    #[test]
    fn test_webp_prefix() {
        let image = EncodedImage::parse("data:image/webp;base64,UklGRg==").unwrap();
        assert_eq!(image.mime(), "image/webp");
    }

    #[test]
    fn test_empty_rejected() {
        assert_eq!(EncodedImage::parse(""), Err(ImageError::Empty));
        assert_eq!(EncodedImage::parse("data:image/jpeg;base64,"), Err(ImageError::Empty));
    }

    #[test]
    fn test_non_image_data_uri_rejected() {
        let err = EncodedImage::parse("data:text/plain;base64,aGVsbG8=").unwrap_err();
        assert!(matches!(err, ImageError::InvalidDataUri(_)));
    }

    #[test]
    fn test_invalid_base64_detected_on_decode() {
        let image = EncodedImage::parse("not base64 at all!").unwrap();
        assert!(matches!(image.decode(), Err(ImageError::InvalidBase64(_))));
    }

    #[test]
    fn test_fingerprint_ignores_prefix() {
        let bare = EncodedImage::from_bytes("image/jpeg", BYTES);
        let prefixed = EncodedImage::parse(&bare.to_data_uri()).unwrap();
        assert_eq!(bare.fingerprint(), prefixed.fingerprint());
    }
}

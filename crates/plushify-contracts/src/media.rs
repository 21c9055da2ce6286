use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataUriError {
    #[error("data URI must start with `data:`")]
    MissingScheme,
    #[error("data URI has no `,` before its payload")]
    MissingPayload,
    #[error("data URI has no MIME type")]
    MissingMimeType,
    #[error("data URI payload is not marked `;base64`")]
    NotBase64,
    #[error("data URI payload is not valid base64: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

pub fn encode_data_uri(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", BASE64.encode(bytes))
}

/// Splits `data:<mime>;base64,<payload>` back into bytes and MIME type.
pub fn decode_data_uri(uri: &str) -> Result<DecodedImage, DataUriError> {
    let rest = uri
        .trim()
        .strip_prefix("data:")
        .ok_or(DataUriError::MissingScheme)?;
    let (header, payload) = rest.split_once(',').ok_or(DataUriError::MissingPayload)?;
    let mut params = header.split(';');
    let mime_type = params
        .next()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(DataUriError::MissingMimeType)?
        .to_string();
    if !params.any(|param| param.trim().eq_ignore_ascii_case("base64")) {
        return Err(DataUriError::NotBase64);
    }
    let bytes = BASE64
        .decode(payload.trim().as_bytes())
        .map_err(|err| DataUriError::Decode(err.to_string()))?;
    Ok(DecodedImage { bytes, mime_type })
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())?;
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

/// The image picked in the upload pane, held in its encoded `data:` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    data_uri: String,
    mime_type: String,
    label: String,
    byte_len: usize,
    sha256: String,
}

impl SourceImage {
    pub fn from_bytes(label: impl Into<String>, mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            data_uri: encode_data_uri(mime_type, bytes),
            mime_type: mime_type.to_string(),
            label: label.into(),
            byte_len: bytes.len(),
            sha256: hex::encode(Sha256::digest(bytes)),
        }
    }

    /// Reads a file fully into memory. Only `image/*` files are accepted.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let Some(mime_type) = mime_for_path(path) else {
            bail!("{} is not a supported image file", path.display());
        };
        let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        if bytes.is_empty() {
            bail!("{} is empty", path.display());
        }
        let label = path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or("image")
            .to_string();
        Ok(Self::from_bytes(label, mime_type, &bytes))
    }

    pub fn data_uri(&self) -> &str {
        &self.data_uri
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn decode(&self) -> Result<DecodedImage, DataUriError> {
        decode_data_uri(&self.data_uri)
    }

    #[cfg(test)]
    pub(crate) fn with_data_uri(mut self, data_uri: &str) -> Self {
        self.data_uri = data_uri.to_string();
        self
    }
}

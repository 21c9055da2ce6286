use crate::media::encode_data_uri;

/// Generated images are always presented as PNG, whatever the provider reports.
pub const RESULT_MIME_TYPE: &str = "image/png";
pub const RESULT_FILE_NAME: &str = "plushy.png";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultImage {
    bytes: Vec<u8>,
}

impl ResultImage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &'static str {
        RESULT_MIME_TYPE
    }

    pub fn to_data_uri(&self) -> String {
        encode_data_uri(RESULT_MIME_TYPE, &self.bytes)
    }
}

/// Why a transform attempt failed. Every variant ends the attempt; nothing is
/// retried. `Display` is the user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("API_KEY_MISSING: no API key was found. Set API_KEY in the environment or in a .env file, then try again.")]
    CredentialMissing,
    #[error("API key is invalid or has no access to this model. Check the key's project and model permissions.")]
    CredentialInvalid,
    #[error("No response from the image service. You might have reached the free tier limit.")]
    NoResponse,
    #[error("Content blocked by safety filters. Try a more neutral image.")]
    SafetyBlocked,
    #[error("{0}")]
    ProviderError(String),
}

impl TransformError {
    pub fn kind(&self) -> &'static str {
        match self {
            TransformError::CredentialMissing => "credential_missing",
            TransformError::CredentialInvalid => "credential_invalid",
            TransformError::NoResponse => "no_response",
            TransformError::SafetyBlocked => "safety_blocked",
            TransformError::ProviderError(_) => "provider_error",
        }
    }
}

/// `Ok(None)` means the service answered without an image; callers treat it
/// as a failed attempt with no specific cause.
pub type TransformOutcome = Result<Option<ResultImage>, TransformError>;

#[cfg(test)]
mod tests {
    use super::{ResultImage, TransformError};

    #[test]
    fn result_image_is_always_png_data_uri() {
        let image = ResultImage::new(b"hello".to_vec());
        assert_eq!(image.mime_type(), "image/png");
        assert_eq!(image.to_data_uri(), "data:image/png;base64,aGVsbG8=");
        assert_eq!(image.bytes(), b"hello");
    }

    #[test]
    fn missing_credential_message_keeps_marker() {
        let message = TransformError::CredentialMissing.to_string();
        assert!(message.starts_with("API_KEY_MISSING"));
        assert_eq!(TransformError::CredentialMissing.kind(), "credential_missing");
    }

    #[test]
    fn provider_error_shows_its_detail() {
        let err = TransformError::ProviderError("Gemini request failed (500): boom".to_string());
        assert_eq!(err.to_string(), "Gemini request failed (500): boom");
        assert_eq!(err.kind(), "provider_error");
    }
}

use crate::locale::{Language, Translations};
use crate::media::SourceImage;
use crate::transform::{ResultImage, TransformOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Ready,
    InFlight,
    Succeeded,
    Failed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Ready => "ready",
            Phase::InFlight => "in_flight",
            Phase::Succeeded => "succeeded",
            Phase::Failed => "failed",
        }
    }
}

/// Everything one transform attempt needs, handed out by
/// [`Workspace::begin_transform`]. The generation ties the eventual outcome
/// back to the attempt that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformTicket {
    pub generation: u64,
    pub image_bytes: Vec<u8>,
    pub mime_type: String,
}

/// View state of the two-pane workspace.
///
/// Each transition consumes the record and returns the next one, so the
/// state machine can be driven and inspected without any rendering layer.
/// `generation` increases whenever an older pending outcome must stop
/// mattering: on every new attempt and on every new source selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    language: Language,
    source: Option<SourceImage>,
    result: Option<ResultImage>,
    error: Option<String>,
    phase: Phase,
    generation: u64,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(Language::default())
    }
}

impl Workspace {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            source: None,
            result: None,
            error: None,
            phase: Phase::Idle,
            generation: 0,
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn strings(&self) -> &'static Translations {
        self.language.strings()
    }

    pub fn source(&self) -> Option<&SourceImage> {
        self.source.as_ref()
    }

    pub fn result(&self) -> Option<&ResultImage> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_in_flight(&self) -> bool {
        self.phase == Phase::InFlight
    }

    pub fn set_language(self, language: Language) -> Self {
        Self { language, ..self }
    }

    pub fn select_source(self, source: SourceImage) -> Self {
        Self {
            source: Some(source),
            result: None,
            error: None,
            phase: Phase::Ready,
            generation: self.generation + 1,
            ..self
        }
    }

    /// Starts an attempt. Without a source image no ticket is issued and the
    /// workspace fails with the upload prompt.
    pub fn begin_transform(self) -> (Self, Option<TransformTicket>) {
        let Some(source) = self.source.as_ref() else {
            let message = self.strings().error_upload.to_string();
            return (
                Self {
                    result: None,
                    error: Some(message),
                    phase: Phase::Failed,
                    ..self
                },
                None,
            );
        };

        let generation = self.generation + 1;
        match source.decode() {
            Ok(decoded) => {
                let ticket = TransformTicket {
                    generation,
                    image_bytes: decoded.bytes,
                    mime_type: decoded.mime_type,
                };
                (
                    Self {
                        result: None,
                        error: None,
                        phase: Phase::InFlight,
                        generation,
                        ..self
                    },
                    Some(ticket),
                )
            }
            Err(_) => {
                let message = self.strings().error_transform.to_string();
                (
                    Self {
                        result: None,
                        error: Some(message),
                        phase: Phase::Failed,
                        generation,
                        ..self
                    },
                    None,
                )
            }
        }
    }

    /// Applies the outcome of attempt `generation`. Outcomes of superseded
    /// attempts leave the workspace untouched.
    pub fn resolve(self, generation: u64, outcome: TransformOutcome) -> Self {
        if !self.accepts(generation) {
            return self;
        }
        match outcome {
            Ok(Some(image)) => Self {
                result: Some(image),
                error: None,
                phase: Phase::Succeeded,
                ..self
            },
            Ok(None) => self.fail_generic(),
            Err(err) => {
                let message = err.to_string();
                if message.trim().is_empty() {
                    return self.fail_generic();
                }
                Self {
                    result: None,
                    error: Some(message),
                    phase: Phase::Failed,
                    ..self
                }
            }
        }
    }

    /// Ends attempt `generation` after something went wrong outside the
    /// transform contract, such as a panic in the driver.
    pub fn abort(self, generation: u64) -> Self {
        if !self.accepts(generation) {
            return self;
        }
        self.fail_generic()
    }

    fn accepts(&self, generation: u64) -> bool {
        self.phase == Phase::InFlight && self.generation == generation
    }

    fn fail_generic(self) -> Self {
        let message = self.strings().error_transform.to_string();
        Self {
            result: None,
            error: Some(message),
            phase: Phase::Failed,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::locale::Language;
    use crate::media::SourceImage;
    use crate::transform::{ResultImage, TransformError};

    use super::{Phase, Workspace};

    fn sample_source(label: &str) -> SourceImage {
        SourceImage::from_bytes(label, "image/png", b"png-bytes")
    }

    #[test]
    fn transform_without_source_fails_with_upload_prompt() {
        let (workspace, ticket) = Workspace::new(Language::En).begin_transform();
        assert!(ticket.is_none());
        assert_eq!(workspace.phase(), Phase::Failed);
        assert_eq!(workspace.error(), Some("Please upload an image first."));
        assert!(!workspace.is_in_flight());
    }

    #[test]
    fn upload_prompt_follows_language() {
        let (workspace, ticket) = Workspace::new(Language::Zh).begin_transform();
        assert!(ticket.is_none());
        assert_eq!(workspace.error(), Some("请先上传图片。"));
    }

    #[test]
    fn selecting_source_moves_to_ready() {
        let workspace = Workspace::default().select_source(sample_source("a.png"));
        assert_eq!(workspace.phase(), Phase::Ready);
        assert_eq!(workspace.source().map(SourceImage::label), Some("a.png"));
        assert!(workspace.error().is_none());
        assert!(workspace.result().is_none());
    }

    #[test]
    fn begin_transform_decodes_source_into_ticket() {
        let workspace = Workspace::default().select_source(sample_source("a.png"));
        let (workspace, ticket) = workspace.begin_transform();
        let ticket = ticket.expect("ticket");
        assert_eq!(ticket.image_bytes, b"png-bytes");
        assert_eq!(ticket.mime_type, "image/png");
        assert_eq!(ticket.generation, workspace.generation());
        assert_eq!(workspace.phase(), Phase::InFlight);
        assert!(workspace.is_in_flight());
    }

    #[test]
    fn successful_outcome_stores_result() {
        let (workspace, ticket) = Workspace::default()
            .select_source(sample_source("a.png"))
            .begin_transform();
        let generation = ticket.expect("ticket").generation;
        let workspace = workspace.resolve(generation, Ok(Some(ResultImage::new(vec![1, 2, 3]))));
        assert_eq!(workspace.phase(), Phase::Succeeded);
        assert_eq!(workspace.result().map(ResultImage::bytes), Some(&[1u8, 2, 3][..]));
        assert!(workspace.error().is_none());
        assert!(!workspace.is_in_flight());
    }

    #[test]
    fn empty_outcome_fails_with_generic_message() {
        let (workspace, ticket) = Workspace::default()
            .select_source(sample_source("a.png"))
            .begin_transform();
        let generation = ticket.expect("ticket").generation;
        let workspace = workspace.resolve(generation, Ok(None));
        assert_eq!(workspace.phase(), Phase::Failed);
        assert_eq!(
            workspace.error(),
            Some("Failed to transform. Please try again.")
        );
        assert!(workspace.result().is_none());
        assert!(!workspace.is_in_flight());
    }

    #[test]
    fn error_outcome_surfaces_specific_message() {
        let (workspace, ticket) = Workspace::default()
            .select_source(sample_source("a.png"))
            .begin_transform();
        let generation = ticket.expect("ticket").generation;
        let workspace = workspace.resolve(generation, Err(TransformError::SafetyBlocked));
        assert_eq!(workspace.phase(), Phase::Failed);
        assert_eq!(
            workspace.error(),
            Some(TransformError::SafetyBlocked.to_string().as_str())
        );
    }

    #[test]
    fn blank_provider_message_falls_back_to_generic() {
        let (workspace, ticket) = Workspace::new(Language::Zh)
            .select_source(sample_source("a.png"))
            .begin_transform();
        let generation = ticket.expect("ticket").generation;
        let workspace = workspace.resolve(
            generation,
            Err(TransformError::ProviderError("  ".to_string())),
        );
        assert_eq!(workspace.error(), Some("转换失败。请重试。"));
    }

    #[test]
    fn abort_always_clears_in_flight() {
        let (workspace, ticket) = Workspace::default()
            .select_source(sample_source("a.png"))
            .begin_transform();
        let generation = ticket.expect("ticket").generation;
        let workspace = workspace.abort(generation);
        assert_eq!(workspace.phase(), Phase::Failed);
        assert!(!workspace.is_in_flight());
        assert_eq!(
            workspace.error(),
            Some("Failed to transform. Please try again.")
        );
    }

    #[test]
    fn undecodable_source_fails_without_ticket() {
        let broken = sample_source("a.png").with_data_uri("data:image/png;base64,@@@");
        let (workspace, ticket) = Workspace::default().select_source(broken).begin_transform();
        assert!(ticket.is_none());
        assert_eq!(workspace.phase(), Phase::Failed);
        assert!(!workspace.is_in_flight());
    }

    #[test]
    fn stale_outcome_cannot_overwrite_newer_attempt() {
        let (workspace, first) = Workspace::default()
            .select_source(sample_source("a.png"))
            .begin_transform();
        let first = first.expect("first ticket").generation;
        let (workspace, second) = workspace.begin_transform();
        let second = second.expect("second ticket").generation;
        assert!(second > first);

        let workspace = workspace.resolve(first, Ok(Some(ResultImage::new(vec![9]))));
        assert_eq!(workspace.phase(), Phase::InFlight);
        assert!(workspace.result().is_none());

        let workspace = workspace.resolve(second, Ok(Some(ResultImage::new(vec![7]))));
        assert_eq!(workspace.phase(), Phase::Succeeded);
        assert_eq!(workspace.result().map(ResultImage::bytes), Some(&[7u8][..]));
    }

    #[test]
    fn new_source_clears_previous_result_and_error() {
        let (workspace, ticket) = Workspace::default()
            .select_source(sample_source("a.png"))
            .begin_transform();
        let generation = ticket.expect("ticket").generation;
        let succeeded = workspace.resolve(generation, Ok(Some(ResultImage::new(vec![1]))));
        let reselected = succeeded.select_source(sample_source("b.png"));
        assert_eq!(reselected.phase(), Phase::Ready);
        assert!(reselected.result().is_none());
        assert!(reselected.error().is_none());

        let (workspace, ticket) = reselected.begin_transform();
        let generation = ticket.expect("ticket").generation;
        let failed = workspace.resolve(generation, Err(TransformError::NoResponse));
        assert!(failed.error().is_some());
        let reselected = failed.select_source(sample_source("c.png"));
        assert_eq!(reselected.phase(), Phase::Ready);
        assert!(reselected.result().is_none());
        assert!(reselected.error().is_none());
    }

    #[test]
    fn selecting_source_mid_flight_discards_pending_outcome() {
        let (workspace, ticket) = Workspace::default()
            .select_source(sample_source("a.png"))
            .begin_transform();
        let generation = ticket.expect("ticket").generation;
        let workspace = workspace.select_source(sample_source("b.png"));
        let workspace = workspace.resolve(generation, Ok(Some(ResultImage::new(vec![1]))));
        assert_eq!(workspace.phase(), Phase::Ready);
        assert!(workspace.result().is_none());
        assert!(!workspace.is_in_flight());
    }

    #[test]
    fn retransform_from_failed_and_succeeded_goes_in_flight() {
        let (workspace, ticket) = Workspace::default()
            .select_source(sample_source("a.png"))
            .begin_transform();
        let generation = ticket.expect("ticket").generation;
        let failed = workspace.resolve(generation, Err(TransformError::NoResponse));
        let (retry, ticket) = failed.begin_transform();
        assert!(ticket.is_some());
        assert_eq!(retry.phase(), Phase::InFlight);
        assert!(retry.error().is_none());

        let generation = ticket.map(|ticket| ticket.generation).unwrap_or_default();
        let succeeded = retry.resolve(generation, Ok(Some(ResultImage::new(vec![1]))));
        let (again, ticket) = succeeded.begin_transform();
        assert!(ticket.is_some());
        assert_eq!(again.phase(), Phase::InFlight);
        assert!(again.result().is_none());
    }

    #[test]
    fn language_switch_keeps_state() {
        let workspace = Workspace::default()
            .select_source(sample_source("a.png"))
            .set_language(Language::Zh);
        assert_eq!(workspace.language(), Language::Zh);
        assert_eq!(workspace.phase(), Phase::Ready);
        assert!(workspace.source().is_some());
    }
}

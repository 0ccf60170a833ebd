use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use serde_json::json;
use tracing::{debug, error};
use trinetra_contracts::conversation::{EncodedFile, GeneratedArtifact, DEFAULT_IMAGE_MIME};
use trinetra_contracts::events::{payload, EventLog};

use crate::backend::{
    Content, ContentRequest, GenerativeBackend, ImageGenerationRequest, Modality, Part,
};
use crate::cancel::CancelToken;
use crate::config::{EngineConfig, ModelChoice};
use crate::error::{GenAiError, CHAT_FALLBACK_REPLY};
use crate::record_event;
use crate::session::{ConversationSession, SessionStore};

const SYNTHESIS_ASPECT_RATIO: &str = "1:1";

/// Front door to the generative service: chat exchanges, image synthesis and image
/// transformation. Each call performs exactly one remote request.
#[derive(Clone)]
pub struct GenAiClient {
    backend: Arc<dyn GenerativeBackend>,
    models: ModelChoice,
    events: EventLog,
}

impl GenAiClient {
    pub fn new(backend: Arc<dyn GenerativeBackend>, models: ModelChoice, events: EventLog) -> Self {
        Self {
            backend,
            models,
            events,
        }
    }

    pub fn from_config(config: &EngineConfig, events: EventLog) -> Result<Self> {
        let models = config.resolve_models()?;
        let backend = config.build_backend()?;
        debug!(
            backend = backend.name(),
            chat = %models.chat,
            synthesis = %models.synthesis,
            edit = %models.edit,
            "generative client ready"
        );
        Ok(Self::new(backend, models, events))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn models(&self) -> &ModelChoice {
        &self.models
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// A session store bound to this client's chat model and event log.
    pub fn session_store(&self) -> SessionStore {
        SessionStore::new(self.models.chat.clone(), self.events.clone())
    }

    /// Sends one user turn (text plus optional attachment) on `session` and returns the
    /// reply text. The exchange is appended to the session history only when it completes
    /// without being cancelled.
    pub fn send(
        &self,
        session: &ConversationSession,
        text: &str,
        attachment: Option<&EncodedFile>,
        cancel: &CancelToken,
    ) -> Result<String, GenAiError> {
        let started = Instant::now();
        let result = self.exchange(session, text, attachment, cancel);
        match &result {
            Ok(reply) => record_event(
                &self.events,
                "reply_received",
                payload(json!({
                    "key": session.key(),
                    "session_id": session.id(),
                    "chars": reply.chars().count(),
                    "latency_ms": started.elapsed().as_millis() as u64,
                })),
            ),
            Err(err) => self.report_failure(
                "exchange_failed",
                json!({ "key": session.key(), "session_id": session.id() }),
                err,
            ),
        }
        result
    }

    /// `send` for callers that only display text: any failure becomes the fixed fallback
    /// reply.
    pub fn send_or_fallback(
        &self,
        session: &ConversationSession,
        text: &str,
        attachment: Option<&EncodedFile>,
    ) -> String {
        self.send(session, text, attachment, &CancelToken::new())
            .unwrap_or_else(|_| CHAT_FALLBACK_REPLY.to_string())
    }

    /// Synthesizes a single square PNG from `prompt`.
    pub fn synthesize(
        &self,
        prompt: &str,
        cancel: &CancelToken,
    ) -> Result<GeneratedArtifact, GenAiError> {
        let result = self.synthesize_inner(prompt, cancel);
        self.report_image("image_generated", &self.models.synthesis, prompt, &result);
        result
    }

    /// `synthesize` rendered as a data URI; any failure yields an empty string.
    pub fn synthesize_or_empty(&self, prompt: &str) -> String {
        self.synthesize(prompt, &CancelToken::new())
            .map(|artifact| artifact.data_uri())
            .unwrap_or_default()
    }

    /// Applies `instruction` to `source`, returning the first image the model produced.
    pub fn transform(
        &self,
        instruction: &str,
        source: &EncodedFile,
        cancel: &CancelToken,
    ) -> Result<GeneratedArtifact, GenAiError> {
        let result = self.transform_inner(instruction, source, cancel);
        self.report_image("image_edited", &self.models.edit, instruction, &result);
        result
    }

    /// `transform` rendered as a data URI; any failure or an imageless reply yields an
    /// empty string.
    pub fn transform_or_empty(&self, instruction: &str, source: &EncodedFile) -> String {
        self.transform(instruction, source, &CancelToken::new())
            .map(|artifact| artifact.data_uri())
            .unwrap_or_default()
    }

    fn exchange(
        &self,
        session: &ConversationSession,
        text: &str,
        attachment: Option<&EncodedFile>,
        cancel: &CancelToken,
    ) -> Result<String, GenAiError> {
        cancel.check()?;
        let mut parts = vec![Part::text(text)];
        if let Some(file) = attachment {
            parts.push(Part::inline(file));
        }
        let user = Content::user(parts);
        let mut contents = session.history();
        contents.push(user.clone());

        record_event(
            &self.events,
            "message_sent",
            payload(json!({
                "key": session.key(),
                "session_id": session.id(),
                "model": session.model(),
                "chars": text.chars().count(),
                "attachment": attachment.map(|file| json!({
                    "name": file.name,
                    "mime_type": file.mime_type,
                })),
            })),
        );

        let request = ContentRequest {
            model: session.model().to_string(),
            system_instruction: Some(session.system_instruction().to_string()),
            contents,
            response_modalities: Vec::new(),
        };
        let mut response = self.backend.generate_content(&request)?;
        cancel.check()?;

        let reply = match response.text() {
            Some(reply) => reply,
            None => {
                if let Some(reason) = response.block_reason.as_deref() {
                    debug!(reason, "prompt blocked");
                }
                return Err(GenAiError::NoContent);
            }
        };
        let candidate = response.candidates.swap_remove(0);
        session.record_exchange(user, Content::model(candidate.parts));
        Ok(reply)
    }

    fn synthesize_inner(
        &self,
        prompt: &str,
        cancel: &CancelToken,
    ) -> Result<GeneratedArtifact, GenAiError> {
        cancel.check()?;
        let request = ImageGenerationRequest {
            model: self.models.synthesis.clone(),
            prompt: prompt.to_string(),
            number_of_images: 1,
            output_mime_type: DEFAULT_IMAGE_MIME.to_string(),
            aspect_ratio: SYNTHESIS_ASPECT_RATIO.to_string(),
        };
        let response = self.backend.generate_images(&request)?;
        cancel.check()?;

        let image = response
            .images
            .into_iter()
            .next()
            .ok_or(GenAiError::NoContent)?;
        Ok(GeneratedArtifact::new(DEFAULT_IMAGE_MIME, image.image_bytes))
    }

    fn transform_inner(
        &self,
        instruction: &str,
        source: &EncodedFile,
        cancel: &CancelToken,
    ) -> Result<GeneratedArtifact, GenAiError> {
        cancel.check()?;
        let request = ContentRequest {
            model: self.models.edit.clone(),
            system_instruction: None,
            contents: vec![Content::user(vec![
                Part::inline(source),
                Part::text(instruction),
            ])],
            response_modalities: vec![Modality::Image],
        };
        let response = self.backend.generate_content(&request)?;
        cancel.check()?;

        let (mime_type, data) = response.first_inline_data().ok_or(GenAiError::NoContent)?;
        if !mime_type.is_empty() && mime_type != DEFAULT_IMAGE_MIME {
            debug!(mime_type, "edited image reported as PNG");
        }
        Ok(GeneratedArtifact::new(DEFAULT_IMAGE_MIME, data))
    }

    fn report_image(
        &self,
        event_type: &str,
        model: &str,
        prompt: &str,
        result: &Result<GeneratedArtifact, GenAiError>,
    ) {
        match result {
            Ok(artifact) => record_event(
                &self.events,
                event_type,
                payload(json!({
                    "model": model,
                    "prompt_chars": prompt.chars().count(),
                    "mime_type": artifact.mime_type,
                    "bytes_base64": artifact.base64.len(),
                })),
            ),
            Err(err) => self.report_failure(
                "generation_failed",
                json!({ "operation": event_type, "model": model }),
                err,
            ),
        }
    }

    fn report_failure(&self, event_type: &str, context: serde_json::Value, err: &GenAiError) {
        let mut fields = payload(context);
        if matches!(err, GenAiError::Cancelled) {
            debug!(event_type, "request cancelled");
            record_event(&self.events, "request_cancelled", fields);
            return;
        }
        error!(error = %err, kind = err.kind(), "{event_type}");
        fields.insert("error".to_string(), json!(err.to_string()));
        fields.insert("error_kind".to_string(), json!(err.kind()));
        record_event(&self.events, event_type, fields);
    }
}

use std::time::Duration;

use anyhow::Context;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::backend::{
    Content, ContentRequest, ContentResponse, GeneratedImage, GenerativeBackend,
    ImageGenerationRequest, ImageGenerationResponse,
};
use crate::error::GenAiError;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const API_KEY_HEADER: &str = "x-goog-api-key";
const ERROR_BODY_MAX_CHARS: usize = 512;

/// Gemini / Imagen REST transport.
///
/// Chat and image edits go through `models/{model}:generateContent`, image synthesis
/// through Imagen's `models/{model}:predict`.
pub struct GeminiBackend {
    api_base: String,
    api_key: String,
    http: HttpClient,
    timeout: Option<Duration>,
}

impl GeminiBackend {
    pub fn new(
        api_key: impl Into<String>,
        api_base: Option<&str>,
        timeout: Option<Duration>,
    ) -> anyhow::Result<Self> {
        let api_base = api_base
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        // Replaces the blocking client's 30s default; only `timeout` bounds a request.
        let http = HttpClient::builder()
            .timeout(None::<Duration>)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            api_base,
            api_key: api_key.into(),
            http,
            timeout,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn endpoint_for_model(&self, model: &str, method: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:{}", self.api_base, model_path, method)
    }

    fn post(&self, endpoint: &str, payload: &Value) -> Result<Value, GenAiError> {
        debug!(endpoint, "posting generative request");
        let mut request = self
            .http
            .post(endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .json(payload);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .map_err(|err| GenAiError::Network(err.without_url().to_string()))?;
        response_json_or_error(response)
    }
}

impl GenerativeBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate_content(&self, request: &ContentRequest) -> Result<ContentResponse, GenAiError> {
        let endpoint = self.endpoint_for_model(&request.model, "generateContent");
        let response_payload = self.post(&endpoint, &content_payload(request))?;
        Ok(parse_content_response(&response_payload))
    }

    fn generate_images(
        &self,
        request: &ImageGenerationRequest,
    ) -> Result<ImageGenerationResponse, GenAiError> {
        let endpoint = self.endpoint_for_model(&request.model, "predict");
        let response_payload = self.post(&endpoint, &image_payload(request))?;
        parse_predictions(&response_payload)
    }
}

pub fn content_payload(request: &ContentRequest) -> Value {
    let mut payload = Map::new();
    payload.insert(
        "contents".to_string(),
        Value::Array(request.contents.iter().map(Content::to_json).collect()),
    );
    if let Some(instruction) = request
        .system_instruction
        .as_deref()
        .filter(|value| !value.trim().is_empty())
    {
        payload.insert(
            "systemInstruction".to_string(),
            json!({ "parts": [{ "text": instruction }] }),
        );
    }
    if !request.response_modalities.is_empty() {
        payload.insert(
            "generationConfig".to_string(),
            json!({
                "responseModalities": request
                    .response_modalities
                    .iter()
                    .map(|modality| modality.as_str())
                    .collect::<Vec<&str>>(),
            }),
        );
    }
    Value::Object(payload)
}

pub fn parse_content_response(payload: &Value) -> ContentResponse {
    let candidates = payload
        .get("candidates")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .map(|candidate| {
                    candidate
                        .get("content")
                        .map(Content::from_json)
                        .unwrap_or_else(|| Content::model(Vec::new()))
                })
                .collect()
        })
        .unwrap_or_default();
    let block_reason = payload
        .get("promptFeedback")
        .and_then(|feedback| feedback.get("blockReason"))
        .and_then(Value::as_str)
        .map(str::to_string);
    ContentResponse {
        candidates,
        block_reason,
    }
}

pub fn image_payload(request: &ImageGenerationRequest) -> Value {
    json!({
        "instances": [{
            "prompt": request.prompt,
        }],
        "parameters": {
            "sampleCount": request.number_of_images.max(1),
            "aspectRatio": request.aspect_ratio,
            "outputOptions": {
                "mimeType": request.output_mime_type,
            },
        },
    })
}

pub fn parse_predictions(payload: &Value) -> Result<ImageGenerationResponse, GenAiError> {
    let Some(object) = payload.as_object() else {
        return Err(GenAiError::Malformed(
            "image response is not a JSON object".to_string(),
        ));
    };
    let predictions = object
        .get("predictions")
        .or_else(|| object.get("generatedImages"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut images = Vec::new();
    for row in predictions {
        let Some(obj) = row.as_object() else {
            continue;
        };
        if let Some(encoded) = obj
            .get("bytesBase64Encoded")
            .or_else(|| obj.get("bytes_base64_encoded"))
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
        {
            images.push(GeneratedImage {
                image_bytes: encoded.to_string(),
                mime_type: mime_from(obj),
            });
            continue;
        }

        let Some(generated) = obj
            .get("image")
            .or_else(|| obj.get("generatedImage"))
            .and_then(Value::as_object)
        else {
            continue;
        };
        if let Some(encoded) = generated
            .get("imageBytes")
            .or_else(|| generated.get("bytesBase64Encoded"))
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
        {
            images.push(GeneratedImage {
                image_bytes: encoded.to_string(),
                mime_type: mime_from(generated),
            });
        }
    }
    Ok(ImageGenerationResponse { images })
}

fn mime_from(object: &Map<String, Value>) -> Option<String> {
    object
        .get("mimeType")
        .or_else(|| object.get("mime_type"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn response_json_or_error(response: HttpResponse) -> Result<Value, GenAiError> {
    let status = response.status();
    let body = response
        .text()
        .map_err(|err| GenAiError::Network(err.without_url().to_string()))?;
    if !status.is_success() {
        return Err(GenAiError::Rejected {
            status: status.as_u16(),
            body: truncate_text(&body, ERROR_BODY_MAX_CHARS),
        });
    }
    serde_json::from_str(&body).map_err(|err| GenAiError::Malformed(err.to_string()))
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

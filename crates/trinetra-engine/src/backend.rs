use serde_json::{json, Value};
use trinetra_contracts::conversation::{EncodedFile, Role};

use crate::error::GenAiError;

/// One piece of a request or response content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    InlineData { mime_type: String, data: String },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(text.into())
    }

    pub fn inline(file: &EncodedFile) -> Self {
        Part::InlineData {
            mime_type: file.mime_type.clone(),
            data: file.base64.clone(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Part::Text(text) => json!({ "text": text }),
            Part::InlineData { mime_type, data } => json!({
                "inlineData": {
                    "mimeType": mime_type,
                    "data": data,
                }
            }),
        }
    }

    /// Parses a wire part. Parts that carry neither text nor inline data (function calls,
    /// thoughts without text) yield `None`.
    pub fn from_json(value: &Value) -> Option<Part> {
        if let Some(inline) = value
            .get("inlineData")
            .or_else(|| value.get("inline_data"))
            .and_then(Value::as_object)
        {
            let data = inline
                .get("data")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if !data.is_empty() {
                let mime_type = inline
                    .get("mimeType")
                    .or_else(|| inline.get("mime_type"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                return Some(Part::InlineData {
                    mime_type: mime_type.to_string(),
                    data: data.to_string(),
                });
            }
        }
        value
            .get("text")
            .and_then(Value::as_str)
            .map(|text| Part::Text(text.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }

    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: Role::Model,
            parts,
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "role": self.role.as_str(),
            "parts": self.parts.iter().map(Part::to_json).collect::<Vec<Value>>(),
        })
    }

    pub fn from_json(value: &Value) -> Content {
        let role = match value.get("role").and_then(Value::as_str) {
            Some("user") => Role::User,
            _ => Role::Model,
        };
        let parts = value
            .get("parts")
            .and_then(Value::as_array)
            .map(|rows| rows.iter().filter_map(Part::from_json).collect())
            .unwrap_or_default();
        Content { role, parts }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Image,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Image => "IMAGE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRequest {
    pub model: String,
    pub system_instruction: Option<String>,
    pub contents: Vec<Content>,
    pub response_modalities: Vec<Modality>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentResponse {
    pub candidates: Vec<Content>,
    pub block_reason: Option<String>,
}

impl ContentResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            candidates: vec![Content::model(vec![Part::text(text)])],
            block_reason: None,
        }
    }

    /// Concatenated text parts of the first candidate, `None` when it has no text.
    pub fn text(&self) -> Option<String> {
        let candidate = self.candidates.first()?;
        let mut out: Option<String> = None;
        for part in &candidate.parts {
            if let Part::Text(text) = part {
                out.get_or_insert_with(String::new).push_str(text);
            }
        }
        out
    }

    /// First part of the first candidate that carries inline binary data.
    pub fn first_inline_data(&self) -> Option<(&str, &str)> {
        self.candidates.first()?.parts.iter().find_map(|part| match part {
            Part::InlineData { mime_type, data } => Some((mime_type.as_str(), data.as_str())),
            Part::Text(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageGenerationRequest {
    pub model: String,
    pub prompt: String,
    pub number_of_images: u32,
    pub output_mime_type: String,
    pub aspect_ratio: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    /// Base64 encoded image bytes.
    pub image_bytes: String,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageGenerationResponse {
    pub images: Vec<GeneratedImage>,
}

/// Remote generative service. Implementations perform exactly one request per call.
pub trait GenerativeBackend: Send + Sync {
    fn name(&self) -> &str;

    fn generate_content(&self, request: &ContentRequest) -> Result<ContentResponse, GenAiError>;

    fn generate_images(
        &self,
        request: &ImageGenerationRequest,
    ) -> Result<ImageGenerationResponse, GenAiError>;
}

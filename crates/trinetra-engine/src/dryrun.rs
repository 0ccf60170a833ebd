use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};
use trinetra_contracts::conversation::{Role, DEFAULT_IMAGE_MIME};

use crate::backend::{
    Content, ContentRequest, ContentResponse, GeneratedImage, GenerativeBackend,
    ImageGenerationRequest, ImageGenerationResponse, Modality, Part,
};
use crate::error::GenAiError;

const DRYRUN_IMAGE_SIDE: u32 = 256;

/// Offline backend: echoes chat turns, paints a solid square per prompt and answers image
/// edits with the color-inverted source.
#[derive(Debug, Default, Clone)]
pub struct DryrunBackend;

impl DryrunBackend {
    fn edit_reply(&self, request: &ContentRequest) -> Result<ContentResponse, GenAiError> {
        let Some((_, data)) = last_user_content(request).and_then(|content| {
            content.parts.iter().find_map(|part| match part {
                Part::InlineData { mime_type, data } => Some((mime_type, data)),
                Part::Text(_) => None,
            })
        }) else {
            return Ok(ContentResponse::from_text("No image was provided to edit."));
        };

        let bytes = BASE64.decode(data.as_bytes()).map_err(|err| GenAiError::Rejected {
            status: 400,
            body: format!("invalid inline image data: {err}"),
        })?;
        let mut image = image::load_from_memory(&bytes).map_err(|err| GenAiError::Rejected {
            status: 400,
            body: format!("unsupported inline image: {err}"),
        })?;
        image.invert();

        Ok(ContentResponse {
            candidates: vec![Content::model(vec![
                Part::text("Here is the edited image."),
                Part::InlineData {
                    mime_type: DEFAULT_IMAGE_MIME.to_string(),
                    data: BASE64.encode(encode_png(&image)?),
                },
            ])],
            block_reason: None,
        })
    }
}

impl GenerativeBackend for DryrunBackend {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate_content(&self, request: &ContentRequest) -> Result<ContentResponse, GenAiError> {
        if request.response_modalities.contains(&Modality::Image) {
            return self.edit_reply(request);
        }

        let (text, attachments) = last_user_content(request)
            .map(|content| {
                let text = content
                    .parts
                    .iter()
                    .filter_map(|part| match part {
                        Part::Text(text) => Some(text.as_str()),
                        Part::InlineData { .. } => None,
                    })
                    .collect::<Vec<&str>>()
                    .join(" ");
                let attachments = content
                    .parts
                    .iter()
                    .filter(|part| matches!(part, Part::InlineData { .. }))
                    .count();
                (text, attachments)
            })
            .unwrap_or_default();

        let mut reply = format!("[dryrun:{}] {}", request.model, text.trim());
        if attachments > 0 {
            reply.push_str(&format!(" (+{attachments} attachment(s))"));
        }
        Ok(ContentResponse::from_text(reply))
    }

    fn generate_images(
        &self,
        request: &ImageGenerationRequest,
    ) -> Result<ImageGenerationResponse, GenAiError> {
        let mut images = Vec::new();
        for idx in 0..request.number_of_images.max(1) {
            let (r, g, b) = color_from_prompt(&request.prompt, u64::from(idx));
            let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(
                DRYRUN_IMAGE_SIDE,
                DRYRUN_IMAGE_SIDE,
                Rgb([r, g, b]),
            ));
            images.push(GeneratedImage {
                image_bytes: BASE64.encode(encode_png(&image)?),
                mime_type: Some(DEFAULT_IMAGE_MIME.to_string()),
            });
        }
        Ok(ImageGenerationResponse { images })
    }
}

fn last_user_content(request: &ContentRequest) -> Option<&Content> {
    request
        .contents
        .iter()
        .rev()
        .find(|content| content.role == Role::User)
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, GenAiError> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|err| GenAiError::Malformed(format!("png encode failed: {err}")))?;
    Ok(bytes)
}

fn color_from_prompt(prompt: &str, seed: u64) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(seed.to_be_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

#[cfg(test)]
mod tests {
    use image::GenericImageView;

    use super::*;

    fn chat_request(parts: Vec<Part>, modalities: Vec<Modality>) -> ContentRequest {
        ContentRequest {
            model: "dryrun-chat-1".to_string(),
            system_instruction: None,
            contents: vec![
                Content::user(vec![Part::text("old")]),
                Content::model(vec![Part::text("older reply")]),
                Content::user(parts),
            ],
            response_modalities: modalities,
        }
    }

    #[test]
    fn chat_echoes_latest_user_turn() {
        let reply = DryrunBackend
            .generate_content(&chat_request(vec![Part::text("hello")], Vec::new()))
            .unwrap();
        assert_eq!(reply.text().as_deref(), Some("[dryrun:dryrun-chat-1] hello"));
    }

    #[test]
    fn synthesized_image_is_deterministic_png() {
        let request = ImageGenerationRequest {
            model: "dryrun-image-1".to_string(),
            prompt: "a red cube".to_string(),
            number_of_images: 1,
            output_mime_type: "image/png".to_string(),
            aspect_ratio: "1:1".to_string(),
        };
        let first = DryrunBackend.generate_images(&request).unwrap();
        let second = DryrunBackend.generate_images(&request).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.images.len(), 1);

        let bytes = BASE64.decode(&first.images[0].image_bytes).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (DRYRUN_IMAGE_SIDE, DRYRUN_IMAGE_SIDE));
    }

    #[test]
    fn edit_inverts_source_image() {
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([10, 20, 30])));
        let data = BASE64.encode(encode_png(&source).unwrap());
        let request = chat_request(
            vec![
                Part::InlineData {
                    mime_type: "image/png".to_string(),
                    data,
                },
                Part::text("invert it"),
            ],
            vec![Modality::Image],
        );

        let reply = DryrunBackend.generate_content(&request).unwrap();
        let (mime, edited) = reply.first_inline_data().unwrap();
        assert_eq!(mime, "image/png");
        let edited = image::load_from_memory(&BASE64.decode(edited).unwrap()).unwrap();
        assert_eq!(edited.to_rgb8().get_pixel(0, 0), &Rgb([245, 235, 225]));
    }

    #[test]
    fn edit_without_image_returns_no_inline_part() {
        let request = chat_request(vec![Part::text("edit what?")], vec![Modality::Image]);
        let reply = DryrunBackend.generate_content(&request).unwrap();
        assert!(reply.first_inline_data().is_none());
    }
}

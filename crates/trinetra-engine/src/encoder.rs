use std::fs;
use std::path::Path;

use trinetra_contracts::conversation::EncodedFile;

use crate::error::EncodeError;

pub const FALLBACK_MIME: &str = "application/octet-stream";

/// Reads the whole file at `path` and base64 encodes it.
///
/// The media type is inferred from the extension; the name is the final path component.
pub fn encode_file(path: &Path) -> Result<EncodedFile, EncodeError> {
    let mime = mime_for_path(path).unwrap_or(FALLBACK_MIME);
    encode_file_as(path, mime)
}

/// Like [`encode_file`] with an explicitly declared media type.
pub fn encode_file_as(path: &Path, mime_type: &str) -> Result<EncodedFile, EncodeError> {
    if path.is_dir() {
        return Err(EncodeError::NotAFile {
            path: path.to_path_buf(),
        });
    }
    let bytes = fs::read(path).map_err(|source| EncodeError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .file_name()
        .map(|value| value.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());
    Ok(encode_bytes(&bytes, mime_type, &name))
}

pub fn encode_bytes(bytes: &[u8], mime_type: &str, name: &str) -> EncodedFile {
    EncodedFile::from_bytes(bytes, mime_type, name)
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        "pdf" => Some("application/pdf"),
        "txt" => Some("text/plain"),
        "md" => Some("text/markdown"),
        "csv" => Some("text/csv"),
        "html" | "htm" => Some("text/html"),
        "json" => Some("application/json"),
        "mp3" => Some("audio/mpeg"),
        "wav" => Some("audio/wav"),
        "mp4" => Some("video/mp4"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_file_round_trips_bytes_type_and_name() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("photo.PNG");
        let bytes: Vec<u8> = (0u8..=255).collect();
        fs::write(&path, &bytes)?;

        let encoded = encode_file(&path)?;
        assert_eq!(encoded.mime_type, "image/png");
        assert_eq!(encoded.name, "photo.PNG");
        assert_eq!(encoded.decode()?, bytes);
        Ok(())
    }

    #[test]
    fn declared_type_is_kept_verbatim() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("notes");
        fs::write(&path, b"plain words")?;

        let inferred = encode_file(&path)?;
        assert_eq!(inferred.mime_type, FALLBACK_MIME);

        let declared = encode_file_as(&path, "text/x-custom")?;
        assert_eq!(declared.mime_type, "text/x-custom");
        assert_eq!(declared.name, "notes");
        assert_eq!(declared.base64, "cGxhaW4gd29yZHM=");
        Ok(())
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = encode_file(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, EncodeError::Read { .. }));
        assert!(err.to_string().contains("/definitely/not/here.png"));
    }

    #[test]
    fn directory_is_rejected() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let err = encode_file(temp.path()).unwrap_err();
        assert!(matches!(err, EncodeError::NotAFile { .. }));
        Ok(())
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use trinetra_contracts::conversation::GeneratedArtifact;

/// Writes `artifact` under `dir` as `artifact-<millis>-<digest>.<ext>` and returns the path.
pub fn write_artifact(dir: &Path, artifact: &GeneratedArtifact) -> Result<PathBuf> {
    let bytes = artifact
        .decode()
        .context("artifact payload is not valid base64")?;
    fs::create_dir_all(dir).with_context(|| format!("failed creating {}", dir.display()))?;
    let stamp = chrono::Utc::now().timestamp_millis();
    let digest = hex::encode(&Sha256::digest(&bytes)[..4]);
    let path = dir.join(format!(
        "artifact-{}-{}.{}",
        stamp,
        digest,
        artifact.extension()
    ));
    write_bytes(&path, &bytes)?;
    Ok(path)
}

/// Writes `artifact` to an explicit destination, creating parent directories.
pub fn write_artifact_to(path: &Path, artifact: &GeneratedArtifact) -> Result<()> {
    let bytes = artifact
        .decode()
        .context("artifact payload is not valid base64")?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating {}", parent.display()))?;
    }
    write_bytes(path, &bytes)
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("failed writing {}", path.display()))
}

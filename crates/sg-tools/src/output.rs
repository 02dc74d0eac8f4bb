//! Shared output helpers for the speech tools

use std::path::{Path, PathBuf};

use serde::Serialize;
use sg_core::{AudioArtifact, CandidateFailure, JobError};
use tokio::fs;

/// First 8 hex digits of a random UUID
pub fn short_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// `tts_<8 hex>.<ext>` in `dir`
pub fn single_file_name(dir: &Path, audio: &AudioArtifact) -> PathBuf {
    dir.join(format!("tts_{}.{}", short_id(), audio.format.extension()))
}

/// `batch_tts_<NNN>_<8 hex>.<ext>` in `dir`, numbered from 1
pub fn batch_file_name(dir: &Path, index: usize, audio: &AudioArtifact) -> PathBuf {
    dir.join(format!(
        "batch_tts_{:03}_{}.{}",
        index + 1,
        short_id(),
        audio.format.extension()
    ))
}

/// Write audio, creating parent directories as needed
pub async fn write_audio(path: &Path, audio: &AudioArtifact) -> std::io::Result<u64> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    fs::write(path, &audio.data[..]).await?;
    Ok(audio.len() as u64)
}

/// Failure body shared by every tool
#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub status: &'static str,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<CandidateFailure>,
}

impl From<&JobError> for ErrorOutput {
    fn from(err: &JobError) -> Self {
        Self {
            status: "error",
            code: err.code(),
            message: err.to_string(),
            failures: err.failures().to_vec(),
        }
    }
}

pub fn to_json<T: Serialize + std::fmt::Debug>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| format!("{:?}", value))
}

//! Batch text-to-speech tool

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sg_core::{Result, SpeechContext, Tool, ToolResult};

use crate::output::{self, to_json, ErrorOutput};
use crate::synthesize::{self, default_auto, default_speed, SynthesisOptions, SynthesisOutput};

/// Convert several texts to audio files with bounded concurrency
pub struct BatchSynthesizeTool {
    context: Arc<SpeechContext>,
    output_dir: PathBuf,
}

impl BatchSynthesizeTool {
    pub fn new(context: Arc<SpeechContext>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            context,
            output_dir: output_dir.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BatchInput {
    texts: Vec<String>,
    #[serde(default = "default_auto")]
    engine: String,
    #[serde(default = "default_auto")]
    language: String,
    #[serde(default)]
    voice: Option<String>,
    #[serde(default = "default_speed")]
    speed: u32,
    #[serde(default)]
    output_dir: Option<String>,
    #[serde(default)]
    max_concurrency: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ItemOutput {
    Saved(SynthesisOutput),
    Failed {
        #[serde(flatten)]
        error: ErrorOutput,
        text: String,
    },
}

#[derive(Debug, Serialize)]
struct BatchOutput {
    status: &'static str,
    total_files: usize,
    succeeded: usize,
    failed: usize,
    output_directory: PathBuf,
    results: Vec<ItemOutput>,
}

#[async_trait]
impl Tool for BatchSynthesizeTool {
    fn name(&self) -> &str {
        "batch_synthesize"
    }

    fn description(&self) -> &str {
        "Convert multiple texts to speech files in one call. Results are returned in input order; one failing text does not affect the others."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "texts": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Texts to convert"
                },
                "engine": {
                    "type": "string",
                    "description": "Engine to use or auto",
                    "default": "auto"
                },
                "language": {
                    "type": "string",
                    "description": "Language code or name (default: auto)",
                    "default": "auto"
                },
                "voice": {
                    "type": "string",
                    "description": "Voice id or name (optional)"
                },
                "speed": {
                    "type": "integer",
                    "description": "Speech speed in words per minute",
                    "default": 150
                },
                "output_dir": {
                    "type": "string",
                    "description": "Output directory (optional)"
                },
                "max_concurrency": {
                    "type": "integer",
                    "description": "Maximum jobs in flight (optional)",
                    "minimum": 1
                }
            },
            "required": ["texts"]
        })
    }

    async fn execute(&self, input: Value) -> Result<ToolResult> {
        let input: BatchInput = serde_json::from_value(input)
            .map_err(|e| sg_core::Error::ToolExecution(format!("Invalid input: {}", e)))?;
        if input.texts.is_empty() {
            return Err(sg_core::Error::ToolExecution("At least one text is required".to_string()));
        }

        let output_dir = input
            .output_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.output_dir.clone());
        let options = SynthesisOptions {
            engine: &input.engine,
            language: &input.language,
            voice: input.voice.as_deref(),
            speed: input.speed,
            offline_only: false,
            online_only: false,
        };
        let jobs = input.texts.iter().map(|text| options.job(text)).collect();

        tracing::debug!(texts = input.texts.len(), dir = %output_dir.display(), "Running batch synthesis");

        let results = self.context.run_batch(jobs, input.max_concurrency).await;

        let mut items = Vec::with_capacity(results.len());
        for (index, (result, text)) in results.into_iter().zip(&input.texts).enumerate() {
            let failed = |error: &sg_core::JobError| ItemOutput::Failed {
                error: ErrorOutput::from(error),
                text: text.clone(),
            };
            let item = match result.outcome {
                Ok(success) => match synthesize::audio_of(&success).cloned() {
                    Ok(audio) => {
                        let path = output::batch_file_name(&output_dir, index, &audio);
                        match synthesize::save(success, text, input.speed, &path, &audio).await {
                            Ok(saved) => ItemOutput::Saved(saved),
                            Err(e) => failed(&sg_core::JobError::Internal(format!(
                                "failed to write {}: {}",
                                path.display(),
                                e
                            ))),
                        }
                    }
                    Err(e) => failed(&e),
                },
                Err(e) => failed(&e),
            };
            items.push(item);
        }

        let succeeded = items.iter().filter(|i| matches!(i, ItemOutput::Saved(_))).count();
        let output = BatchOutput {
            status: "completed",
            total_files: items.len(),
            succeeded,
            failed: items.len() - succeeded,
            output_directory: output_dir,
            results: items,
        };
        tracing::info!(succeeded, failed = output.failed, "Batch synthesis finished");
        Ok(ToolResult::success(to_json(&output)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FakeBackend};

    #[tokio::test]
    async fn test_batch_keeps_order_and_numbers_files() {
        let dir = tempfile::tempdir().unwrap();
        let context = testing::context(vec![FakeBackend::new(testing::espeak())]).await;
        let tool = BatchSynthesizeTool::new(context, dir.path());

        let result = tool
            .execute(json!({"texts": ["one", "two", "three"], "language": "en"}))
            .await
            .unwrap();
        assert!(!result.is_error);

        let out: Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(out["total_files"], 3);
        assert_eq!(out["succeeded"], 3);
        for (i, text) in ["one", "two", "three"].iter().enumerate() {
            let item = &out["results"][i];
            assert_eq!(item["text"], *text);
            let file = item["output_file"].as_str().unwrap();
            assert!(file.contains(&format!("batch_tts_{:03}_", i + 1)));
            assert_eq!(std::fs::read(file).unwrap(), format!("espeak:en:{}", text).into_bytes());
        }
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let context = testing::context(vec![FakeBackend::new(testing::espeak())]).await;
        let tool = BatchSynthesizeTool::new(context, dir.path());

        let result = tool
            .execute(json!({"texts": ["fine", "   ", "also fine"], "language": "en"}))
            .await
            .unwrap();
        let out: Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(out["succeeded"], 2);
        assert_eq!(out["failed"], 1);
        assert_eq!(out["results"][1]["code"], "invalid_request");
        assert_eq!(out["results"][2]["status"], "success");
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let context = testing::context(vec![FakeBackend::new(testing::espeak())]).await;
        let tool = BatchSynthesizeTool::new(context, dir.path());
        assert!(tool.execute(json!({"texts": []})).await.is_err());
    }
}

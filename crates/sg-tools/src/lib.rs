//! sg-tools: Speech tools for speech-gateway
//!
//! Tool-call operations over a [`SpeechContext`]: engine listing, voice
//! listing, service limits, single and batch synthesis, and transcription. Results are JSON
//! text so any protocol listener can relay them unchanged.

use std::path::PathBuf;
use std::sync::Arc;

use sg_core::{SpeechContext, ToolManager};

pub mod batch;
pub mod engines;
pub(crate) mod output;
pub mod synthesize;
pub mod transcribe;

#[cfg(test)]
mod testing;

pub use batch::BatchSynthesizeTool;
pub use engines::{GetAvailableEnginesTool, GetServiceLimitsTool, ListVoicesTool};
pub use synthesize::SynthesizeSpeechTool;
pub use transcribe::TranscribeAudioTool;

/// Register every speech tool with the tool manager
pub fn register_speech_tools(manager: &mut ToolManager, context: Arc<SpeechContext>, output_dir: impl Into<PathBuf>) {
    let output_dir = output_dir.into();
    manager.register(Arc::new(GetAvailableEnginesTool::new(context.clone())));
    manager.register(Arc::new(ListVoicesTool::new(context.clone())));
    manager.register(Arc::new(GetServiceLimitsTool::new(context.clone())));
    manager.register(Arc::new(SynthesizeSpeechTool::new(context.clone(), output_dir.clone())));
    manager.register(Arc::new(BatchSynthesizeTool::new(context.clone(), output_dir)));
    manager.register(Arc::new(TranscribeAudioTool::new(context)));
}

//! sg-engines: Speech engine adapters for speech-gateway
//!
//! Concrete [`SpeechBackend`](sg_core::SpeechBackend) implementations and the
//! [`EngineDiscovery`] capability source that registers them.
//!
//! ## Engines
//!
//! - **espeak**: offline, `espeak`/`espeak-ng --stdout` (WAV)
//! - **say**: offline, macOS system voices (AIFF)
//! - **gtts**: online, Google Translate TTS (MP3, 100-character chunks)
//! - **azure**: online, Azure Speech REST with SSML (MP3)
//! - **openai**: online, OpenAI speech and Whisper transcription (MP3)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sg_core::{Config, SpeechContext};
//! use sg_engines::EngineDiscovery;
//!
//! let config = Config::load()?;
//! let source = Arc::new(EngineDiscovery::from_config(&config)?);
//! let context = SpeechContext::initialize(&config, source).await?;
//! ```

pub mod azure;
pub mod discovery;
pub mod error;
pub mod espeak;
pub mod gtts;
mod http;
pub mod openai;
mod process;
pub mod say;

pub use azure::AzureBackend;
pub use discovery::EngineDiscovery;
pub use error::{EngineError, Result};
pub use espeak::EspeakBackend;
pub use gtts::GttsBackend;
pub use openai::{OpenAiBackend, OpenAiVoice};
pub use say::SayBackend;

//! Shared HTTP plumbing for the cloud engines

use std::time::Duration;

use reqwest::{Client, Response};

use crate::error::{EngineError, Result};

/// Build the client shared by every cloud adapter
///
/// Per-attempt deadlines are enforced by the executor; this timeout only
/// bounds a hung connection.
pub fn client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .user_agent(concat!("speech-gateway/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| EngineError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Turn a non-2xx response into [`EngineError::Api`]
pub async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
    Err(EngineError::Api {
        status: status.as_u16(),
        body,
    })
}

/// Read a successful response body as audio bytes
pub async fn audio_bytes(response: Response) -> Result<Vec<u8>> {
    let bytes = check_status(response).await?.bytes().await?;
    if bytes.is_empty() {
        return Err(EngineError::InvalidFormat("empty audio response".to_string()));
    }
    Ok(bytes.to_vec())
}

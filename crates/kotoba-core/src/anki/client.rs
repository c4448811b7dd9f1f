//! AnkiConnect Client
//!
//! JSON request/response protocol (version 6) over local HTTP. The client
//! only talks to a local endpoint and gives up after five seconds; retries
//! are the caller's responsibility.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::Note;

/// Default AnkiConnect endpoint
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8765";

/// Protocol version this client speaks
pub const PROTOCOL_VERSION: u32 = 6;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// AnkiConnect error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum AnkiError {
    /// Transport-level failure (connection refused, timeout, bad JSON)
    #[error("AnkiConnect request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The protocol-level `error` field was non-null
    #[error("AnkiConnect error: {0}")]
    Api(String),
    /// A successful response carried no result
    #[error("AnkiConnect response missing result")]
    MissingResult,
}

#[derive(Debug, Serialize)]
struct AnkiRequest<'a, P> {
    action: &'a str,
    version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<P>,
}

#[derive(Debug, Deserialize)]
struct AnkiResponse<T> {
    result: Option<T>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct AddNoteParams<'a> {
    note: &'a Note,
}

#[derive(Debug, Serialize)]
struct ModelFieldNamesParams<'a> {
    #[serde(rename = "modelName")]
    model_name: &'a str,
}

/// Client for a local AnkiConnect instance
pub struct AnkiClient {
    http: reqwest::Client,
    endpoint: String,
}

impl AnkiClient {
    /// Client against the default local endpoint
    pub fn new() -> Result<Self, AnkiError> {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    /// Client against an explicit endpoint
    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self, AnkiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    async fn invoke<P, T>(&self, action: &str, params: Option<P>) -> Result<T, AnkiError>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let request = AnkiRequest {
            action,
            version: PROTOCOL_VERSION,
            params,
        };
        let response: AnkiResponse<T> = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .json()
            .await?;
        if let Some(error) = response.error {
            return Err(AnkiError::Api(error));
        }
        response.result.ok_or(AnkiError::MissingResult)
    }

    /// Protocol version of the running AnkiConnect instance
    pub async fn version(&self) -> Result<u32, AnkiError> {
        self.invoke::<(), u32>("version", None).await
    }

    /// Connectivity probe: true when AnkiConnect answers the version
    /// action
    pub async fn is_available(&self) -> bool {
        self.version().await.is_ok()
    }

    /// Names of every deck
    pub async fn deck_names(&self) -> Result<Vec<String>, AnkiError> {
        self.invoke::<(), Vec<String>>("deckNames", None).await
    }

    /// Names of every note model
    pub async fn model_names(&self) -> Result<Vec<String>, AnkiError> {
        self.invoke::<(), Vec<String>>("modelNames", None).await
    }

    /// Field names of one note model
    pub async fn model_field_names(&self, model: &str) -> Result<Vec<String>, AnkiError> {
        self.invoke("modelFieldNames", Some(ModelFieldNamesParams { model_name: model }))
            .await
    }

    /// Create one note; returns the new note id
    pub async fn add_note(&self, note: &Note) -> Result<i64, AnkiError> {
        self.invoke("addNote", Some(AddNoteParams { note })).await
    }
}

//! Blocking HTTP client for the CoreNLP-style annotation service.
//!
//! The service contract: request = plain text plus annotator properties
//! (mapping file reference and background-tag suppression list); response =
//! a JSON structure with a list of sentences, each with a list of tokens,
//! each token exposing its original text, its trailing separator, and an
//! entity tag. Anything else is a protocol violation.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::ServiceConfig;
use crate::sanitize;

/// Errors for a single annotation request.
///
/// These never escape the annotation layer: the chunking driver maps every
/// variant to an empty result for the affected chunk.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The service could not be reached or the request timed out.
    #[error("can't reach annotation service at {url}: {source}")]
    Transport {
        url: String,
        source: reqwest::Error,
    },

    /// The service answered, but not with the expected response shape.
    #[error("malformed annotation response: {reason}")]
    Malformed { reason: String },
}

/// Strict schema for the service response.
///
/// `sentences` is required; a response without it fails to decode and is
/// treated as malformed rather than silently tolerated.
#[derive(Debug, Clone, Deserialize)]
pub struct NlpResponse {
    /// Sentences in input order.
    pub sentences: Vec<Sentence>,
}

/// One sentence of annotated tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct Sentence {
    /// Tokens in input order.
    #[serde(default)]
    pub tokens: Vec<NlpToken>,
}

/// One annotated token.
#[derive(Debug, Clone, Deserialize)]
pub struct NlpToken {
    /// The token text exactly as it appeared in the input.
    #[serde(rename = "originalText")]
    pub original_text: Option<String>,
    /// Normalized word form; fallback when `originalText` is absent.
    pub word: Option<String>,
    /// The entity tag ("O" is the service's sentinel for "no tag").
    pub ner: String,
    /// The separator text that followed the token in the input.
    pub after: String,
}

impl NlpToken {
    /// The token's source text, preferring `originalText` over `word`.
    pub fn text(&self) -> &str {
        self.original_text
            .as_deref()
            .or(self.word.as_deref())
            .unwrap_or("")
    }
}

/// Seam between the chunking driver and the wire client, so tests can stub
/// the service.
pub trait NerBackend {
    /// Annotate one chunk of text.
    fn annotate(&self, text: &str) -> Result<NlpResponse, ClientError>;
}

/// Synchronous client for one CoreNLP server.
pub struct CoreNlpClient {
    http: reqwest::blocking::Client,
    url: String,
    properties: String,
}

impl CoreNlpClient {
    /// Build a client from service configuration.
    ///
    /// The annotator properties are composed once here; per-request state is
    /// just the text body.
    pub fn new(cfg: &ServiceConfig) -> Result<Self, ClientError> {
        let mut properties = serde_json::json!({
            "annotators": "tokenize, ssplit, pos, ner, regexner",
            "ner.useSUTime": "false",
            "ner.applyNumericClassifiers": "false",
            "outputFormat": "json",
        });
        if !cfg.mapping_file.is_empty() {
            properties["regexner.mapping"] = cfg.mapping_file.clone().into();
        }
        if !cfg.builtin_tags.is_empty() {
            properties["regexner.backgroundSymbol"] = cfg.builtin_tags.join(",").into();
        }

        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|source| ClientError::Transport {
                url: cfg.url.clone(),
                source,
            })?;

        Ok(Self {
            http,
            url: cfg.url.clone(),
            properties: properties.to_string(),
        })
    }

    /// The configured service URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl NerBackend for CoreNlpClient {
    fn annotate(&self, text: &str) -> Result<NlpResponse, ClientError> {
        let response = self
            .http
            .post(&self.url)
            .query(&[("properties", self.properties.as_str())])
            .body(text.to_string())
            .send()
            .map_err(|source| ClientError::Transport {
                url: self.url.clone(),
                source,
            })?;

        let status = response.status();
        let body = response.text().map_err(|source| ClientError::Transport {
            url: self.url.clone(),
            source,
        })?;

        if !status.is_success() {
            debug!(response = %sanitize::encode_snippet(&body), "Service response body");
            return Err(ClientError::Malformed {
                reason: format!("HTTP {status}"),
            });
        }

        decode_response(&body)
    }
}

/// Decode a response body under the strict schema.
///
/// The service occasionally emits raw control characters inside JSON
/// strings, which strict JSON forbids; one cleanup pass replacing them
/// with spaces is attempted before giving up.
fn decode_response(body: &str) -> Result<NlpResponse, ClientError> {
    match serde_json::from_str::<NlpResponse>(body) {
        Ok(parsed) => Ok(parsed),
        Err(first_err) => {
            let cleaned: String = body
                .chars()
                .map(|c| if (c as u32) < 0x20 { ' ' } else { c })
                .collect();
            serde_json::from_str::<NlpResponse>(&cleaned).map_err(|_| {
                debug!(response = %sanitize::encode_snippet(body), "Service response body");
                ClientError::Malformed {
                    reason: first_err.to_string(),
                }
            })
        }
    }
}

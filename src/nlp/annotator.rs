//! Chunking driver that turns arbitrary-length text into annotation triples.
//!
//! The outer layer splits oversized input into consecutive whitespace-
//! preserving chunks and calls the inner single-chunk path once per chunk,
//! strictly in order: later chunks' group numbering and whitespace
//! reattachment depend on the concatenation order of earlier results.
//!
//! Failures are absorbed here. A chunk whose request fails (after at most
//! one bounded retry) degrades to a single untagged triple carrying the
//! chunk's full text, so the lossless-reconstruction invariant holds even
//! when the service is down.

use tracing::{error, info, warn};

use crate::config::ServiceConfig;
use crate::markup::Triple;
use crate::nlp::client::NerBackend;

/// Tokenizes and NER-tags text through a [`NerBackend`].
pub struct Annotator<B> {
    backend: B,
    chunk_size: usize,
    retry: bool,
    background_tags: Vec<String>,
    builtin_tags: Vec<String>,
    builtin_authority: String,
}

impl<B: NerBackend> Annotator<B> {
    /// Build an annotator over `backend` using the service configuration.
    pub fn new(backend: B, cfg: &ServiceConfig) -> Self {
        Self {
            backend,
            chunk_size: cfg.chunk_size.max(1),
            retry: cfg.retry,
            background_tags: cfg.background_tags.clone(),
            builtin_tags: cfg.builtin_tags.clone(),
            builtin_authority: cfg.builtin_authority.clone(),
        }
    }

    /// Annotate `text`, chunking it when it exceeds the configured size.
    ///
    /// Concatenating every returned triple's token and tail reproduces
    /// `text` exactly.
    pub fn annotate(&self, text: &str) -> Vec<Triple> {
        if text.is_empty() {
            warn!("Asked to annotate empty text; returning no triples");
            return Vec::new();
        }

        let chunks = split_chunks(text, self.chunk_size);
        let total_chunks = chunks.len();
        if total_chunks > 1 {
            info!(
                chunk_size = self.chunk_size,
                total_chunks, "Text exceeds chunk size; splitting"
            );
        }

        let mut triples = Vec::new();
        for (index, chunk) in chunks.into_iter().enumerate() {
            if total_chunks > 1 {
                info!("Annotating chunk {} of {}", index + 1, total_chunks);
            }

            let mut chunk_triples = self.annotate_chunk(chunk);
            if chunk_triples.is_empty() && self.retry {
                warn!("Chunk produced no tokens; making one more attempt");
                chunk_triples = self.annotate_chunk(chunk);
            }

            if chunk_triples.is_empty() {
                warn!("Chunk still empty; preserving its text untagged");
                triples.push(Triple::new("", "", chunk));
                continue;
            }

            // The service silently discards whitespace around the outermost
            // tokens of a request; reattach it here.
            let (leading, trailing) = outer_space(chunk);
            if !leading.is_empty() {
                triples.push(Triple::new("", "", leading));
            }
            triples.append(&mut chunk_triples);
            if !trailing.is_empty() {
                triples.push(Triple::new("", "", trailing));
            }
        }

        triples
    }

    /// Annotate a single chunk. Every failure collapses to an empty list.
    fn annotate_chunk(&self, chunk: &str) -> Vec<Triple> {
        let response = match self.backend.annotate(chunk) {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Annotation request failed");
                return Vec::new();
            }
        };

        // The service answers a whitespace-only request with no sentences
        // at all; keep the text rather than losing it.
        if response.sentences.is_empty() && chunk.trim().is_empty() {
            return vec![Triple::new("", "", chunk)];
        }

        let mut triples = Vec::new();
        for sentence in &response.sentences {
            for token in &sentence.tokens {
                triples.push(Triple::new(
                    token.text(),
                    &self.normalize_tag(&token.ner),
                    &token.after,
                ));
            }
        }
        triples
    }

    /// Normalize a raw service tag.
    ///
    /// Background classes become the empty tag; builtin tags gain the
    /// service's authority domain so they read as composite tags downstream.
    fn normalize_tag(&self, tag: &str) -> String {
        if self.background_tags.iter().any(|t| t == tag) {
            return String::new();
        }
        if self.builtin_tags.iter().any(|t| t == tag) {
            return format!("::{}::{}", self.builtin_authority, tag);
        }
        tag.to_string()
    }
}

/// Split `text` into consecutive, non-overlapping chunks of at most `width`
/// characters, preferring to break after whitespace. No character is ever
/// dropped: the chunks concatenate back to `text`.
fn split_chunks(text: &str, width: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;

    loop {
        // Find the byte index just past `width` characters, tracking the
        // last whitespace boundary inside the window.
        let mut over_limit = None;
        let mut last_ws_end = None;
        let mut count = 0usize;
        for (i, c) in rest.char_indices() {
            if count == width {
                over_limit = Some(i);
                break;
            }
            count += 1;
            if c.is_whitespace() {
                last_ws_end = Some(i + c.len_utf8());
            }
        }

        match over_limit {
            None => {
                if !rest.is_empty() {
                    chunks.push(rest);
                }
                return chunks;
            }
            Some(limit) => {
                let cut = last_ws_end.filter(|&w| w <= limit).unwrap_or(limit);
                chunks.push(&rest[..cut]);
                rest = &rest[cut..];
            }
        }
    }
}

/// Return the leading and trailing whitespace of `text`.
///
/// Both are empty when `text` is entirely whitespace; that case is handled
/// by the whitespace-only response path instead.
fn outer_space(text: &str) -> (&str, &str) {
    let lead_len = text.len() - text.trim_start().len();
    let trail_len = text.len() - text.trim_end().len();

    let leading = if lead_len > 0 && lead_len < text.len() {
        &text[..lead_len]
    } else {
        ""
    };
    let trailing = if trail_len > 0 && trail_len < text.len() {
        &text[text.len() - trail_len..]
    } else {
        ""
    };
    (leading, trailing)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::nlp::client::{ClientError, NerBackend, NlpResponse, NlpToken, Sentence};

    /// Scripted backend: splits on whitespace like a real tokenizer and can
    /// fail on chosen calls.
    struct FakeBackend {
        calls: RefCell<Vec<String>>,
        fail_on_calls: Vec<usize>,
        tag_for: fn(&str) -> String,
    }

    impl FakeBackend {
        fn new() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                fail_on_calls: Vec::new(),
                tag_for: |_| "O".to_string(),
            }
        }

        fn failing_on(mut self, calls: &[usize]) -> Self {
            self.fail_on_calls = calls.to_vec();
            self
        }

        fn tagging(mut self, tag_for: fn(&str) -> String) -> Self {
            self.tag_for = tag_for;
            self
        }

        fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    impl NerBackend for &FakeBackend {
        fn annotate(&self, text: &str) -> Result<NlpResponse, ClientError> {
            let call_index = {
                let mut calls = self.calls.borrow_mut();
                calls.push(text.to_string());
                calls.len()
            };
            if self.fail_on_calls.contains(&call_index) {
                return Err(ClientError::Malformed {
                    reason: "scripted failure".into(),
                });
            }

            // Whitespace-only input: no sentences, like the real service.
            if text.trim().is_empty() {
                return Ok(NlpResponse { sentences: vec![] });
            }

            // Tokenize on whitespace, keeping each token's trailing run of
            // whitespace as its "after" text. Leading whitespace is
            // discarded, as the real service does.
            let mut tokens = Vec::new();
            let trimmed = text.trim_start();
            let mut token = String::new();
            let mut after = String::new();
            for c in trimmed.chars() {
                if c.is_whitespace() {
                    after.push(c);
                } else {
                    if !after.is_empty() {
                        tokens.push((std::mem::take(&mut token), std::mem::take(&mut after)));
                    }
                    token.push(c);
                }
            }
            if !token.is_empty() || !after.is_empty() {
                tokens.push((token, after));
            }
            // Trailing whitespace is "outer space": the service drops it.
            if let Some(last) = tokens.last_mut() {
                last.1 = String::new();
            }

            let tokens = tokens
                .into_iter()
                .map(|(word, after)| NlpToken {
                    original_text: Some(word.clone()),
                    word: Some(word.clone()),
                    ner: (self.tag_for)(&word),
                    after,
                })
                .collect();
            Ok(NlpResponse {
                sentences: vec![Sentence { tokens }],
            })
        }
    }

    fn service_config(chunk_size: usize, retry: bool) -> crate::config::ServiceConfig {
        crate::config::ServiceConfig {
            chunk_size,
            retry,
            ..Default::default()
        }
    }

    fn reconstruct(triples: &[Triple]) -> String {
        triples
            .iter()
            .map(|t| format!("{}{}", t.token, t.tail))
            .collect()
    }

    #[test]
    fn test_lossless_reconstruction_short_input() {
        let backend = FakeBackend::new();
        let annotator = Annotator::new(&backend, &service_config(100, false));
        let text = "  Jane Doe\nhello  ";
        assert_eq!(reconstruct(&annotator.annotate(text)), text);
        assert_eq!(backend.call_count(), 1);
    }

    #[test]
    fn test_lossless_reconstruction_long_input() {
        let backend = FakeBackend::new();
        let annotator = Annotator::new(&backend, &service_config(10, false));
        let text = "the quick brown fox jumps over the lazy dog again and again";
        assert_eq!(reconstruct(&annotator.annotate(text)), text);
        assert!(backend.call_count() >= 2);
    }

    #[test]
    fn test_chunk_size_boundary_exact() {
        let backend = FakeBackend::new();
        let annotator = Annotator::new(&backend, &service_config(16, false));
        let text = "abcd efgh ijklmn";
        assert_eq!(text.chars().count(), 16);
        let triples = annotator.annotate(text);
        assert_eq!(backend.call_count(), 1);
        assert_eq!(reconstruct(&triples), text);
    }

    #[test]
    fn test_chunk_size_boundary_plus_one() {
        let backend = FakeBackend::new();
        let annotator = Annotator::new(&backend, &service_config(16, false));
        let text = "abcd efgh ijklmno";
        assert_eq!(text.chars().count(), 17);
        let triples = annotator.annotate(text);
        assert!(backend.call_count() >= 2);
        assert_eq!(reconstruct(&triples), text);
    }

    #[test]
    fn test_failed_chunk_preserves_text_untagged() {
        let backend = FakeBackend::new().failing_on(&[1]);
        let annotator = Annotator::new(&backend, &service_config(10, false));
        let text = "first part second part";
        let triples = annotator.annotate(text);
        assert_eq!(reconstruct(&triples), text);
        // The failed chunk degraded to a single untagged placeholder.
        assert!(triples.iter().any(|t| t.token.is_empty() && !t.tail.is_empty()));
    }

    #[test]
    fn test_retry_recovers_glitched_chunk() {
        let backend = FakeBackend::new().failing_on(&[1]);
        let annotator = Annotator::new(&backend, &service_config(1000, true));
        let triples = annotator.annotate("hello world");
        assert_eq!(backend.call_count(), 2);
        assert_eq!(reconstruct(&triples), "hello world");
        assert!(triples.iter().all(|t| !t.token.is_empty()));
    }

    #[test]
    fn test_whitespace_only_input_kept() {
        let backend = FakeBackend::new();
        let annotator = Annotator::new(&backend, &service_config(1000, false));
        let triples = annotator.annotate(" \n\t ");
        assert_eq!(triples, vec![Triple::new("", "", " \n\t ")]);
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        let backend = FakeBackend::new();
        let annotator = Annotator::new(&backend, &service_config(1000, false));
        assert!(annotator.annotate("").is_empty());
        assert_eq!(backend.call_count(), 0);
    }

    #[test]
    fn test_background_tag_normalized_to_empty() {
        let backend = FakeBackend::new().tagging(|word| {
            if word == "now" {
                "DATE".to_string()
            } else {
                "O".to_string()
            }
        });
        let annotator = Annotator::new(&backend, &service_config(1000, false));
        let triples = annotator.annotate("call now");
        assert!(triples.iter().all(|t| t.tag.is_empty()));
    }

    #[test]
    fn test_builtin_tag_gains_authority() {
        let backend = FakeBackend::new().tagging(|word| {
            if word == "Jane" {
                "PERSON".to_string()
            } else {
                "O".to_string()
            }
        });
        let annotator = Annotator::new(&backend, &service_config(1000, false));
        let triples = annotator.annotate("Jane called");
        assert_eq!(triples[0].tag, "::stanford.edu::PERSON");
        assert_eq!(triples[1].tag, "");
    }

    #[test]
    fn test_custom_tag_passes_through() {
        let backend = FakeBackend::new().tagging(|_| "SSN::example.org::PII.SSN".to_string());
        let annotator = Annotator::new(&backend, &service_config(1000, false));
        let triples = annotator.annotate("042-52-6985");
        assert_eq!(triples[0].tag, "SSN::example.org::PII.SSN");
    }

    #[test]
    fn test_split_chunks_never_drops_characters() {
        for width in [1, 2, 3, 5, 8, 50] {
            let text = "a bb  ccc\nun broken-word \t tail  ";
            let chunks = split_chunks(text, width);
            assert_eq!(chunks.concat(), text, "width {width}");
            for chunk in &chunks {
                assert!(chunk.chars().count() <= width, "width {width}");
            }
        }
    }

    #[test]
    fn test_split_chunks_multibyte_boundary() {
        let text = "ééééé ééééé";
        let chunks = split_chunks(text, 4);
        assert_eq!(chunks.concat(), text);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 4);
        }
    }

    #[test]
    fn test_outer_space() {
        assert_eq!(outer_space("  a  "), ("  ", "  "));
        assert_eq!(outer_space("a"), ("", ""));
        assert_eq!(outer_space("   "), ("", ""));
        assert_eq!(outer_space("\na"), ("\n", ""));
    }
}

//! Per-message tagging workflow.
//!
//! The updater walks one message through a fixed sequence: select content,
//! decode its transfer encoding, strip HTML, annotate, encode the markup,
//! and splice the result back into the message. The original body parts are
//! never replaced: the tagged markup (and, when the body was altered, the
//! decoded plain text) are appended as a new part so the audit trail is
//! preserved.

use base64::Engine;
use tracing::{info, warn};

use crate::eaxs::dom::XmlElement;
use crate::eaxs::extract::{self, MessageContent};
use crate::error::{Result, TagError};
use crate::html::HtmlConverter;
use crate::markup;
use crate::nlp::client::NerBackend;
use crate::nlp::Annotator;
use crate::sanitize;
use crate::PII_PREFIX;

/// Terminal state of one message's workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Tagged content was spliced into the message.
    Updated {
        /// True when a PII entity was found and the message was restricted.
        restricted: bool,
    },
    /// The message had no eligible content and passed through untagged.
    Skipped,
}

/// Mutates `<Message>` elements with tagged content and restriction flags.
pub struct MessageUpdater<'a, B> {
    annotator: &'a Annotator<B>,
    html: &'a dyn HtmlConverter,
    charset: &'static encoding_rs::Encoding,
}

impl<'a, B: NerBackend> MessageUpdater<'a, B> {
    /// Build an updater.
    ///
    /// `charset` is an encoding label ("UTF-8", "windows-1252", ...); an
    /// unknown label falls back to UTF-8 with a warning.
    pub fn new(annotator: &'a Annotator<B>, html: &'a dyn HtmlConverter, charset: &str) -> Self {
        let charset = encoding_rs::Encoding::for_label(charset.as_bytes()).unwrap_or_else(|| {
            warn!(label = charset, "Unknown charset label; falling back to UTF-8");
            encoding_rs::UTF_8
        });
        Self {
            annotator,
            html,
            charset,
        }
    }

    /// Run the whole workflow on one message.
    ///
    /// The message is mutated in place. An error means the message could not
    /// be updated and should be skipped by the caller; it never aborts the
    /// surrounding run.
    pub fn update(&self, message: &mut XmlElement, folder_path: &str) -> Result<UpdateOutcome> {
        // New attributes first, so even a skipped message carries them.
        if !sanitize::is_xml_legal(folder_path) {
            warn!("Cleaning @ParentFolder attribute value");
        }
        message.set_attr(
            "ParentFolder",
            sanitize::legalize_if_needed(folder_path).into_owned(),
        );
        message.set_attr("Processed", "false");
        message.set_attr("Record", "true");
        message.set_attr("Restricted", "false");
        message.push_element(XmlElement::new("Restriction"));

        let content = extract::extract_content(message);
        if content.text.is_empty() {
            info!("Found empty message content; skipping message tagging");
            return Ok(UpdateOutcome::Skipped);
        }

        let (text, altered) = self.normalize_content(&content)?;

        let triples = self.annotator.annotate(&text);
        let tree = markup::encode(&triples);

        let restricted = tree.has_entity_with_prefix(PII_PREFIX);
        if restricted {
            info!("Found PII tag; updating message's @Restricted attribute");
            message.set_attr("Restricted", "true");
        }

        let tagged_xml = tree.to_xml()?;

        // Splice a new <SingleBody> holding the tagged markup, plus the
        // decoded plain text when the original content was altered.
        let mut single_body = XmlElement::new("SingleBody");

        let mut tagged_el = XmlElement::new("TaggedContent");
        tagged_el.push_cdata(cdata_safe(tagged_xml.trim())?);
        single_body.push_element(tagged_el);

        if altered {
            let mut stripped_el = XmlElement::new("StrippedContent");
            stripped_el.push_cdata(cdata_safe(text.trim())?);
            single_body.push_element(stripped_el);
        }

        let multi_body = message.find_mut("MultiBody").ok_or_else(|| {
            TagError::MalformedMessage("no <MultiBody> to attach tagged content to".into())
        })?;
        multi_body.push_element(single_body);

        Ok(UpdateOutcome::Updated { restricted })
    }

    /// Decode the body's transfer encoding and strip HTML as needed.
    ///
    /// Returns the normalized text and whether it differs from the original.
    fn normalize_content(&self, content: &MessageContent) -> Result<(String, bool)> {
        let mut text = content.text.clone();
        let mut altered = false;

        match content.transfer_encoding.as_str() {
            "base64" => {
                info!("Decoding base64 message content");
                let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(compact.as_bytes())
                    .map_err(|e| TagError::Decode(format!("base64: {e}")))?;
                text = self.decode_bytes(&bytes);
                altered = true;
            }
            "quoted-printable" => {
                info!("Decoding quoted-printable message content");
                let bytes =
                    quoted_printable::decode(text.as_bytes(), quoted_printable::ParseMode::Robust)
                        .map_err(|e| TagError::Decode(format!("quoted-printable: {e}")))?;
                text = self.decode_bytes(&bytes);
                altered = true;
            }
            _ => {}
        }

        if matches!(
            content.content_type.as_str(),
            "text/html" | "application/xml+html"
        ) {
            info!("Converting HTML message content to plain text");
            text = self.html.to_text(&text);
            altered = true;
        }

        Ok((text, altered))
    }

    /// Decode raw bytes with the configured charset, replacing undecodable
    /// sequences rather than failing.
    fn decode_bytes(&self, bytes: &[u8]) -> String {
        let (decoded, _, had_errors) = self.charset.decode(bytes);
        if had_errors {
            warn!(
                charset = self.charset.name(),
                "Replaced undecodable byte sequences in message content"
            );
        }
        decoded.into_owned()
    }
}

/// Make text safe for a CDATA block: one sanitize pass, then a hard error
/// for this message only.
fn cdata_safe(text: &str) -> Result<String> {
    if sanitize::is_xml_legal(text) {
        return Ok(text.to_string());
    }
    warn!("Cleaning content in order to write CDATA");
    let cleaned = sanitize::legalize_xml_text(text);
    if sanitize::is_xml_legal(&cleaned) {
        Ok(cleaned)
    } else {
        Err(TagError::IllegalText)
    }
}

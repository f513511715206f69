//! `eaxstag`: EAXS to tagged EAXS conversion.
//!
//! This crate provides the core library for streaming an EAXS email archive
//! through an external NER annotation service and writing a tagged EAXS
//! document in which each message body is spliced back in as structured
//! markup, with messages that appear to contain PII flagged as restricted.

pub mod config;
pub mod eaxs;
pub mod error;
pub mod html;
pub mod markup;
pub mod nlp;
pub mod sanitize;

/// The EAXS mail-account XML namespace.
pub const EAXS_NS: &str = "http://www.archives.ncdcr.gov/mail-account";

/// Entity labels starting with this prefix mark a message as restricted.
pub const PII_PREFIX: &str = "PII.";

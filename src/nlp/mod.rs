//! Annotation service integration.
//!
//! Two explicit layers: [`client`] speaks HTTP to the service for a single
//! request, and [`annotator`] drives chunking, ordering, and failure
//! fallback on top of it.

pub mod annotator;
pub mod client;

pub use annotator::Annotator;
pub use client::{ClientError, CoreNlpClient, NerBackend, NlpResponse};

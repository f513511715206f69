//! EAXS archive processing: streaming read, per-message update, streaming
//! write.

pub mod dom;
pub mod extract;
pub mod reader;
pub mod stream;
pub mod update;
pub mod writer;

pub use stream::{tag_archive, PipelineDeps, TagRunStats};

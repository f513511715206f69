//! End-to-end pipeline: stream messages from a source archive, tag each
//! one, and stream the results into a new tagged archive.

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::eaxs::reader::{self, MessageStream};
use crate::eaxs::update::{MessageUpdater, UpdateOutcome};
use crate::eaxs::writer::TaggedWriter;
use crate::error::{Result, TagError};
use crate::html::HtmlConverter;
use crate::nlp::client::NerBackend;
use crate::nlp::Annotator;

/// Collaborators the pipeline needs but does not own.
pub struct PipelineDeps<'a, B> {
    /// The chunking annotator driving the tagging service.
    pub annotator: &'a Annotator<B>,
    /// HTML to plain text conversion for HTML bodies.
    pub html: &'a dyn HtmlConverter,
    /// Output encoding label, also used to decode binary bodies.
    pub charset: &'a str,
}

/// Tallies for one completed run.
#[derive(Debug, Default)]
pub struct TagRunStats {
    /// Messages found in the source archive.
    pub total_messages: u64,
    /// Messages written to the tagged archive.
    pub processed: u64,
    /// Messages that received tagged content.
    pub tagged: u64,
    /// Messages with no eligible content, passed through untagged.
    pub skipped: u64,
    /// Messages flagged as restricted.
    pub restricted: u64,
    /// Identifiers of messages whose tagging workflow failed; they are
    /// left out of the tagged archive.
    pub failed: Vec<String>,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

/// Convert `source` into a tagged archive at `dest`.
///
/// `progress` is called after each message with (done, total). A failing
/// message is logged, recorded in [`TagRunStats::failed`], and omitted
/// from the output without aborting the run; only file-level problems
/// (missing source, existing destination, structural XML errors) abort.
pub fn tag_archive<B: NerBackend>(
    source: &Path,
    dest: &Path,
    deps: &PipelineDeps<'_, B>,
    mut progress: impl FnMut(u64, u64),
) -> Result<TagRunStats> {
    let started = Instant::now();

    // Both endpoints are validated before any real work starts.
    if !source.is_file() {
        return Err(TagError::SourceNotFound(source.to_path_buf()));
    }
    if dest.exists() {
        return Err(TagError::DestinationExists(dest.to_path_buf()));
    }

    info!(source = %source.display(), dest = %dest.display(), "Tagging EAXS archive");
    let scan = reader::pre_scan(source)?;
    info!(
        global_id = %scan.global_id,
        messages = scan.total_messages,
        "Scanned source archive"
    );

    let mut writer = TaggedWriter::create(dest, &scan.global_id, source)?;
    let updater = MessageUpdater::new(deps.annotator, deps.html, deps.charset);

    let mut stats = TagRunStats {
        total_messages: scan.total_messages,
        ..TagRunStats::default()
    };

    let mut stream = MessageStream::open(source)?;
    let mut done = 0u64;
    while let Some(mut message) = stream.next_message()? {
        done += 1;
        let message_id = message
            .message_id()
            .unwrap_or_else(|| "<no MessageId>".to_string());
        info!(message_id = %message_id, folder = %message.folder_path, "Tagging message");

        match updater.update(&mut message.element, &message.folder_path) {
            Ok(outcome) => {
                writer.write_message(&message.element)?;
                stats.processed += 1;
                match outcome {
                    UpdateOutcome::Updated { restricted } => {
                        stats.tagged += 1;
                        if restricted {
                            stats.restricted += 1;
                        }
                    }
                    UpdateOutcome::Skipped => stats.skipped += 1,
                }
            }
            Err(e) => {
                // A half-updated message never reaches the output.
                error!(message_id = %message_id, "Failed to tag message: {e}");
                stats.failed.push(message_id);
            }
        }
        progress(done, scan.total_messages);
    }

    writer.finish()?;
    stats.elapsed = started.elapsed();

    if stats.failed.is_empty() {
        info!(
            processed = stats.processed,
            tagged = stats.tagged,
            restricted = stats.restricted,
            "Finished tagging archive"
        );
    } else {
        warn!(
            failed = stats.failed.len(),
            "Finished tagging archive with failures"
        );
    }
    Ok(stats)
}

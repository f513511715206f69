//! Streaming reader for EAXS archives.
//!
//! The reader walks Account → Folder → Message forward-only, yielding one
//! owned `<Message>` subtree at a time together with its containing-folder
//! path. Folders are never materialized: only their names are kept on a
//! stack while descending, so an archive far larger than memory streams
//! through in one pass.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, warn};

use crate::eaxs::dom::{self, XmlElement};
use crate::error::{Result, TagError};

/// Size of the internal read buffer.
const READ_BUFFER_SIZE: usize = 128 * 1024;

/// Results of the cheap first pass over an archive.
#[derive(Debug, Clone, Default)]
pub struct ArchivePreScan {
    /// The archive's `<GlobalId>` value (first occurrence).
    pub global_id: String,
    /// Total `<Message>` elements, for progress reporting.
    pub total_messages: u64,
}

/// One message pulled from the stream.
#[derive(Debug)]
pub struct StreamedMessage {
    /// The owned `<Message>` subtree.
    pub element: XmlElement,
    /// Slash-joined ancestor folder names, root to leaf.
    pub folder_path: String,
}

impl StreamedMessage {
    /// The `<MessageId>` value, trimmed, if present.
    pub fn message_id(&self) -> Option<String> {
        self.element
            .find("MessageId")
            .map(|el| el.text().trim().to_string())
    }
}

/// Read the archive identifier and message count in one forward pass.
pub fn pre_scan(path: &Path) -> Result<ArchivePreScan> {
    let mut reader = open_reader(path)?;
    let mut buf = Vec::new();
    let mut scan = ArchivePreScan::default();
    let mut in_global_id = false;
    let mut seen_global_id = false;

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| TagError::xml(path, e))?
        {
            Event::Start(e) => match local_name(e.name().as_ref()).as_str() {
                "GlobalId" if !seen_global_id => in_global_id = true,
                "Message" => {
                    scan.total_messages += 1;
                    // Skip the subtree so nested elements are not miscounted.
                    let end = e.to_end().into_owned();
                    reader
                        .read_to_end_into(end.name(), &mut Vec::new())
                        .map_err(|e| TagError::xml(path, e))?;
                }
                _ => {}
            },
            Event::Text(e) if in_global_id => {
                scan.global_id = e
                    .unescape()
                    .map_err(|e| TagError::xml(path, e))?
                    .trim()
                    .to_string();
                in_global_id = false;
                seen_global_id = true;
            }
            Event::End(_) => in_global_id = false,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !seen_global_id {
        warn!(path = %path.display(), "Archive has no <GlobalId>; using empty identifier");
    }
    debug!(total = scan.total_messages, "Pre-scan complete");
    Ok(scan)
}

/// Forward-only stream of `<Message>` subtrees.
pub struct MessageStream {
    reader: Reader<BufReader<File>>,
    buf: Vec<u8>,
    path: PathBuf,
    /// Names of the currently open `<Folder>` ancestors, root first.
    folders: Vec<String>,
    /// True right after a `<Folder>` opens, until its `<Name>` (which must
    /// be its first child) has been seen or ruled out.
    awaiting_name: bool,
    in_name: bool,
}

impl MessageStream {
    /// Open an archive for streaming.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = open_reader(&path)?;
        Ok(Self {
            reader,
            buf: Vec::new(),
            path,
            folders: Vec::new(),
            awaiting_name: false,
            in_name: false,
        })
    }

    /// Pull the next message, or `None` at the end of the archive.
    ///
    /// The returned subtree is owned: the stream holds no reference to it,
    /// so the caller can drop it as soon as it has been written out.
    pub fn next_message(&mut self) -> Result<Option<StreamedMessage>> {
        loop {
            self.buf.clear();
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .map_err(|e| TagError::xml(&self.path, e))?;

            match event {
                Event::Start(e) => match local_name(e.name().as_ref()).as_str() {
                    "Folder" => {
                        self.folders.push(String::new());
                        self.awaiting_name = true;
                    }
                    "Name" if self.awaiting_name => {
                        self.in_name = true;
                    }
                    "Message" => {
                        self.awaiting_name = false;
                        let start = e.to_owned();
                        let element = dom::read_subtree(&mut self.reader, &start)
                            .map_err(|e| TagError::xml(&self.path, e))?;
                        let folder_path = self.folder_path();
                        return Ok(Some(StreamedMessage {
                            element,
                            folder_path,
                        }));
                    }
                    _ => {
                        self.awaiting_name = false;
                    }
                },
                Event::Text(e) if self.in_name => {
                    let name = e
                        .unescape()
                        .map_err(|e| TagError::xml(&self.path, e))?
                        .into_owned();
                    if let Some(top) = self.folders.last_mut() {
                        *top = name;
                    }
                }
                Event::End(e) => {
                    let local = local_name(e.name().as_ref());
                    if self.in_name && local == "Name" {
                        self.in_name = false;
                        self.awaiting_name = false;
                    } else if local == "Folder" {
                        self.folders.pop();
                    }
                }
                Event::Eof => return Ok(None),
                _ => {}
            }
        }
    }

    /// The slash-joined path of the currently open folders.
    fn folder_path(&self) -> String {
        self.folders
            .iter()
            .filter(|name| !name.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Open a buffered XML reader over a file, mapping a missing file to a
/// distinct error.
fn open_reader(path: &Path) -> Result<Reader<BufReader<File>>> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            TagError::SourceNotFound(path.to_path_buf())
        } else {
            TagError::io(path, e)
        }
    })?;
    Ok(Reader::from_reader(BufReader::with_capacity(
        READ_BUFFER_SIZE,
        file,
    )))
}

/// Local part of a possibly prefixed XML name.
fn local_name(qname: &[u8]) -> String {
    let name = String::from_utf8_lossy(qname);
    match name.split_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.into_owned(),
    }
}

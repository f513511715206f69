//! Streaming writer for tagged EAXS archives.

use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tracing::{debug, info};

use crate::eaxs::dom::{self, XmlElement};
use crate::error::{Result, TagError};
use crate::EAXS_NS;

/// Streams a tagged archive to disk one message at a time.
///
/// The destination must not exist when the writer is created; nothing on
/// disk is touched if it does. Dropping the writer without calling
/// [`TaggedWriter::finish`] leaves a truncated file, so callers should
/// treat an unfinished writer as a failed run.
pub struct TaggedWriter {
    writer: Writer<BufWriter<File>>,
    path: PathBuf,
    messages_written: u64,
}

impl TaggedWriter {
    /// Create the destination file and write the archive preamble.
    ///
    /// `global_id` is carried over from the source archive and `source`
    /// names the archive this one was derived from. The output is always
    /// UTF-8; the configured body charset only governs content decoding.
    pub fn create(path: impl AsRef<Path>, global_id: &str, source: &Path) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Fail before any output resource is opened.
        if path.exists() {
            return Err(TagError::DestinationExists(path));
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(TagError::DestinationDirMissing(parent.to_path_buf()));
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| TagError::io(&path, e))?;
        let mut writer = Writer::new(BufWriter::new(file));

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| TagError::xml(&path, e))?;
        writer
            .write_event(Event::Text(BytesText::from_escaped("\n")))
            .map_err(|e| TagError::xml(&path, e))?;

        let mut account = BytesStart::new("Account");
        account.push_attribute(("xmlns", EAXS_NS));
        writer
            .write_event(Event::Start(account))
            .map_err(|e| TagError::xml(&path, e))?;

        let mut id_el = XmlElement::new("GlobalId");
        if !global_id.is_empty() {
            id_el.push_text(global_id);
        }
        dom::write_subtree(&mut writer, &id_el).map_err(|e| TagError::xml(&path, e))?;

        // File name only, never the full path.
        let source_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.to_string_lossy().into_owned());
        let mut source_el = XmlElement::new("SourceEAXS");
        source_el.push_text(source_name);
        dom::write_subtree(&mut writer, &source_el).map_err(|e| TagError::xml(&path, e))?;

        info!(path = %path.display(), "Created tagged archive");
        Ok(Self {
            writer,
            path,
            messages_written: 0,
        })
    }

    /// Append one message subtree to the archive.
    pub fn write_message(&mut self, message: &XmlElement) -> Result<()> {
        dom::write_subtree(&mut self.writer, message).map_err(|e| TagError::xml(&self.path, e))?;
        self.messages_written += 1;
        Ok(())
    }

    /// Close the root element and flush everything to disk.
    pub fn finish(mut self) -> Result<u64> {
        self.writer
            .write_event(Event::End(BytesEnd::new("Account")))
            .map_err(|e| TagError::xml(&self.path, e))?;
        self.writer
            .write_event(Event::Text(BytesText::from_escaped("\n")))
            .map_err(|e| TagError::xml(&self.path, e))?;

        let mut inner = self.writer.into_inner();
        std::io::Write::flush(&mut inner).map_err(|e| TagError::io(&self.path, e))?;
        debug!(messages = self.messages_written, "Closed tagged archive");
        Ok(self.messages_written)
    }
}

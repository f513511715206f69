//! Content extraction: selecting the preferred textual body of a message.

use tracing::debug;

use crate::eaxs::dom::XmlElement;

/// Default transfer encoding when a body part does not declare one.
const DEFAULT_TRANSFER_ENCODING: &str = "7-bit";

/// Default content type when a body part does not declare one.
const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// The selected body of a message.
///
/// `text` is empty when the message has no eligible body part; callers must
/// then skip tagging for the message (that is not an error).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageContent {
    /// The raw body text, still in its transfer encoding.
    pub text: String,
    /// Lowercased transfer encoding (e.g. "base64", "quoted-printable").
    pub transfer_encoding: String,
    /// Lowercased content type (e.g. "text/plain", "text/html").
    pub content_type: String,
}

/// Locate the preferred textual body part of a `<Message>` element.
///
/// Only non-attachment `<SingleBody>` parts under the message's
/// `<MultiBody>` are considered; a part is an attachment if it carries a
/// `<Disposition>` marker anywhere beneath it. The scan stops at the first
/// "text/plain" part; if none exists, the first candidate encountered is
/// used. No side effects.
pub fn extract_content(message: &XmlElement) -> MessageContent {
    let Some(multi_body) = message.find("MultiBody") else {
        debug!("Message has no <MultiBody>; no content to extract");
        return MessageContent::default();
    };

    let mut first_candidate: Option<MessageContent> = None;

    for single_body in multi_body.children_named("SingleBody") {
        if single_body.has_descendant("Disposition") {
            continue;
        }

        let candidate = read_part(single_body);
        if candidate.content_type == "text/plain" {
            return candidate;
        }
        if first_candidate.is_none() {
            first_candidate = Some(candidate);
        }
    }

    first_candidate.unwrap_or_default()
}

/// Read one `<SingleBody>` part's content, transfer encoding, and content
/// type, applying the documented defaults for absent fields.
fn read_part(single_body: &XmlElement) -> MessageContent {
    let text = single_body
        .find("BodyContent")
        .and_then(|bc| bc.find("Content"))
        .map(|c| c.text())
        .unwrap_or_default();

    let transfer_encoding = single_body
        .find("BodyContent")
        .and_then(|bc| bc.find("TransferEncoding"))
        .map(|e| e.text().to_lowercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_TRANSFER_ENCODING.to_string());

    let content_type = single_body
        .find("ContentType")
        .map(|e| e.text().to_lowercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

    MessageContent {
        text,
        transfer_encoding,
        content_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eaxs::dom::{read_subtree, XmlElement};
    use quick_xml::events::Event;
    use quick_xml::Reader;

    fn parse(xml: &str) -> XmlElement {
        let mut reader = Reader::from_str(xml);
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf).expect("read") {
                Event::Start(e) => {
                    let start = e.to_owned();
                    return read_subtree(&mut reader, &start).expect("subtree");
                }
                Event::Eof => panic!("no root element"),
                _ => {}
            }
        }
    }

    fn message(bodies: &str) -> XmlElement {
        parse(&format!("<Message><MultiBody>{bodies}</MultiBody></Message>"))
    }

    #[test]
    fn test_prefers_first_text_plain() {
        let msg = message(
            "<SingleBody><ContentType>text/html</ContentType>\
             <BodyContent><Content>&lt;p&gt;html&lt;/p&gt;</Content></BodyContent></SingleBody>\
             <SingleBody><ContentType>text/plain</ContentType>\
             <BodyContent><Content>plain body</Content></BodyContent></SingleBody>",
        );
        let content = extract_content(&msg);
        assert_eq!(content.text, "plain body");
        assert_eq!(content.content_type, "text/plain");
    }

    #[test]
    fn test_falls_back_to_first_candidate() {
        // No text/plain part anywhere: the FIRST part wins, even though a
        // later part might look more useful. Deliberate compatibility with
        // the archive format's established behavior.
        let msg = message(
            "<SingleBody><ContentType>text/html</ContentType>\
             <BodyContent><Content>first html</Content></BodyContent></SingleBody>\
             <SingleBody><ContentType>text/enriched</ContentType>\
             <BodyContent><Content>second</Content></BodyContent></SingleBody>",
        );
        let content = extract_content(&msg);
        assert_eq!(content.text, "first html");
        assert_eq!(content.content_type, "text/html");
    }

    #[test]
    fn test_attachments_are_skipped() {
        let msg = message(
            "<SingleBody><ContentType>text/plain</ContentType>\
             <Disposition>attachment</Disposition>\
             <BodyContent><Content>attached notes</Content></BodyContent></SingleBody>\
             <SingleBody><ContentType>text/plain</ContentType>\
             <BodyContent><Content>real body</Content></BodyContent></SingleBody>",
        );
        let content = extract_content(&msg);
        assert_eq!(content.text, "real body");
    }

    #[test]
    fn test_nested_disposition_marks_attachment() {
        let msg = message(
            "<SingleBody><ContentType>text/plain</ContentType>\
             <BodyContent><Disposition>attachment</Disposition>\
             <Content>deep attachment</Content></BodyContent></SingleBody>",
        );
        let content = extract_content(&msg);
        assert_eq!(content.text, "");
    }

    #[test]
    fn test_defaults_applied_when_fields_absent() {
        let msg = message("<SingleBody><BodyContent><Content>hello</Content></BodyContent></SingleBody>");
        let content = extract_content(&msg);
        assert_eq!(content.text, "hello");
        assert_eq!(content.transfer_encoding, "7-bit");
        assert_eq!(content.content_type, "text/plain");
    }

    #[test]
    fn test_encoding_and_type_lowercased() {
        let msg = message(
            "<SingleBody><ContentType>TEXT/PLAIN</ContentType>\
             <BodyContent><TransferEncoding>Base64</TransferEncoding>\
             <Content>aGk=</Content></BodyContent></SingleBody>",
        );
        let content = extract_content(&msg);
        assert_eq!(content.transfer_encoding, "base64");
        assert_eq!(content.content_type, "text/plain");
    }

    #[test]
    fn test_no_content_yields_empty() {
        let msg = parse("<Message><MessageId>m1</MessageId></Message>");
        let content = extract_content(&msg);
        assert_eq!(content.text, "");
    }
}

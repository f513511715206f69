//! Text sanitation for XML output.
//!
//! The annotation service and decoded message bodies can both carry control
//! characters that are illegal inside XML text, attribute values, and CDATA
//! blocks. Every component that writes text into markup funnels it through
//! these helpers.

/// Returns true if `text` can be written into XML text or an attribute value
/// without sanitation.
///
/// Vertical tabs, form feeds, carriage returns, and all other control
/// characters except `\t` and `\n` are considered illegal.
pub fn is_xml_legal(text: &str) -> bool {
    text.chars().all(|c| c == '\t' || c == '\n' || !c.is_control())
}

/// Replace vertical tabs, form feeds, and carriage returns with line breaks
/// and remove all remaining control characters except `\t` and `\n`.
pub fn legalize_xml_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{b}' | '\u{c}' | '\r' => out.push('\n'),
            '\t' | '\n' => out.push(c),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

/// Check `text` for legality, sanitizing it once if needed.
///
/// Returns the text unchanged when it is already legal; otherwise returns the
/// sanitized copy. The caller logs the sanitize pass.
pub fn legalize_if_needed(text: &str) -> std::borrow::Cow<'_, str> {
    if is_xml_legal(text) {
        std::borrow::Cow::Borrowed(text)
    } else {
        std::borrow::Cow::Owned(legalize_xml_text(text))
    }
}

/// Maximum length of a bad-response snippet kept for diagnostics.
const SNIPPET_MAX_LENGTH: usize = 500;

/// Encode an unexpected service response for logging.
///
/// Non-ASCII bytes are dropped and the result is truncated so a huge or
/// binary response cannot flood the log.
pub fn encode_snippet(response: &str) -> String {
    let mut out: String = response
        .chars()
        .filter(|c| c.is_ascii() && (!c.is_control() || *c == '\n' || *c == '\t'))
        .collect();
    if out.len() > SNIPPET_MAX_LENGTH {
        out.truncate(SNIPPET_MAX_LENGTH);
        out.push_str("...");
    }
    out
}

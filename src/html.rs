//! HTML-to-plain-text conversion.
//!
//! The tagging pipeline treats HTML stripping as an external collaborator
//! with a narrow interface: HTML in, text out. The default implementation
//! here is self-contained so the pipeline has no further opinion about how
//! the conversion happens.

/// Narrow interface for the HTML-to-text collaborator.
pub trait HtmlConverter {
    /// Convert an HTML document or fragment to plain text.
    fn to_text(&self, html: &str) -> String;
}

/// Built-in HTML-to-text converter.
///
/// - Converts `<a href="url">text</a>` to `"text [url]"`
/// - Removes `<img>` elements
/// - Preserves line breaks from `<br>`, `<p>`, `<div>`, `<li>`, headings
/// - Removes scripts and styles
/// - Decodes common HTML entities
#[derive(Debug, Default)]
pub struct DefaultHtmlConverter;

impl HtmlConverter for DefaultHtmlConverter {
    fn to_text(&self, html: &str) -> String {
        let mut text = shift_links(html);

        // Remove script and style blocks
        text = remove_tag_block(&text, "script");
        text = remove_tag_block(&text, "style");

        // Convert block elements to newlines
        for tag in &["br", "BR", "br/", "br /"] {
            text = text.replace(&format!("<{tag}>"), "\n");
        }
        for tag in &["p", "div", "tr", "li", "h1", "h2", "h3", "h4", "h5", "h6"] {
            text = text.replace(&format!("<{tag}>"), "\n");
            text = text.replace(&format!("<{tag} "), "\n<");
            let upper = tag.to_uppercase();
            text = text.replace(&format!("<{upper}>"), "\n");
            text = text.replace(&format!("</{tag}>"), "\n");
            text = text.replace(&format!("</{upper}>"), "\n");
        }

        // Strip all remaining HTML tags
        let mut result = String::with_capacity(text.len());
        let mut in_tag = false;
        for ch in text.chars() {
            match ch {
                '<' => in_tag = true,
                '>' => in_tag = false,
                _ if !in_tag => result.push(ch),
                _ => {}
            }
        }

        // Decode HTML entities
        result = result.replace("&amp;", "&");
        result = result.replace("&lt;", "<");
        result = result.replace("&gt;", ">");
        result = result.replace("&quot;", "\"");
        result = result.replace("&#39;", "'");
        result = result.replace("&apos;", "'");
        result = result.replace("&nbsp;", " ");
        result = result.replace("&#160;", " ");

        // Collapse multiple blank lines into at most two
        let mut prev_was_blank = false;
        let mut cleaned = String::with_capacity(result.len());
        for line in result.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                if !prev_was_blank {
                    cleaned.push('\n');
                    prev_was_blank = true;
                }
            } else {
                cleaned.push_str(trimmed);
                cleaned.push('\n');
                prev_was_blank = false;
            }
        }

        cleaned.trim().to_string()
    }
}

/// Rewrite `<a href="url">text</a>` so that the link target survives tag
/// stripping as `text [url]`.
fn shift_links(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut remaining = html;

    while let Some(start) = find_ci(remaining, "<a ") {
        result.push_str(&remaining[..start]);
        let anchor = &remaining[start..];

        // The anchor's open tag must close before we can find its href.
        let Some(open_end) = anchor.find('>') else {
            remaining = anchor;
            break;
        };
        let open_tag = &anchor[..open_end];
        let href = extract_href(open_tag);

        let after_open = &anchor[open_end + 1..];
        match find_ci(after_open, "</a>") {
            Some(close) => {
                let inner = &after_open[..close];
                result.push_str(inner);
                if let Some(url) = href {
                    if !url.is_empty() && !inner.contains(&url) {
                        result.push_str(" [");
                        result.push_str(&url);
                        result.push(']');
                    }
                }
                remaining = &after_open[close + 4..];
            }
            None => {
                remaining = after_open;
                break;
            }
        }
    }
    result.push_str(remaining);
    result
}

/// Pull the href value out of an anchor open tag, if present.
fn extract_href(open_tag: &str) -> Option<String> {
    let idx = find_ci(open_tag, "href=")?;
    let rest = &open_tag[idx + 5..];
    let mut chars = rest.chars();
    match chars.next() {
        Some(quote @ ('"' | '\'')) => {
            let rest = &rest[1..];
            rest.find(quote).map(|end| rest[..end].to_string())
        }
        Some(_) => {
            let end = rest
                .find(|c: char| c.is_whitespace() || c == '>')
                .unwrap_or(rest.len());
            Some(rest[..end].to_string())
        }
        None => None,
    }
}

/// Case-insensitive substring search returning the byte index of the match.
fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_lowercase().find(&needle.to_lowercase())
}

/// Remove an entire tag block (e.g. `<script>…</script>`).
fn remove_tag_block(html: &str, tag: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut remaining = html;
    let open = format!("<{tag}");
    let close = format!("</{tag}>");

    while let Some(start) = remaining.to_lowercase().find(&open) {
        result.push_str(&remaining[..start]);
        let after = &remaining[start..];
        if let Some(end) = after.to_lowercase().find(&close) {
            remaining = &after[end + close.len()..];
        } else {
            // No closing tag: remove the rest
            remaining = "";
            break;
        }
    }
    result.push_str(remaining);
    result
}

//! Converts annotation triples into the tagged `<Tokens>` markup tree.
//!
//! The encoder is deterministic and performs no I/O: the same triple list
//! always produces a structurally identical tree. Contiguous runs of
//! identically tagged tokens share a group number so a multi-token entity
//! can be reassembled from the output.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tracing::warn;

use crate::error::{Result, TagError};
use crate::sanitize;
use crate::EAXS_NS;

/// Delimiter separating the pattern identifier, authority domain, and entity
/// label inside a composite tag.
const TAG_DELIMITER: &str = "::";

/// One (token, tag, trailing whitespace) unit from the annotation client.
///
/// An empty `token` with a non-empty `tail` represents pure whitespace
/// between tokens, not a real token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    /// The token's original text.
    pub token: String,
    /// The (possibly composite) tag label; empty when untagged.
    pub tag: String,
    /// The whitespace that followed the token in the source text.
    pub tail: String,
}

impl Triple {
    /// Build a triple from string slices.
    pub fn new(token: &str, tag: &str, tail: &str) -> Self {
        Self {
            token: token.to_string(),
            tag: tag.to_string(),
            tail: tail.to_string(),
        }
    }
}

/// Entity attributes carried by a tagged token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    /// The entity label (the final part of the composite tag).
    pub label: String,
    /// Group number shared by a contiguous run of identically tagged tokens.
    pub group: u32,
    /// Optional pattern identifier from the composite tag.
    pub pattern: Option<String>,
    /// Optional authority domain from the composite tag.
    pub authority: Option<String>,
}

/// One token in the markup tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenNode {
    /// The token's text.
    pub text: String,
    /// Whitespace written after the closing tag.
    pub tail: String,
    /// Entity attributes; `None` for untagged tokens.
    pub entity: Option<Entity>,
}

/// A node in the markup tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A real token.
    Token(TokenNode),
    /// A whitespace holder emitted when whitespace precedes the first token.
    BlockText(String),
}

/// The markup tree rooted at a `<Tokens>` element.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenTree {
    /// Child nodes in document order.
    pub nodes: Vec<Node>,
}

impl TokenTree {
    /// True if any token carries an entity label starting with `prefix`.
    pub fn has_entity_with_prefix(&self, prefix: &str) -> bool {
        self.nodes.iter().any(|node| match node {
            Node::Token(token) => token
                .entity
                .as_ref()
                .is_some_and(|e| e.label.starts_with(prefix)),
            Node::BlockText(_) => false,
        })
    }

    /// Serialize the tree to an XML string.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        let map_err = |e: quick_xml::Error| TagError::xml("<tagged-content>", e);

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(map_err)?;

        let mut root = BytesStart::new("Tokens");
        root.push_attribute(("xmlns", EAXS_NS));
        writer.write_event(Event::Start(root)).map_err(map_err)?;

        for node in &self.nodes {
            match node {
                Node::BlockText(text) => {
                    writer
                        .write_event(Event::Start(BytesStart::new("BlockText")))
                        .map_err(map_err)?;
                    writer
                        .write_event(Event::Text(BytesText::new(text)))
                        .map_err(map_err)?;
                    writer
                        .write_event(Event::End(BytesEnd::new("BlockText")))
                        .map_err(map_err)?;
                }
                Node::Token(token) => {
                    let mut start = BytesStart::new("Token");
                    if let Some(entity) = &token.entity {
                        start.push_attribute(("entity", entity.label.as_str()));
                        start.push_attribute(("group", entity.group.to_string().as_str()));
                        if let Some(pattern) = &entity.pattern {
                            start.push_attribute(("pattern", pattern.as_str()));
                        }
                        if let Some(authority) = &entity.authority {
                            start.push_attribute(("authority", authority.as_str()));
                        }
                    }
                    writer.write_event(Event::Start(start)).map_err(map_err)?;
                    writer
                        .write_event(Event::Text(BytesText::new(&token.text)))
                        .map_err(map_err)?;
                    writer
                        .write_event(Event::End(BytesEnd::new("Token")))
                        .map_err(map_err)?;
                    if !token.tail.is_empty() {
                        writer
                            .write_event(Event::Text(BytesText::new(&token.tail)))
                            .map_err(map_err)?;
                    }
                }
            }
        }

        writer
            .write_event(Event::End(BytesEnd::new("Tokens")))
            .map_err(map_err)?;

        String::from_utf8(writer.into_inner())
            .map_err(|e| TagError::xml("<tagged-content>", e))
    }
}

/// Encode a triple list into a markup tree.
///
/// Group numbers increase monotonically: a new group starts exactly when the
/// tag differs from the immediately preceding tag and is non-empty.
/// Whitespace-only triples are merged into the previous node's trailing text
/// and never create or advance a group.
pub fn encode(triples: &[Triple]) -> TokenTree {
    let mut tree = TokenTree::default();
    let mut group: u32 = 0;
    let mut current_tag: Option<&str> = None;

    if triples.is_empty() {
        warn!("Annotation triple list is empty; emitting empty <Tokens> tree");
    }

    for triple in triples {
        // Pure whitespace between tokens: attach to the previous node.
        if triple.token.is_empty() {
            let tail = clean_text(&triple.tail, "whitespace");
            match tree.nodes.last_mut() {
                Some(Node::Token(token)) => token.tail.push_str(&tail),
                Some(Node::BlockText(text)) => text.push_str(&tail),
                None => tree.nodes.push(Node::BlockText(tail)),
            }
            continue;
        }

        if current_tag != Some(triple.tag.as_str()) {
            current_tag = Some(triple.tag.as_str());
            if !triple.tag.is_empty() {
                group += 1;
            }
        }

        let entity = if triple.tag.is_empty() {
            None
        } else {
            let (pattern, authority, label) = split_entity(&triple.tag);
            Some(Entity {
                label: clean_text(&label, "entity"),
                group,
                pattern: pattern.map(|p| clean_text(&p, "pattern")),
                authority: authority.map(|a| clean_text(&a, "authority")),
            })
        };

        tree.nodes.push(Node::Token(TokenNode {
            text: clean_text(&triple.token, "token"),
            tail: clean_text(&triple.tail, "tail"),
            entity,
        }));
    }

    tree
}

/// Split a composite tag into its pattern identifier, authority domain, and
/// entity label.
///
/// A tag that does not split into exactly three parts is treated entirely as
/// the entity label (with the delimiter neutralized) and carries no pattern
/// or authority.
pub fn split_entity(tag: &str) -> (Option<String>, Option<String>, String) {
    let parts: Vec<&str> = tag.split(TAG_DELIMITER).collect();
    if parts.len() != 3 {
        return (None, None, tag.replace(TAG_DELIMITER, "_"));
    }
    let pattern = (!parts[0].is_empty()).then(|| parts[0].to_string());
    let authority = (!parts[1].is_empty()).then(|| parts[1].to_string());
    (pattern, authority, parts[2].to_string())
}

/// One sanitize pass for text destined for markup, logged when needed.
fn clean_text(text: &str, what: &str) -> String {
    if sanitize::is_xml_legal(text) {
        text.to_string()
    } else {
        warn!("Cleaning illegal characters out of {what} text");
        sanitize::legalize_xml_text(text)
    }
}

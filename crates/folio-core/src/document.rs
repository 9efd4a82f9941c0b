//! The serialized rich-document model and its derived plain-text form.
//!
//! A document is a tree of typed nodes rooted at a `doc` node, the shape the
//! editing surface emits on every mutation. The engine treats node types as
//! opaque except for `text` and `hardBreak`, which drive flattening.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

const DOC: &str = "doc";
const PARAGRAPH: &str = "paragraph";
const TEXT: &str = "text";
const HARD_BREAK: &str = "hardBreak";

// ─── Node ────────────────────────────────────────────────────────────────────

/// A single node of the document tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
  #[serde(rename = "type")]
  pub kind:    String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub attrs:   Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub content: Vec<Node>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub text:    Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub marks:   Vec<serde_json::Value>,
}

impl Node {
  fn block(kind: &str, content: Vec<Node>) -> Self {
    Self {
      kind: kind.to_owned(),
      attrs: None,
      content,
      text: None,
      marks: Vec::new(),
    }
  }

  fn text(text: &str) -> Self {
    Self {
      kind: TEXT.to_owned(),
      attrs: None,
      content: Vec::new(),
      text: Some(text.to_owned()),
      marks: Vec::new(),
    }
  }

  fn is_inline(&self) -> bool { self.kind == TEXT || self.kind == HARD_BREAK }

  fn flatten_into(&self, out: &mut String) {
    if self.kind == TEXT {
      out.push_str(self.text.as_deref().unwrap_or_default());
      return;
    }
    if self.kind == HARD_BREAK {
      out.push('\n');
      return;
    }

    // Inline children concatenate; block children are separated by newlines.
    let blocks = self.content.iter().any(|child| !child.is_inline());
    for (i, child) in self.content.iter().enumerate() {
      if blocks && i > 0 {
        out.push('\n');
      }
      child.flatten_into(out);
    }
  }
}

// ─── Document ────────────────────────────────────────────────────────────────

/// A parsed rich document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
  root: Node,
}

impl Document {
  /// The empty-document sentinel: a `doc` holding one empty paragraph.
  pub fn empty() -> Self {
    Self { root: Node::block(DOC, vec![Node::block(PARAGRAPH, Vec::new())]) }
  }

  /// Parse serialized document JSON.
  pub fn parse(raw: &str) -> Result<Self> {
    let root: Node = serde_json::from_str(raw)?;
    if root.kind != DOC {
      return Err(Error::Parse(format!(
        "root node must be {DOC:?}, found {:?}",
        root.kind
      )));
    }
    Ok(Self { root })
  }

  /// Parse stored content, substituting the empty document when it is blank
  /// or unparsable. Used on scene load, where a blank editor beats an error.
  pub fn parse_or_empty(raw: &str) -> Self {
    if raw.trim().is_empty() {
      return Self::empty();
    }
    match Self::parse(raw) {
      Ok(doc) => doc,
      Err(e) => {
        tracing::warn!(error = %e, "stored content is not a document; loading empty");
        Self::empty()
      }
    }
  }

  /// Build a document with one paragraph per line of `text`.
  pub fn from_plain_text(text: &str) -> Self {
    let paragraphs = text
      .split('\n')
      .map(|line| {
        let content = if line.is_empty() {
          Vec::new()
        } else {
          vec![Node::text(line)]
        };
        Node::block(PARAGRAPH, content)
      })
      .collect();
    Self { root: Node::block(DOC, paragraphs) }
  }

  pub fn root(&self) -> &Node { &self.root }

  /// Serialize back to the JSON form stored in the `content` column.
  pub fn to_json_string(&self) -> String {
    // A `Node` tree holds only strings, vectors and JSON values.
    serde_json::to_string(&self.root).unwrap_or_default()
  }

  /// The flattened visible text of the document.
  pub fn plain_text(&self) -> String {
    let mut out = String::new();
    self.root.flatten_into(&mut out);
    out
  }
}

impl Default for Document {
  fn default() -> Self { Self::empty() }
}

// ─── Derived content ─────────────────────────────────────────────────────────

/// Character counts derived from a scene's plain text.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
pub struct TextStats {
  /// Characters excluding all whitespace.
  pub char_count:             u64,
  /// Characters excluding line breaks.
  pub char_count_with_spaces: u64,
}

impl TextStats {
  pub fn from_plain_text(text: &str) -> Self {
    let mut stats = Self::default();
    for c in text.chars() {
      if c != '\n' && c != '\r' {
        stats.char_count_with_spaces += 1;
      }
      if !c.is_whitespace() {
        stats.char_count += 1;
      }
    }
    stats
  }
}

/// Serialized content plus everything derived from it. Scenes and versions
/// both carry one; the derived fields are always computed together so they
/// cannot drift from `content`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneContent {
  pub content:    String,
  pub plain_text: String,
  pub stats:      TextStats,
  /// Hex SHA-256 of `content`.
  pub digest:     String,
}

impl SceneContent {
  pub fn from_document(doc: &Document) -> Self {
    let content = doc.to_json_string();
    let plain_text = doc.plain_text();
    Self {
      stats: TextStats::from_plain_text(&plain_text),
      digest: content_digest(&content),
      content,
      plain_text,
    }
  }

  /// Parse `content` back into a document, falling back to empty.
  pub fn document(&self) -> Document { Document::parse_or_empty(&self.content) }
}

/// Hex-encoded SHA-256 of serialized content.
pub fn content_digest(content: &str) -> String {
  hex::encode(Sha256::digest(content.as_bytes()))
}

#[cfg(test)]
mod tests {
  use super::*;

  const NESTED: &str = r#"{
    "type": "doc",
    "content": [
      { "type": "heading", "attrs": { "level": 1 },
        "content": [{ "type": "text", "text": "Chapter One" }] },
      { "type": "paragraph", "content": [
        { "type": "text", "text": "It was " },
        { "type": "text", "text": "late", "marks": [{ "type": "bold" }] },
        { "type": "hardBreak" },
        { "type": "text", "text": "and dark." }
      ] },
      { "type": "blockquote", "content": [
        { "type": "paragraph", "content": [{ "type": "text", "text": "Quote" }] }
      ] }
    ]
  }"#;

  #[test]
  fn flattens_blocks_marks_and_breaks() {
    let doc = Document::parse(NESTED).unwrap();
    assert_eq!(doc.plain_text(), "Chapter One\nIt was late\nand dark.\nQuote");
  }

  #[test]
  fn plain_text_round_trips_through_paragraphs() {
    let cases = [
      "",
      "one line",
      "a\n\nb",
      "trailing\n",
      "a\r\nb\r\n",
      "\u{d55c}\u{ae00} \u{bb38}\u{c7a5}",
    ];
    for text in cases {
      let doc = Document::from_plain_text(text);
      assert_eq!(doc.plain_text(), text);
      let reparsed = Document::parse(&doc.to_json_string()).unwrap();
      assert_eq!(reparsed.plain_text(), text);
    }
  }

  #[test]
  fn from_plain_text_builds_one_paragraph_per_line() {
    let doc = Document::from_plain_text("first\n\nthird");
    let root = doc.root();
    assert_eq!(root.kind, "doc");
    assert_eq!(root.content.len(), 3);
    assert!(root.content.iter().all(|p| p.kind == "paragraph"));
    assert!(root.content[1].content.is_empty());
  }

  #[test]
  fn parse_rejects_non_doc_root() {
    let err = Document::parse(r#"{"type":"paragraph"}"#).unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
  }

  #[test]
  fn parse_or_empty_recovers() {
    assert_eq!(Document::parse_or_empty(""), Document::empty());
    assert_eq!(Document::parse_or_empty("{not json"), Document::empty());
    assert_eq!(Document::parse_or_empty("[1,2]"), Document::empty());
    assert_eq!(Document::empty().plain_text(), "");
  }

  #[test]
  fn stats_count_characters() {
    let stats = TextStats::from_plain_text("ab c\nd");
    assert_eq!(stats.char_count, 4);
    assert_eq!(stats.char_count_with_spaces, 5);
  }

  #[test]
  fn scene_content_is_consistent() {
    let doc = Document::from_plain_text("Hello world");
    let content = SceneContent::from_document(&doc);
    assert_eq!(content.plain_text, "Hello world");
    assert_eq!(content.stats.char_count, 10);
    assert_eq!(content.digest, content_digest(&content.content));
    assert_eq!(content.document(), doc);
  }
}

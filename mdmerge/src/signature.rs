//! Block signatures: the identity keys used to pair blocks across documents.
//!
//! Two statements match iff their signatures are equal. A statement without
//! a signature never matches anything.

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::analysis::Statement;
use crate::document::DocumentNode;
use crate::freeze::FreezeBlock;
use crate::node::{BlockKind, BlockNode, ListKind};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Signature {
    Heading { level: u8, text: String },
    Paragraph { hash: String },
    CodeBlock { language: Option<String>, hash: String },
    List { kind: ListKind, items: usize },
    BlockQuote { hash: String },
    ThematicBreak,
    HtmlBlock { hash: String },
    Table { rows: usize, header_hash: String },
    FootnoteDefinition { label: String },
    LinkDefinition { label: String },
    FreezeBlock { hash: String },
    /// Blocks with no structural identity (front matter, definition lists,
    /// opaque backend output). The key is positional: such a block only
    /// pairs with one of the same kind starting on the same line, and a
    /// block without a span gets no signature at all.
    Unknown { kind: String, start_line: usize },
    /// A caller-supplied tuple from a custom signature generator.
    Custom(Vec<String>),
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signature::Heading { level, text } => write!(f, "(heading, {}, {:?})", level, text),
            Signature::Paragraph { hash } => write!(f, "(paragraph, {})", hash),
            Signature::CodeBlock { language, hash } => match language {
                Some(lang) => write!(f, "(code_block, {}, {})", lang, hash),
                None => write!(f, "(code_block, nil, {})", hash),
            },
            Signature::List { kind, items } => write!(f, "(list, {}, {})", kind, items),
            Signature::BlockQuote { hash } => write!(f, "(block_quote, {})", hash),
            Signature::ThematicBreak => write!(f, "(thematic_break)"),
            Signature::HtmlBlock { hash } => write!(f, "(html_block, {})", hash),
            Signature::Table { rows, header_hash } => {
                write!(f, "(table, {}, {})", rows, header_hash)
            }
            Signature::FootnoteDefinition { label } => {
                write!(f, "(footnote_definition, {:?})", label)
            }
            Signature::LinkDefinition { label } => {
                write!(f, "(link_reference_definition, {:?})", label)
            }
            Signature::FreezeBlock { hash } => write!(f, "(freeze_block, {})", hash),
            Signature::Unknown { kind, start_line } => {
                write!(f, "(unknown, {}, {})", kind, start_line)
            }
            Signature::Custom(parts) => write!(f, "({})", parts.join(", ")),
        }
    }
}

/// What a custom signature generator decided for one statement.
///
/// `Unmatchable` and `Default` are deliberately different answers: the first
/// forces the statement to stay one-sided, the second defers to the built-in
/// signature for its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureOverride {
    Use(Signature),
    Unmatchable,
    Default,
}

/// Caller-supplied signature hook. Must be pure.
pub type SignatureGenerator = Arc<dyn Fn(&Statement<'_>) -> SignatureOverride + Send + Sync>;

/// Signature of a statement, consulting `generator` first when present.
pub fn compute(statement: &Statement<'_>, generator: Option<&SignatureGenerator>) -> Option<Signature> {
    if let Some(generator) = generator {
        match generator(statement) {
            SignatureOverride::Use(signature) => return Some(signature),
            SignatureOverride::Unmatchable => return None,
            SignatureOverride::Default => {}
        }
    }
    default_signature(statement)
}

/// Built-in signature for a statement.
pub fn default_signature(statement: &Statement<'_>) -> Option<Signature> {
    match statement {
        Statement::Node(node) => node_signature(node),
        Statement::Freeze(block) => Some(freeze_signature(block)),
    }
}

pub fn freeze_signature(block: &FreezeBlock) -> Signature {
    Signature::FreezeBlock {
        hash: content_hash(block.content.trim(), 16),
    }
}

pub fn node_signature(node: &BlockNode) -> Option<Signature> {
    let signature = match node.kind() {
        BlockKind::Heading => Signature::Heading {
            level: node.heading_level().unwrap_or(1),
            text: normalize_whitespace(&node.heading_text().unwrap_or_default()),
        },
        BlockKind::Paragraph => Signature::Paragraph {
            hash: content_hash(&node.content.text(), 32),
        },
        BlockKind::CodeBlock => {
            let body = match &node.content {
                DocumentNode::CodeBlock { content, .. } => content.as_str(),
                _ => "",
            };
            Signature::CodeBlock {
                language: node.fence_language().map(str::to_string),
                hash: content_hash(body, 16),
            }
        }
        BlockKind::List => Signature::List {
            kind: node.list_kind().unwrap_or(ListKind::Bulleted),
            items: node.item_count().unwrap_or(0),
        },
        BlockKind::BlockQuote => Signature::BlockQuote {
            hash: content_hash(&node.content.text(), 16),
        },
        BlockKind::ThematicBreak => Signature::ThematicBreak,
        BlockKind::HtmlBlock => {
            let raw = match &node.content {
                DocumentNode::HtmlBlock(raw) => raw.as_str(),
                _ => "",
            };
            Signature::HtmlBlock {
                hash: content_hash(raw, 16),
            }
        }
        BlockKind::Table => Signature::Table {
            rows: node.table_row_count().unwrap_or(0),
            header_hash: content_hash(&node.table_headers().unwrap_or_default().join("|"), 16),
        },
        BlockKind::FootnoteDefinition => Signature::FootnoteDefinition {
            label: node.footnote_label().unwrap_or_default().to_string(),
        },
        BlockKind::LinkDefinition => Signature::LinkDefinition {
            label: node.link_label().unwrap_or_default().to_lowercase(),
        },
        BlockKind::Other => Signature::Unknown {
            kind: node.kind_name().to_string(),
            start_line: node.start_line()?,
        },
    };
    Some(signature)
}

/// Hex SHA-256 of `text`, truncated to `len` characters.
pub fn content_hash(text: &str, len: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(len);
    hex
}

/// Strip leading/trailing whitespace, collapse interior whitespace.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

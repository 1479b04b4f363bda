use std::fmt;

use crate::document::DocumentNode;

/// A 1-indexed, inclusive range of source lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineSpan {
    pub start: usize,
    pub end: usize,
}

impl LineSpan {
    pub fn new(start: usize, end: usize) -> Self {
        LineSpan { start, end }
    }

    pub fn contains_line(&self, line: usize) -> bool {
        self.start <= line && line <= self.end
    }

    /// True if `other` lies entirely inside this span.
    pub fn covers(&self, other: &LineSpan) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// True if the two spans share at least one line.
    pub fn overlaps(&self, other: &LineSpan) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl fmt::Display for LineSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "L{}", self.start)
        } else {
            write!(f, "L{}-L{}", self.start, self.end)
        }
    }
}

/// The closed set of block kinds the merge engine distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Heading,
    Paragraph,
    CodeBlock,
    List,
    BlockQuote,
    ThematicBreak,
    HtmlBlock,
    Table,
    FootnoteDefinition,
    LinkDefinition,
    Other,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Heading => "heading",
            BlockKind::Paragraph => "paragraph",
            BlockKind::CodeBlock => "code_block",
            BlockKind::List => "list",
            BlockKind::BlockQuote => "block_quote",
            BlockKind::ThematicBreak => "thematic_break",
            BlockKind::HtmlBlock => "html_block",
            BlockKind::Table => "table",
            BlockKind::FootnoteDefinition => "footnote_definition",
            BlockKind::LinkDefinition => "link_reference_definition",
            BlockKind::Other => "other",
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    Ordered,
    Bulleted,
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListKind::Ordered => f.write_str("ordered"),
            ListKind::Bulleted => f.write_str("bullet"),
        }
    }
}

/// A top-level block of a parsed document.
///
/// `span` is `None` only for synthetic nodes that were never read from a
/// source file; those are reproduced by re-rendering instead of by line range.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockNode {
    pub content: DocumentNode,
    pub span: Option<LineSpan>,
}

impl BlockNode {
    pub fn new(content: DocumentNode, span: LineSpan) -> Self {
        BlockNode {
            content,
            span: Some(span),
        }
    }

    pub fn synthetic(content: DocumentNode) -> Self {
        BlockNode {
            content,
            span: None,
        }
    }

    pub fn kind(&self) -> BlockKind {
        match &self.content {
            DocumentNode::Heading { .. } => BlockKind::Heading,
            DocumentNode::Paragraph(_) => BlockKind::Paragraph,
            DocumentNode::CodeBlock { .. } => BlockKind::CodeBlock,
            DocumentNode::OrderedList { .. } | DocumentNode::UnorderedList { .. } => {
                BlockKind::List
            }
            DocumentNode::Blockquote(_) => BlockKind::BlockQuote,
            DocumentNode::HorizontalRule => BlockKind::ThematicBreak,
            DocumentNode::HtmlBlock(_) => BlockKind::HtmlBlock,
            DocumentNode::Table { .. } => BlockKind::Table,
            DocumentNode::FootnoteDefinition { .. } => BlockKind::FootnoteDefinition,
            DocumentNode::LinkDefinition { .. } => BlockKind::LinkDefinition,
            DocumentNode::Other { .. } => BlockKind::Other,
        }
    }

    /// Finer-grained kind name; differs from `kind()` only for `Other` nodes.
    pub fn kind_name(&self) -> &str {
        match &self.content {
            DocumentNode::Other { kind, .. } => kind,
            _ => self.kind().as_str(),
        }
    }

    pub fn start_line(&self) -> Option<usize> {
        self.span.map(|s| s.start)
    }

    pub fn end_line(&self) -> Option<usize> {
        self.span.map(|s| s.end)
    }

    pub fn heading_level(&self) -> Option<u8> {
        match &self.content {
            DocumentNode::Heading { level, .. } => Some(*level),
            _ => None,
        }
    }

    pub fn fence_language(&self) -> Option<&str> {
        match &self.content {
            DocumentNode::CodeBlock { language, .. } => language.as_deref(),
            _ => None,
        }
    }

    pub fn list_kind(&self) -> Option<ListKind> {
        match &self.content {
            DocumentNode::OrderedList { .. } => Some(ListKind::Ordered),
            DocumentNode::UnorderedList { .. } => Some(ListKind::Bulleted),
            _ => None,
        }
    }

    pub fn item_count(&self) -> Option<usize> {
        match &self.content {
            DocumentNode::OrderedList { items, .. } | DocumentNode::UnorderedList { items } => {
                Some(items.len())
            }
            _ => None,
        }
    }

    /// Number of body rows (the header row is not counted).
    pub fn table_row_count(&self) -> Option<usize> {
        match &self.content {
            DocumentNode::Table { rows, .. } => Some(rows.len()),
            _ => None,
        }
    }

    /// Plain text of each header cell.
    pub fn table_headers(&self) -> Option<Vec<String>> {
        match &self.content {
            DocumentNode::Table { headers, .. } => Some(
                headers
                    .iter()
                    .map(|cell| {
                        let mut text = String::new();
                        for inline in cell {
                            inline.collect_text(&mut text);
                        }
                        text.trim().to_string()
                    })
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn footnote_label(&self) -> Option<&str> {
        match &self.content {
            DocumentNode::FootnoteDefinition { label, .. } => Some(label),
            _ => None,
        }
    }

    pub fn link_label(&self) -> Option<&str> {
        match &self.content {
            DocumentNode::LinkDefinition { label, .. } => Some(label),
            _ => None,
        }
    }

    /// Heading text with formatting dropped.
    pub fn heading_text(&self) -> Option<String> {
        match &self.content {
            DocumentNode::Heading { content, .. } => {
                let mut text = String::new();
                for inline in content {
                    inline.collect_text(&mut text);
                }
                Some(text)
            }
            _ => None,
        }
    }

    /// Canonical Markdown for nodes without a source span.
    pub fn render(&self) -> String {
        self.content.to_string()
    }
}

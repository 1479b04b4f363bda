use std::fmt;

/// A sequence of document nodes representing nested Markdown content
/// (the body of a block quote, a list item or a footnote definition).
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub nodes: Vec<DocumentNode>,
}

impl Document {
    pub fn empty() -> Self {
        Document { nodes: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Append every literal text and inline code run, depth-first.
    pub fn collect_text(&self, out: &mut String) {
        for node in &self.nodes {
            node.collect_text(out);
        }
    }
}

/// A single block-level node of the Markdown AST.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentNode {
    Paragraph(Vec<InlineNode>),
    Heading {
        level: u8,
        content: Vec<InlineNode>,
    },
    CodeBlock {
        language: Option<String>,
        content: String,
    },
    Blockquote(Document),
    Table {
        alignments: Vec<ColumnAlignment>,
        headers: Vec<Vec<InlineNode>>,
        rows: Vec<Vec<Vec<InlineNode>>>,
    },
    OrderedList {
        start: u64,
        items: Vec<Document>,
    },
    UnorderedList {
        items: Vec<Document>,
    },
    HtmlBlock(String),
    FootnoteDefinition {
        label: String,
        content: Document,
    },
    /// `[label]: destination "title"`, which the parser consumes without
    /// emitting events. `raw` holds the original source lines.
    LinkDefinition {
        label: String,
        raw: String,
    },
    /// Anything without a dedicated variant: front matter, definition
    /// lists, display math, or source lines the parser skipped.
    Other {
        kind: String,
        raw: String,
    },

    // Separator
    HorizontalRule,
}

impl DocumentNode {
    /// Append every literal text and inline code run found in this node's
    /// subtree. All other inline formatting is ignored.
    pub fn collect_text(&self, out: &mut String) {
        match self {
            DocumentNode::Paragraph(inlines) | DocumentNode::Heading { content: inlines, .. } => {
                collect_inline_text(inlines, out);
            }
            DocumentNode::CodeBlock { content, .. } => out.push_str(content),
            DocumentNode::Blockquote(doc) => doc.collect_text(out),
            DocumentNode::Table { headers, rows, .. } => {
                for cell in headers {
                    collect_inline_text(cell, out);
                }
                for row in rows {
                    for cell in row {
                        collect_inline_text(cell, out);
                    }
                }
            }
            DocumentNode::OrderedList { items, .. } | DocumentNode::UnorderedList { items } => {
                for item in items {
                    item.collect_text(out);
                }
            }
            DocumentNode::FootnoteDefinition { content, .. } => content.collect_text(out),
            DocumentNode::HtmlBlock(_)
            | DocumentNode::LinkDefinition { .. }
            | DocumentNode::Other { .. }
            | DocumentNode::HorizontalRule => {}
        }
    }

    /// Text runs of the subtree as an owned string.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }
}

fn collect_inline_text(inlines: &[InlineNode], out: &mut String) {
    for inline in inlines {
        inline.collect_text(out);
    }
}

/// Inline elements that appear within a line of text.
/// Inline types nest freely within one another.
#[derive(Debug, Clone, PartialEq)]
pub enum InlineNode {
    Text(String),
    Strong(Vec<InlineNode>),
    Emphasis(Vec<InlineNode>),
    Strikethrough(Vec<InlineNode>),
    CodeSpan(String),
    Link {
        dest: String,
        title: String,
        content: Vec<InlineNode>,
    },
    Image {
        dest: String,
        title: String,
        alt: Vec<InlineNode>,
    },
    Html(String),
    FootnoteReference(String),
    TaskMarker(bool),
    SoftBreak,
    HardBreak,
}

impl InlineNode {
    pub fn collect_text(&self, out: &mut String) {
        match self {
            InlineNode::Text(s) | InlineNode::CodeSpan(s) => out.push_str(s),
            InlineNode::Strong(children)
            | InlineNode::Emphasis(children)
            | InlineNode::Strikethrough(children)
            | InlineNode::Link {
                content: children, ..
            }
            | InlineNode::Image { alt: children, .. } => collect_inline_text(children, out),
            InlineNode::Html(_)
            | InlineNode::FootnoteReference(_)
            | InlineNode::TaskMarker(_)
            | InlineNode::SoftBreak
            | InlineNode::HardBreak => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnAlignment {
    None,
    Left,
    Center,
    Right,
}

// Canonical re-rendering. Used only for nodes that carry no source span;
// everything parsed from a file is reproduced from its original lines.

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            write!(f, "{}", node)?;
        }
        Ok(())
    }
}

impl fmt::Display for DocumentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentNode::Paragraph(inlines) => {
                for inline in inlines {
                    write!(f, "{}", inline)?;
                }
                writeln!(f)
            }
            DocumentNode::Heading { level, content } => {
                for _ in 0..*level {
                    write!(f, "#")?;
                }
                write!(f, " ")?;
                for inline in content {
                    write!(f, "{}", inline)?;
                }
                writeln!(f)
            }
            DocumentNode::CodeBlock { language, content } => {
                write!(f, "```")?;
                if let Some(lang) = language {
                    write!(f, "{}", lang)?;
                }
                writeln!(f)?;
                write!(f, "{}", content)?;
                if !content.is_empty() && !content.ends_with('\n') {
                    writeln!(f)?;
                }
                writeln!(f, "```")
            }
            DocumentNode::Blockquote(doc) => {
                let text = format!("{}", doc);
                for line in text.lines() {
                    if line.is_empty() {
                        writeln!(f, ">")?;
                    } else {
                        writeln!(f, "> {}", line)?;
                    }
                }
                Ok(())
            }
            DocumentNode::Table {
                alignments,
                headers,
                rows,
            } => {
                write!(f, "|")?;
                for header in headers {
                    write!(f, " ")?;
                    for inline in header {
                        write!(f, "{}", inline)?;
                    }
                    write!(f, " |")?;
                }
                writeln!(f)?;
                write!(f, "|")?;
                for (i, _) in headers.iter().enumerate() {
                    let rule = match alignments.get(i) {
                        Some(ColumnAlignment::Left) => ":---",
                        Some(ColumnAlignment::Center) => ":---:",
                        Some(ColumnAlignment::Right) => "---:",
                        _ => "---",
                    };
                    write!(f, "{}|", rule)?;
                }
                writeln!(f)?;
                for row in rows {
                    write!(f, "|")?;
                    for cell in row {
                        write!(f, " ")?;
                        for inline in cell {
                            write!(f, "{}", inline)?;
                        }
                        write!(f, " |")?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            }
            DocumentNode::OrderedList { start, items } => {
                for (i, item) in items.iter().enumerate() {
                    write!(f, "{}. {}", *start as usize + i, item)?;
                }
                Ok(())
            }
            DocumentNode::UnorderedList { items } => {
                for item in items {
                    write!(f, "- {}", item)?;
                }
                Ok(())
            }
            DocumentNode::HtmlBlock(raw) => {
                write!(f, "{}", raw)?;
                if !raw.ends_with('\n') {
                    writeln!(f)?;
                }
                Ok(())
            }
            DocumentNode::FootnoteDefinition { label, content } => {
                write!(f, "[^{}]: {}", label, content)
            }
            DocumentNode::LinkDefinition { raw, .. } | DocumentNode::Other { raw, .. } => {
                writeln!(f, "{}", raw.trim_end_matches('\n'))
            }
            DocumentNode::HorizontalRule => writeln!(f, "---"),
        }
    }
}

impl fmt::Display for InlineNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InlineNode::Text(s) => write!(f, "{}", s),
            InlineNode::Strong(children) => {
                write!(f, "**")?;
                for child in children {
                    write!(f, "{}", child)?;
                }
                write!(f, "**")
            }
            InlineNode::Emphasis(children) => {
                write!(f, "*")?;
                for child in children {
                    write!(f, "{}", child)?;
                }
                write!(f, "*")
            }
            InlineNode::Strikethrough(children) => {
                write!(f, "~~")?;
                for child in children {
                    write!(f, "{}", child)?;
                }
                write!(f, "~~")
            }
            InlineNode::CodeSpan(code) => write!(f, "`{}`", code),
            InlineNode::Link { dest, content, .. } => {
                write!(f, "[")?;
                for child in content {
                    write!(f, "{}", child)?;
                }
                write!(f, "]({})", dest)
            }
            InlineNode::Image { dest, alt, .. } => {
                write!(f, "![")?;
                for child in alt {
                    write!(f, "{}", child)?;
                }
                write!(f, "]({})", dest)
            }
            InlineNode::Html(raw) => write!(f, "{}", raw),
            InlineNode::FootnoteReference(label) => write!(f, "[^{}]", label),
            InlineNode::TaskMarker(checked) => {
                write!(f, "{} ", if *checked { "[x]" } else { "[ ]" })
            }
            InlineNode::SoftBreak => writeln!(f),
            InlineNode::HardBreak => writeln!(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_runs_ignore_formatting() {
        let node = DocumentNode::Paragraph(vec![
            InlineNode::Text("Use ".into()),
            InlineNode::Strong(vec![InlineNode::CodeSpan("cargo".into())]),
            InlineNode::Text(" via ".into()),
            InlineNode::Link {
                dest: "https://example.com".into(),
                title: String::new(),
                content: vec![InlineNode::Emphasis(vec![InlineNode::Text("docs".into())])],
            },
        ]);
        assert_eq!(node.text(), "Use cargo via docs");
    }

    #[test]
    fn renders_heading_and_code_block() {
        let heading = DocumentNode::Heading {
            level: 2,
            content: vec![InlineNode::Text("Usage".into())],
        };
        assert_eq!(heading.to_string(), "## Usage\n");

        let code = DocumentNode::CodeBlock {
            language: Some("rust".into()),
            content: "fn main() {}".into(),
        };
        assert_eq!(code.to_string(), "```rust\nfn main() {}\n```\n");
    }
}

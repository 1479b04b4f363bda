//! Freeze blocks: spans of a document that must survive a merge verbatim.
//!
//! ```text
//! <!-- {token}:freeze [optional reason] -->
//! ...preserved content...
//! <!-- {token}:unfreeze -->
//! ```
//!
//! Marker anomalies (an unfreeze with nothing open, a freeze never closed)
//! are logged at debug level and otherwise ignored.

use crate::analysis::StatementRef;
use crate::node::{BlockNode, LineSpan};

pub const DEFAULT_FREEZE_TOKEN: &str = "merge";

/// A matched freeze/unfreeze marker pair and everything between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreezeBlock {
    /// Line of the freeze marker (1-based).
    pub start_line: usize,
    /// Line of the unfreeze marker (1-based).
    pub end_line: usize,
    /// Text strictly between the two marker lines.
    pub content: String,
    pub reason: Option<String>,
    pub start_marker: String,
    pub end_marker: String,
    /// The full original span, markers included.
    pub text: String,
}

impl FreezeBlock {
    pub fn span(&self) -> LineSpan {
        LineSpan::new(self.start_line, self.end_line)
    }

    pub fn contains_line(&self, line: usize) -> bool {
        self.span().contains_line(line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FreezeDirective {
    Freeze { reason: Option<String> },
    Unfreeze,
}

/// Recognizes the marker comments for one freeze token.
#[derive(Debug, Clone)]
pub struct FreezeMarkers {
    token: String,
}

impl FreezeMarkers {
    pub fn new(token: impl Into<String>) -> Self {
        FreezeMarkers {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Parse a whole source line as a marker. The comment must be the only
    /// thing on the line apart from surrounding whitespace.
    pub fn parse_line(&self, line: &str) -> Option<FreezeDirective> {
        let inner = line
            .trim()
            .strip_prefix("<!--")?
            .strip_suffix("-->")?
            .trim();
        let directive = inner.strip_prefix(self.token.as_str())?.strip_prefix(':')?;

        if directive == "unfreeze" {
            return Some(FreezeDirective::Unfreeze);
        }

        let rest = directive.strip_prefix("freeze")?;
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let reason = rest.trim();
        Some(FreezeDirective::Freeze {
            reason: if reason.is_empty() {
                None
            } else {
                Some(reason.to_string())
            },
        })
    }

    /// Scan `lines` for marker pairs. Returns closed blocks sorted by start
    /// line. Nested pairs are each reported; disjointness is not checked.
    pub fn extract<S: AsRef<str>>(&self, lines: &[S]) -> Vec<FreezeBlock> {
        self.extract_outside(lines, &[])
    }

    /// Like [`FreezeMarkers::extract`], but lines inside any of `skip` (code
    /// blocks, typically) are never read as markers.
    pub fn extract_outside<S: AsRef<str>>(&self, lines: &[S], skip: &[LineSpan]) -> Vec<FreezeBlock> {
        let mut open: Vec<(usize, Option<String>)> = Vec::new();
        let mut blocks = Vec::new();

        for (index, line) in lines.iter().enumerate() {
            let number = index + 1;
            if skip.iter().any(|span| span.contains_line(number)) {
                continue;
            }
            match self.parse_line(line.as_ref()) {
                Some(FreezeDirective::Freeze { reason }) => open.push((number, reason)),
                Some(FreezeDirective::Unfreeze) => match open.pop() {
                    Some((start_line, reason)) => {
                        blocks.push(build_block(lines, start_line, number, reason));
                    }
                    None => {
                        tracing::debug!(line = number, token = %self.token, "unfreeze marker without an open freeze");
                    }
                },
                None => {}
            }
        }

        for (start_line, _) in &open {
            tracing::debug!(line = *start_line, token = %self.token, "freeze marker never closed");
        }

        blocks.sort_by_key(|b| b.start_line);
        blocks
    }
}

impl Default for FreezeMarkers {
    fn default() -> Self {
        FreezeMarkers::new(DEFAULT_FREEZE_TOKEN)
    }
}

fn build_block<S: AsRef<str>>(
    lines: &[S],
    start_line: usize,
    end_line: usize,
    reason: Option<String>,
) -> FreezeBlock {
    let join = |from: usize, to: usize| -> String {
        if from > to {
            return String::new();
        }
        lines[from - 1..to]
            .iter()
            .map(|l| l.as_ref())
            .collect::<Vec<_>>()
            .join("\n")
    };

    FreezeBlock {
        start_line,
        end_line,
        content: join(start_line + 1, end_line - 1),
        reason,
        start_marker: lines[start_line - 1].as_ref().to_string(),
        end_marker: lines[end_line - 1].as_ref().to_string(),
        text: join(start_line, end_line),
    }
}

/// Drop freeze blocks that do not line up with top-level block boundaries:
/// markers inside a parsed block (an indented list item, a block quote) or
/// a pair straddling one. The enclosing block already reproduces those
/// lines, so keeping the freeze block would emit them twice.
pub(crate) fn drop_misaligned(blocks: Vec<FreezeBlock>, nodes: &[BlockNode]) -> Vec<FreezeBlock> {
    blocks
        .into_iter()
        .filter(|block| {
            let span = block.span();
            let crossing = nodes
                .iter()
                .filter_map(|n| n.span)
                .find(|s| s.overlaps(&span) && !span.covers(s));
            match crossing {
                Some(node_span) => {
                    tracing::debug!(
                        line = block.start_line,
                        node = %node_span,
                        "freeze markers inside a parsed block, ignoring"
                    );
                    false
                }
                None => true,
            }
        })
        .collect()
}

/// Interleave parsed nodes and freeze blocks into a statement sequence.
///
/// Freeze blocks are emitted before the first node that starts after them.
/// Nodes lying entirely inside a freeze span are represented only by that
/// freeze block, and a freeze block nested inside an earlier one is dropped
/// so no line is emitted twice.
pub(crate) fn integrate(nodes: &[BlockNode], blocks: &[FreezeBlock]) -> Vec<StatementRef> {
    let mut statements = Vec::with_capacity(nodes.len() + blocks.len());
    let mut next_block = 0;
    let mut last_frozen: Option<LineSpan> = None;

    let mut flush = |until: Option<usize>, statements: &mut Vec<StatementRef>| {
        while next_block < blocks.len() {
            let block = &blocks[next_block];
            if until.is_some_and(|line| block.start_line >= line) {
                break;
            }
            let span = block.span();
            if last_frozen.is_some_and(|outer| outer.covers(&span)) {
                tracing::debug!(line = block.start_line, "freeze block nested inside another, skipping");
            } else {
                statements.push(StatementRef::Freeze(next_block));
                last_frozen = Some(span);
            }
            next_block += 1;
        }
    };

    for (index, node) in nodes.iter().enumerate() {
        let Some(span) = node.span else {
            statements.push(StatementRef::Node(index));
            continue;
        };
        flush(Some(span.start), &mut statements);
        if blocks.iter().any(|b| b.span().covers(&span)) {
            continue;
        }
        statements.push(StatementRef::Node(index));
    }
    flush(None, &mut statements);

    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::BlockKind;
    use crate::parser::{CmarkBackend, MarkdownBackend};

    fn lines(source: &str) -> Vec<&str> {
        source.split('\n').collect()
    }

    #[test]
    fn parses_markers() {
        let markers = FreezeMarkers::new("merge");
        assert_eq!(
            markers.parse_line("<!-- merge:freeze -->"),
            Some(FreezeDirective::Freeze { reason: None })
        );
        assert_eq!(
            markers.parse_line("  <!--merge:freeze   keep local badges  -->  "),
            Some(FreezeDirective::Freeze {
                reason: Some("keep local badges".into())
            })
        );
        assert_eq!(
            markers.parse_line("<!-- merge:unfreeze -->"),
            Some(FreezeDirective::Unfreeze)
        );
        assert_eq!(markers.parse_line("<!-- other:freeze -->"), None);
        assert_eq!(markers.parse_line("<!-- merge:freezer -->"), None);
        assert_eq!(markers.parse_line("text <!-- merge:freeze -->"), None);
    }

    #[test]
    fn extracts_block_with_reason() {
        let src = "# Title\n<!-- merge:freeze custom -->\nKept\nAlso kept\n<!-- merge:unfreeze -->\n";
        let blocks = FreezeMarkers::default().extract(&lines(src));
        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert_eq!((block.start_line, block.end_line), (2, 5));
        assert_eq!(block.content, "Kept\nAlso kept");
        assert_eq!(block.reason.as_deref(), Some("custom"));
        assert_eq!(block.start_marker, "<!-- merge:freeze custom -->");
        assert_eq!(
            block.text,
            "<!-- merge:freeze custom -->\nKept\nAlso kept\n<!-- merge:unfreeze -->"
        );
    }

    #[test]
    fn unmatched_markers_are_ignored() {
        let src = "<!-- merge:unfreeze -->\ntext\n<!-- merge:freeze -->\nmore\n";
        assert!(FreezeMarkers::default().extract(&lines(src)).is_empty());
    }

    #[test]
    fn nested_blocks_pop_innermost_first() {
        let src = "<!-- merge:freeze -->\na\n<!-- merge:freeze -->\nb\n<!-- merge:unfreeze -->\nc\n<!-- merge:unfreeze -->";
        let blocks = FreezeMarkers::default().extract(&lines(src));
        assert_eq!(blocks.len(), 2);
        assert_eq!((blocks[0].start_line, blocks[0].end_line), (1, 7));
        assert_eq!((blocks[1].start_line, blocks[1].end_line), (3, 5));
        assert_eq!(blocks[0].content, "a\n<!-- merge:freeze -->\nb\n<!-- merge:unfreeze -->\nc");
    }

    #[test]
    fn empty_block_has_empty_content() {
        let blocks =
            FreezeMarkers::default().extract(&lines("<!-- merge:freeze -->\n<!-- merge:unfreeze -->"));
        assert_eq!(blocks[0].content, "");
    }

    #[test]
    fn integration_suppresses_frozen_nodes() {
        let src = "# Title\n\n<!-- merge:freeze -->\nKept\n<!-- merge:unfreeze -->\n\nAfter.\n";
        let nodes = CmarkBackend::default().parse(src).unwrap();
        let blocks = FreezeMarkers::default().extract(&lines(src));
        let statements = integrate(&nodes, &blocks);
        assert_eq!(
            statements,
            vec![
                StatementRef::Node(0),
                StatementRef::Freeze(0),
                StatementRef::Node(nodes.len() - 1),
            ]
        );
    }

    fn code_spans(nodes: &[BlockNode]) -> Vec<LineSpan> {
        nodes
            .iter()
            .filter(|n| n.kind() == BlockKind::CodeBlock)
            .filter_map(|n| n.span)
            .collect()
    }

    #[test]
    fn markers_in_code_blocks_are_not_read() {
        let src = "# Usage\n\n```markdown\n<!-- merge:freeze -->\nKept\n<!-- merge:unfreeze -->\n```\n";
        let nodes = CmarkBackend::default().parse(src).unwrap();
        let markers = FreezeMarkers::default();
        assert_eq!(markers.extract(&lines(src)).len(), 1);
        assert!(markers.extract_outside(&lines(src), &code_spans(&nodes)).is_empty());
    }

    #[test]
    fn code_sample_does_not_close_a_real_block() {
        let src = "<!-- merge:freeze -->\n```\n<!-- merge:unfreeze -->\n```\n<!-- merge:unfreeze -->\n";
        let nodes = CmarkBackend::default().parse(src).unwrap();
        let blocks = FreezeMarkers::default().extract_outside(&lines(src), &code_spans(&nodes));
        assert_eq!(blocks.len(), 1);
        assert_eq!((blocks[0].start_line, blocks[0].end_line), (1, 5));
    }

    #[test]
    fn markers_inside_list_item_are_dropped() {
        let src = "- item\n  <!-- merge:freeze -->\n  kept\n  <!-- merge:unfreeze -->\n- other\n";
        let nodes = CmarkBackend::default().parse(src).unwrap();
        let blocks = FreezeMarkers::default().extract(&lines(src));
        assert_eq!(blocks.len(), 1);

        let blocks = drop_misaligned(blocks, &nodes);
        assert!(blocks.is_empty());
        assert_eq!(integrate(&nodes, &blocks), vec![StatementRef::Node(0)]);
    }

    #[test]
    fn markers_straddling_a_block_are_dropped() {
        let src = "<!-- merge:freeze -->\n<div>\nstuff\n<!-- merge:unfreeze -->\nmore\n</div>\n";
        let nodes = CmarkBackend::default().parse(src).unwrap();
        let blocks = FreezeMarkers::default().extract(&lines(src));
        assert_eq!(blocks.len(), 1);
        assert!(drop_misaligned(blocks, &nodes).is_empty());
    }

    #[test]
    fn aligned_blocks_are_kept() {
        let src = "# Title\n\n<!-- merge:freeze -->\nKept\n<!-- merge:unfreeze -->\n";
        let nodes = CmarkBackend::default().parse(src).unwrap();
        let blocks = FreezeMarkers::default().extract(&lines(src));
        assert_eq!(drop_misaligned(blocks, &nodes).len(), 1);
    }

    #[test]
    fn integration_drops_nested_freeze_blocks() {
        let src = "<!-- merge:freeze -->\n<!-- merge:freeze -->\nb\n<!-- merge:unfreeze -->\n<!-- merge:unfreeze -->\n";
        let nodes = CmarkBackend::default().parse(src).unwrap();
        let blocks = FreezeMarkers::default().extract(&lines(src));
        assert_eq!(blocks.len(), 2);
        assert_eq!(integrate(&nodes, &blocks), vec![StatementRef::Freeze(0)]);
    }
}

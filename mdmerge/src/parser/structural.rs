use std::ops::Range;

use pulldown_cmark::{
    Alignment, CodeBlockKind, Event, HeadingLevel, Options, Parser as CmarkParser, Tag, TagEnd,
};

use crate::document::{ColumnAlignment, Document, DocumentNode, InlineNode};
use crate::node::{BlockNode, LineSpan};
use crate::signature::normalize_whitespace;

type Events<'a> = [(Event<'a>, Range<usize>)];

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse Markdown source text into its top-level blocks, ordered by line.
pub fn parse_nodes(source: &str, options: Options) -> Vec<BlockNode> {
    let parser = CmarkParser::new_ext(source, options);
    let events: Vec<(Event<'_>, Range<usize>)> = parser.into_offset_iter().collect();

    let mut state = ParseState::new(source);
    state.process_events(&events);
    state.finalize()
}

// ---------------------------------------------------------------------------
// Line index
// ---------------------------------------------------------------------------

/// Maps byte offsets to 1-based line numbers.
struct LineIndex<'a> {
    lines: Vec<&'a str>,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(source: &'a str) -> Self {
        let lines: Vec<&str> = source.split('\n').collect();
        let mut starts = Vec::with_capacity(lines.len());
        let mut offset = 0;
        for line in &lines {
            starts.push(offset);
            offset += line.len() + 1;
        }
        LineIndex { lines, starts }
    }

    fn len(&self) -> usize {
        self.lines.len()
    }

    fn line(&self, number: usize) -> &'a str {
        self.lines.get(number.wrapping_sub(1)).copied().unwrap_or("")
    }

    fn line_of(&self, offset: usize) -> usize {
        self.starts.partition_point(|&s| s <= offset).max(1)
    }

    fn is_blank(&self, number: usize) -> bool {
        self.line(number).trim().is_empty()
    }

    /// Lines covered by a byte range, with trailing blank lines dropped.
    fn span_of(&self, range: &Range<usize>) -> LineSpan {
        let start = self.line_of(range.start);
        let mut end = if range.end > range.start {
            self.line_of(range.end - 1)
        } else {
            start
        };
        while end > start && self.is_blank(end) {
            end -= 1;
        }
        LineSpan::new(start, end)
    }
}

// ---------------------------------------------------------------------------
// Parse state
// ---------------------------------------------------------------------------

struct ParseState<'a> {
    source: &'a str,
    lines: LineIndex<'a>,
    /// Completed top-level nodes, in event order.
    nodes: Vec<BlockNode>,
}

impl<'a> ParseState<'a> {
    fn new(source: &'a str) -> Self {
        ParseState {
            source,
            lines: LineIndex::new(source),
            nodes: Vec::new(),
        }
    }

    fn process_events(&mut self, events: &Events<'_>) {
        let mut i = 0;

        while i < events.len() {
            let (ref ev, ref range) = events[i];

            match ev {
                Event::Start(tag) => {
                    i += 1;
                    let content = self.collect_block(events, &mut i, tag, range);
                    self.push_node(content, range);
                }

                Event::Rule => {
                    self.push_node(DocumentNode::HorizontalRule, range);
                    i += 1;
                }

                _ => {
                    i += 1;
                }
            }
        }
    }

    fn push_node(&mut self, content: DocumentNode, range: &Range<usize>) {
        let span = self.lines.span_of(range);
        self.nodes.push(BlockNode::new(content, span));
    }

    /// Collect one block whose Start event has already been consumed.
    fn collect_block(
        &self,
        events: &Events<'_>,
        i: &mut usize,
        tag: &Tag<'_>,
        range: &Range<usize>,
    ) -> DocumentNode {
        match tag {
            Tag::Paragraph => {
                let inlines = self.collect_inlines(events, i, &|e| matches!(e, TagEnd::Paragraph));
                DocumentNode::Paragraph(inlines)
            }

            Tag::Heading { level, .. } => {
                let content =
                    self.collect_inlines(events, i, &|e| matches!(e, TagEnd::Heading(_)));
                DocumentNode::Heading {
                    level: heading_level_to_u8(level),
                    content,
                }
            }

            Tag::CodeBlock(kind) => {
                let language = match kind {
                    CodeBlockKind::Fenced(info) => {
                        // Only the first word of the info string names the language.
                        let lang = info.split_whitespace().next().unwrap_or("").to_string();
                        if lang.is_empty() { None } else { Some(lang) }
                    }
                    CodeBlockKind::Indented => None,
                };
                let content = collect_text_until(events, i, |e| matches!(e, TagEnd::CodeBlock));
                DocumentNode::CodeBlock { language, content }
            }

            Tag::BlockQuote(_) => {
                let inner =
                    self.collect_document(events, i, &|e| matches!(e, TagEnd::BlockQuote(_)));
                DocumentNode::Blockquote(inner)
            }

            Tag::List(start) => self.collect_list(events, i, *start),

            Tag::Table(alignments) => {
                let alignments: Vec<ColumnAlignment> = alignments
                    .iter()
                    .map(|a| match a {
                        Alignment::None => ColumnAlignment::None,
                        Alignment::Left => ColumnAlignment::Left,
                        Alignment::Center => ColumnAlignment::Center,
                        Alignment::Right => ColumnAlignment::Right,
                    })
                    .collect();
                let (headers, rows) = self.collect_table(events, i);
                DocumentNode::Table {
                    alignments,
                    headers,
                    rows,
                }
            }

            Tag::HtmlBlock => {
                let raw = collect_text_until(events, i, |e| matches!(e, TagEnd::HtmlBlock));
                DocumentNode::HtmlBlock(raw)
            }

            Tag::FootnoteDefinition(label) => {
                let content =
                    self.collect_document(events, i, &|e| matches!(e, TagEnd::FootnoteDefinition));
                DocumentNode::FootnoteDefinition {
                    label: label.to_string(),
                    content,
                }
            }

            Tag::MetadataBlock(_) => {
                skip_to_end(events, i);
                DocumentNode::Other {
                    kind: "front_matter".to_string(),
                    raw: self.raw_text(range),
                }
            }

            Tag::DefinitionList => {
                skip_to_end(events, i);
                DocumentNode::Other {
                    kind: "definition_list".to_string(),
                    raw: self.raw_text(range),
                }
            }

            _ => {
                skip_to_end(events, i);
                DocumentNode::Other {
                    kind: "other".to_string(),
                    raw: self.raw_text(range),
                }
            }
        }
    }

    /// Collect nested blocks (block quote, list item, footnote body) until a
    /// matching End tag. Tight list items carry bare inline events, which
    /// become a paragraph.
    fn collect_document(
        &self,
        events: &Events<'_>,
        i: &mut usize,
        is_end: &dyn Fn(&TagEnd) -> bool,
    ) -> Document {
        let mut nodes = Vec::new();

        while *i < events.len() {
            let (ref ev, ref range) = events[*i];
            match ev {
                Event::End(tag_end) if is_end(tag_end) => {
                    *i += 1;
                    break;
                }
                Event::Start(tag) if is_block_tag(tag) => {
                    *i += 1;
                    nodes.push(self.collect_block(events, i, tag, range));
                }
                Event::Rule => {
                    nodes.push(DocumentNode::HorizontalRule);
                    *i += 1;
                }
                _ => {
                    let inlines = self.collect_tight_inlines(events, i);
                    if inlines.is_empty() {
                        *i += 1;
                    } else {
                        nodes.push(DocumentNode::Paragraph(inlines));
                    }
                }
            }
        }

        Document { nodes }
    }

    fn collect_list(&self, events: &Events<'_>, i: &mut usize, start: Option<u64>) -> DocumentNode {
        let mut items = Vec::new();

        while *i < events.len() {
            let (ref ev, _) = events[*i];
            match ev {
                Event::End(TagEnd::List(_)) => {
                    *i += 1;
                    break;
                }
                Event::Start(Tag::Item) => {
                    *i += 1;
                    items.push(self.collect_document(events, i, &|e| matches!(e, TagEnd::Item)));
                }
                _ => {
                    *i += 1;
                }
            }
        }

        match start {
            Some(start) => DocumentNode::OrderedList { start, items },
            None => DocumentNode::UnorderedList { items },
        }
    }

    /// Collect inline nodes until a matching End tag.
    fn collect_inlines(
        &self,
        events: &Events<'_>,
        i: &mut usize,
        is_end: &dyn Fn(&TagEnd) -> bool,
    ) -> Vec<InlineNode> {
        let mut inlines = Vec::new();

        while *i < events.len() {
            if let Event::End(tag_end) = &events[*i].0 {
                if is_end(tag_end) {
                    *i += 1;
                    break;
                }
            }
            match self.collect_inline(events, i) {
                Some(node) => inlines.push(node),
                None => *i += 1,
            }
        }

        inlines
    }

    /// Collect consecutive inline events, stopping at the first event that
    /// is not inline (without consuming it).
    fn collect_tight_inlines(&self, events: &Events<'_>, i: &mut usize) -> Vec<InlineNode> {
        let mut inlines = Vec::new();
        while *i < events.len() {
            match self.collect_inline(events, i) {
                Some(node) => inlines.push(node),
                None => break,
            }
        }
        inlines
    }

    /// Collect a single inline node starting at `events[*i]`. Returns `None`
    /// and leaves `i` untouched if the event is not inline content.
    fn collect_inline(&self, events: &Events<'_>, i: &mut usize) -> Option<InlineNode> {
        let (ref ev, _) = events[*i];
        let node = match ev {
            Event::Text(s) => InlineNode::Text(s.to_string()),
            Event::Code(s) => InlineNode::CodeSpan(s.to_string()),
            Event::InlineMath(s) => InlineNode::Text(format!("${}$", s)),
            Event::DisplayMath(s) => InlineNode::Text(format!("$${}$$", s)),
            Event::InlineHtml(s) | Event::Html(s) => InlineNode::Html(s.to_string()),
            Event::FootnoteReference(s) => InlineNode::FootnoteReference(s.to_string()),
            Event::TaskListMarker(checked) => InlineNode::TaskMarker(*checked),
            Event::SoftBreak => InlineNode::SoftBreak,
            Event::HardBreak => InlineNode::HardBreak,
            Event::Start(Tag::Strong) => {
                *i += 1;
                let children = self.collect_inlines(events, i, &|e| matches!(e, TagEnd::Strong));
                return Some(InlineNode::Strong(children));
            }
            Event::Start(Tag::Emphasis) => {
                *i += 1;
                let children = self.collect_inlines(events, i, &|e| matches!(e, TagEnd::Emphasis));
                return Some(InlineNode::Emphasis(children));
            }
            Event::Start(Tag::Strikethrough) => {
                *i += 1;
                let children =
                    self.collect_inlines(events, i, &|e| matches!(e, TagEnd::Strikethrough));
                return Some(InlineNode::Strikethrough(children));
            }
            Event::Start(Tag::Link { dest_url, title, .. }) => {
                let dest = dest_url.to_string();
                let title = title.to_string();
                *i += 1;
                let content = self.collect_inlines(events, i, &|e| matches!(e, TagEnd::Link));
                return Some(InlineNode::Link {
                    dest,
                    title,
                    content,
                });
            }
            Event::Start(Tag::Image { dest_url, title, .. }) => {
                let dest = dest_url.to_string();
                let title = title.to_string();
                *i += 1;
                let alt = self.collect_inlines(events, i, &|e| matches!(e, TagEnd::Image));
                return Some(InlineNode::Image { dest, title, alt });
            }
            _ => return None,
        };
        *i += 1;
        Some(node)
    }

    /// Collect table headers and rows.
    fn collect_table(
        &self,
        events: &Events<'_>,
        i: &mut usize,
    ) -> (Vec<Vec<InlineNode>>, Vec<Vec<Vec<InlineNode>>>) {
        let mut headers: Vec<Vec<InlineNode>> = Vec::new();
        let mut rows: Vec<Vec<Vec<InlineNode>>> = Vec::new();
        let mut in_head = false;
        let mut current_row: Vec<Vec<InlineNode>> = Vec::new();

        while *i < events.len() {
            let (ref ev, _) = events[*i];
            match ev {
                Event::End(TagEnd::Table) => {
                    *i += 1;
                    break;
                }
                Event::Start(Tag::TableHead) => {
                    in_head = true;
                    current_row = Vec::new();
                    *i += 1;
                }
                Event::End(TagEnd::TableHead) => {
                    in_head = false;
                    headers = std::mem::take(&mut current_row);
                    *i += 1;
                }
                Event::Start(Tag::TableRow) => {
                    current_row = Vec::new();
                    *i += 1;
                }
                Event::End(TagEnd::TableRow) => {
                    if !in_head {
                        rows.push(std::mem::take(&mut current_row));
                    }
                    *i += 1;
                }
                Event::Start(Tag::TableCell) => {
                    *i += 1;
                    let cell = self.collect_inlines(events, i, &|e| matches!(e, TagEnd::TableCell));
                    current_row.push(cell);
                }
                _ => {
                    *i += 1;
                }
            }
        }

        (headers, rows)
    }

    fn raw_text(&self, range: &Range<usize>) -> String {
        self.source
            .get(range.clone())
            .unwrap_or_default()
            .trim_end_matches(['\n', '\r'])
            .to_string()
    }

    /// Turn source lines no parsed block covers into blocks of their own, then
    /// order everything by line. pulldown-cmark emits no events for link
    /// reference definitions; without this they would vanish from a merge.
    fn finalize(mut self) -> Vec<BlockNode> {
        let mut covered = vec![false; self.lines.len() + 1];
        for span in self.nodes.iter().filter_map(|n| n.span) {
            for line in span.start..=span.end.min(self.lines.len()) {
                covered[line] = true;
            }
        }

        let mut runs: Vec<(LineSpan, Option<String>)> = Vec::new();
        let mut current: Option<(LineSpan, Option<String>)> = None;

        for line in 1..=self.lines.len() {
            if covered[line] || self.lines.is_blank(line) {
                runs.extend(current.take());
                continue;
            }
            match link_definition_label(self.lines.line(line)) {
                Some(label) => {
                    runs.extend(current.take());
                    current = Some((LineSpan::new(line, line), Some(label)));
                }
                None => match current.as_mut() {
                    Some((span, _)) => span.end = line,
                    None => current = Some((LineSpan::new(line, line), None)),
                },
            }
        }
        runs.extend(current.take());

        if !runs.is_empty() {
            tracing::debug!(count = runs.len(), "captured source lines without parser events");
        }

        for (span, label) in runs {
            let raw = (span.start..=span.end)
                .map(|l| self.lines.line(l))
                .collect::<Vec<_>>()
                .join("\n");
            let content = match label {
                Some(label) => DocumentNode::LinkDefinition { label, raw },
                None => DocumentNode::Other {
                    kind: "raw".to_string(),
                    raw,
                },
            };
            self.nodes.push(BlockNode::new(content, span));
        }

        self.nodes.sort_by_key(|n| n.start_line());
        self.nodes
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn heading_level_to_u8(level: &HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn is_block_tag(tag: &Tag<'_>) -> bool {
    matches!(
        tag,
        Tag::Paragraph
            | Tag::Heading { .. }
            | Tag::CodeBlock(_)
            | Tag::BlockQuote(_)
            | Tag::List(_)
            | Tag::Table(_)
            | Tag::HtmlBlock
            | Tag::FootnoteDefinition(_)
            | Tag::MetadataBlock(_)
            | Tag::DefinitionList
    )
}

/// Collect all text content until a matching End tag.
fn collect_text_until(
    events: &Events<'_>,
    i: &mut usize,
    is_end: impl Fn(&TagEnd) -> bool,
) -> String {
    let mut text = String::new();
    while *i < events.len() {
        let (ref ev, _) = events[*i];
        match ev {
            Event::End(tag_end) if is_end(tag_end) => {
                *i += 1;
                break;
            }
            Event::Text(s) | Event::Html(s) => {
                text.push_str(s);
                *i += 1;
            }
            _ => {
                *i += 1;
            }
        }
    }
    text
}

/// Skip past the End event that closes an already-consumed Start.
fn skip_to_end(events: &Events<'_>, i: &mut usize) {
    let mut depth = 1usize;
    while *i < events.len() {
        match events[*i].0 {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    *i += 1;
                    return;
                }
            }
            _ => {}
        }
        *i += 1;
    }
}

/// Label of a `[label]: destination` line, if the line starts one.
fn link_definition_label(line: &str) -> Option<String> {
    let rest = line.trim_start_matches(' ');
    if line.len() - rest.len() > 3 {
        return None;
    }
    let rest = rest.strip_prefix('[')?;
    let close = rest.find("]:")?;
    let label = &rest[..close];
    if label.trim().is_empty() || label.starts_with('^') {
        return None;
    }
    Some(normalize_whitespace(label))
}

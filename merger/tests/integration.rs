use std::sync::Arc;

use mdmerge::document::{ColumnAlignment, Document, DocumentNode, InlineNode};
use mdmerge::{
    AnalysisOptions, BlockKind, BlockNode, FileAnalysis, LineSpan, MarkdownBackend, ParseError,
    Signature, SignatureGenerator, SignatureOverride, Statement,
};
use merger::{
    AlignmentEntry, Decision, FileAligner, MergeError, MergeOptions, Preference, Side,
    SmartMerger, TableMatchRefiner,
};

const FROZEN: &str = "<!-- merge:freeze -->\nKept\n<!-- merge:unfreeze -->";

fn merge(template: &str, destination: &str, options: MergeOptions) -> String {
    SmartMerger::new(template, destination, options)
        .merge_content()
        .expect("merge failed")
}

fn all_options() -> Vec<MergeOptions> {
    let mut out = Vec::new();
    for preference in [Preference::Template, Preference::Destination] {
        for add in [false, true] {
            out.push(
                MergeOptions::default()
                    .preference(preference)
                    .add_template_only_nodes(add),
            );
        }
    }
    out
}

#[test]
fn destination_content_wins_by_default() {
    let output = merge(
        "# Title\n\nTemplate content.\n",
        "# Title\n\nDestination content.\n",
        MergeOptions::default(),
    );
    assert!(output.contains("# Title"));
    assert!(output.contains("Destination content."));
    assert!(!output.contains("Template content."));
}

#[test]
fn freeze_block_survives_any_preference() {
    let template = "# Title\n\nCompletely different.\n\n## Other\n";
    let destination = format!("# Title\n\n{FROZEN}\n\nTrailing.\n");
    for options in all_options() {
        let output = merge(template, &destination, options);
        assert!(output.contains(FROZEN), "freeze block altered:\n{output}");
        assert!(output.contains("Kept"));
    }
}

#[test]
fn freeze_block_is_byte_identical() {
    let block = "<!-- merge:freeze local edits -->\n##   Odd   heading\n\n\n\ntext with trailing   \n<!-- merge:unfreeze -->";
    let destination = format!("# Doc\n\n{block}\n");
    let template = "# Doc\n\n## Odd heading\n\nUpstream text.\n";

    let result = SmartMerger::new(
        template,
        destination.as_str(),
        MergeOptions::default()
            .preference(Preference::Template)
            .add_template_only_nodes(true),
    )
    .merge()
    .unwrap();

    assert!(result.content.contains(block));
    assert_eq!(result.stats.frozen, 1);
    assert_eq!(result.frozen_blocks.len(), 1);
    let info = &result.frozen_blocks[0];
    assert_eq!(info.side, Side::Destination);
    assert_eq!((info.start_line, info.end_line), (3, 9));
    assert_eq!(info.reason.as_deref(), Some("local edits"));
}

#[test]
fn duplicate_headings_align_pairwise() {
    let template = FileAnalysis::parse("# Heading\n\nFirst.\n\n# Heading\n\nSecond.\n").unwrap();
    let destination = FileAnalysis::parse("# Heading\n").unwrap();
    let entries = FileAligner::new().align(&template, &destination);

    let is_heading = |i: usize| {
        template
            .statement(i)
            .and_then(|s| s.as_node())
            .is_some_and(|n| n.kind() == BlockKind::Heading)
    };
    let heading_matches = entries
        .iter()
        .filter(|e| matches!(e, AlignmentEntry::Match { .. }))
        .count();
    let heading_template_only = entries
        .iter()
        .filter_map(|e| match e {
            AlignmentEntry::TemplateOnly { template_index } => Some(*template_index),
            _ => None,
        })
        .filter(|&t| is_heading(t))
        .count();

    assert_eq!(heading_matches, 1);
    assert_eq!(heading_template_only, 1);
    assert_eq!(
        entries[0],
        AlignmentEntry::Match {
            template_index: 0,
            dest_index: 0
        }
    );
}

#[test]
fn empty_template_keeps_destination() {
    let destination = "# Notes\n\nSome text.\n\n- one\n- two\n";
    let template = FileAnalysis::parse("").unwrap();
    let dest = FileAnalysis::parse(destination).unwrap();
    let entries = FileAligner::new().align(&template, &dest);
    assert_eq!(entries.len(), 3);
    assert!(
        entries
            .iter()
            .all(|e| matches!(e, AlignmentEntry::DestOnly { .. }))
    );

    assert_eq!(merge("", destination, MergeOptions::default()), destination);
}

#[test]
fn empty_destination_with_template_only_nodes() {
    let template = "# Guide\n\nIntro.\n";
    assert_eq!(merge(template, "", MergeOptions::default()), "");
    assert_eq!(
        merge(template, "", MergeOptions::default().add_template_only_nodes(true)),
        template
    );
}

#[test]
fn template_preference_takes_template_text() {
    let template = "# Title\n\n~~~rust\nfn main() {}\n~~~\n";
    let destination = "# Title\n\n```rust\nfn main() {}\n```\n";

    let output = merge(
        template,
        destination,
        MergeOptions::default().preference(Preference::Template),
    );
    assert_eq!(output, template);

    let output = merge(template, destination, MergeOptions::default());
    assert_eq!(output, destination);
}

#[test]
fn destination_only_statements_are_never_dropped() {
    let template = "# Title\n\n## Install\n\nRun `make`.\n";
    let destination =
        "# Title\n\nLocal notes.\n\n## Install\n\nCustom steps.\n\n[docs]: https://example.com\n";
    for options in all_options() {
        let output = merge(template, destination, options);
        assert!(output.contains("Local notes."));
        assert!(output.contains("Custom steps."));
        assert!(output.contains("[docs]: https://example.com"));
    }
}

#[test]
fn template_only_nodes_require_opt_in() {
    let template = "# Title\n\n## Install\n\nRun `make`.\n";
    let destination = "# Title\n\nLocal notes.\n";

    let skipped = SmartMerger::new(template, destination, MergeOptions::default())
        .merge()
        .unwrap();
    assert_eq!(skipped.content, destination);
    assert_eq!(skipped.stats.nodes_skipped, 2);
    assert_eq!(skipped.stats.nodes_added, 0);

    let added = SmartMerger::new(
        template,
        destination,
        MergeOptions::default().add_template_only_nodes(true),
    )
    .merge()
    .unwrap();
    assert_eq!(
        added.content,
        "# Title\n\nLocal notes.\n\n## Install\n\nRun `make`.\n"
    );
    assert_eq!(added.stats.nodes_added, 2);
}

#[test]
fn merging_is_idempotent() {
    let template = "# Title\n\n## Install\n\nRun `make`.\n";
    let destination = "# Title\n\nLocal notes.\n\n## Install\n\nCustom steps.\n";
    for options in all_options() {
        let once = merge(template, destination, options.clone());
        let twice = merge(template, &once, options);
        assert_eq!(once, twice);
    }
}

#[test]
fn merging_a_document_with_itself_is_identity() {
    let doc = r##"---
title: Demo
---

# Demo

Intro with a note[^1] and [a link][docs].

## Build

```sh
make all
```

| Name | Value |
|------|-------|
| a    | 1     |

> Quoted text
> over two lines.

- first
  <!-- merge:freeze -->
  kept in the item
  <!-- merge:unfreeze -->
- second

1. one
2. two

***

<div>
html block
</div>

<!-- merge:freeze local -->
## Frozen

Local text.
<!-- merge:unfreeze -->

```markdown
<!-- merge:freeze -->
sample
<!-- merge:unfreeze -->
```

[^1]: The footnote.

[docs]: https://example.com
"##;
    let analysis = FileAnalysis::parse(doc).unwrap();
    assert_eq!(analysis.freeze_blocks().len(), 1);

    for options in all_options() {
        assert_eq!(merge(doc, doc, options), doc);
    }
}

#[test]
fn markers_inside_other_blocks_are_plain_content() {
    let docs = [
        "# Usage\n\n```markdown\n<!-- merge:freeze -->\nKept\n<!-- merge:unfreeze -->\n```\n",
        "- item\n  <!-- merge:freeze -->\n  kept\n  <!-- merge:unfreeze -->\n- other\n",
    ];
    for doc in docs {
        assert!(FileAnalysis::parse(doc).unwrap().freeze_blocks().is_empty());
        for options in all_options() {
            assert_eq!(merge(doc, doc, options.clone()), doc);
            let once = merge("# Usage\n", doc, options.clone());
            assert_eq!(merge("# Usage\n", &once, options), once);
        }
    }
}

#[test]
fn matching_ignores_heading_whitespace() {
    let output = merge(
        "#   Getting    Started\n",
        "# Getting Started\n",
        MergeOptions::default(),
    );
    assert_eq!(output, "# Getting Started\n");
}

#[test]
fn custom_generator_overrides_matching() {
    let any_heading: SignatureGenerator =
        Arc::new(|statement: &Statement<'_>| {
            match statement.as_node().map(BlockNode::kind) {
                Some(BlockKind::Heading) => {
                    SignatureOverride::Use(Signature::Custom(vec!["heading".to_string()]))
                }
                Some(BlockKind::Paragraph) => SignatureOverride::Unmatchable,
                _ => SignatureOverride::Default,
            }
        });
    let options = MergeOptions::default()
        .preference(Preference::Template)
        .add_template_only_nodes(true)
        .signature_generator(any_heading);

    let output = merge("# Alpha\n\nSame.\n", "# Beta\n\nSame.\n", options);
    assert!(output.starts_with("# Alpha\n"));
    assert!(!output.contains("Beta"));
    assert_eq!(output.matches("Same.").count(), 2);
}

#[test]
fn custom_freeze_token() {
    let destination = "# Doc\n\n<!-- sync:freeze -->\nPinned.\n<!-- sync:unfreeze -->\n";
    let result = SmartMerger::new(
        "# Doc\n",
        destination,
        MergeOptions::default().freeze_token("sync"),
    )
    .merge()
    .unwrap();
    assert_eq!(result.stats.frozen, 1);
    assert_eq!(result.content, destination);
}

#[test]
fn table_refiner_matches_grown_tables() {
    let template = "| Name | Value |\n|---|---|\n| a | 1 |\n";
    let destination = "| Name | Value |\n|---|---|\n| a | 1 |\n| b | 2 |\n";

    let plain = merge(
        template,
        destination,
        MergeOptions::default()
            .preference(Preference::Template)
            .add_template_only_nodes(true),
    );
    assert_eq!(plain.matches("| Name | Value |").count(), 2);

    let refined = merge(
        template,
        destination,
        MergeOptions::default()
            .preference(Preference::Template)
            .add_template_only_nodes(true)
            .match_refiner(Arc::new(TableMatchRefiner::default())),
    );
    assert_eq!(refined, template);
}

#[test]
fn decisions_are_reported_in_output_order() {
    let result = SmartMerger::new(
        "# A\n\nNew.\n",
        format!("# A\n\n{FROZEN}\n"),
        MergeOptions::default(),
    )
    .merge()
    .unwrap();
    let decisions: Vec<Decision> = result.decisions.iter().map(|d| d.decision).collect();
    assert_eq!(
        decisions,
        vec![Decision::Destination, Decision::Frozen, Decision::Skipped]
    );
    assert_eq!(result.stats.to_map()["frozen"], 1);
}

/// Treats every non-blank line as an opaque block.
struct LineBackend;

impl MarkdownBackend for LineBackend {
    fn name(&self) -> &str {
        "lines"
    }

    fn parse(&self, source: &str) -> Result<Vec<BlockNode>, ParseError> {
        if let Some(offset) = source.find("BROKEN") {
            return Err(ParseError::error("cannot parse", offset..offset + 6));
        }
        Ok(source
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                BlockNode::new(
                    DocumentNode::Other {
                        kind: "line".to_string(),
                        raw: line.to_string(),
                    },
                    LineSpan::new(i + 1, i + 1),
                )
            })
            .collect())
    }
}

#[test]
fn injected_backend_is_used() {
    let output = SmartMerger::new("a\nb\n", "x\ny\nz\n", MergeOptions::default())
        .with_backend(Arc::new(LineBackend))
        .merge_content()
        .unwrap();
    // Opaque blocks pair by position, so the destination keeps its lines.
    assert_eq!(output, "x\n\ny\n\nz\n");
}

#[test]
fn parse_errors_name_the_failing_side() {
    let err = SmartMerger::new("BROKEN", "fine", MergeOptions::default())
        .with_backend(Arc::new(LineBackend))
        .merge()
        .unwrap_err();
    assert!(matches!(err, MergeError::TemplateParse(_)));
    assert_eq!(err.parse_error().span, 0..6);

    let err = SmartMerger::new("fine", "still BROKEN", MergeOptions::default())
        .with_backend(Arc::new(LineBackend))
        .merge()
        .unwrap_err();
    assert!(matches!(err, MergeError::DestinationParse(_)));
    assert_eq!(err.side(), Side::Destination);
}

#[test]
fn non_utf8_input_is_a_parse_error() {
    let err = SmartMerger::from_bytes(&[0x23, 0x20, 0xff], b"# ok\n", MergeOptions::default())
        .err()
        .unwrap();
    assert!(matches!(err, MergeError::TemplateParse(_)));
    assert!(err.to_string().starts_with("template parse error"));
}

#[test]
fn merger_is_shareable_across_threads() {
    let merger = Arc::new(SmartMerger::new(
        "# T\n\nTemplate.\n",
        "# T\n\nDestination.\n",
        MergeOptions::default().match_refiner(Arc::new(TableMatchRefiner::default())),
    ));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let merger = Arc::clone(&merger);
            std::thread::spawn(move || merger.merge_content().unwrap())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), "# T\n\nDestination.\n");
    }
}

fn text(s: &str) -> InlineNode {
    InlineNode::Text(s.to_string())
}

fn item(s: &str) -> Document {
    Document {
        nodes: vec![DocumentNode::Paragraph(vec![text(s)])],
    }
}

/// Builds nodes in memory instead of parsing, so none of them carry a span.
struct SyntheticBackend;

impl MarkdownBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn parse(&self, _source: &str) -> Result<Vec<BlockNode>, ParseError> {
        Ok(vec![
            BlockNode::synthetic(DocumentNode::Heading {
                level: 1,
                content: vec![text("Title")],
            }),
            BlockNode::synthetic(DocumentNode::Paragraph(vec![
                text("Body "),
                InlineNode::Strong(vec![text("bold")]),
            ])),
            BlockNode::synthetic(DocumentNode::UnorderedList {
                items: vec![item("a"), item("b")],
            }),
            BlockNode::synthetic(DocumentNode::Blockquote(item("quoted"))),
            BlockNode::synthetic(DocumentNode::Table {
                alignments: vec![ColumnAlignment::Left, ColumnAlignment::None],
                headers: vec![vec![text("A")], vec![text("B")]],
                rows: vec![vec![vec![text("1")], vec![text("2")]]],
            }),
            BlockNode::synthetic(DocumentNode::CodeBlock {
                language: Some("rust".to_string()),
                content: "fn main() {}\n".to_string(),
            }),
        ])
    }
}

#[test]
fn spanless_nodes_are_rendered_in_order() {
    let analysis = FileAnalysis::new("", &SyntheticBackend, &AnalysisOptions::default()).unwrap();
    let kinds: Vec<BlockKind> = analysis
        .statements()
        .map(|s| {
            assert!(s.span().is_none());
            s.as_node().map(BlockNode::kind).unwrap()
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            BlockKind::Heading,
            BlockKind::Paragraph,
            BlockKind::List,
            BlockKind::BlockQuote,
            BlockKind::Table,
            BlockKind::CodeBlock,
        ]
    );

    let expected = "# Title\n\nBody **bold**\n\n- a\n- b\n\n> quoted\n\n\
                    | A | B |\n|:---|---|\n| 1 | 2 |\n\n```rust\nfn main() {}\n```\n";
    for options in all_options() {
        let output = SmartMerger::new("", "", options)
            .with_backend(Arc::new(SyntheticBackend))
            .merge_content()
            .unwrap();
        assert_eq!(output, expected);
    }
}

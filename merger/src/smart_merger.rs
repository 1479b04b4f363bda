use std::sync::Arc;
use std::time::Instant;

use mdmerge::{CmarkBackend, FileAnalysis, MarkdownBackend, ParseError};

use crate::aligner::{AlignmentEntry, FileAligner};
use crate::error::{MergeError, Side};
use crate::options::MergeOptions;
use crate::resolver::{ConflictResolver, Decision};
use crate::result::{DecisionRecord, FrozenBlockInfo, MergeResult, MergeStats};

/// Merges a template document into a destination document.
///
/// ```
/// use merger::{MergeOptions, SmartMerger};
///
/// let template = "# Title\n\n## Install\n\nRun it.\n";
/// let destination = "# Title\n\nMy notes.\n";
/// let merged = SmartMerger::new(template, destination, MergeOptions::default())
///     .merge_content()
///     .unwrap();
/// assert_eq!(merged, "# Title\n\nMy notes.\n");
/// ```
pub struct SmartMerger {
    template: String,
    destination: String,
    options: MergeOptions,
    backend: Arc<dyn MarkdownBackend>,
}

impl SmartMerger {
    pub fn new(
        template: impl Into<String>,
        destination: impl Into<String>,
        options: MergeOptions,
    ) -> Self {
        let backend = Arc::new(CmarkBackend::new(options.parser_options));
        SmartMerger {
            template: template.into(),
            destination: destination.into(),
            options,
            backend,
        }
    }

    /// Like [`SmartMerger::new`], but for raw bytes. Input that is not valid
    /// UTF-8 is reported as a parse error of that side.
    pub fn from_bytes(
        template: &[u8],
        destination: &[u8],
        options: MergeOptions,
    ) -> Result<Self, MergeError> {
        let template = decode(template, Side::Template)?;
        let destination = decode(destination, Side::Destination)?;
        Ok(SmartMerger::new(template, destination, options))
    }

    /// Replace the Markdown backend used for both documents.
    pub fn with_backend(mut self, backend: Arc<dyn MarkdownBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    pub fn merge(&self) -> Result<MergeResult, MergeError> {
        let started = Instant::now();
        let analysis_options = self.options.analysis_options();

        let template = FileAnalysis::new(&self.template, self.backend.as_ref(), &analysis_options)
            .map_err(|e| MergeError::parse(Side::Template, e))?;
        let destination =
            FileAnalysis::new(&self.destination, self.backend.as_ref(), &analysis_options)
                .map_err(|e| MergeError::parse(Side::Destination, e))?;

        let entries = FileAligner::with_refiner(self.options.match_refiner.clone())
            .align(&template, &destination);
        let resolver =
            ConflictResolver::new(self.options.preference, self.options.add_template_only_nodes);

        let mut chunks: Vec<String> = Vec::new();
        let mut stats = MergeStats::default();
        let mut frozen_blocks = Vec::new();
        let mut decisions = Vec::with_capacity(entries.len());

        for entry in &entries {
            let resolution = resolver.resolve(entry, &template, &destination);
            let analysis = match resolution.source {
                Side::Template => &template,
                Side::Destination => &destination,
            };
            let index = match resolution.source {
                Side::Template => entry.template_index(),
                Side::Destination => entry.dest_index(),
            };
            let statement = index.and_then(|i| analysis.statement(i));

            match resolution.decision {
                Decision::Frozen => {
                    stats.frozen += 1;
                    if let Some(block) = statement.and_then(|s| s.as_freeze()) {
                        frozen_blocks.push(FrozenBlockInfo {
                            side: resolution.source,
                            start_line: block.start_line,
                            end_line: block.end_line,
                            reason: block.reason.clone(),
                        });
                    }
                }
                Decision::Template => {
                    let dest_text = entry.dest_index().and_then(|d| destination.statement_text(d));
                    if resolution.text != dest_text {
                        stats.nodes_modified += 1;
                    } else {
                        stats.nodes_preserved += 1;
                    }
                }
                Decision::Destination | Decision::DestinationOnly => stats.nodes_preserved += 1,
                Decision::TemplateOnly => stats.nodes_added += 1,
                Decision::Skipped => stats.nodes_skipped += 1,
            }

            decisions.push(DecisionRecord {
                entry: *entry,
                source: resolution.source,
                decision: resolution.decision,
                span: statement.and_then(|s| s.span()),
            });

            if let Some(text) = resolution.text {
                let chunk = match resolution.decision {
                    Decision::Frozen => text,
                    _ => text.trim_matches('\n').to_string(),
                };
                if !chunk.trim().is_empty() {
                    chunks.push(chunk);
                }
            }
        }

        let mut content = chunks.join("\n\n");
        if !content.is_empty() {
            content.push('\n');
        }

        stats.elapsed = started.elapsed();
        tracing::info!(
            entries = entries.len(),
            modified = stats.nodes_modified,
            added = stats.nodes_added,
            preserved = stats.nodes_preserved,
            skipped = stats.nodes_skipped,
            frozen = stats.frozen,
            "merge complete"
        );

        Ok(MergeResult {
            content,
            success: true,
            frozen_blocks,
            stats,
            decisions,
        })
    }

    /// Run the merge and return only the merged text.
    pub fn merge_content(&self) -> Result<String, MergeError> {
        self.merge().map(|result| result.content)
    }
}

fn decode(bytes: &[u8], side: Side) -> Result<String, MergeError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| MergeError::parse(side, ParseError::invalid_utf8(&e)))
}

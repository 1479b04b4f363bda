use std::fmt;

use mdmerge::{FileAnalysis, Statement};

use crate::aligner::AlignmentEntry;
use crate::error::Side;
use crate::options::Preference;

/// Why an entry's text ended up (or did not end up) in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// A freeze block; reproduced verbatim regardless of preference.
    Frozen,
    /// Matched pair, template text wins.
    Template,
    /// Matched pair, destination text wins.
    Destination,
    /// Unmatched template content, included on request.
    TemplateOnly,
    /// Unmatched destination content, always kept.
    DestinationOnly,
    /// Unmatched template content, left out.
    Skipped,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Decision::Frozen => "frozen",
            Decision::Template => "template",
            Decision::Destination => "destination",
            Decision::TemplateOnly => "template_only",
            Decision::DestinationOnly => "destination_only",
            Decision::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Outcome for one alignment entry. `text` is `None` when nothing is emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub source: Side,
    pub decision: Decision,
    pub text: Option<String>,
}

/// Decides each alignment entry's output text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver {
    preference: Preference,
    add_template_only_nodes: bool,
}

impl ConflictResolver {
    pub fn new(preference: Preference, add_template_only_nodes: bool) -> Self {
        ConflictResolver {
            preference,
            add_template_only_nodes,
        }
    }

    pub fn resolve(
        &self,
        entry: &AlignmentEntry,
        template: &FileAnalysis,
        destination: &FileAnalysis,
    ) -> Resolution {
        match *entry {
            AlignmentEntry::Match {
                template_index,
                dest_index,
            } => {
                let dest_statement = destination.statement(dest_index);
                let template_statement = template.statement(template_index);

                if dest_statement.is_some_and(|s| s.is_freeze()) {
                    return frozen(Side::Destination, dest_statement);
                }
                if template_statement.is_some_and(|s| s.is_freeze()) {
                    return frozen(Side::Template, template_statement);
                }

                match self.preference {
                    Preference::Template => Resolution {
                        source: Side::Template,
                        decision: Decision::Template,
                        text: template.statement_text(template_index),
                    },
                    Preference::Destination => Resolution {
                        source: Side::Destination,
                        decision: Decision::Destination,
                        text: destination.statement_text(dest_index),
                    },
                }
            }

            AlignmentEntry::TemplateOnly { template_index } => {
                if self.add_template_only_nodes {
                    Resolution {
                        source: Side::Template,
                        decision: Decision::TemplateOnly,
                        text: template.statement_text(template_index),
                    }
                } else {
                    Resolution {
                        source: Side::Template,
                        decision: Decision::Skipped,
                        text: None,
                    }
                }
            }

            AlignmentEntry::DestOnly { dest_index } => {
                let statement = destination.statement(dest_index);
                if statement.is_some_and(|s| s.is_freeze()) {
                    return frozen(Side::Destination, statement);
                }
                Resolution {
                    source: Side::Destination,
                    decision: Decision::DestinationOnly,
                    text: destination.statement_text(dest_index),
                }
            }
        }
    }
}

fn frozen(source: Side, statement: Option<Statement<'_>>) -> Resolution {
    Resolution {
        source,
        decision: Decision::Frozen,
        text: statement
            .and_then(|s| s.as_freeze())
            .map(|block| block.text.clone()),
    }
}

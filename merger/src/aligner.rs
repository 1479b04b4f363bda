use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use mdmerge::{FileAnalysis, Signature};

use crate::refiner::MatchRefiner;

/// One row of the correspondence between template and destination.
/// Indices point into each document's statement sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentEntry {
    Match {
        template_index: usize,
        dest_index: usize,
    },
    TemplateOnly {
        template_index: usize,
    },
    DestOnly {
        dest_index: usize,
    },
}

impl AlignmentEntry {
    pub fn template_index(&self) -> Option<usize> {
        match self {
            AlignmentEntry::Match { template_index, .. }
            | AlignmentEntry::TemplateOnly { template_index } => Some(*template_index),
            AlignmentEntry::DestOnly { .. } => None,
        }
    }

    pub fn dest_index(&self) -> Option<usize> {
        match self {
            AlignmentEntry::Match { dest_index, .. } | AlignmentEntry::DestOnly { dest_index } => {
                Some(*dest_index)
            }
            AlignmentEntry::TemplateOnly { .. } => None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, AlignmentEntry::Match { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            AlignmentEntry::Match { .. } => "match",
            AlignmentEntry::TemplateOnly { .. } => "template_only",
            AlignmentEntry::DestOnly { .. } => "dest_only",
        }
    }
}

/// Pairs the statements of two analyses by signature.
#[derive(Default, Clone)]
pub struct FileAligner {
    refiner: Option<Arc<dyn MatchRefiner>>,
}

impl FileAligner {
    pub fn new() -> Self {
        FileAligner::default()
    }

    pub fn with_refiner(refiner: Option<Arc<dyn MatchRefiner>>) -> Self {
        FileAligner { refiner }
    }

    /// Compute the ordered alignment.
    ///
    /// Each destination statement takes the earliest unconsumed template
    /// statement with an equal signature. The result follows template order;
    /// a destination-only entry is placed right after the entry of the
    /// nearest matched destination statement before it (or first, if there
    /// is none), and several such entries keep destination order.
    pub fn align(&self, template: &FileAnalysis, destination: &FileAnalysis) -> Vec<AlignmentEntry> {
        let mut candidates: HashMap<&Signature, VecDeque<usize>> = HashMap::new();
        for t in 0..template.len() {
            if let Some(signature) = template.signature(t) {
                candidates.entry(signature).or_default().push_back(t);
            }
        }

        let mut template_for_dest: Vec<Option<usize>> = vec![None; destination.len()];
        let mut consumed = vec![false; template.len()];

        for (d, slot) in template_for_dest.iter_mut().enumerate() {
            let Some(signature) = destination.signature(d) else {
                continue;
            };
            if let Some(t) = candidates.get_mut(signature).and_then(VecDeque::pop_front) {
                consumed[t] = true;
                *slot = Some(t);
            }
        }

        if let Some(refiner) = &self.refiner {
            self.apply_refiner(
                refiner.as_ref(),
                template,
                destination,
                &mut consumed,
                &mut template_for_dest,
            );
        }

        // Sort key: (anchor template index, tier, tiebreak). `None` anchors
        // sort before every template position.
        let mut keyed: Vec<((Option<usize>, u8, usize), AlignmentEntry)> =
            Vec::with_capacity(template.len() + destination.len());

        for (t, _) in consumed.iter().enumerate().filter(|(_, used)| !**used) {
            keyed.push((
                (Some(t), 0, t),
                AlignmentEntry::TemplateOnly { template_index: t },
            ));
        }

        let mut anchor: Option<usize> = None;
        for (d, matched) in template_for_dest.iter().enumerate() {
            match matched {
                Some(t) => {
                    keyed.push((
                        (Some(*t), 0, *t),
                        AlignmentEntry::Match {
                            template_index: *t,
                            dest_index: d,
                        },
                    ));
                    anchor = Some(*t);
                }
                None => {
                    keyed.push(((anchor, 1, d), AlignmentEntry::DestOnly { dest_index: d }));
                }
            }
        }

        keyed.sort_by_key(|(key, _)| *key);
        let entries: Vec<AlignmentEntry> = keyed.into_iter().map(|(_, entry)| entry).collect();

        tracing::debug!(
            matched = entries.iter().filter(|e| e.is_match()).count(),
            template_only = entries
                .iter()
                .filter(|e| matches!(e, AlignmentEntry::TemplateOnly { .. }))
                .count(),
            dest_only = entries
                .iter()
                .filter(|e| matches!(e, AlignmentEntry::DestOnly { .. }))
                .count(),
            "aligned documents"
        );

        entries
    }

    fn apply_refiner(
        &self,
        refiner: &dyn MatchRefiner,
        template: &FileAnalysis,
        destination: &FileAnalysis,
        consumed: &mut [bool],
        template_for_dest: &mut [Option<usize>],
    ) {
        let template_only: Vec<usize> = (0..consumed.len()).filter(|&t| !consumed[t]).collect();
        let dest_only: Vec<usize> = (0..template_for_dest.len())
            .filter(|&d| template_for_dest[d].is_none())
            .collect();
        if template_only.is_empty() || dest_only.is_empty() {
            return;
        }

        for (t, d) in refiner.refine(template, destination, &template_only, &dest_only) {
            let valid = t < consumed.len()
                && d < template_for_dest.len()
                && !consumed[t]
                && template_for_dest[d].is_none();
            if !valid {
                tracing::debug!(template = t, destination = d, "refiner proposed an unavailable pair");
                continue;
            }
            consumed[t] = true;
            template_for_dest[d] = Some(t);
        }
    }
}

//! Second-pass matchers that pair statements exact signatures missed.

use std::collections::HashSet;

use mdmerge::{BlockKind, FileAnalysis};

/// Pairs leftover statements after exact signature alignment.
///
/// `template_only` and `dest_only` hold statement indices that found no
/// exact match. The returned `(template_index, dest_index)` pairs become
/// matches; pairs naming an index outside those lists, or reusing one, are
/// ignored by the aligner.
pub trait MatchRefiner: Send + Sync {
    fn refine(
        &self,
        template: &FileAnalysis,
        destination: &FileAnalysis,
        template_only: &[usize],
        dest_only: &[usize],
    ) -> Vec<(usize, usize)>;
}

/// Pairs tables whose header cells are similar enough, so a table that
/// gained or lost rows still lines up with its counterpart.
#[derive(Debug, Clone, Copy)]
pub struct TableMatchRefiner {
    threshold: f64,
}

impl TableMatchRefiner {
    pub const DEFAULT_THRESHOLD: f64 = 0.5;

    pub fn new(threshold: f64) -> Self {
        TableMatchRefiner {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Default for TableMatchRefiner {
    fn default() -> Self {
        TableMatchRefiner::new(Self::DEFAULT_THRESHOLD)
    }
}

impl MatchRefiner for TableMatchRefiner {
    fn refine(
        &self,
        template: &FileAnalysis,
        destination: &FileAnalysis,
        template_only: &[usize],
        dest_only: &[usize],
    ) -> Vec<(usize, usize)> {
        let template_tables = table_headers(template, template_only);
        let dest_tables = table_headers(destination, dest_only);

        let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
        for (t, t_headers) in &template_tables {
            for (d, d_headers) in &dest_tables {
                let score = jaccard(t_headers, d_headers);
                if score >= self.threshold {
                    candidates.push((score, *t, *d));
                }
            }
        }

        // Best score first; ties go to the earlier template, then earlier
        // destination table.
        candidates.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
        });

        let mut used_template = HashSet::new();
        let mut used_dest = HashSet::new();
        let mut pairs = Vec::new();
        for (score, t, d) in candidates {
            if used_template.contains(&t) || used_dest.contains(&d) {
                continue;
            }
            tracing::debug!(template = t, destination = d, score, "paired tables by header similarity");
            used_template.insert(t);
            used_dest.insert(d);
            pairs.push((t, d));
        }
        pairs
    }
}

fn table_headers(analysis: &FileAnalysis, indices: &[usize]) -> Vec<(usize, HashSet<String>)> {
    indices
        .iter()
        .filter_map(|&i| {
            let node = analysis.statement(i)?.as_node()?;
            if node.kind() != BlockKind::Table {
                return None;
            }
            let headers = node
                .table_headers()?
                .into_iter()
                .map(|h| h.to_lowercase())
                .collect();
            Some((i, headers))
        })
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

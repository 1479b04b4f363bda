use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use mdmerge::LineSpan;

use crate::aligner::AlignmentEntry;
use crate::error::Side;
use crate::resolver::Decision;

/// Output of a completed merge.
#[derive(Debug, Clone)]
pub struct MergeResult {
    pub content: String,
    /// Always `true`; a merge that gets past parsing cannot fail.
    pub success: bool,
    pub frozen_blocks: Vec<FrozenBlockInfo>,
    pub stats: MergeStats,
    /// One record per alignment entry, in output order.
    pub decisions: Vec<DecisionRecord>,
}

/// A freeze block that was emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrozenBlockInfo {
    pub side: Side,
    pub start_line: usize,
    pub end_line: usize,
    pub reason: Option<String>,
}

/// How one alignment entry was resolved. `span` is the source span of the
/// statement the decision came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionRecord {
    pub entry: AlignmentEntry,
    pub source: Side,
    pub decision: Decision,
    pub span: Option<LineSpan>,
}

impl fmt::Display for DecisionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<13} {:<16} {}", self.entry.label(), self.decision, self.source)?;
        if let Some(span) = self.span {
            write!(f, " {}", span)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Matched pairs where differing template text replaced the destination's.
    pub nodes_modified: usize,
    /// Template-only statements that were included.
    pub nodes_added: usize,
    /// Destination text kept as is, matched or unmatched.
    pub nodes_preserved: usize,
    /// Template-only statements that were left out.
    pub nodes_skipped: usize,
    pub frozen: usize,
    pub elapsed: Duration,
}

impl MergeStats {
    /// Statistics as a name → number map; `elapsed` is in milliseconds.
    pub fn to_map(&self) -> BTreeMap<&'static str, u64> {
        let mut map = BTreeMap::new();
        map.insert("nodes_modified", self.nodes_modified as u64);
        map.insert("nodes_added", self.nodes_added as u64);
        map.insert("nodes_preserved", self.nodes_preserved as u64);
        map.insert("nodes_skipped", self.nodes_skipped as u64);
        map.insert("frozen", self.frozen as u64);
        map.insert(
            "elapsed_ms",
            u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX),
        );
        map
    }
}

impl fmt::Display for MergeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} modified, {} added, {} preserved, {} skipped, {} frozen ({:.2?})",
            self.nodes_modified,
            self.nodes_added,
            self.nodes_preserved,
            self.nodes_skipped,
            self.frozen,
            self.elapsed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_map_has_every_counter() {
        let stats = MergeStats {
            nodes_modified: 1,
            nodes_added: 2,
            nodes_preserved: 3,
            nodes_skipped: 4,
            frozen: 5,
            elapsed: Duration::from_millis(7),
        };
        let map = stats.to_map();
        assert_eq!(map["nodes_modified"], 1);
        assert_eq!(map["nodes_added"], 2);
        assert_eq!(map["nodes_preserved"], 3);
        assert_eq!(map["nodes_skipped"], 4);
        assert_eq!(map["frozen"], 5);
        assert_eq!(map["elapsed_ms"], 7);
        assert_eq!(map.len(), 6);
    }

    #[test]
    fn decision_record_display() {
        let record = DecisionRecord {
            entry: AlignmentEntry::DestOnly { dest_index: 2 },
            source: Side::Destination,
            decision: Decision::DestinationOnly,
            span: Some(LineSpan::new(5, 6)),
        };
        let line = record.to_string();
        assert!(line.starts_with("dest_only"));
        assert!(line.contains("destination_only"));
        assert!(line.ends_with("L5-L6"));
    }
}

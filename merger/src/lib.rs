//! Template-to-destination merging of Markdown documents.
//!
//! Both documents are analyzed into statement sequences, aligned by
//! signature, and every alignment entry is resolved into output text. The
//! destination's content is never dropped; template content fills in only
//! where asked, and freeze blocks pass through untouched.

pub mod aligner;
pub mod error;
pub mod options;
pub mod refiner;
pub mod resolver;
pub mod result;
pub mod smart_merger;

pub use aligner::{AlignmentEntry, FileAligner};
pub use error::{MergeError, Side};
pub use options::{MergeOptions, Preference};
pub use refiner::{MatchRefiner, TableMatchRefiner};
pub use resolver::{ConflictResolver, Decision, Resolution};
pub use result::{DecisionRecord, FrozenBlockInfo, MergeResult, MergeStats};
pub use smart_merger::SmartMerger;

//! Structural analysis of Markdown documents for smart merging.
//!
//! A document is parsed into top-level blocks, freeze blocks are spliced in
//! where `<!-- {token}:freeze -->` markers appear, and every resulting
//! statement gets a [`Signature`] that decides what it can be paired with.

pub mod analysis;
pub mod document;
pub mod freeze;
pub mod node;
pub mod parser;
pub mod signature;

pub use analysis::{AnalysisOptions, FileAnalysis, Statement};
pub use freeze::{FreezeBlock, FreezeMarkers};
pub use node::{BlockKind, BlockNode, LineSpan, ListKind};
pub use parser::{CmarkBackend, MarkdownBackend, ParseError};
pub use signature::{Signature, SignatureGenerator, SignatureOverride};

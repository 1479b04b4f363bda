use crate::freeze::{FreezeBlock, FreezeMarkers, drop_misaligned, integrate};
use crate::node::{BlockKind, BlockNode, LineSpan};
use crate::parser::{CmarkBackend, MarkdownBackend, ParseError};
use crate::signature::{self, Signature, SignatureGenerator};

/// Index of a statement's underlying item inside a [`FileAnalysis`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementRef {
    Node(usize),
    Freeze(usize),
}

/// One entry of a statement sequence: a parsed top-level block or a freeze
/// block, borrowed from the analysis that owns it.
#[derive(Debug, Clone, Copy)]
pub enum Statement<'a> {
    Node(&'a BlockNode),
    Freeze(&'a FreezeBlock),
}

impl<'a> Statement<'a> {
    pub fn span(&self) -> Option<LineSpan> {
        match self {
            Statement::Node(node) => node.span,
            Statement::Freeze(block) => Some(block.span()),
        }
    }

    pub fn kind_name(&self) -> &'a str {
        match self {
            Statement::Node(node) => node.kind_name(),
            Statement::Freeze(_) => "freeze_block",
        }
    }

    pub fn is_freeze(&self) -> bool {
        matches!(self, Statement::Freeze(_))
    }

    pub fn as_node(&self) -> Option<&'a BlockNode> {
        match self {
            Statement::Node(node) => Some(node),
            Statement::Freeze(_) => None,
        }
    }

    pub fn as_freeze(&self) -> Option<&'a FreezeBlock> {
        match self {
            Statement::Freeze(block) => Some(block),
            Statement::Node(_) => None,
        }
    }
}

/// Settings that shape how a document is analyzed.
#[derive(Clone, Default)]
pub struct AnalysisOptions {
    pub freeze_markers: FreezeMarkers,
    pub signature_generator: Option<SignatureGenerator>,
}

impl AnalysisOptions {
    pub fn with_freeze_token(mut self, token: impl Into<String>) -> Self {
        self.freeze_markers = FreezeMarkers::new(token);
        self
    }

    pub fn with_signature_generator(mut self, generator: SignatureGenerator) -> Self {
        self.signature_generator = Some(generator);
        self
    }
}

impl std::fmt::Debug for AnalysisOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisOptions")
            .field("freeze_token", &self.freeze_markers.token())
            .field("signature_generator", &self.signature_generator.is_some())
            .finish()
    }
}

/// Everything derived from one document: its lines, parsed blocks, freeze
/// blocks, statement sequence and the signature of every statement.
#[derive(Debug)]
pub struct FileAnalysis {
    lines: Vec<String>,
    nodes: Vec<BlockNode>,
    freeze_blocks: Vec<FreezeBlock>,
    statements: Vec<StatementRef>,
    signatures: Vec<Option<Signature>>,
}

impl FileAnalysis {
    /// Analyze `source` using the given backend.
    pub fn new(
        source: &str,
        backend: &dyn MarkdownBackend,
        options: &AnalysisOptions,
    ) -> Result<Self, ParseError> {
        let nodes = backend.parse(source)?;
        let lines: Vec<String> = source.split('\n').map(str::to_string).collect();
        let code_spans: Vec<LineSpan> = nodes
            .iter()
            .filter(|n| n.kind() == BlockKind::CodeBlock)
            .filter_map(|n| n.span)
            .collect();
        let extracted = options.freeze_markers.extract_outside(&lines, &code_spans);
        let freeze_blocks = drop_misaligned(extracted, &nodes);
        let statements = integrate(&nodes, &freeze_blocks);

        let mut analysis = FileAnalysis {
            lines,
            nodes,
            freeze_blocks,
            statements,
            signatures: Vec::new(),
        };
        analysis.signatures = (0..analysis.statements.len())
            .map(|i| {
                let statement = analysis.statement_at(i);
                signature::compute(&statement, options.signature_generator.as_ref())
            })
            .collect();

        tracing::debug!(
            backend = backend.name(),
            lines = analysis.lines.len(),
            statements = analysis.statements.len(),
            freeze_blocks = analysis.freeze_blocks.len(),
            "analyzed document"
        );

        Ok(analysis)
    }

    /// Analyze with the default pulldown-cmark backend and options.
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        FileAnalysis::new(source, &CmarkBackend::default(), &AnalysisOptions::default())
    }

    /// Number of statements in the sequence.
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn statement(&self, index: usize) -> Option<Statement<'_>> {
        (index < self.statements.len()).then(|| self.statement_at(index))
    }

    pub fn statements(&self) -> impl Iterator<Item = Statement<'_>> + '_ {
        (0..self.statements.len()).map(|i| self.statement_at(i))
    }

    fn statement_at(&self, index: usize) -> Statement<'_> {
        match self.statements[index] {
            StatementRef::Node(i) => Statement::Node(&self.nodes[i]),
            StatementRef::Freeze(i) => Statement::Freeze(&self.freeze_blocks[i]),
        }
    }

    /// Every parsed top-level node, including those hidden by freeze blocks.
    pub fn nodes(&self) -> &[BlockNode] {
        &self.nodes
    }

    pub fn freeze_blocks(&self) -> &[FreezeBlock] {
        &self.freeze_blocks
    }

    /// Cached signature of statement `index`; `None` if out of range or the
    /// statement is unmatchable.
    pub fn signature(&self, index: usize) -> Option<&Signature> {
        self.signatures.get(index).and_then(Option::as_ref)
    }

    /// Raw line by 1-based number.
    pub fn line(&self, number: usize) -> Option<&str> {
        number
            .checked_sub(1)
            .and_then(|i| self.lines.get(i))
            .map(String::as_str)
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Raw lines `start..=end` joined with `\n`. Invalid ranges give an empty
    /// string.
    pub fn lines_text(&self, start: usize, end: usize) -> String {
        if start == 0 || start > end || end > self.lines.len() {
            return String::new();
        }
        self.lines[start - 1..end].join("\n")
    }

    pub fn in_freeze_block(&self, line: usize) -> bool {
        self.freeze_block_at(line).is_some()
    }

    /// The freeze block containing `line`, marker lines included. With
    /// nested blocks the outermost one is returned.
    pub fn freeze_block_at(&self, line: usize) -> Option<&FreezeBlock> {
        self.freeze_blocks.iter().find(|b| b.contains_line(line))
    }

    /// Source text of statement `index`: its exact original lines, or a
    /// canonical re-render for nodes without a span.
    pub fn statement_text(&self, index: usize) -> Option<String> {
        let text = match self.statement(index)? {
            Statement::Freeze(block) => block.text.clone(),
            Statement::Node(node) => match node.span {
                Some(span) => self.lines_text(span.start, span.end),
                None => node.render().trim_end_matches('\n').to_string(),
            },
        };
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::signature::SignatureOverride;

    const DOC: &str = "# Title\n\nIntro text.\n\n<!-- merge:freeze local -->\n## Kept\n\nCustom.\n<!-- merge:unfreeze -->\n\n- a\n- b\n";

    #[test]
    fn statement_sequence_interleaves_freeze_blocks() {
        let analysis = FileAnalysis::parse(DOC).unwrap();
        let kinds: Vec<&str> = analysis.statements().map(|s| s.kind_name()).collect();
        assert_eq!(kinds, vec!["heading", "paragraph", "freeze_block", "list"]);
        assert_eq!(analysis.len(), 4);
        assert!(analysis.nodes().len() > analysis.len());
    }

    #[test]
    fn line_lookup() {
        let analysis = FileAnalysis::parse(DOC).unwrap();
        assert_eq!(analysis.line(1), Some("# Title"));
        assert_eq!(analysis.line(0), None);
        assert_eq!(analysis.line(1000), None);
        assert_eq!(analysis.lines_text(1, 3), "# Title\n\nIntro text.");
        assert_eq!(analysis.lines_text(3, 1), "");
        assert_eq!(analysis.lines_text(0, 2), "");
        assert_eq!(analysis.lines_text(1, 1000), "");
    }

    #[test]
    fn freeze_membership() {
        let analysis = FileAnalysis::parse(DOC).unwrap();
        assert!(!analysis.in_freeze_block(4));
        assert!(analysis.in_freeze_block(5));
        assert!(analysis.in_freeze_block(7));
        assert!(analysis.in_freeze_block(9));
        assert!(!analysis.in_freeze_block(10));
        let block = analysis.freeze_block_at(6).unwrap();
        assert_eq!(block.reason.as_deref(), Some("local"));
        assert_eq!(block.content, "## Kept\n\nCustom.");
    }

    #[test]
    fn signatures_are_cached_per_statement() {
        let analysis = FileAnalysis::parse(DOC).unwrap();
        assert!(matches!(
            analysis.signature(0),
            Some(Signature::Heading { level: 1, .. })
        ));
        assert!(matches!(
            analysis.signature(2),
            Some(Signature::FreezeBlock { .. })
        ));
        assert_eq!(analysis.signature(99), None);
    }

    #[test]
    fn statement_text_reproduces_source() {
        let analysis = FileAnalysis::parse(DOC).unwrap();
        assert_eq!(analysis.statement_text(0).as_deref(), Some("# Title"));
        assert_eq!(
            analysis.statement_text(2).as_deref(),
            Some("<!-- merge:freeze local -->\n## Kept\n\nCustom.\n<!-- merge:unfreeze -->")
        );
        assert_eq!(analysis.statement_text(3).as_deref(), Some("- a\n- b"));
        assert_eq!(analysis.statement_text(4), None);
    }

    #[test]
    fn custom_generator_can_suppress_matching() {
        let options = AnalysisOptions::default().with_signature_generator(Arc::new(
            |statement: &Statement<'_>| match statement.as_node().map(BlockNode::kind) {
                Some(BlockKind::Paragraph) => SignatureOverride::Unmatchable,
                _ => SignatureOverride::Default,
            },
        ));
        let analysis = FileAnalysis::new(DOC, &CmarkBackend::default(), &options).unwrap();
        assert!(analysis.signature(0).is_some());
        assert_eq!(analysis.signature(1), None);
    }

    #[test]
    fn custom_freeze_token() {
        let options = AnalysisOptions::default().with_freeze_token("sync");
        let analysis = FileAnalysis::new(DOC, &CmarkBackend::default(), &options).unwrap();
        assert!(analysis.freeze_blocks().is_empty());
        assert!(!analysis.in_freeze_block(6));
    }

    struct FailingBackend;

    impl MarkdownBackend for FailingBackend {
        fn name(&self) -> &str {
            "failing"
        }

        fn parse(&self, source: &str) -> Result<Vec<BlockNode>, ParseError> {
            Err(ParseError::error("unsupported input", 0..source.len()))
        }
    }

    #[test]
    fn backend_failure_propagates() {
        let err = FileAnalysis::new("# x\n", &FailingBackend, &AnalysisOptions::default())
            .unwrap_err();
        assert_eq!(err.message, "unsupported input");
    }
}

pub mod error;
mod structural;

pub use error::ParseError;
pub use pulldown_cmark::Options;

use crate::node::BlockNode;

/// A Markdown parser that turns source text into top-level blocks with
/// line spans. The merge engine only talks to parsers through this trait.
pub trait MarkdownBackend: Send + Sync {
    /// Short name for logs and diagnostics.
    fn name(&self) -> &str;

    /// Parse `source` into its top-level blocks, in document order.
    fn parse(&self, source: &str) -> Result<Vec<BlockNode>, ParseError>;
}

/// CommonMark backend built on pulldown-cmark.
#[derive(Debug, Clone, Copy)]
pub struct CmarkBackend {
    options: Options,
}

impl CmarkBackend {
    pub fn new(options: Options) -> Self {
        CmarkBackend { options }
    }

    pub fn options(&self) -> Options {
        self.options
    }
}

impl Default for CmarkBackend {
    fn default() -> Self {
        CmarkBackend::new(default_options())
    }
}

impl MarkdownBackend for CmarkBackend {
    fn name(&self) -> &str {
        "pulldown-cmark"
    }

    fn parse(&self, source: &str) -> Result<Vec<BlockNode>, ParseError> {
        Ok(structural::parse_nodes(source, self.options))
    }
}

/// GFM-flavored defaults: tables, footnotes, strikethrough, task lists and
/// YAML front matter.
pub fn default_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_YAML_STYLE_METADATA_BLOCKS
}

/// Map a configuration-file extension name to its parser flag.
pub fn extension_from_name(name: &str) -> Option<Options> {
    let flag = match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "tables" => Options::ENABLE_TABLES,
        "footnotes" => Options::ENABLE_FOOTNOTES,
        "strikethrough" => Options::ENABLE_STRIKETHROUGH,
        "tasklists" | "task_lists" => Options::ENABLE_TASKLISTS,
        "smart_punctuation" => Options::ENABLE_SMART_PUNCTUATION,
        "heading_attributes" => Options::ENABLE_HEADING_ATTRIBUTES,
        "front_matter" | "yaml_metadata" => Options::ENABLE_YAML_STYLE_METADATA_BLOCKS,
        "pluses_metadata" => Options::ENABLE_PLUSES_DELIMITED_METADATA_BLOCKS,
        "math" => Options::ENABLE_MATH,
        "gfm" => Options::ENABLE_GFM,
        "definition_lists" => Options::ENABLE_DEFINITION_LIST,
        "superscript" => Options::ENABLE_SUPERSCRIPT,
        "subscript" => Options::ENABLE_SUBSCRIPT,
        "wikilinks" => Options::ENABLE_WIKILINKS,
        _ => return None,
    };
    Some(flag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_names() {
        assert_eq!(extension_from_name("tables"), Some(Options::ENABLE_TABLES));
        assert_eq!(extension_from_name("Task-Lists"), Some(Options::ENABLE_TASKLISTS));
        assert_eq!(extension_from_name("nonsense"), None);
    }

    #[test]
    fn default_backend_parses() {
        let nodes = CmarkBackend::default().parse("# Title\n\nBody.\n").unwrap();
        assert_eq!(nodes.len(), 2);
    }
}

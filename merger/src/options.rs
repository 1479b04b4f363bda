use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use mdmerge::freeze::DEFAULT_FREEZE_TOKEN;
use mdmerge::parser::{self, Options};
use mdmerge::{AnalysisOptions, SignatureGenerator};

use crate::refiner::MatchRefiner;

/// Which side wins when a matched pair differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preference {
    Template,
    #[default]
    Destination,
}

impl fmt::Display for Preference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Preference::Template => f.write_str("template"),
            Preference::Destination => f.write_str("destination"),
        }
    }
}

impl FromStr for Preference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "template" => Ok(Preference::Template),
            "destination" | "dest" => Ok(Preference::Destination),
            other => Err(format!(
                "unknown preference '{}' (expected 'template' or 'destination')",
                other
            )),
        }
    }
}

/// Everything that controls a merge.
#[derive(Clone)]
pub struct MergeOptions {
    pub signature_generator: Option<SignatureGenerator>,
    pub preference: Preference,
    /// Append template blocks that have no counterpart in the destination.
    pub add_template_only_nodes: bool,
    pub freeze_token: String,
    pub match_refiner: Option<Arc<dyn MatchRefiner>>,
    /// Passed through to the Markdown parser untouched.
    pub parser_options: Options,
}

impl Default for MergeOptions {
    fn default() -> Self {
        MergeOptions {
            signature_generator: None,
            preference: Preference::default(),
            add_template_only_nodes: false,
            freeze_token: DEFAULT_FREEZE_TOKEN.to_string(),
            match_refiner: None,
            parser_options: parser::default_options(),
        }
    }
}

impl MergeOptions {
    pub fn new() -> Self {
        MergeOptions::default()
    }

    pub fn preference(mut self, preference: Preference) -> Self {
        self.preference = preference;
        self
    }

    pub fn add_template_only_nodes(mut self, add: bool) -> Self {
        self.add_template_only_nodes = add;
        self
    }

    pub fn freeze_token(mut self, token: impl Into<String>) -> Self {
        self.freeze_token = token.into();
        self
    }

    pub fn signature_generator(mut self, generator: SignatureGenerator) -> Self {
        self.signature_generator = Some(generator);
        self
    }

    pub fn match_refiner(mut self, refiner: Arc<dyn MatchRefiner>) -> Self {
        self.match_refiner = Some(refiner);
        self
    }

    pub fn parser_options(mut self, options: Options) -> Self {
        self.parser_options = options;
        self
    }

    pub(crate) fn analysis_options(&self) -> AnalysisOptions {
        let options = AnalysisOptions::default().with_freeze_token(self.freeze_token.clone());
        match &self.signature_generator {
            Some(generator) => options.with_signature_generator(generator.clone()),
            None => options,
        }
    }
}

impl fmt::Debug for MergeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeOptions")
            .field("signature_generator", &self.signature_generator.is_some())
            .field("preference", &self.preference)
            .field("add_template_only_nodes", &self.add_template_only_nodes)
            .field("freeze_token", &self.freeze_token)
            .field("match_refiner", &self.match_refiner.is_some())
            .field("parser_options", &self.parser_options)
            .finish()
    }
}

use std::fmt;

use mdmerge::ParseError;
use thiserror::Error;

/// Which input document something came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Template,
    Destination,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Template => f.write_str("template"),
            Side::Destination => f.write_str("destination"),
        }
    }
}

/// A merge that could not start because one input failed to parse.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("template parse error: {0}")]
    TemplateParse(#[source] ParseError),

    #[error("destination parse error: {0}")]
    DestinationParse(#[source] ParseError),
}

impl MergeError {
    pub fn parse(side: Side, error: ParseError) -> Self {
        match side {
            Side::Template => MergeError::TemplateParse(error),
            Side::Destination => MergeError::DestinationParse(error),
        }
    }

    /// The side to blame.
    pub fn side(&self) -> Side {
        match self {
            MergeError::TemplateParse(_) => Side::Template,
            MergeError::DestinationParse(_) => Side::Destination,
        }
    }

    pub fn parse_error(&self) -> &ParseError {
        match self {
            MergeError::TemplateParse(e) | MergeError::DestinationParse(e) => e,
        }
    }
}

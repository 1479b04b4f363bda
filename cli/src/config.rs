use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use mdmerge::parser::{self, Options};
use merger::{MergeOptions, Preference, TableMatchRefiner};

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "mdmerge.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub merge: MergeSection,
}

/// The `[merge]` table. Every key is optional; command-line flags win.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeSection {
    #[serde(default)]
    pub preference: Option<String>,

    #[serde(default)]
    pub add_template_only_nodes: Option<bool>,

    #[serde(default)]
    pub freeze_token: Option<String>,

    /// Parser extensions replacing the default set, e.g. `["tables", "math"]`.
    #[serde(default)]
    pub extensions: Option<Vec<String>>,

    /// Enables header-similarity pairing of tables.
    #[serde(default)]
    pub table_refiner_threshold: Option<f64>,
}

impl ConfigFile {
    pub fn parse(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| format!("TOML parse error: {}", e))
    }

    /// Load `explicit` if given, else `mdmerge.toml` if it exists, else an
    /// empty configuration.
    pub fn load(explicit: Option<&Path>) -> Result<Self, String> {
        let path: PathBuf = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    return Ok(ConfigFile::default());
                }
                default
            }
        };
        let text = std::fs::read_to_string(&path)
            .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        ConfigFile::parse(&text).map_err(|e| format!("{}: {}", path.display(), e))
    }
}

impl MergeSection {
    /// Build merge options from this table on top of the defaults.
    pub fn to_options(&self) -> Result<MergeOptions, String> {
        let mut options = MergeOptions::default();
        if let Some(preference) = &self.preference {
            options = options.preference(preference.parse::<Preference>()?);
        }
        if let Some(add) = self.add_template_only_nodes {
            options = options.add_template_only_nodes(add);
        }
        if let Some(token) = &self.freeze_token {
            if token.trim().is_empty() {
                return Err("freeze_token must not be empty".into());
            }
            options = options.freeze_token(token.trim());
        }
        if let Some(names) = &self.extensions {
            options = options.parser_options(parse_extensions(names)?);
        }
        if let Some(threshold) = self.table_refiner_threshold {
            options = options.match_refiner(Arc::new(TableMatchRefiner::new(threshold)));
        }
        Ok(options)
    }
}

fn parse_extensions(names: &[String]) -> Result<Options, String> {
    names.iter().try_fold(Options::empty(), |acc, name| {
        parser::extension_from_name(name)
            .map(|flag| acc | flag)
            .ok_or_else(|| format!("unknown parser extension '{}'", name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_gives_defaults() {
        let config = ConfigFile::parse("").unwrap();
        let options = config.merge.to_options().unwrap();
        assert_eq!(options.preference, Preference::Destination);
        assert_eq!(options.freeze_token, "merge");
        assert!(options.match_refiner.is_none());
    }

    #[test]
    fn merge_table_is_applied() {
        let config = ConfigFile::parse(
            r#"
[merge]
preference = "template"
add_template_only_nodes = true
freeze_token = "keep"
extensions = ["tables", "footnotes"]
table_refiner_threshold = 0.6
"#,
        )
        .unwrap();
        let options = config.merge.to_options().unwrap();
        assert_eq!(options.preference, Preference::Template);
        assert!(options.add_template_only_nodes);
        assert_eq!(options.freeze_token, "keep");
        assert_eq!(
            options.parser_options,
            Options::ENABLE_TABLES | Options::ENABLE_FOOTNOTES
        );
        assert!(options.match_refiner.is_some());
    }

    #[test]
    fn invalid_values_are_reported() {
        let bad_pref = ConfigFile::parse("[merge]\npreference = \"both\"\n").unwrap();
        assert!(bad_pref.merge.to_options().is_err());

        let bad_ext = ConfigFile::parse("[merge]\nextensions = [\"nope\"]\n").unwrap();
        let err = bad_ext.merge.to_options().unwrap_err();
        assert!(err.contains("nope"));

        assert!(ConfigFile::parse("[merge]\nunknown_key = 1\n").is_err());
    }

    #[test]
    fn load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[merge]\nfreeze_token = \"sync\"\n").unwrap();
        let config = ConfigFile::load(Some(&path)).unwrap();
        assert_eq!(config.merge.freeze_token.as_deref(), Some("sync"));

        assert!(ConfigFile::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use merger::{MergeOptions, MergeResult, Preference, SmartMerger};

/// Front matter of a `.test.md` fixture. The body below the front matter is
/// the destination document.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestConfig {
    /// Human-readable test description.
    #[serde(default)]
    pub description: Option<String>,

    /// Template document, inline.
    #[serde(default)]
    pub template: Option<String>,

    /// Template document, as a path relative to the fixture.
    #[serde(default)]
    pub template_file: Option<String>,

    #[serde(default)]
    pub preference: Option<String>,

    #[serde(default)]
    pub add_template_only_nodes: bool,

    #[serde(default)]
    pub freeze_token: Option<String>,

    /// Expected merged document (trailing whitespace ignored).
    #[serde(default)]
    pub expect_output: Option<String>,

    /// Substrings that must appear in the merged document.
    #[serde(default)]
    pub expect_contains: Vec<String>,

    /// Substrings that must not appear in the merged document.
    #[serde(default)]
    pub expect_absent: Vec<String>,

    /// Expected merge statistics by name, e.g. `{ nodes_added = 1 }`.
    /// Only the listed counters are checked.
    #[serde(default)]
    pub expect_stats: BTreeMap<String, u64>,
}

impl TestConfig {
    fn options(&self) -> Result<MergeOptions, String> {
        let mut options =
            MergeOptions::default().add_template_only_nodes(self.add_template_only_nodes);
        if let Some(preference) = &self.preference {
            options = options.preference(preference.parse::<Preference>()?);
        }
        if let Some(token) = &self.freeze_token {
            options = options.freeze_token(token.as_str());
        }
        Ok(options)
    }

    fn load_template(&self, fixture: &Path) -> Result<String, String> {
        match (&self.template, &self.template_file) {
            (Some(_), Some(_)) => Err("set either 'template' or 'template_file', not both".into()),
            (Some(inline), None) => Ok(inline.clone()),
            (None, Some(file)) => {
                let base = fixture.parent().unwrap_or_else(|| Path::new("."));
                let path = base.join(file);
                std::fs::read_to_string(&path)
                    .map_err(|e| format!("cannot read template '{}': {}", path.display(), e))
            }
            (None, None) => Ok(String::new()),
        }
    }
}

/// Parse a `.test.md` file into its TOML config and destination document.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.trim_start_matches('\u{feff}'); // strip BOM

    if !content.starts_with("---") {
        return Err("missing opening --- frontmatter delimiter".into());
    }

    let after_open = &content[3..];
    let after_open = after_open
        .strip_prefix('\n')
        .or_else(|| after_open.strip_prefix("\r\n"))
        .unwrap_or(after_open);

    let close_pos = after_open
        .find("\n---")
        .ok_or("missing closing --- frontmatter delimiter")?;

    let toml_str = after_open[..close_pos].trim_end_matches('\r');
    let rest_start = close_pos + 4; // skip \n---
    let destination = after_open[rest_start..]
        .strip_prefix("\r\n")
        .or_else(|| after_open[rest_start..].strip_prefix('\n'))
        .unwrap_or(&after_open[rest_start..]);

    let config: TestConfig =
        toml::from_str(toml_str).map_err(|e| format!("TOML parse error: {}", e))?;

    Ok((config, destination))
}

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

impl TestResult {
    fn fail(path: &Path, description: Option<String>, reason: impl Into<String>) -> Self {
        TestResult {
            path: path.to_path_buf(),
            description,
            outcome: TestOutcome::Fail(reason.into()),
        }
    }
}

fn run_single_test(path: &Path) -> TestResult {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => return TestResult::fail(path, None, format!("cannot read file: {}", e)),
    };

    let (config, destination) = match parse_test_file(&content) {
        Ok(pair) => pair,
        Err(e) => return TestResult::fail(path, None, format!("frontmatter error: {}", e)),
    };

    let description = config.description.clone();

    let prepared = config
        .options()
        .and_then(|options| Ok((config.load_template(path)?, options)));
    let (template, options) = match prepared {
        Ok(pair) => pair,
        Err(e) => return TestResult::fail(path, description, e),
    };

    let result = match SmartMerger::new(template, destination, options).merge() {
        Ok(result) => result,
        Err(e) => return TestResult::fail(path, description, format!("merge failed: {}", e)),
    };

    match check_expectations(&config, &result) {
        Some(reason) => TestResult::fail(path, description, reason),
        None => TestResult {
            path: path.to_path_buf(),
            description,
            outcome: TestOutcome::Pass,
        },
    }
}

/// Returns `Some(reason)` on the first unmet expectation.
fn check_expectations(config: &TestConfig, result: &MergeResult) -> Option<String> {
    let actual = result.content.as_str();

    if let Some(expected) = &config.expect_output {
        if actual.trim_end() != expected.trim_end() {
            return Some(format!(
                "output mismatch\n  expected:\n{}\n  actual:\n{}",
                indent(expected.trim_end()),
                indent(actual.trim_end())
            ));
        }
    }

    for needle in &config.expect_contains {
        if !actual.contains(needle.as_str()) {
            return Some(format!(
                "expected output containing \"{}\"\n  actual:\n{}",
                needle,
                indent(actual.trim_end())
            ));
        }
    }

    for needle in &config.expect_absent {
        if actual.contains(needle.as_str()) {
            return Some(format!("expected output without \"{}\"", needle));
        }
    }

    let stats = result.stats.to_map();
    for (name, expected) in &config.expect_stats {
        match stats.get(name.as_str()) {
            Some(value) if value == expected => {}
            Some(value) => {
                return Some(format!("stat '{}': expected {}, got {}", name, expected, value));
            }
            None => return Some(format!("unknown stat '{}'", name)),
        }
    }

    None
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("    {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Discover `.test.md` files grouped by category (subfolder relative to root).
/// Files directly in `root` get category "" (uncategorized).
fn discover_categorized(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut categories: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    collect_tests(root, root, &mut categories);
    for files in categories.values_mut() {
        files.sort();
    }
    categories
}

fn collect_tests(dir: &Path, root: &Path, out: &mut BTreeMap<String, Vec<PathBuf>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_tests(&path, root, out);
        } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.ends_with(".test.md") {
                let category = path
                    .parent()
                    .and_then(|p| p.strip_prefix(root).ok())
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
                    .unwrap_or_default();
                out.entry(category).or_default().push(path);
            }
        }
    }
}

/// List available categories for the given test path.
pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("(single file, no categories)");
        return;
    }

    let categories = discover_categorized(path);
    if categories.is_empty() {
        eprintln!("no .test.md files found in {}", path.display());
        return;
    }

    eprintln!("available categories:");
    for (cat, files) in &categories {
        let label = if cat.is_empty() { "(root)" } else { cat.as_str() };
        eprintln!("  {} ({} tests)", label, files.len());
    }
}

fn pass_label(no_color: bool) -> &'static str {
    if no_color { "PASS" } else { "\x1b[32mPASS\x1b[0m" }
}

fn fail_label(no_color: bool) -> &'static str {
    if no_color { "FAIL" } else { "\x1b[31mFAIL\x1b[0m" }
}

fn bold(s: &str, no_color: bool) -> String {
    if no_color {
        s.to_string()
    } else {
        format!("\x1b[1m{}\x1b[0m", s)
    }
}

fn label_for<'a>(result: &'a TestResult) -> &'a str {
    result.description.as_deref().unwrap_or_else(|| {
        result
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("?")
    })
}

/// Select the fixtures to run: a single file, or every fixture under a
/// directory, optionally restricted to `categories`.
fn select(path: &Path, categories: &[String]) -> BTreeMap<String, Vec<PathBuf>> {
    if path.is_file() {
        return BTreeMap::from([(String::new(), vec![path.to_path_buf()])]);
    }

    let all_categories = discover_categorized(path);
    if categories.is_empty() {
        return all_categories;
    }

    let mut filtered = BTreeMap::new();
    for requested in categories {
        let req = requested.trim_matches('/');
        let mut found = false;
        for (cat, files) in &all_categories {
            if cat == req || cat.starts_with(&format!("{}/", req)) {
                filtered.insert(cat.clone(), files.clone());
                found = true;
            }
        }
        if !found {
            eprintln!(
                "warning: category '{}' not found (available: {})",
                req,
                all_categories
                    .keys()
                    .map(|k| if k.is_empty() { "(root)" } else { k.as_str() })
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }
    filtered
}

/// Run all `.test.md` files under `path` (or a single file).
/// Returns exit code: 0 = all pass, 1 = any failure or nothing to run.
pub fn run_tests(path: &Path, no_color: bool, categories: &[String]) -> i32 {
    let selected = select(path, categories);
    if selected.is_empty() {
        eprintln!("no .test.md fixtures selected in {}", path.display());
        return 1;
    }

    let mut passed = 0usize;
    let mut failures: Vec<TestResult> = Vec::new();

    for (cat, files) in &selected {
        if !path.is_file() {
            let header = if cat.is_empty() { "(root)" } else { cat.as_str() };
            eprintln!();
            eprintln!("{}", bold(header, no_color));
        }

        for file in files {
            let result = run_single_test(file);
            match &result.outcome {
                TestOutcome::Pass => {
                    passed += 1;
                    eprintln!("  {}  {}", pass_label(no_color), label_for(&result));
                }
                TestOutcome::Fail(_) => {
                    eprintln!("  {}  {}", fail_label(no_color), label_for(&result));
                    failures.push(result);
                }
            }
        }
    }

    if !failures.is_empty() {
        eprintln!();
        eprintln!("failures:");
        for f in &failures {
            eprintln!();
            eprintln!("  --- {} ---", f.path.display());
            if let TestOutcome::Fail(reason) = &f.outcome {
                for line in reason.lines() {
                    eprintln!("  {}", line);
                }
            }
        }
    }

    eprintln!();
    let failed = failures.len();
    if failed == 0 {
        let ok = if no_color { "ok" } else { "\x1b[32mok\x1b[0m" };
        eprintln!("test result: {}. {} passed, 0 failed", ok, passed);
        0
    } else {
        let status = if no_color { "FAILED" } else { "\x1b[31mFAILED\x1b[0m" };
        eprintln!(
            "test result: {}. {} passed, {} failed (of {})",
            status,
            passed,
            failed,
            passed + failed
        );
        1
    }
}

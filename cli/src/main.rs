mod config;
mod test_runner;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use tracing_subscriber::EnvFilter;

use mdmerge::{AnalysisOptions, CmarkBackend, FileAnalysis, ParseError, Statement};
use merger::{MergeOptions, MergeResult, Preference, Side, SmartMerger};

use config::ConfigFile;

#[derive(Parser)]
#[command(name = "mdmerge", version, about = "Structural merge of Markdown documents")]
struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Log debug output (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Merge a template into a destination document
    Merge(MergeArgs),

    /// Print the statement sequence and signatures of a document
    Analyze(AnalyzeArgs),

    /// Run .test.md merge fixtures
    Test(TestArgs),
}

#[derive(clap::Args)]
struct MergeArgs {
    /// Template document
    template: PathBuf,

    /// Destination document
    destination: PathBuf,

    /// Write the merged document here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Which side wins when matched blocks differ
    #[arg(long, value_parser = parse_preference)]
    preference: Option<Preference>,

    /// Include template blocks missing from the destination
    #[arg(long)]
    add_template_only: bool,

    /// Marker token, as in `<!-- TOKEN:freeze -->`
    #[arg(long)]
    freeze_token: Option<String>,

    /// Configuration file (default: ./mdmerge.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print per-block decisions and statistics to stderr
    #[arg(long)]
    report: bool,

    /// Don't write anything; exit 1 if the merge would change the destination
    #[arg(long)]
    check: bool,
}

#[derive(clap::Args)]
struct AnalyzeArgs {
    /// Markdown document to analyze
    file: PathBuf,

    /// Marker token, as in `<!-- TOKEN:freeze -->`
    #[arg(long)]
    freeze_token: Option<String>,

    /// Configuration file (default: ./mdmerge.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.md file or directory containing them
    path: String,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn parse_preference(s: &str) -> Result<Preference, String> {
    s.parse()
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match cli.command {
        Command::Merge(args) => do_merge(args, cli.no_color),
        Command::Analyze(args) => do_analyze(args, cli.no_color),
        Command::Test(test_args) => {
            let path = Path::new(&test_args.path);
            if test_args.list_categories {
                test_runner::list_categories(path);
                0
            } else {
                test_runner::run_tests(path, cli.no_color, &test_args.category)
            }
        }
    };
    process::exit(exit_code);
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn color_choice(no_color: bool) -> ColorChoice {
    if no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, i32> {
    std::fs::read(path).map_err(|e| {
        eprintln!("error: cannot read '{}': {}", path.display(), e);
        1
    })
}

fn do_merge(args: MergeArgs, no_color: bool) -> i32 {
    match run_merge(&args, no_color) {
        Ok(code) | Err(code) => code,
    }
}

fn run_merge(args: &MergeArgs, no_color: bool) -> Result<i32, i32> {
    let options = merge_options(args).map_err(|e| {
        eprintln!("error: {}", e);
        1
    })?;

    let template = read_bytes(&args.template)?;
    let destination = read_bytes(&args.destination)?;

    let merged = SmartMerger::from_bytes(&template, &destination, options)
        .and_then(|merger| merger.merge());
    let result = match merged {
        Ok(result) => result,
        Err(error) => {
            let (path, bytes) = match error.side() {
                Side::Template => (&args.template, &template),
                Side::Destination => (&args.destination, &destination),
            };
            let label = format!("{} ({})", path.display(), error.side());
            emit_parse_error(&label, bytes, error.parse_error(), no_color);
            return Err(1);
        }
    };

    if args.report {
        print_report(&result);
    }

    if args.check {
        let unchanged = result.content.as_bytes() == destination.as_slice();
        if unchanged {
            eprintln!("ok: {} is up to date", args.destination.display());
            return Ok(0);
        }
        eprintln!("{} would change", args.destination.display());
        return Ok(1);
    }

    match &args.output {
        Some(path) => std::fs::write(path, &result.content).map_err(|e| {
            eprintln!("error: cannot write '{}': {}", path.display(), e);
            1
        })?,
        None => print!("{}", result.content),
    }
    Ok(0)
}

/// Defaults, then the configuration file, then command-line flags.
fn merge_options(args: &MergeArgs) -> Result<MergeOptions, String> {
    let config = ConfigFile::load(args.config.as_deref())?;
    let mut options = config.merge.to_options()?;
    if let Some(preference) = args.preference {
        options = options.preference(preference);
    }
    if args.add_template_only {
        options = options.add_template_only_nodes(true);
    }
    if let Some(token) = &args.freeze_token {
        options = options.freeze_token(token.as_str());
    }
    Ok(options)
}

fn print_report(result: &MergeResult) {
    eprintln!("decisions:");
    for record in &result.decisions {
        eprintln!("  {}", record);
    }
    if !result.frozen_blocks.is_empty() {
        eprintln!("frozen blocks:");
        for block in &result.frozen_blocks {
            eprintln!(
                "  {} L{}-L{}{}",
                block.side,
                block.start_line,
                block.end_line,
                block
                    .reason
                    .as_deref()
                    .map(|r| format!(" ({})", r))
                    .unwrap_or_default()
            );
        }
    }
    eprintln!("stats: {}", result.stats);
}

fn emit_parse_error(label: &str, bytes: &[u8], error: &ParseError, no_color: bool) {
    let mut files = SimpleFiles::new();
    let source = String::from_utf8_lossy(bytes).into_owned();
    let file_id = files.add(label.to_string(), source);

    let diagnostic = error.to_diagnostic(file_id);
    let writer = StandardStream::stderr(color_choice(no_color));
    let config = term::Config::default();
    if term::emit_to_write_style(&mut writer.lock(), &config, &files, &diagnostic).is_err() {
        eprintln!("error: {}", error);
    }
}

/// The parser and analysis settings `merge` would use for one side, from
/// the configuration file and flags.
fn analysis_setup(
    config: Option<&Path>,
    freeze_token: Option<&str>,
) -> Result<(CmarkBackend, AnalysisOptions), String> {
    let merge = ConfigFile::load(config)?.merge.to_options()?;
    let token = freeze_token.unwrap_or(merge.freeze_token.as_str());
    Ok((
        CmarkBackend::new(merge.parser_options),
        AnalysisOptions::default().with_freeze_token(token),
    ))
}

fn do_analyze(args: AnalyzeArgs, no_color: bool) -> i32 {
    let (backend, options) =
        match analysis_setup(args.config.as_deref(), args.freeze_token.as_deref()) {
            Ok(setup) => setup,
            Err(e) => {
                eprintln!("error: {}", e);
                return 1;
            }
        };

    let Ok(bytes) = read_bytes(&args.file) else {
        return 1;
    };
    let label = args.file.display().to_string();
    let source = match std::str::from_utf8(&bytes) {
        Ok(s) => s,
        Err(e) => {
            emit_parse_error(&label, &bytes, &ParseError::invalid_utf8(&e), no_color);
            return 1;
        }
    };

    let analysis = match FileAnalysis::new(source, &backend, &options) {
        Ok(analysis) => analysis,
        Err(e) => {
            emit_parse_error(&label, &bytes, &e, no_color);
            return 1;
        }
    };

    for (index, statement) in analysis.statements().enumerate() {
        let span = statement
            .span()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let signature = analysis
            .signature(index)
            .map(|s| s.to_string())
            .unwrap_or_else(|| "(unmatchable)".to_string());
        println!("{:>3}  {:<10} {:<26} {}", index, span, statement.kind_name(), signature);
        if let Statement::Freeze(block) = statement {
            if let Some(reason) = &block.reason {
                println!("     reason: {}", reason);
            }
        }
    }
    eprintln!(
        "{} statements, {} freeze blocks, {} lines",
        analysis.len(),
        analysis.freeze_blocks().len(),
        analysis.line_count()
    );
    0
}

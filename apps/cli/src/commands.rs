//! CLI command definitions, routing, and tracing setup.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::Section;
use color_eyre::eyre::{Report, Result, WrapErr};
use folio_core::{ProgressReporter, extract_book};
use folio_shared::{
    AppConfig, ErrorCategory, ExtractOptions, ExtractedBook, FolioError, init_config,
    load_config, load_config_from,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// folio — turn EPUB books into clean Markdown chapters.
#[derive(Parser)]
#[command(
    name = "folio",
    version,
    about = "Turn EPUB books into clean, segmented Markdown chapters.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Extraction result format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human-readable chapter summary.
    Text,
    /// Full book (metadata and chapter markdown) as JSON.
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Extract chapters from an EPUB file.
    Extract(ExtractArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments for `folio extract`.
#[derive(Args, Debug)]
pub(crate) struct ExtractArgs {
    /// EPUB file to read.
    pub epub: PathBuf,

    /// Output format.
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Write the result to this file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Config file to use instead of ~/.folio/folio.toml.
    #[arg(long, env = "FOLIO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Keep image references in chapter markdown.
    #[arg(long)]
    pub no_strip_images: bool,

    /// Keep links into the book itself.
    #[arg(long)]
    pub keep_internal_links: bool,

    /// Keep front/back matter, licenses, and note sections.
    #[arg(long)]
    pub no_filter: bool,

    /// Split chapters above this many words.
    #[arg(long)]
    pub max_chapter_words: Option<usize>,

    /// Merge split sections below this many words.
    #[arg(long)]
    pub min_section_words: Option<usize>,
}

impl ExtractArgs {
    /// Merge CLI flags over the loaded config.
    fn options(&self, config: &AppConfig) -> ExtractOptions {
        let base = ExtractOptions::from(config);
        ExtractOptions {
            strip_images: base.strip_images && !self.no_strip_images,
            strip_internal_links: base.strip_internal_links && !self.keep_internal_links,
            filter_boilerplate: base.filter_boilerplate && !self.no_filter,
            max_chapter_words: self.max_chapter_words.unwrap_or(base.max_chapter_words),
            min_section_words: self.min_section_words.unwrap_or(base.min_section_words),
        }
    }
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show {
        /// Config file to use instead of ~/.folio/folio.toml.
        #[arg(long, env = "FOLIO_CONFIG")]
        config: Option<PathBuf>,
    },
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "folio=warn",
        1 => "folio=info",
        2 => "folio=debug",
        _ => "folio=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Extract(args) => cmd_extract(&args),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show { config } => cmd_config_show(config.as_deref()),
        },
    }
}

fn cmd_extract(args: &ExtractArgs) -> Result<()> {
    let config = resolve_config(args.config.as_deref())?;
    let options = args.options(&config);

    info!(epub = %args.epub.display(), ?options, "extracting chapters");

    let reporter = CliProgress::new();
    let book = extract_book(&args.epub, &options, &reporter).map_err(|e| {
        reporter.abandon();
        with_remediation(e)
    })?;

    let rendered = match args.format {
        OutputFormat::Text => render_summary(&book),
        OutputFormat::Json => serde_json::to_string_pretty(&book)? + "\n",
    };

    match &args.output {
        Some(path) => write_output(path, &rendered)?,
        None => print!("{rendered}"),
    }

    Ok(())
}

/// Load the explicit config file when given, else the default location.
fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => load_config_from(path),
        None => load_config(),
    }
    .map_err(with_remediation)
}

fn write_output(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content)
        .wrap_err_with(|| format!("cannot write {}", path.display()))?;
    eprintln!("Wrote {}", path.display());
    Ok(())
}

/// Attach a remediation hint matching the error's category.
fn with_remediation(err: FolioError) -> Report {
    let hint = match err.category() {
        ErrorCategory::MalformedInput => {
            "Check that the file is a valid EPUB; convert other formats to EPUB first."
        }
        ErrorCategory::NoContent => {
            "Re-run with -vv to see why each document was dropped, or with --no-filter to keep boilerplate."
        }
        ErrorCategory::OcrRequired => {
            "The book looks like scanned page images. Run it through OCR tooling, then extract again."
        }
        ErrorCategory::Environment => {
            "Check the input path and the config file (see `folio config show`)."
        }
    };
    Report::new(err).suggestion(hint)
}

/// Plain-text summary of an extracted book.
fn render_summary(book: &ExtractedBook) -> String {
    let meta = &book.metadata;
    let mut out = String::new();

    let _ = writeln!(out, "Title:    {}", meta.title.as_deref().unwrap_or("(untitled)"));
    if !meta.authors.is_empty() {
        let _ = writeln!(out, "Authors:  {}", meta.authors.join(", "));
    }
    if let Some(language) = &meta.language {
        let _ = writeln!(out, "Language: {language}");
    }
    if let Some(publisher) = &meta.publisher {
        let _ = writeln!(out, "Publisher: {publisher}");
    }

    let total_words: usize = book.chapters.iter().map(|c| c.word_count).sum();
    let _ = writeln!(out, "Chapters: {} ({total_words} words)", book.chapters.len());
    out.push('\n');

    for chapter in &book.chapters {
        let _ = writeln!(
            out,
            "{:>4}  {:<50}  {:>7}  {}",
            chapter.index, chapter.title, chapter.word_count, chapter.source_file
        );
    }

    out
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn abandon(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn document_rendered(&self, path: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Rendering [{current}/{total}] {path}"));
    }

    fn done(&self, _book: &ExtractedBook) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config().map_err(with_remediation)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

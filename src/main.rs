use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use logweave::normalize::{LevelNormalizer, Pipeline, TimestampNormalizer};
use logweave::security::{self, MAX_REGEX_LENGTH, PEEK_LINES};
use logweave::source::{LineSource, PeekStdinSource, SourceError, open_path_source};
use logweave::{
    FormatDetector, LogLevel, LogParser, LogRecord, ParserRegistry, output,
};

#[derive(Parser)]
#[command(
    name = "logweave",
    version,
    about = "Detect, parse, and correlate logs from any format"
)]
struct Cli {
    /// Suppress non-essential output.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, ValueEnum)]
enum ParseOutput {
    Table,
    Json,
    Csv,
    Compact,
}

#[derive(Clone, Copy, PartialEq, ValueEnum)]
enum CorrelateOutput {
    Table,
    Json,
}

#[derive(Clone, Copy, PartialEq, ValueEnum)]
enum StreamOutput {
    Compact,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    #[value(name = "request_id")]
    RequestId,
    Timestamp,
    Session,
    All,
}

impl StrategyArg {
    fn as_str(self) -> &'static str {
        match self {
            StrategyArg::RequestId => "request_id",
            StrategyArg::Timestamp => "timestamp",
            StrategyArg::Session => "session",
            StrategyArg::All => "all",
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LevelArg {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LevelArg {
    fn to_level(self) -> LogLevel {
        match self {
            LevelArg::Debug => LogLevel::Debug,
            LevelArg::Info => LogLevel::Info,
            LevelArg::Warning => LogLevel::Warning,
            LevelArg::Error => LogLevel::Error,
            LevelArg::Critical => LogLevel::Critical,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Parse log files (or stdin) and display normalized records.
    Parse {
        /// Log files to parse. Omit to read from stdin.
        files: Vec<PathBuf>,

        /// Force a specific log format (skip auto-detection).
        #[arg(short, long)]
        format: Option<String>,

        /// Output format.
        #[arg(short, long, value_enum, default_value = "table")]
        output: ParseOutput,

        /// Filter by minimum log level.
        #[arg(short, long, value_enum, ignore_case = true)]
        level: Option<LevelArg>,

        /// Limit the number of entries displayed.
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Filter entries by message content (regex).
        #[arg(short, long)]
        grep: Option<String>,

        /// Apply the normalization pipeline (timestamps to UTC, level recovery).
        #[arg(long)]
        normalize: bool,

        #[arg(long = "no-normalize", hide = true)]
        no_normalize: bool,
    },

    /// Correlate related log entries across multiple files.
    Correlate {
        /// Log files to correlate (at least two).
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Force a specific log format for all files.
        #[arg(short, long)]
        format: Option<String>,

        /// Correlation strategy.
        #[arg(short, long, value_enum, default_value = "all")]
        strategy: StrategyArg,

        /// Time window in seconds for timestamp correlation.
        #[arg(short, long, default_value_t = 1.0)]
        window: f64,

        /// Output format.
        #[arg(short, long, value_enum, default_value = "table")]
        output: CorrelateOutput,
    },

    /// Stream-parse a very large log file with bounded memory.
    Stream {
        /// Log file to stream.
        file: PathBuf,

        /// Log format (required, no auto-detection in stream mode).
        #[arg(short, long)]
        format: String,

        /// Output format.
        #[arg(short, long, value_enum, default_value = "compact")]
        output: StreamOutput,

        /// Show a progress bar (default on).
        #[arg(long)]
        progress: bool,

        #[arg(long = "no-progress", hide = true)]
        no_progress: bool,
    },

    /// Detect the log format of files.
    Detect {
        /// Files to inspect.
        files: Vec<PathBuf>,

        /// Show all matching formats with confidence scores.
        #[arg(short, long)]
        all: bool,
    },

    /// List registered parsers and their format aliases.
    Formats,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logweave=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let quiet = cli.quiet;

    match cli.command {
        Command::Parse {
            files,
            format,
            output,
            level,
            limit,
            grep,
            normalize,
            no_normalize,
        } => parse_command(
            &files,
            format.as_deref(),
            output,
            level,
            limit,
            grep.as_deref(),
            normalize && !no_normalize,
            quiet,
        ),
        Command::Correlate {
            files,
            format,
            strategy,
            window,
            output,
        } => correlate_command(&files, format.as_deref(), strategy, window, output, quiet),
        Command::Stream {
            file,
            format,
            output,
            progress: _,
            no_progress,
        } => stream_command(&file, &format, output, !no_progress, quiet),
        Command::Detect { files, all } => detect_command(&files, all),
        Command::Formats => formats_command(),
    }
}

/// Collect records from a source, stamping origin metadata on each.
/// Security violations abort; plain I/O trouble ends the stream with a
/// diagnostic already emitted by the source.
fn collect_records(
    source: Box<dyn LineSource>,
    parser: &dyn LogParser,
    label: &str,
) -> Result<Vec<LogRecord>, SourceError> {
    let mut records = Vec::new();
    let mut line_number = 0u64;
    for line in source.read_lines() {
        let line = match line {
            Ok(line) => line,
            Err(SourceError::Security(e)) => return Err(SourceError::Security(e)),
            Err(_) => break,
        };
        line_number += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut record = parser.parse_line(trimmed);
        record.source.file_path = Some(label.to_string());
        record.source.line_number = Some(line_number);
        records.push(record);
    }
    Ok(records)
}

fn parser_for(format: &str) -> Option<&'static dyn LogParser> {
    let registry = ParserRegistry::shared();
    registry
        .get_parser(format)
        .or_else(|| registry.get_parser("generic"))
}

#[allow(clippy::too_many_arguments)]
fn parse_command(
    files: &[PathBuf],
    format: Option<&str>,
    output: ParseOutput,
    level: Option<LevelArg>,
    limit: Option<usize>,
    grep: Option<&str>,
    normalize: bool,
    quiet: bool,
) -> anyhow::Result<()> {
    // Validate the grep pattern before doing any work.
    let grep_pattern = match grep {
        Some(pattern) => Some(
            security::validate_regex_pattern(pattern, MAX_REGEX_LENGTH)
                .map_err(|e| anyhow::anyhow!("regex validation failed: {e}"))?,
        ),
        None => None,
    };

    let detector = FormatDetector::new();
    let mut records: Vec<LogRecord> = Vec::new();

    if files.is_empty() {
        if std::io::stdin().is_terminal() {
            bail!("no files specified and stdin is a terminal");
        }
        let mut source = PeekStdinSource::new(PEEK_LINES);
        let format_name = match format {
            Some(f) => f.to_string(),
            None => {
                let sample = source.peek().context("failed reading stdin")?.to_vec();
                let (detected, confidence) = detector.detect(&sample);
                if !quiet {
                    eprintln!(
                        "{} detected {} (confidence: {:.0}%)",
                        style("stdin:").dim(),
                        style(&detected).cyan(),
                        confidence * 100.0
                    );
                }
                detected
            }
        };
        let Some(parser) = parser_for(&format_name) else {
            bail!("no parser for format: {format_name}");
        };
        records.append(&mut collect_records(Box::new(source), parser, "<stdin>")?);
    } else {
        for file in files {
            if !file.exists() {
                bail!("file not found: {}", file.display());
            }
            let format_name = match format {
                Some(f) => f.to_string(),
                None => {
                    let (detected, confidence) = detector.detect_file(file);
                    if !quiet {
                        eprintln!(
                            "{} detected {} (confidence: {:.0}%)",
                            style(format!("{}:", file.display())).dim(),
                            style(&detected).cyan(),
                            confidence * 100.0
                        );
                    }
                    detected
                }
            };
            let Some(parser) = parser_for(&format_name) else {
                bail!("no parser for format: {format_name}");
            };
            let source = open_path_source(file)
                .with_context(|| format!("cannot open {}", file.display()))?;
            records.append(&mut collect_records(
                source,
                parser,
                &file.display().to_string(),
            )?);
        }
    }

    if normalize {
        let mut pipeline = Pipeline::new(vec![
            Box::new(TimestampNormalizer::utc()),
            Box::new(LevelNormalizer),
        ]);
        records = pipeline
            .process(records.into_iter())
            .filter_map(Result::ok)
            .collect();
    }

    if let Some(level) = level {
        let min = level.to_level();
        records.retain(|r| r.level >= min);
    }
    if let Some(pattern) = &grep_pattern {
        records.retain(|r| pattern.is_match(&r.message));
    }
    if let Some(limit) = limit {
        records.truncate(limit);
    }

    if records.is_empty() {
        if !quiet {
            println!("{}", style("No matching log entries found.").yellow());
        }
        return Ok(());
    }

    match output {
        ParseOutput::Table => output::render_table(&records),
        ParseOutput::Json => output::render_json(&records),
        ParseOutput::Csv => output::render_csv(&records),
        ParseOutput::Compact => output::render_compact(&records),
    }
    Ok(())
}

fn correlate_command(
    files: &[PathBuf],
    format: Option<&str>,
    strategy: StrategyArg,
    window: f64,
    output: CorrelateOutput,
    quiet: bool,
) -> anyhow::Result<()> {
    if files.len() < 2 {
        bail!("correlation requires at least 2 files");
    }

    let mut valid: Vec<&Path> = Vec::new();
    for file in files {
        if file.exists() {
            if !quiet {
                eprintln!("{} {}", style("added source:").dim(), file.display());
            }
            valid.push(file);
        } else {
            eprintln!(
                "{} file not found: {}",
                style("warning:").yellow(),
                file.display()
            );
        }
    }
    if valid.len() < 2 {
        bail!("need at least 2 valid sources for correlation");
    }

    let result = logweave::correlate(&valid, strategy.as_str(), format, window)?;

    if !quiet {
        println!();
        println!("{}", style("Correlation Results").bold());
        println!(
            "  groups found: {}",
            style(result.groups.len()).cyan()
        );
        println!(
            "  orphan entries: {}",
            style(result.orphans.len()).yellow()
        );
        println!();
    }

    match output {
        CorrelateOutput::Table => output::render_correlation_table(&result),
        CorrelateOutput::Json => output::render_correlation_json(&result),
    }
    Ok(())
}

fn stream_command(
    file: &Path,
    format: &str,
    output: StreamOutput,
    progress: bool,
    quiet: bool,
) -> anyhow::Result<()> {
    if !file.exists() {
        bail!("file not found: {}", file.display());
    }

    let bar = if progress {
        let size = std::fs::metadata(file).map(|m| m.len()).unwrap_or(0);
        let bar = ProgressBar::new(size).with_style(
            ProgressStyle::with_template("[{bar:40}] {bytes}/{total_bytes} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Some(bar)
    } else {
        None
    };

    let callback = bar.clone().map(|bar| {
        Box::new(move |bytes_read: u64, _total: u64, lines: u64| {
            bar.set_position(bytes_read);
            bar.set_message(format!("{lines} lines"));
        }) as logweave::ProgressFn
    });

    let stream = logweave::stream_parse(file, format, callback)?;

    let mut count = 0u64;
    for record in stream {
        match output {
            StreamOutput::Json => println!("{}", record.to_mapping()),
            StreamOutput::Compact => println!("{}", output::compact_line(&record)),
        }
        count += 1;
    }

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    if !quiet {
        eprintln!("{}", style(format!("Processed {count} entries")).green());
    }
    Ok(())
}

fn detect_command(files: &[PathBuf], all: bool) -> anyhow::Result<()> {
    if files.is_empty() {
        bail!("no files specified");
    }

    let detector = FormatDetector::new();

    for file in files {
        if !file.exists() {
            bail!("file not found: {}", file.display());
        }

        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());

        if all {
            let source = logweave::FileSource::open(file)
                .with_context(|| format!("cannot open {}", file.display()))?;
            let lines: Vec<String> = Box::new(source)
                .read_lines()
                .take(security::DETECT_SAMPLE_SIZE)
                .filter_map(Result::ok)
                .collect();
            println!();
            println!("{}", style(&name).bold());
            for (format, confidence) in detector.detect_all(&lines).into_iter().take(5) {
                println!(
                    "  {:<20} {} {:.0}%",
                    format,
                    output::confidence_bar(confidence, 10),
                    confidence * 100.0
                );
            }
        } else {
            let (format, confidence) = detector.detect_file(file);
            println!(
                "{}: {} {} {:.0}%",
                name,
                style(&format).cyan(),
                output::confidence_bar(confidence, 10),
                confidence * 100.0
            );
        }
    }

    Ok(())
}

fn formats_command() -> anyhow::Result<()> {
    let registry = ParserRegistry::shared();
    println!("{}", style(format!("{:<24}  {}", "PARSER", "FORMATS")).bold().magenta());
    let mut names = registry.list_parsers();
    names.sort_unstable();
    for name in names {
        if let Some(parser) = registry.get_parser(name) {
            println!("{:<24}  {}", name, parser.supported_formats().join(", "));
        }
    }
    Ok(())
}

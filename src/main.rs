//! grokken CLI: OCR cleanup and long-document training-data generation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use grokken::analyzer::Analyzer;
use grokken::clean::BookCatalog;
use grokken::config::{GenerationConfig, StrategyConfig};
use grokken::generator::{Generator, output};
use grokken::prompts::format_thousands;
use grokken::provider::create_provider;
use grokken::reader::SimulatedReader;
use grokken::schema::{Role, Segment};
use grokken::segment::{HandlerRegistry, SegmentMethod, Segmenter};
use grokken::source::{BookRow, SourceTable, write_jsonl};
use grokken::tokenizer::{TokenizerKind, build_counter};

/// Exit status for a run stopped by SIGINT/SIGTERM.
const EXIT_INTERRUPTED: i32 = 130;

const PREVIEW_CHARS: usize = 2000;

#[derive(Parser)]
#[command(
    name = "grokken",
    version,
    about = "OCR book cleanup and long-document summarization training data"
)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Token-budget knobs shared by `analyze` and `segment`.
#[derive(Args)]
struct BudgetArgs {
    /// Context window of the target model, in tokens.
    #[arg(long, default_value = "100000")]
    max_tokens: usize,

    /// Books under this many tokens are summarized in one call.
    #[arg(long, default_value = "80000")]
    threshold: usize,

    /// Token budget of each segment summary.
    #[arg(long, default_value = "2000")]
    segment_tokens: usize,

    /// Count tokens as chars/4 instead of loading the BPE vocabulary.
    #[arg(long)]
    approximate: bool,
}

impl BudgetArgs {
    fn strategy(&self) -> StrategyConfig {
        StrategyConfig {
            max_context_tokens: self.max_tokens,
            short_book_threshold: self.threshold,
            segment_summary_tokens: self.segment_tokens,
            ..StrategyConfig::default()
        }
    }

    fn tokenizer(&self) -> TokenizerKind {
        if self.approximate {
            TokenizerKind::Approximate
        } else {
            TokenizerKind::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate summaries and Q&A for the books named in a config.
    Generate {
        /// TOML run configuration.
        #[arg(long)]
        config: PathBuf,

        /// Process only this barcode (replaces the config's target).
        #[arg(long, conflicts_with = "collection")]
        barcode: Option<String>,

        /// Process this collection (replaces the config's target).
        #[arg(long)]
        collection: Option<String>,

        /// Resume from this checkpoint file.
        #[arg(long)]
        resume: Option<PathBuf>,

        /// Output directory (replaces the config's `output_dir`).
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Classify books as short or long and estimate segment counts.
    Analyze {
        /// JSONL source table.
        #[arg(long)]
        source: PathBuf,

        /// Analyze one book; every book in the table when omitted.
        #[arg(long)]
        barcode: Option<String>,

        #[command(flatten)]
        budget: BudgetArgs,
    },

    /// Show how a book would be segmented.
    Segment {
        /// JSONL source table.
        #[arg(long)]
        source: PathBuf,

        #[arg(long)]
        barcode: String,

        /// Aim for roughly this many segments.
        #[arg(long)]
        target: Option<usize>,

        /// Print the start of segment N (1-based).
        #[arg(long)]
        preview: Option<usize>,

        #[command(flatten)]
        budget: BudgetArgs,
    },

    /// List the books with custom segmentation handlers.
    Handlers,

    /// Clean OCR text with a book's registered processor.
    Clean {
        /// JSONL source table.
        #[arg(long)]
        source: PathBuf,

        #[arg(long, conflicts_with = "collection", required_unless_present = "collection")]
        barcode: Option<String>,

        #[arg(long)]
        collection: Option<String>,

        /// JSONL file for the cleaned rows.
        #[arg(long)]
        output: PathBuf,
    },

    /// List the books in the cleaning catalog.
    Books {
        #[arg(long)]
        collection: Option<String>,
    },

    /// Generate standalone Q&A pairs from a saved result's final summary.
    Quiz {
        /// `<barcode>.json` written by `generate`.
        #[arg(long)]
        result: PathBuf,

        /// Number of question/answer pairs.
        #[arg(long, default_value = "5")]
        count: usize,

        /// TOML run configuration (for the provider settings).
        #[arg(long)]
        config: PathBuf,
    },

    /// Write a default run configuration.
    InitConfig {
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Generate {
            config,
            barcode,
            collection,
            resume,
            output,
        } => {
            let mut config = GenerationConfig::load(&config)?;
            if let Some(barcode) = barcode {
                config.barcode = Some(barcode);
                config.collection = None;
            } else if let Some(collection) = collection {
                config.collection = Some(collection);
                config.barcode = None;
            }
            if resume.is_some() {
                config.resume_from = resume;
            }
            if let Some(output) = output {
                config.output_dir = output;
            }
            config.validate()?;
            cmd_generate(config)?;
        }

        Commands::Analyze {
            source,
            barcode,
            budget,
        } => cmd_analyze(&source, barcode.as_deref(), &budget)?,

        Commands::Segment {
            source,
            barcode,
            target,
            preview,
            budget,
        } => cmd_segment(&source, &barcode, target, preview, &budget)?,

        Commands::Handlers => {
            let handlers = HandlerRegistry::builtin();
            println!("Custom segmentation handlers ({}):", handlers.len());
            for handler in handlers.iter() {
                println!("  {}  {}", handler.barcode(), handler.title());
            }
        }

        Commands::Clean {
            source,
            barcode,
            collection,
            output,
        } => cmd_clean(&source, barcode.as_deref(), collection.as_deref(), &output)?,

        Commands::Books { collection } => {
            let catalog = BookCatalog::builtin();
            let books = match &collection {
                Some(name) => catalog.collection(name)?,
                None => catalog.iter().collect(),
            };
            match &collection {
                Some(name) => println!("Collection: {name} ({} books)", books.len()),
                None => println!(
                    "Books ({}) in collections: {}",
                    books.len(),
                    catalog.collections().join(", ")
                ),
            }
            for book in books {
                println!("  {}  {} ({}, {})", book.barcode, book.title, book.author, book.date);
            }
        }

        Commands::Quiz {
            result,
            count,
            config,
        } => cmd_quiz(&result, count, &config)?,

        Commands::InitConfig { path, force } => {
            if path.exists() && !force {
                miette::bail!(
                    "{} already exists (pass --force to overwrite)",
                    path.display()
                );
            }
            let config = GenerationConfig {
                collection: Some("principia".into()),
                ..GenerationConfig::default()
            };
            config.save(&path)?;
            println!("Wrote default configuration to {}", path.display());
        }
    }

    Ok(())
}

fn cmd_generate(config: GenerationConfig) -> Result<()> {
    let interrupt = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        // A second signal while shutting down exits immediately.
        signal_hook::flag::register_conditional_shutdown(
            signal,
            EXIT_INTERRUPTED,
            Arc::clone(&interrupt),
        )
        .into_diagnostic()?;
        signal_hook::flag::register(signal, Arc::clone(&interrupt)).into_diagnostic()?;
    }

    let counter = build_counter(&config.tokenizer)?;
    let provider = create_provider(&config.provider, Arc::clone(&counter))?;
    let source = SourceTable::from_jsonl(&config.source)?;

    println!("Starting generation: {}", config.name);
    println!("Source: {}", config.source.display());
    println!("Output: {}", config.output_dir.display());

    let mut generator = Generator::new(config, provider, counter)
        .with_interrupt(Arc::clone(&interrupt))
        .with_progress(Box::new(|message, current, total| {
            if total > 0 {
                eprintln!("[{current}/{total}] {message}");
            } else {
                eprintln!("{message}");
            }
        }));
    let result = generator.run(&source)?;

    println!(
        "\nProcessed {} books ({} failed)",
        result.success_count(),
        result.failure_count()
    );
    if !result.records.is_empty() {
        let tokens: usize = result.records.iter().map(|r| r.source_tokens).sum();
        let turns = result
            .records
            .iter()
            .flat_map(|r| &r.qa_conversation)
            .filter(|m| m.role == Role::Assistant)
            .count();
        println!("Total source tokens: {}", format_thousands(tokens));
        println!("Total Q&A turns: {turns}");
    }
    println!(
        "API calls: {}  tokens in/out: {}/{}",
        result.total_calls,
        format_thousands(result.total_input_tokens as usize),
        format_thousands(result.total_output_tokens as usize)
    );
    println!("Total cost: ${:.4}", result.total_cost);

    if result.interrupted || interrupt.load(Ordering::SeqCst) {
        eprintln!("\nInterrupted; rerun with auto_resume or --resume to continue");
        std::process::exit(EXIT_INTERRUPTED);
    }
    Ok(())
}

fn cmd_analyze(source: &Path, barcode: Option<&str>, budget: &BudgetArgs) -> Result<()> {
    let table = SourceTable::from_jsonl(source)?;
    let counter = build_counter(&budget.tokenizer())?;
    let analyzer = Analyzer::new(counter, budget.strategy());

    if let Some(barcode) = barcode {
        let row = table.get(barcode)?;
        let a = analyzer.analyze(&row.text, &row.metadata())?;
        println!("Barcode: {}", a.barcode);
        println!("Title: {}", a.title);
        println!("Author: {}", a.author);
        println!("Characters: {}", format_thousands(a.char_count));
        println!("Tokens: {}", format_thousands(a.token_count));
        println!("Strategy: {}", a.strategy);
        println!("Estimated segments: {}", a.estimated_segments);
        return Ok(());
    }

    let mut analyses = Vec::with_capacity(table.len());
    for row in table.rows() {
        match analyzer.analyze(&row.text, &row.metadata()) {
            Ok(a) => analyses.push(a),
            Err(e) => tracing::warn!(barcode = %row.barcode, error = %e, "skipping book"),
        }
    }
    analyses.sort_by(|a, b| b.token_count.cmp(&a.token_count));

    println!("Analyzed {} books\n", analyses.len());
    println!("{:<20} {:>12} {:<12} {:>8}", "Barcode", "Tokens", "Strategy", "Segments");
    println!("{}", "-".repeat(60));
    let mut long = 0;
    for a in &analyses {
        println!(
            "{:<20} {:>12} {:<12} {:>8}",
            a.barcode,
            format_thousands(a.token_count),
            a.strategy.to_string(),
            a.estimated_segments
        );
        if a.needs_segmentation() {
            long += 1;
        }
    }
    println!("{}", "-".repeat(60));
    let total: usize = analyses.iter().map(|a| a.token_count).sum();
    println!("Total: {} tokens", format_thousands(total));
    println!("Short books: {}, Long books: {long}", analyses.len() - long);
    Ok(())
}

fn cmd_segment(
    source: &Path,
    barcode: &str,
    target: Option<usize>,
    preview: Option<usize>,
    budget: &BudgetArgs,
) -> Result<()> {
    let table = SourceTable::from_jsonl(source)?;
    let row = table.get(barcode)?;
    let counter = build_counter(&budget.tokenizer())?;
    let handlers = HandlerRegistry::builtin();

    let (text, segments, method, total_tokens) = match (handlers.get(barcode), target) {
        (Some(handler), None) => {
            let text = handler.preprocess_for_generation(&row.text).into_owned();
            let segments = handler.get_segments(&text, counter.as_ref())?;
            let total = counter.count(&text);
            (text, segments, SegmentMethod::CustomHandler, total)
        }
        (_, target) => {
            let segmenter = Segmenter::new(Arc::clone(&counter), budget.strategy());
            let result = match target {
                Some(n) => segmenter.segment_with_target(&row.text, n)?,
                None => segmenter.segment(&row.text)?,
            };
            (row.text.clone(), result.segments, result.method, result.total_tokens)
        }
    };

    let title = if row.title.is_empty() { "Unknown" } else { &row.title };
    println!("Book: {title}");
    println!("Method: {method}");
    println!("Total tokens: {}", format_thousands(total_tokens));
    println!("Segments: {}\n", segments.len());
    println!("{:>3} {:<50} {:>10}", "#", "Title", "Tokens");
    println!("{}", "-".repeat(70));
    for seg in &segments {
        println!(
            "{:>3} {:<50} {:>10}",
            seg.index() + 1,
            truncate_title(seg.title(), 50),
            format_thousands(seg.token_count())
        );
    }

    if let Some(n) = preview {
        println!("\n--- Preview of segment {n} ---\n");
        print_preview(&text, &segments, n);
    }
    Ok(())
}

fn truncate_title(title: &str, width: usize) -> String {
    if title.chars().count() <= width {
        return title.to_string();
    }
    let head: String = title.chars().take(width - 3).collect();
    format!("{head}...")
}

fn print_preview(text: &str, segments: &[Segment], n: usize) {
    let Some(seg) = n.checked_sub(1).and_then(|i| segments.get(i)) else {
        println!("Invalid segment number: {n}");
        return;
    };
    let Some(body) = seg.text(text) else {
        println!("Segment {n} is out of range for this text");
        return;
    };
    let preview: String = body.chars().take(PREVIEW_CHARS).collect();
    println!("{preview}");
    if body.chars().count() > PREVIEW_CHARS {
        println!("... [truncated]");
    }
}

fn cmd_clean(
    source: &Path,
    barcode: Option<&str>,
    collection: Option<&str>,
    output: &Path,
) -> Result<()> {
    let table = SourceTable::from_jsonl(source)?;
    let catalog = BookCatalog::builtin();
    let books = match (barcode, collection) {
        (Some(barcode), _) => vec![catalog.require(barcode)?],
        (None, Some(name)) => catalog.collection(name)?,
        (None, None) => miette::bail!("pass --barcode or --collection"),
    };

    let mut rows = Vec::with_capacity(books.len());
    let mut failed = 0;
    for book in books {
        println!("Processing {} ({})", book.barcode, book.title);
        let cleaned = table
            .get(book.barcode)
            .map_err(grokken::error::GrokkenError::from)
            .and_then(|row| Ok(book.process_with_stats(&row.text)?));
        match cleaned {
            Ok((text, stats)) => {
                println!(
                    "  Done: {} -> {} chars ({}% reduction)",
                    format_thousands(stats.raw_chars),
                    format_thousands(stats.processed_chars),
                    stats.reduction_pct
                );
                let meta = book.metadata();
                rows.push(BookRow {
                    barcode: meta.barcode,
                    text,
                    title: meta.title,
                    author: meta.author,
                    date: meta.date,
                });
            }
            Err(e) => {
                failed += 1;
                tracing::error!(barcode = book.barcode, error = %e, "cleaning failed");
            }
        }
    }

    if rows.is_empty() {
        miette::bail!("no books were cleaned ({failed} failed)");
    }
    let path = write_jsonl(output, &rows)?;
    println!("\nSaved {} cleaned books to {}", rows.len(), path.display());
    Ok(())
}

fn cmd_quiz(result: &Path, count: usize, config: &Path) -> Result<()> {
    let record = output::read_record(result)?;
    if record.final_summary.trim().is_empty() {
        miette::bail!("{} has no final summary to quiz on", result.display());
    }
    // The run config only has to supply provider settings here.
    let content = std::fs::read_to_string(config).into_diagnostic()?;
    let config: GenerationConfig = toml::from_str(&content).into_diagnostic()?;

    let counter = build_counter(&config.tokenizer)?;
    let provider = create_provider(&config.provider, counter)?;
    let mut reader = SimulatedReader::seeded(&*provider, config.qa.clone(), config.seed);
    let pairs = reader.generate_standalone_qa(
        &record.title,
        &record.author,
        &record.final_summary,
        count,
        config.provider.temperature,
    )?;

    if pairs.is_empty() {
        println!("No question/answer pairs could be parsed from the response.");
    }
    for (i, (question, answer)) in pairs.iter().enumerate() {
        println!("Q{}: {question}\nA{}: {answer}\n", i + 1, i + 1);
    }
    let usage = reader.usage();
    println!("Cost: ${:.4} ({} calls)", usage.cost, usage.calls);
    Ok(())
}

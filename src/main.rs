use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use annograph::stages::{OffsetConfig, ParentResolverConfig, TurnMergeConfig};
use annograph::{
    assemble, convert_batch, parse_document_file, AssemblyConfig, BatchConfig, ConventionLayers,
    ConventionPipeline, DocumentStatus, FlatLexicon, GraphDocument, HumanTranscript, LexiconFormat,
    PhonemeTable, SyllableTagger, TaggerConfig,
};

#[derive(Parser)]
#[command(name = "annograph")]
#[command(author, version, about = "Builds consistent annotation graphs from tiered transcripts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Assembly options shared by the converting commands
#[derive(clap::Args, Clone)]
struct AssemblyArgs {
    /// Longest pause between two turns of one speaker that still merges them
    #[arg(long, default_value = "0.0")]
    pause_tolerance: f64,

    /// Labels longer than this are truncated
    #[arg(long, default_value = "255")]
    max_label_length: usize,

    /// Leave transcription conventions in word labels
    #[arg(long)]
    no_conventions: bool,

    /// Also expand [CS:lang] code-switching markup
    #[arg(long)]
    phrase_language: bool,

    /// Don't split utterances into words when the source has no word tier
    #[arg(long)]
    no_tokenize: bool,

    /// Only accept parents that contain the whole child
    #[arg(long)]
    strict_parents: bool,
}

impl AssemblyArgs {
    fn config(&self) -> AssemblyConfig {
        let layers = ConventionLayers::default();
        let conventions = if self.no_conventions {
            None
        } else if self.phrase_language {
            Some(ConventionPipeline::with_phrase_language(&layers))
        } else {
            Some(ConventionPipeline::standard(&layers))
        };
        AssemblyConfig {
            turn_merge: TurnMergeConfig {
                pause_tolerance: self.pause_tolerance,
            },
            parents: ParentResolverConfig {
                midpoint_fallback: !self.strict_parents,
            },
            offsets: OffsetConfig::default(),
            tokenize_when_words_unmapped: !self.no_tokenize,
            max_label_length: self.max_label_length,
            conventions,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a source document into an annotation graph
    Convert {
        /// Input source document (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for the graph (JSON)
        #[arg(short, long)]
        output: PathBuf,

        /// Output file for a human-readable transcript (text)
        #[arg(long)]
        human_readable: Option<PathBuf>,

        #[command(flatten)]
        assembly: AssemblyArgs,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Convert many source documents in parallel
    Batch {
        /// Input source documents (JSON)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Directory for the graphs
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Documents converted at the same time
        #[arg(long, default_value = "4")]
        workers: usize,

        /// Also write human-readable transcripts
        #[arg(long)]
        human_readable: bool,

        #[command(flatten)]
        assembly: AssemblyArgs,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Assemble a document and report on the resulting graph without writing it
    Analyze {
        /// Input source document (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Recover syllables from segmented phones using a pronunciation lexicon
    Syllabify {
        /// Input source document (JSON) with a tier mapped to the phone layer
        #[arg(short, long)]
        input: PathBuf,

        /// Lexicon flat file
        #[arg(short, long)]
        lexicon: PathBuf,

        /// Output file for the graph (JSON)
        #[arg(short, long)]
        output: PathBuf,

        /// Lexicon pronunciations are Unisyn keysymbols rather than DISC
        #[arg(long)]
        unisyn: bool,

        /// Lexicon field delimiter; " - " splits on the first space only
        #[arg(long, default_value = "\t")]
        delimiter: String,

        /// The lexicon's first line holds field names
        #[arg(long)]
        skip_header: bool,

        /// Column holding the pronunciation
        #[arg(long, default_value = "1")]
        pronunciation_field: usize,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            input,
            output,
            human_readable,
            assembly,
            verbose,
        } => {
            setup_logging(verbose);
            convert_document(input, output, human_readable, assembly.config())
        }
        Commands::Batch {
            inputs,
            output_dir,
            workers,
            human_readable,
            assembly,
            verbose,
        } => {
            setup_logging(verbose);
            let config = BatchConfig {
                workers,
                assembly: assembly.config(),
                output_dir: Some(output_dir),
                human_readable,
            };
            run_batch(inputs, config).await
        }
        Commands::Analyze { input, verbose } => {
            setup_logging(verbose);
            analyze_document(input)
        }
        Commands::Syllabify {
            input,
            lexicon,
            output,
            unisyn,
            delimiter,
            skip_header,
            pronunciation_field,
            verbose,
        } => {
            setup_logging(verbose);
            let format = LexiconFormat {
                delimiter,
                skip_header,
                pronunciation_field,
                ..LexiconFormat::default()
            };
            syllabify_document(input, lexicon, output, format, unisyn)
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn convert_document(
    input: PathBuf,
    output: PathBuf,
    human_readable: Option<PathBuf>,
    config: AssemblyConfig,
) -> Result<()> {
    info!("Loading source document from {:?}", input);
    let document = parse_document_file(&input).context("Failed to parse input document")?;
    info!(
        "Loaded {} tier mappings, {} events",
        document.tiers.len(),
        document.events.len()
    );

    let conversion = assemble(&document, &config).context("Failed to assemble graph")?;
    for warning in &conversion.warnings {
        warn!("{}", warning);
    }

    info!("Writing graph to {:?}", output);
    GraphDocument::from_conversion(&conversion).write_json(&output)?;
    if let Some(path) = human_readable {
        info!("Writing human-readable transcript to {:?}", path);
        HumanTranscript::new(&conversion.graph).write_file(&path)?;
    }

    info!(
        "Complete: {} annotations, {} anchors, {} warnings",
        conversion.graph.annotation_count(),
        conversion.graph.anchor_count(),
        conversion.warnings.len()
    );
    Ok(())
}

async fn run_batch(inputs: Vec<PathBuf>, config: BatchConfig) -> Result<()> {
    if let Some(dir) = &config.output_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }

    let progress = Arc::new(AtomicUsize::new(0));
    let cancel = Arc::new(AtomicBool::new(false));
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted: finishing documents already started");
            on_interrupt.store(true, Ordering::Relaxed);
        }
    });

    let total = inputs.len();
    let outcomes = convert_batch(inputs, &config, progress.clone(), cancel).await?;

    for outcome in &outcomes {
        match &outcome.status {
            DocumentStatus::Converted {
                annotations,
                warnings,
            } => info!(
                "{:?}: {} annotations, {} warnings",
                outcome.path, annotations, warnings
            ),
            DocumentStatus::Failed { error } => warn!("{:?}: {}", outcome.path, error),
            DocumentStatus::Cancelled => info!("{:?}: not converted", outcome.path),
        }
    }
    info!(
        "Complete: {}/{} documents processed",
        progress.load(Ordering::Relaxed),
        total
    );
    Ok(())
}

fn analyze_document(input: PathBuf) -> Result<()> {
    info!("Analyzing source document from {:?}", input);
    let document = parse_document_file(&input).context("Failed to parse input document")?;
    let conversion =
        assemble(&document, &AssemblyConfig::default()).context("Failed to assemble graph")?;
    let graph = &conversion.graph;
    let stats = &conversion.stats;

    println!("Graph Analysis");
    println!("==============");
    println!("Graph: {}", graph.id);
    println!("Events: {} ({} ignored)", stats.events, stats.events_ignored);
    println!("Anchors: {}", graph.anchor_count());
    println!("Annotations: {}", graph.annotation_count());
    println!();

    println!("Layers");
    println!("------");
    for layer in &graph.schema().layers {
        let count = graph.layer_count(&layer.id);
        if count > 0 {
            println!("{}: {}", layer.id, count);
        }
    }
    println!();

    println!("Reconciliation");
    println!("--------------");
    println!(
        "References resolved: {} in {} passes",
        stats.references_resolved, stats.reference_passes
    );
    println!("Turns created: {}", stats.turns_created);
    println!("Utterances created: {}", stats.utterances_created);
    println!("Turns merged: {}", stats.turns_merged);
    println!("Words tokenized: {}", stats.words_tokenized);
    println!("Convention changes: {}", stats.convention_changes);
    println!("Parents resolved: {}", stats.parents_resolved);
    println!("Offsets interpolated: {}", stats.offsets_interpolated);
    println!("Labels truncated: {}", stats.labels_truncated);
    println!();

    println!("Warnings");
    println!("--------");
    if conversion.warnings.is_empty() {
        println!("None");
    }
    for warning in &conversion.warnings {
        println!("{}", warning);
    }

    let violations = graph.validate();
    if !violations.is_empty() {
        println!();
        println!("Violations");
        println!("----------");
        for violation in &violations {
            println!("{}", violation);
        }
    }

    Ok(())
}

fn syllabify_document(
    input: PathBuf,
    lexicon: PathBuf,
    output: PathBuf,
    format: LexiconFormat,
    unisyn: bool,
) -> Result<()> {
    let table = unisyn.then(PhonemeTable::unisyn);
    let lexicon = FlatLexicon::load_file(&lexicon, &format, table)?;

    let document = parse_document_file(&input).context("Failed to parse input document")?;
    let mut conversion =
        assemble(&document, &AssemblyConfig::default()).context("Failed to assemble graph")?;

    let cancel = AtomicBool::new(false);
    let report =
        SyllableTagger::new(TaggerConfig::default(), &lexicon).tag(&mut conversion.graph, &cancel);
    conversion.warnings.extend(report.warnings);

    info!("Writing graph to {:?}", output);
    GraphDocument::from_conversion(&conversion).write_json(&output)?;
    info!(
        "Complete: {} words syllabified, {} syllables, {} words not in lexicon",
        report.words_tagged, report.syllables_created, report.not_found
    );
    Ok(())
}

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use blastbait_rs::blast::{BlastCommandLine, OutputColumn};
use blastbait_rs::config::{AlignOptions, BaitConfig, ClusterMode, NameSource};
use blastbait_rs::config::{
    DEFAULT_BAIT_IDENTITY, DEFAULT_BAIT_LENGTH, DEFAULT_BAIT_MAX_HITS, DEFAULT_DUP_IDENTITY,
    DEFAULT_DUP_LENGTH, DEFAULT_TAXMIN,
};
use blastbait_rs::dedup::TerminalPrompt;
use blastbait_rs::dispatch::{dispatch, DispatchConfig};
use blastbait_rs::error::Result;
use blastbait_rs::filter::{filter_fastq, FilterConfig, FilterMode};
use blastbait_rs::taxonomy::{EntrezClient, TaxonomyService, EUTILS_BASE};
use blastbait_rs::{run_bait, BaitOutcome};

/// BLAST-driven contig baiting and read filtering
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// blastn executable
    #[arg(long, global = true, default_value = "blastn")]
    blastn: PathBuf,

    /// makeblastdb executable
    #[arg(long, global = true, default_value = "makeblastdb")]
    makeblastdb: PathBuf,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Classify contigs against a barcode library
    Bait(BaitArgs),
    /// Run one BLAST job per FASTA file on a bounded pool
    Dispatch(DispatchArgs),
    /// Keep or drop FASTQ reads according to BLAST hits
    Filter(FilterArgs),
}

#[derive(Debug, Args)]
struct BaitArgs {
    /// Barcode (bait) FASTA
    #[arg(long)]
    baits: PathBuf,

    /// Assembled contigs FASTA
    #[arg(long)]
    contigs: PathBuf,

    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Prefix for every output file
    #[arg(long, default_value = "bait")]
    prefix: String,

    /// TSV of <name> TAB <lineage; separated; ranks>
    #[arg(long)]
    taxonomy: Option<PathBuf>,

    /// One taxonomic name per line
    #[arg(long)]
    names: Option<PathBuf>,

    /// Take bait names from this field of the id instead of matching names
    #[arg(long)]
    name_field: Option<usize>,

    #[arg(long, default_value = "|", requires = "name_field")]
    name_delimiter: String,

    /// Find and resolve duplicate barcodes before baiting
    #[arg(long)]
    dupcheck: bool,

    /// Ask which duplicate to keep instead of deciding by taxonomy
    #[arg(long)]
    interactive: bool,

    /// Cluster duplicates by full transitive closure
    #[arg(long)]
    transitive: bool,

    #[arg(long, default_value_t = DEFAULT_DUP_IDENTITY)]
    dupid: f64,

    #[arg(long, default_value_t = DEFAULT_DUP_LENGTH)]
    duplength: u32,

    #[arg(long, default_value_t = DEFAULT_BAIT_IDENTITY)]
    baitid: f64,

    #[arg(long, default_value_t = DEFAULT_BAIT_LENGTH)]
    baitlength: u32,

    #[arg(long, default_value_t = DEFAULT_BAIT_MAX_HITS)]
    max_hits: usize,

    /// Reference database for best-guess lineages
    #[arg(long, default_value = "nt")]
    taxdb: String,

    /// Search --taxdb locally rather than on the NCBI servers
    #[arg(long)]
    local_taxdb: bool,

    #[arg(long, default_value_t = DEFAULT_TAXMIN)]
    taxmin: f64,

    #[arg(long, default_value = EUTILS_BASE)]
    eutils_url: String,

    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Where duplicate-resolution progress is saved
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Continue from a saved checkpoint
    #[arg(long)]
    resume: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct DispatchArgs {
    /// Query FASTA files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    #[arg(long)]
    db: PathBuf,

    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Simultaneous BLAST processes
    #[arg(long, default_value_t = 1)]
    jobs: usize,

    /// Threads per BLAST process
    #[arg(long, default_value_t = 1)]
    threads: usize,

    #[arg(long, default_value = "qseqid sseqid pident length evalue")]
    columns: String,

    #[arg(long)]
    identity: Option<f64>,

    #[arg(long, default_value_t = 500)]
    max_hits: usize,
}

#[derive(Debug, Args)]
struct FilterArgs {
    #[arg(long)]
    fastq: PathBuf,

    /// BLAST tabular output for the reads
    #[arg(long)]
    hits: PathBuf,

    #[arg(long)]
    output: PathBuf,

    #[arg(long, default_value = "qseqid sseqid pident length evalue")]
    columns: String,

    #[arg(long, default_value_t = 0.0)]
    identity: f64,

    #[arg(long, default_value_t = 0)]
    length: u32,

    #[arg(long)]
    evalue: Option<f64>,

    /// Write reads without qualifying hits instead of those with them
    #[arg(long)]
    drop: bool,
}

fn spinner(color: &str, message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template(&format!("{{spinner:.{}}} {{msg}}", color))
    {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner
}

fn bait_config(args: &BaitArgs) -> BaitConfig {
    let mut config = BaitConfig::new(args.baits.clone(), args.contigs.clone());
    config.name_source = match args.name_field {
        Some(index) => NameSource::Field {
            delimiter: args.name_delimiter.clone(),
            index,
        },
        None => NameSource::Match,
    };
    config.taxonomy_table = args.taxonomy.clone();
    config.library_names = args.names.clone();
    config.dedup.enabled = args.dupcheck;
    config.dedup.interactive = args.interactive;
    config.dedup.min_identity = args.dupid;
    config.dedup.min_length = args.duplength;
    config.dedup.cluster_mode = if args.transitive {
        ClusterMode::Transitive
    } else {
        ClusterMode::Online
    };
    config.taxonomy.database = args.taxdb.clone();
    config.taxonomy.remote = !args.local_taxdb;
    config.taxonomy.taxmin = args.taxmin;
    config.bait_identity = args.baitid;
    config.bait_length = args.baitlength;
    config.bait_max_hits = args.max_hits;
    config.threads = args.threads;
    config.resume = args.resume.clone();
    config.checkpoint = Some(
        args.checkpoint
            .clone()
            .unwrap_or_else(|| args.out_dir.join(format!("{}.checkpoint.json", args.prefix))),
    );
    config
}

fn run_bait_command(args: &BaitArgs, aligner: &BlastCommandLine) -> Result<()> {
    let config = bait_config(args);
    let entrez = match (&config.taxonomy_table, config.dedup.enabled || config.resume.is_some()) {
        (Some(_), true) => Some(EntrezClient::new(&args.eutils_url)?),
        _ => None,
    };
    let taxonomy = entrez.as_ref().map(|c| c as &dyn TaxonomyService);
    std::fs::create_dir_all(&args.out_dir)?;

    let mut prompt = TerminalPrompt;
    match run_bait(&config, aligner, taxonomy, &mut prompt)? {
        BaitOutcome::Halted { checkpoint, resolved } => {
            match checkpoint {
                Some(path) => println!(
                    "Stopped after {} duplicate set(s); resume with --resume {}",
                    resolved,
                    path.display()
                ),
                None => println!("Stopped after {} duplicate set(s)", resolved),
            }
            Ok(())
        }
        BaitOutcome::Completed(results) => {
            let pb = spinner("yellow", "Writing output files...");
            let written = results.write_outputs(&args.out_dir, &args.prefix)?;
            pb.finish_with_message(format!("{} output file(s) written to {}", written.len(), args.out_dir.display()));
            Ok(())
        }
    }
}

fn run_dispatch_command(args: &DispatchArgs, aligner: &BlastCommandLine) -> Result<()> {
    let config = DispatchConfig {
        inputs: args.inputs.clone(),
        database: args.db.clone(),
        output_dir: args.out_dir.clone(),
        jobs: args.jobs,
        options: AlignOptions {
            min_identity: args.identity,
            max_hits_per_query: args.max_hits,
            thread_count: args.threads,
            columns: OutputColumn::parse_list(&args.columns)?,
            ..AlignOptions::default()
        },
    };
    let pb = ProgressBar::new(config.inputs.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("{bar:40.green} {pos}/{len} {msg}") {
        pb.set_style(style);
    }
    pb.set_message("BLAST jobs");
    let outputs = dispatch(&config, aligner, Some(&pb))?;
    pb.finish_with_message(format!("{} report(s) in {}", outputs.len(), config.output_dir.display()));
    Ok(())
}

fn run_filter_command(args: &FilterArgs) -> Result<()> {
    let config = FilterConfig {
        fastq: args.fastq.clone(),
        hits: args.hits.clone(),
        output: args.output.clone(),
        columns: OutputColumn::parse_list(&args.columns)?,
        min_identity: args.identity,
        min_length: args.length,
        max_evalue: args.evalue,
        mode: if args.drop { FilterMode::Drop } else { FilterMode::Keep },
    };
    let pb = spinner("green", "Filtering reads...");
    pb.enable_steady_tick(Duration::from_millis(100));
    let summary = filter_fastq(&config)?;
    pb.finish_with_message(format!(
        "{} of {} read(s) written ({} with hits)",
        summary.written, summary.total, summary.with_hits
    ));
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let aligner = BlastCommandLine {
        blastn: cli.blastn.clone(),
        makeblastdb: cli.makeblastdb.clone(),
    };

    let result = match &cli.command {
        Command::Bait(args) => run_bait_command(args, &aligner),
        Command::Dispatch(args) => run_dispatch_command(args, &aligner),
        Command::Filter(args) => run_filter_command(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

// src/lib.rs
pub mod blast;
pub mod classify;
pub mod config;
pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod fastq;
pub mod filter;
pub mod names;
pub mod seqstore;
pub mod taxonomy;
pub mod types;

use ahash::AHashMap;
use std::fmt::Write as FmtWrite;
use std::fs;
use std::path::{Path, PathBuf};

use crate::blast::{format_row, Aligner, OutputColumn};
use crate::classify::BaitClassifier;
use crate::config::BaitConfig;
use crate::dedup::{apply_selections, Checkpoint, DuplicateResolver, DuplicateSetBuilder, Prompt, Resolution};
use crate::error::Result;
use crate::names::{parse_lineage_table, parse_name_list, LineageTable, NameMapping};
use crate::seqstore::SequenceStore;
use crate::taxonomy::{TaxonomyResolver, TaxonomyService};
use crate::types::{AuditRecord, ClassificationResult, DuplicateSet, HitRecord};

/// Everything a finished baiting run produced.
/// Only structured data is stored; text is generated on demand.
pub struct BaitResults {
    /// One entry per contig, in contig order
    pub classifications: Vec<ClassificationResult>,

    /// One entry per duplicate-set member
    pub audit: Vec<AuditRecord>,

    /// Baits left after duplicate resolution
    pub deduplicated_baits: SequenceStore,
    pub contigs: SequenceStore,

    /// Raw contig-vs-bait hits and the columns they were requested with
    pub hits: Vec<HitRecord>,
    pub hit_columns: Vec<OutputColumn>,

    /// Whether a taxonomy table was supplied (adds lineage columns to the audit log)
    pub taxonomy_present: bool,
}

fn or_na(value: Option<&str>) -> &str {
    value.unwrap_or("NA")
}

fn lineage_text(lineage: &[String]) -> String {
    if lineage.is_empty() {
        "NA".to_string()
    } else {
        lineage.join(";")
    }
}

impl BaitResults {
    /// contig id, match count, assigned name, representative, criterion
    pub fn get_classification_log(&self) -> String {
        let mut output = String::new();
        output.push_str("contig\tmatches\tname\trepresentative\tcriterion\n");
        for c in &self.classifications {
            writeln!(
                output,
                "{}\t{}\t{}\t{}\t{}",
                c.contig_id,
                c.matches.len(),
                or_na(c.assigned_name.as_deref()),
                or_na(c.representative.as_deref()),
                c.criterion
            )
            .unwrap();
        }
        output
    }

    pub fn get_alignment_log(&self) -> String {
        let mut output = String::new();
        for hit in &self.hits {
            writeln!(output, "{}", format_row(hit, &self.hit_columns)).unwrap();
        }
        output
    }

    pub fn get_audit_log(&self) -> String {
        let mut output = String::new();
        output.push_str("set\tmember\tsequence\tlength\t");
        if self.taxonomy_present {
            output.push_str("name\tblast_lineage\tsupplied_lineage\t");
        }
        output.push_str("action\n");

        for r in &self.audit {
            write!(output, "{}\t{}\t{}\t{}\t", r.set_id, r.ordinal, r.sequence_id, r.length).unwrap();
            if self.taxonomy_present {
                write!(
                    output,
                    "{}\t{}\t{}\t",
                    r.taxonomic_name,
                    lineage_text(&r.blast_lineage),
                    lineage_text(&r.supplied_lineage)
                )
                .unwrap();
            }
            writeln!(output, "{}", r.action).unwrap();
        }
        output
    }

    /// Contigs with `|<name>` appended to the header when a name was assigned.
    pub fn get_classified_contigs_text(&self) -> String {
        let names: AHashMap<&str, &str> = self
            .classifications
            .iter()
            .filter_map(|c| c.assigned_name.as_deref().map(|name| (c.contig_id.as_str(), name)))
            .collect();

        let mut output = String::new();
        for (id, seq) in self.contigs.iter() {
            match names.get(id) {
                Some(name) => writeln!(output, ">{}|{}\n{}", id, name, seq).unwrap(),
                None => writeln!(output, ">{}\n{}", id, seq).unwrap(),
            }
        }
        output
    }

    /// Writes every artefact as `<dir>/<prefix>.*` and returns the paths.
    pub fn write_outputs(&self, dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let path = |suffix: &str| dir.join(format!("{}.{}", prefix, suffix));

        let mut written = Vec::new();
        for (suffix, text) in [
            ("classification.tsv", self.get_classification_log()),
            ("blast.tsv", self.get_alignment_log()),
            ("duplicates.tsv", self.get_audit_log()),
            ("contigs.fasta", self.get_classified_contigs_text()),
        ] {
            fs::write(path(suffix), text)?;
            written.push(path(suffix));
        }
        let dedup = path("baits.dedup.fasta");
        self.deduplicated_baits.write_fasta(&dedup, |id| id.to_string())?;
        written.push(dedup);
        Ok(written)
    }
}

/// How a baiting run ended.
pub enum BaitOutcome {
    Completed(BaitResults),
    /// The user quit during duplicate resolution; no baiting took place.
    Halted {
        checkpoint: Option<PathBuf>,
        resolved: usize,
    },
}

/// Supplied names and lineages for the baits.
fn load_names(config: &BaitConfig, baits: &SequenceStore) -> Result<(NameMapping, Option<LineageTable>)> {
    let lineages = config.taxonomy_table.as_ref().map(parse_lineage_table).transpose()?;
    let names = match (&config.library_names, &lineages) {
        (Some(path), _) => parse_name_list(path)?,
        (None, Some(table)) => {
            let mut names: Vec<String> = table.keys().cloned().collect();
            names.sort();
            names
        }
        (None, None) => Vec::new(),
    };
    let mapping = NameMapping::build(baits.ids(), &names, &config.name_source)?;
    Ok((mapping, lineages))
}

/// Self-alignment, clustering, and (with a taxonomy table) best-guess lineages.
fn find_duplicates(
    config: &BaitConfig,
    aligner: &dyn Aligner,
    taxonomy: Option<&dyn TaxonomyService>,
    baits: &SequenceStore,
    names: &NameMapping,
    lineages: Option<&LineageTable>,
) -> Result<Vec<DuplicateSet>> {
    let hits = {
        let db = aligner.build_database(baits)?;
        aligner.align(baits, db.path(), &config.self_align_options())?
    };
    let mut sets = DuplicateSetBuilder::new(&config.dedup, names, lineages).build(&hits, baits);
    log::info!("Found {} duplicate set(s) among {} bait(s)", sets.len(), baits.len());

    if let (Some(service), Some(_)) = (taxonomy, lineages) {
        let database = Path::new(&config.taxonomy.database);
        let resolver = TaxonomyResolver::new(
            aligner,
            service,
            database,
            config.taxonomy_align_options(),
            config.taxonomy.taxmin,
        );
        for set in &mut sets {
            resolver.annotate(set, baits)?;
            log::debug!(
                "Duplicate set {} best guess: {}",
                set.set_id,
                set.best_guess_lineage.join("; ")
            );
        }
    }
    Ok(sets)
}

/// Baits `config.contigs` against `config.baits`, resolving duplicate
/// barcodes first when enabled or when resuming.
pub fn run_bait(
    config: &BaitConfig,
    aligner: &dyn Aligner,
    taxonomy: Option<&dyn TaxonomyService>,
    prompt: &mut dyn Prompt,
) -> Result<BaitOutcome> {
    // 1. Load sequences and names
    let mut baits = SequenceStore::load(&config.baits)?;
    let contigs = SequenceStore::load(&config.contigs)?;
    let (names, lineages) = load_names(config, &baits)?;
    log::info!("Loaded {} bait(s) and {} contig(s)", baits.len(), contigs.len());

    // 2. Duplicate sets, fresh or from a checkpoint
    let checkpoint_path = config.checkpoint.as_deref().or(config.resume.as_deref());
    let sets = if let Some(resume) = &config.resume {
        let checkpoint = Checkpoint::load(resume)?;
        log::info!("Resuming {} duplicate set(s) from {}", checkpoint.sets.len(), resume.display());
        checkpoint.sets
    } else if config.dedup.enabled && !baits.is_empty() {
        let sets = find_duplicates(config, aligner, taxonomy, &baits, &names, lineages.as_ref())?;
        if let Some(path) = checkpoint_path {
            Checkpoint::new(sets.clone()).save(path)?;
        }
        sets
    } else {
        Vec::new()
    };

    // 3. Resolve every set, then commit deletions
    let audit = if sets.is_empty() {
        Vec::new()
    } else {
        let mut resolver = DuplicateResolver::new(config.dedup.interactive, checkpoint_path, prompt);
        match resolver.resolve(sets)? {
            Resolution::Completed(sets) => apply_selections(&sets, &mut baits),
            Resolution::Halted { checkpoint, resolved } => {
                return Ok(BaitOutcome::Halted { checkpoint, resolved });
            }
        }
    };

    // 4. Bait the contigs
    let options = config.bait_align_options();
    let hits = if baits.is_empty() || contigs.is_empty() {
        Vec::new()
    } else {
        let db = aligner.build_database(&baits)?;
        aligner.align(&contigs, db.path(), &options)?
    };
    let classifier = BaitClassifier::new(&names, &baits, config.bait_identity, config.bait_length);
    let classifications = classifier.classify(&contigs, &hits);
    let named = classifications.iter().filter(|c| c.assigned_name.is_some()).count();
    log::info!("{} of {} contig(s) received a name", named, classifications.len());

    Ok(BaitOutcome::Completed(BaitResults {
        classifications,
        audit,
        deduplicated_baits: baits,
        contigs,
        hits,
        hit_columns: options.columns,
        taxonomy_present: lineages.is_some(),
    }))
}

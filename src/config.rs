// src/config.rs

use std::path::PathBuf;

use crate::blast::OutputColumn;

/// Default identity (%) for two baits to count as duplicates.
pub const DEFAULT_DUP_IDENTITY: f64 = 100.0;
pub const DEFAULT_DUP_LENGTH: u32 = 100;
/// Default identity (%) for a contig to be baited by a reference.
pub const DEFAULT_BAIT_IDENTITY: f64 = 99.0;
pub const DEFAULT_BAIT_LENGTH: u32 = 100;
pub const DEFAULT_BAIT_MAX_HITS: usize = 10;
pub const DEFAULT_TAXONOMY_MAX_HITS: usize = 25;
/// Minimum fraction of lineages that must agree to extend the best guess.
pub const DEFAULT_TAXMIN: f64 = 0.25;

/// Options for a single aligner invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignOptions {
    pub min_identity: Option<f64>,
    pub min_length: Option<u32>,
    pub max_hits_per_query: usize,
    pub thread_count: usize,
    pub columns: Vec<OutputColumn>,
    /// Restrict the search to these subject ids.
    pub seqid_list: Option<PathBuf>,
    /// Search the database on the NCBI servers instead of locally.
    pub remote: bool,
}

impl Default for AlignOptions {
    fn default() -> Self {
        Self {
            min_identity: None,
            min_length: None,
            max_hits_per_query: 500,
            thread_count: 1,
            columns: OutputColumn::standard().to_vec(),
            seqid_list: None,
            remote: false,
        }
    }
}

/// How a bait id is tied to its taxonomic name.
#[derive(Debug, Clone, PartialEq)]
pub enum NameSource {
    /// Match each id against the supplied names.
    Match,
    /// Take a delimited field of the id.
    Field { delimiter: String, index: usize },
}

/// Linkage used when building duplicate sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClusterMode {
    /// Single pass, order dependent.
    #[default]
    Online,
    /// Full transitive closure.
    Transitive,
}

/// Settings for the duplicate-barcode pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupConfig {
    pub enabled: bool,
    pub min_identity: f64,
    pub min_length: u32,
    pub cluster_mode: ClusterMode,
    pub interactive: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_identity: DEFAULT_DUP_IDENTITY,
            min_length: DEFAULT_DUP_LENGTH,
            cluster_mode: ClusterMode::Online,
            interactive: false,
        }
    }
}

/// Settings for best-guess lineage lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxonomyConfig {
    /// Reference database the duplicate members are searched against.
    pub database: String,
    pub remote: bool,
    pub max_hits: usize,
    pub taxmin: f64,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            database: "nt".to_string(),
            remote: true,
            max_hits: DEFAULT_TAXONOMY_MAX_HITS,
            taxmin: DEFAULT_TAXMIN,
        }
    }
}

/// Everything a baiting run needs. Built once and passed by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct BaitConfig {
    pub baits: PathBuf,
    pub contigs: PathBuf,
    pub name_source: NameSource,
    /// TSV of `name<TAB>lineage`.
    pub taxonomy_table: Option<PathBuf>,
    /// One taxonomic name per line.
    pub library_names: Option<PathBuf>,
    pub dedup: DedupConfig,
    pub taxonomy: TaxonomyConfig,
    pub bait_identity: f64,
    pub bait_length: u32,
    pub bait_max_hits: usize,
    pub threads: usize,
    pub checkpoint: Option<PathBuf>,
    pub resume: Option<PathBuf>,
}

impl BaitConfig {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(baits: P, contigs: Q) -> Self {
        Self {
            baits: baits.into(),
            contigs: contigs.into(),
            name_source: NameSource::Match,
            taxonomy_table: None,
            library_names: None,
            dedup: DedupConfig::default(),
            taxonomy: TaxonomyConfig::default(),
            bait_identity: DEFAULT_BAIT_IDENTITY,
            bait_length: DEFAULT_BAIT_LENGTH,
            bait_max_hits: DEFAULT_BAIT_MAX_HITS,
            threads: 1,
            checkpoint: None,
            resume: None,
        }
    }

    pub fn self_align_options(&self) -> AlignOptions {
        AlignOptions {
            min_identity: Some(self.dedup.min_identity),
            min_length: Some(self.dedup.min_length),
            thread_count: self.threads,
            ..AlignOptions::default()
        }
    }

    pub fn bait_align_options(&self) -> AlignOptions {
        AlignOptions {
            min_identity: Some(self.bait_identity),
            min_length: Some(self.bait_length),
            max_hits_per_query: self.bait_max_hits,
            thread_count: self.threads,
            ..AlignOptions::default()
        }
    }

    pub fn taxonomy_align_options(&self) -> AlignOptions {
        AlignOptions {
            max_hits_per_query: self.taxonomy.max_hits,
            thread_count: self.threads,
            columns: vec![OutputColumn::SubjectAccession, OutputColumn::BitScore],
            remote: self.taxonomy.remote,
            ..AlignOptions::default()
        }
    }
}

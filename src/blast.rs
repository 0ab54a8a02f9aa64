// src/blast.rs

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use crate::config::AlignOptions;
use crate::error::{BaitError, Result};
use crate::seqstore::SequenceStore;
use crate::types::HitRecord;

/// A column of BLAST `-outfmt 6` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputColumn {
    QueryId,
    SubjectId,
    SubjectAccession,
    PercentIdentity,
    AlignmentLength,
    EValue,
    BitScore,
}

impl OutputColumn {
    /// qseqid sseqid pident length evalue
    pub fn standard() -> &'static [OutputColumn] {
        &[
            OutputColumn::QueryId,
            OutputColumn::SubjectId,
            OutputColumn::PercentIdentity,
            OutputColumn::AlignmentLength,
            OutputColumn::EValue,
        ]
    }

    pub fn blast_name(&self) -> &'static str {
        match self {
            OutputColumn::QueryId => "qseqid",
            OutputColumn::SubjectId => "sseqid",
            OutputColumn::SubjectAccession => "sacc",
            OutputColumn::PercentIdentity => "pident",
            OutputColumn::AlignmentLength => "length",
            OutputColumn::EValue => "evalue",
            OutputColumn::BitScore => "bitscore",
        }
    }

    pub fn from_blast_name(name: &str) -> Option<Self> {
        Some(match name {
            "qseqid" => OutputColumn::QueryId,
            "sseqid" => OutputColumn::SubjectId,
            "sacc" => OutputColumn::SubjectAccession,
            "pident" => OutputColumn::PercentIdentity,
            "length" => OutputColumn::AlignmentLength,
            "evalue" => OutputColumn::EValue,
            "bitscore" => OutputColumn::BitScore,
            _ => return None,
        })
    }

    /// Parses a space or comma separated list such as `"qseqid sseqid pident"`.
    pub fn parse_list(text: &str) -> Result<Vec<OutputColumn>> {
        text.split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(|name| {
                Self::from_blast_name(name)
                    .ok_or_else(|| BaitError::Alignment(format!("unsupported output column '{}'", name)))
            })
            .collect()
    }
}

impl fmt::Display for OutputColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.blast_name())
    }
}

/// Parses one tabular row laid out as `columns`.
pub fn parse_row(line: &str, columns: &[OutputColumn]) -> std::result::Result<HitRecord, String> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != columns.len() {
        return Err(format!(
            "expected {} fields, found {}",
            columns.len(),
            fields.len()
        ));
    }

    let mut hit = HitRecord::default();
    for (column, raw) in columns.iter().zip(fields) {
        let raw = raw.trim();
        let bad = |e: String| format!("bad {} value '{}': {}", column, raw, e);
        match column {
            OutputColumn::QueryId => hit.query_id = raw.to_string(),
            OutputColumn::SubjectId => hit.subject_id = raw.to_string(),
            OutputColumn::SubjectAccession => hit.subject_accession = raw.to_string(),
            OutputColumn::PercentIdentity => {
                hit.percent_identity = raw.parse().map_err(|e: std::num::ParseFloatError| bad(e.to_string()))?
            }
            OutputColumn::AlignmentLength => {
                hit.alignment_length = raw.parse().map_err(|e: std::num::ParseIntError| bad(e.to_string()))?
            }
            OutputColumn::EValue => {
                hit.e_value = raw.parse().map_err(|e: std::num::ParseFloatError| bad(e.to_string()))?
            }
            OutputColumn::BitScore => {
                hit.bit_score = raw.parse().map_err(|e: std::num::ParseFloatError| bad(e.to_string()))?
            }
        }
    }
    Ok(hit)
}

/// Parses a whole tabular report; `source` names it in error messages.
pub fn parse_tabular(text: &str, columns: &[OutputColumn], source: &str) -> Result<Vec<HitRecord>> {
    let mut hits = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let hit = parse_row(line, columns)
            .map_err(|msg| BaitError::Alignment(format!("{}: row {}: {}", source, idx + 1, msg)))?;
        hits.push(hit);
    }
    Ok(hits)
}

/// Renders hits back into tabular form using `columns`.
pub fn format_row(hit: &HitRecord, columns: &[OutputColumn]) -> String {
    columns
        .iter()
        .map(|column| match column {
            OutputColumn::QueryId => hit.query_id.clone(),
            OutputColumn::SubjectId => hit.subject_id.clone(),
            OutputColumn::SubjectAccession => hit.subject_accession.clone(),
            OutputColumn::PercentIdentity => format!("{:.3}", hit.percent_identity),
            OutputColumn::AlignmentLength => hit.alignment_length.to_string(),
            OutputColumn::EValue => format!("{:e}", hit.e_value),
            OutputColumn::BitScore => format!("{:.1}", hit.bit_score),
        })
        .collect::<Vec<_>>()
        .join("\t")
}

/// Drops hits shorter than the requested minimum, when length was reported.
fn apply_length_filter(hits: Vec<HitRecord>, opts: &AlignOptions) -> Vec<HitRecord> {
    match opts.min_length {
        Some(min) if opts.columns.contains(&OutputColumn::AlignmentLength) => hits
            .into_iter()
            .filter(|hit| hit.alignment_length >= min)
            .collect(),
        _ => hits,
    }
}

/// A temporary alignment database. Its files are removed on drop.
#[derive(Debug)]
pub struct DatabaseHandle {
    dir: TempDir,
    name: PathBuf,
}

impl DatabaseHandle {
    /// Creates an empty scratch directory; `name` is the database prefix in it.
    pub fn scratch(name: &str) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("blastbait-").tempdir()?;
        let name = dir.path().join(name);
        Ok(Self { dir, name })
    }

    /// Database prefix to hand to the aligner.
    pub fn path(&self) -> &Path {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Writes a store to a FASTA file inside `dir`.
pub fn write_query(store: &SequenceStore, dir: &Path, file_name: &str) -> Result<PathBuf> {
    let path = dir.join(file_name);
    let mut out = BufWriter::new(File::create(&path)?);
    store.write_records(&mut out, |id| id.to_string())?;
    out.flush()?;
    Ok(path)
}

/// The external aligner as the pipeline sees it.
pub trait Aligner: Sync {
    /// Builds a throwaway database from `sequences`.
    fn build_database(&self, sequences: &SequenceStore) -> Result<DatabaseHandle>;

    /// Aligns the FASTA at `query` against the database prefix `database`.
    fn align_file(&self, query: &Path, database: &Path, opts: &AlignOptions) -> Result<Vec<HitRecord>>;

    fn align(&self, query: &SequenceStore, database: &Path, opts: &AlignOptions) -> Result<Vec<HitRecord>> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let scratch = tempfile::Builder::new().prefix("blastbait-query-").tempdir()?;
        let query_path = write_query(query, scratch.path(), "query.fasta")?;
        self.align_file(&query_path, database, opts)
    }
}

/// `makeblastdb` + `blastn` on the PATH (or at the given locations).
#[derive(Debug, Clone)]
pub struct BlastCommandLine {
    pub blastn: PathBuf,
    pub makeblastdb: PathBuf,
}

impl Default for BlastCommandLine {
    fn default() -> Self {
        Self {
            blastn: PathBuf::from("blastn"),
            makeblastdb: PathBuf::from("makeblastdb"),
        }
    }
}

impl BlastCommandLine {
    /// Ids stay local (no `-parse_seqids`); `sseqid` must echo ids such as
    /// `Alpha|1` unchanged.
    fn makeblastdb_args(fasta: &Path, out: &Path) -> Vec<String> {
        vec![
            "-in".to_string(),
            fasta.to_string_lossy().to_string(),
            "-dbtype".to_string(),
            "nucl".to_string(),
            "-out".to_string(),
            out.to_string_lossy().to_string(),
        ]
    }

    fn blastn_args(&self, query: &Path, database: &Path, opts: &AlignOptions) -> Vec<String> {
        let outfmt = std::iter::once("6".to_string())
            .chain(opts.columns.iter().map(|c| c.blast_name().to_string()))
            .collect::<Vec<_>>()
            .join(" ");

        let mut args = vec![
            "-query".to_string(),
            query.to_string_lossy().to_string(),
            "-db".to_string(),
            database.to_string_lossy().to_string(),
            "-outfmt".to_string(),
            outfmt,
            "-max_target_seqs".to_string(),
            opts.max_hits_per_query.to_string(),
            "-max_hsps".to_string(),
            "1".to_string(),
        ];
        if let Some(identity) = opts.min_identity {
            args.push("-perc_identity".to_string());
            args.push(identity.to_string());
        }
        if let Some(list) = &opts.seqid_list {
            args.push("-seqidlist".to_string());
            args.push(list.to_string_lossy().to_string());
        }
        if opts.remote {
            // blastn refuses -num_threads together with -remote
            args.push("-remote".to_string());
        } else {
            args.push("-num_threads".to_string());
            args.push(opts.thread_count.max(1).to_string());
        }
        args
    }
}

fn run(program: &Path, args: &[String]) -> Result<String> {
    log::debug!("Running '{} {}'", program.display(), args.join(" "));
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| BaitError::Alignment(format!("cannot start {}: {}", program.display(), e)))?;
    if !output.status.success() {
        return Err(BaitError::Alignment(format!(
            "{} exited with {}: {}",
            program.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    String::from_utf8(output.stdout)
        .map_err(|e| BaitError::Alignment(format!("{} wrote non-UTF-8 output: {}", program.display(), e)))
}

impl Aligner for BlastCommandLine {
    fn build_database(&self, sequences: &SequenceStore) -> Result<DatabaseHandle> {
        let handle = DatabaseHandle::scratch("db")?;
        let fasta = write_query(sequences, handle.dir(), "db.fasta")?;
        run(&self.makeblastdb, &Self::makeblastdb_args(&fasta, handle.path()))?;
        Ok(handle)
    }

    fn align_file(&self, query: &Path, database: &Path, opts: &AlignOptions) -> Result<Vec<HitRecord>> {
        let args = self.blastn_args(query, database, opts);
        let stdout = run(&self.blastn, &args)?;
        let hits = parse_tabular(&stdout, &opts.columns, &query.display().to_string())?;
        Ok(apply_length_filter(hits, opts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_requested_columns_only() {
        let columns = [OutputColumn::SubjectAccession, OutputColumn::BitScore];
        let hits = parse_tabular("MN001\t512.5\n\nMN002\t88\n", &columns, "t").unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].subject_accession, "MN001");
        assert_eq!(hits[1].bit_score, 88.0);
        assert!(hits[0].query_id.is_empty());
    }

    #[test]
    fn test_field_count_mismatch_fails() {
        let err = parse_tabular("q1\ts1\t99.0\n", OutputColumn::standard(), "t").unwrap_err();
        assert!(matches!(err, BaitError::Alignment(ref m) if m.contains("row 1")));
    }

    #[test]
    fn test_unparsable_number_fails() {
        let row = "q1\ts1\tninety\t120\t1e-50";
        assert!(parse_row(row, OutputColumn::standard()).is_err());
    }

    #[test]
    fn test_column_list_and_args() {
        let columns = OutputColumn::parse_list("qseqid, sseqid pident").unwrap();
        assert_eq!(columns.len(), 3);
        assert!(OutputColumn::parse_list("qseqid staxids").is_err());

        let opts = AlignOptions {
            min_identity: Some(99.0),
            columns,
            thread_count: 4,
            ..AlignOptions::default()
        };
        let args = BlastCommandLine::default().blastn_args(Path::new("q.fa"), Path::new("db"), &opts);
        let outfmt = args.iter().position(|a| a == "-outfmt").unwrap();
        assert_eq!(args[outfmt + 1], "6 qseqid sseqid pident");
        assert!(args.windows(2).any(|w| w[0] == "-perc_identity" && w[1] == "99"));
        assert!(args.windows(2).any(|w| w[0] == "-num_threads" && w[1] == "4"));
    }

    #[test]
    fn test_database_keeps_local_ids() {
        let args = BlastCommandLine::makeblastdb_args(Path::new("baits.fasta"), Path::new("db"));
        assert!(!args.iter().any(|a| a == "-parse_seqids"));
        assert!(args.windows(2).any(|w| w[0] == "-dbtype" && w[1] == "nucl"));
        assert_eq!(args.last().map(String::as_str), Some("db"));
    }

    #[test]
    fn test_length_filter_needs_length_column() {
        let hits = vec![
            HitRecord { alignment_length: 50, ..HitRecord::default() },
            HitRecord { alignment_length: 150, ..HitRecord::default() },
        ];
        let opts = AlignOptions { min_length: Some(100), ..AlignOptions::default() };
        assert_eq!(apply_length_filter(hits.clone(), &opts).len(), 1);

        let no_len = AlignOptions {
            min_length: Some(100),
            columns: vec![OutputColumn::SubjectAccession],
            ..AlignOptions::default()
        };
        assert_eq!(apply_length_filter(hits, &no_len).len(), 2);
    }

    #[test]
    fn test_database_handle_cleans_up() {
        let dir;
        {
            let handle = DatabaseHandle::scratch("db").unwrap();
            dir = handle.dir().to_path_buf();
            assert!(dir.exists());
        }
        assert!(!dir.exists());
    }
}

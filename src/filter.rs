// src/filter.rs

use ahash::AHashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::blast::{parse_tabular, OutputColumn};
use crate::error::{BaitError, Result};
use crate::fastq::{read_fastq_records, write_fastq_records};
use crate::types::HitRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Write only reads with a qualifying hit.
    Keep,
    /// Write only reads without one.
    Drop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterConfig {
    pub fastq: PathBuf,
    pub hits: PathBuf,
    pub output: PathBuf,
    pub columns: Vec<OutputColumn>,
    pub min_identity: f64,
    pub min_length: u32,
    pub max_evalue: Option<f64>,
    pub mode: FilterMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterSummary {
    pub total: usize,
    pub with_hits: usize,
    pub written: usize,
}

fn qualifies(hit: &HitRecord, config: &FilterConfig) -> bool {
    let has = |c: OutputColumn| config.columns.contains(&c);
    (!has(OutputColumn::PercentIdentity) || hit.percent_identity >= config.min_identity)
        && (!has(OutputColumn::AlignmentLength) || hit.alignment_length >= config.min_length)
        && match config.max_evalue {
            Some(max) if has(OutputColumn::EValue) => hit.e_value <= max,
            _ => true,
        }
}

/// Query ids with at least one hit passing the thresholds.
pub fn matching_read_ids(hits: &[HitRecord], config: &FilterConfig) -> AHashSet<String> {
    hits.iter()
        .filter(|hit| qualifies(hit, config))
        .map(|hit| hit.query_id.clone())
        .collect()
}

/// Splits a FASTQ file by BLAST evidence and writes the selected reads.
pub fn filter_fastq(config: &FilterConfig) -> Result<FilterSummary> {
    if !config.columns.contains(&OutputColumn::QueryId) {
        return Err(BaitError::Alignment("hit columns must include qseqid".to_string()));
    }
    let text = fs::read_to_string(&config.hits)?;
    let hits = parse_tabular(&text, &config.columns, &config.hits.display().to_string())?;
    let ids = matching_read_ids(&hits, config);

    let reads = read_fastq_records(&config.fastq)?;
    let with_hits = reads.iter().filter(|r| ids.contains(&r.id)).count();
    let selected = reads.iter().filter(|r| match config.mode {
        FilterMode::Keep => ids.contains(&r.id),
        FilterMode::Drop => !ids.contains(&r.id),
    });

    let mut out = BufWriter::new(File::create(&config.output)?);
    let written = write_fastq_records(&mut out, selected)?;
    out.flush()?;

    log::info!(
        "{}: {} read(s), {} with qualifying hits, {} written to {}",
        config.fastq.display(),
        reads.len(),
        with_hits,
        written,
        config.output.display()
    );
    Ok(FilterSummary {
        total: reads.len(),
        with_hits,
        written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &tempfile::TempDir, mode: FilterMode) -> FilterConfig {
        let fastq = dir.path().join("reads.fq");
        let hits = dir.path().join("hits.tsv");
        fs::write(&fastq, "@r1\nACGT\n+\nIIII\n@r2\nCCCC\n+\nIIII\n@r3\nGGGG\n+\nIIII\n").unwrap();
        fs::write(
            &hits,
            "r1\tref1\t99.5\t150\t1e-60\nr2\tref1\t90.0\t150\t1e-20\nr3\tref2\t100\t40\t1e-5\n",
        )
        .unwrap();
        FilterConfig {
            fastq,
            hits,
            output: dir.path().join("out.fq"),
            columns: OutputColumn::standard().to_vec(),
            min_identity: 95.0,
            min_length: 100,
            max_evalue: None,
            mode,
        }
    }

    #[test]
    fn test_keep_mode_writes_reads_with_hits() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir, FilterMode::Keep);
        let summary = filter_fastq(&cfg).unwrap();
        assert_eq!(summary, FilterSummary { total: 3, with_hits: 1, written: 1 });
        assert_eq!(fs::read_to_string(&cfg.output).unwrap(), "@r1\nACGT\n+\nIIII\n");
    }

    #[test]
    fn test_drop_mode_and_evalue_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(&dir, FilterMode::Drop);
        cfg.min_identity = 0.0;
        cfg.min_length = 0;
        cfg.max_evalue = Some(1e-10);
        let summary = filter_fastq(&cfg).unwrap();
        assert_eq!(summary.with_hits, 2);
        assert_eq!(fs::read_to_string(&cfg.output).unwrap(), "@r3\nGGGG\n+\nIIII\n");
    }

    #[test]
    fn test_requires_query_column() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(&dir, FilterMode::Keep);
        cfg.columns = vec![OutputColumn::SubjectId];
        assert!(filter_fastq(&cfg).is_err());
    }
}

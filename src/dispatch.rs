// src/dispatch.rs

use indicatif::ProgressBar;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::blast::{format_row, Aligner};
use crate::config::AlignOptions;
use crate::error::{BaitError, Result};

/// Many independent aligner runs, one per query file.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    pub inputs: Vec<PathBuf>,
    pub database: PathBuf,
    pub output_dir: PathBuf,
    /// Simultaneous aligner processes. Each also uses `options.thread_count`.
    pub jobs: usize,
    pub options: AlignOptions,
}

/// `<output_dir>/<input stem>.blast.tsv`
pub fn output_path(output_dir: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "query".to_string());
    output_dir.join(format!("{}.blast.tsv", stem))
}

fn run_one(aligner: &dyn Aligner, config: &DispatchConfig, input: &Path) -> Result<PathBuf> {
    let hits = aligner.align_file(input, &config.database, &config.options)?;
    let out_path = output_path(&config.output_dir, input);
    let mut out = BufWriter::new(File::create(&out_path)?);
    for hit in &hits {
        writeln!(out, "{}", format_row(hit, &config.options.columns))?;
    }
    out.flush()?;
    Ok(out_path)
}

/// Runs every input on a pool of `jobs` workers. Completion order is not
/// defined. Fails after all jobs ran if any of them failed.
pub fn dispatch(
    config: &DispatchConfig,
    aligner: &dyn Aligner,
    progress: Option<&ProgressBar>,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(&config.output_dir)?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.jobs.max(1))
        .build()
        .map_err(|e| BaitError::Alignment(format!("cannot start worker pool: {}", e)))?;

    let total = config.inputs.len();
    let finished = Mutex::new(0usize);
    let results: Vec<(PathBuf, Result<PathBuf>)> = pool.install(|| {
        config
            .inputs
            .par_iter()
            .map(|input| {
                let result = run_one(aligner, config, input);
                let done = {
                    let mut count = finished.lock();
                    *count += 1;
                    *count
                };
                if let Some(pb) = progress {
                    pb.inc(1);
                }
                match &result {
                    Ok(out) => log::info!("[{}/{}] {} -> {}", done, total, input.display(), out.display()),
                    Err(e) => log::error!("[{}/{}] {} failed: {}", done, total, input.display(), e),
                }
                (input.clone(), result)
            })
            .collect()
    });

    let mut outputs = Vec::with_capacity(total);
    let mut failed = Vec::new();
    for (input, result) in results {
        match result {
            Ok(out) => outputs.push(out),
            Err(e) => failed.push(format!("{}: {}", input.display(), e)),
        }
    }
    if !failed.is_empty() {
        return Err(BaitError::Alignment(format!(
            "{} of {} job(s) failed: {}",
            failed.len(),
            total,
            failed.join("; ")
        )));
    }
    Ok(outputs)
}

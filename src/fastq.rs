// src/fastq.rs

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::error::{BaitError, Result};

/// A minimal representation of a read.
#[derive(Debug, Clone, PartialEq)]
pub struct FastqRecord {
    pub id: String,
    pub header_line: String,
    pub seq: String,
    pub quals: String,
}

fn open_maybe_gz(path: &Path) -> Result<Box<dyn BufRead>> {
    let f = File::open(path)?;
    let is_gz = path
        .extension()
        .map(|ext| ext == "gz")
        .unwrap_or(false);

    Ok(if is_gz {
        Box::new(BufReader::new(MultiGzDecoder::new(f)))
    } else {
        Box::new(BufReader::new(f))
    })
}

/// Reads four-line FASTQ records from a plain or `.gz` file.
pub fn read_fastq_records<P: AsRef<Path>>(path: P) -> Result<Vec<FastqRecord>> {
    let path = path.as_ref();
    let mut reader = open_maybe_gz(path)?;

    let mut records = Vec::new();
    let mut line = String::new();
    let mut line_no = 0;

    let mut next_line = |reader: &mut Box<dyn BufRead>, line: &mut String| -> Result<Option<usize>> {
        line.clear();
        if reader.read_line(line)? == 0 {
            return Ok(None);
        }
        line_no += 1;
        Ok(Some(line_no))
    };

    loop {
        // 1) header, skipping blank lines between records
        let header_no = loop {
            match next_line(&mut reader, &mut line)? {
                None => return Ok(records),
                Some(_) if line.trim().is_empty() => continue,
                Some(n) => break n,
            }
        };
        let header_line = line.trim_end().to_string();
        let Some(header_str) = header_line.strip_prefix('@') else {
            return Err(BaitError::format(path, header_no, "FASTQ header must start with '@'"));
        };
        let header_str = header_str.to_string();

        // 2) sequence
        let seq_no = next_line(&mut reader, &mut line)?
            .ok_or_else(|| BaitError::format(path, header_no, "truncated record"))?;
        let seq = line.trim_end().to_string();

        // 3) plus line
        next_line(&mut reader, &mut line)?
            .filter(|_| line.starts_with('+'))
            .ok_or_else(|| BaitError::format(path, seq_no + 1, "expected '+' separator"))?;

        // 4) quality
        let qual_no = next_line(&mut reader, &mut line)?
            .ok_or_else(|| BaitError::format(path, seq_no + 2, "truncated record"))?;
        let quals = line.trim_end().to_string();
        if quals.len() != seq.len() {
            return Err(BaitError::format(path, qual_no, "quality length differs from sequence length"));
        }

        let id = header_str
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        records.push(FastqRecord {
            id,
            header_line: header_str,
            seq,
            quals,
        });
    }
}

pub fn write_fastq_records<'r, W, I>(out: &mut W, records: I) -> std::io::Result<usize>
where
    W: Write,
    I: IntoIterator<Item = &'r FastqRecord>,
{
    let mut written = 0;
    for read in records {
        writeln!(out, "@{}\n{}\n+\n{}", read.header_line, read.seq, read.quals)?;
        written += 1;
    }
    Ok(written)
}

// src/seqstore.rs

use ahash::AHashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{BaitError, Result};

/// IUPAC nucleotide codes plus the gap character.
const ALPHABET: &[u8] = b"ACGTURYSWKMBDHVN-";

fn is_sequence_line(line: &str) -> bool {
    line.bytes()
        .all(|b| ALPHABET.contains(&b.to_ascii_uppercase()))
}

/// In-memory id -> bases mapping that remembers load order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceStore {
    order: Vec<String>,
    bases: AHashMap<String, String>,
}

impl SequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from id/bases pairs. Later duplicates overwrite earlier ones.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut store = Self::new();
        for (id, seq) in pairs {
            store.insert(id.into(), seq.into());
        }
        store
    }

    /// Parses a FASTA file. Colliding ids are renamed `<id>_<n>` with the
    /// smallest free `n`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);

        let mut store = Self::new();
        let mut current: Option<(String, String, usize)> = None;

        for (idx, line_result) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line_result?;
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }

            if let Some(header) = line.strip_prefix('>') {
                if let Some((id, seq, header_line)) = current.take() {
                    store.push_record(path, id, seq, header_line)?;
                }
                let id = header.trim_start();
                if id.is_empty() {
                    return Err(BaitError::format(path, line_no, "empty FASTA header"));
                }
                if id.chars().any(char::is_whitespace) {
                    return Err(BaitError::Identifier(format!(
                        "{}: line {}: sequence id '{}' contains whitespace",
                        path.display(),
                        line_no,
                        id
                    )));
                }
                current = Some((id.to_string(), String::new(), line_no));
            } else if is_sequence_line(line) {
                match current.as_mut() {
                    Some((_, seq, _)) => seq.push_str(line),
                    None => {
                        return Err(BaitError::format(
                            path,
                            line_no,
                            "sequence data before the first header",
                        ))
                    }
                }
            } else {
                return Err(BaitError::format(
                    path,
                    line_no,
                    "line is neither a header nor nucleotide sequence",
                ));
            }
        }

        if let Some((id, seq, header_line)) = current.take() {
            store.push_record(path, id, seq, header_line)?;
        }
        Ok(store)
    }

    fn push_record(&mut self, path: &Path, id: String, seq: String, header_line: usize) -> Result<()> {
        if seq.is_empty() {
            return Err(BaitError::format(path, header_line, format!("record '{}' has no sequence", id)));
        }
        let id = if self.contains(&id) {
            let renamed = self.free_id(&id);
            log::warn!(
                "{}: duplicate sequence id '{}' renamed to '{}'",
                path.display(),
                id,
                renamed
            );
            renamed
        } else {
            id
        };
        self.insert(id, seq);
        Ok(())
    }

    fn free_id(&self, id: &str) -> String {
        (1..)
            .map(|n| format!("{}_{}", id, n))
            .find(|candidate| !self.contains(candidate))
            .unwrap_or_else(|| id.to_string())
    }

    fn insert(&mut self, id: String, seq: String) {
        if self.bases.insert(id.clone(), seq).is_none() {
            self.order.push(id);
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.bases.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.bases.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ids in load order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order
            .iter()
            .map(move |id| (id.as_str(), self.bases[id].as_str()))
    }

    /// Deletes the given ids in place; unknown ids are ignored.
    pub fn remove<'a, I>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut removed = 0;
        for id in ids {
            if self.bases.remove(id).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            let bases = &self.bases;
            self.order.retain(|id| bases.contains_key(id));
        }
        removed
    }

    /// Writes one record per id; `header_fn` produces the header text for an id.
    pub fn write_fasta<P, F>(&self, path: P, header_fn: F) -> Result<()>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> String,
    {
        let mut out = BufWriter::new(File::create(path)?);
        self.write_records(&mut out, header_fn)?;
        out.flush()?;
        Ok(())
    }

    pub fn write_records<W, F>(&self, out: &mut W, header_fn: F) -> std::io::Result<()>
    where
        W: Write,
        F: Fn(&str) -> String,
    {
        for (id, seq) in self.iter() {
            writeln!(out, ">{}\n{}", header_fn(id), seq)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_tmp(dir: &tempfile::TempDir, name: &str, text: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_load_concatenates_multiline_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tmp(&dir, "a.fa", ">s1\nACGT\nacgn\n\n>s2\nTT-A\n");
        let store = SequenceStore::load(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("s1"), Some("ACGTacgn"));
        assert_eq!(store.get("s2"), Some("TT-A"));
    }

    #[test]
    fn test_duplicate_headers_are_renamed_not_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tmp(&dir, "dup.fa", ">x\nAAAA\n>x\nCCCC\n>x_1\nGGGG\n>x\nTTTT\n");
        let store = SequenceStore::load(&path).unwrap();
        assert_eq!(store.len(), 4);
        assert_eq!(store.get("x"), Some("AAAA"));
        assert_eq!(store.get("x_1"), Some("CCCC"));
        assert_eq!(store.get("x_1_1"), Some("GGGG"));
        assert_eq!(store.get("x_2"), Some("TTTT"));
    }

    #[test]
    fn test_whitespace_in_id_is_identifier_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tmp(&dir, "ws.fa", ">seq one\nACGT\n");
        match SequenceStore::load(&path) {
            Err(BaitError::Identifier(msg)) => assert!(msg.contains("seq one")),
            other => panic!("expected identifier error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_line_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tmp(&dir, "bad.fa", ">s1\nACGT\nhello world\n");
        match SequenceStore::load(&path) {
            Err(BaitError::Format { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected format error, got {:?}", other),
        }
    }

    #[test]
    fn test_write_then_reload_preserves_case() {
        let dir = tempfile::tempdir().unwrap();
        let store = SequenceStore::from_pairs([("a", "ACgtN"), ("b", "ttttU")]);
        let path = dir.path().join("out.fa");
        store.write_fasta(&path, |id| id.to_string()).unwrap();
        let reloaded = SequenceStore::load(&path).unwrap();
        assert_eq!(reloaded, store);
    }

    #[test]
    fn test_remove_keeps_order_of_survivors() {
        let mut store = SequenceStore::from_pairs([("a", "A"), ("b", "C"), ("c", "G")]);
        assert_eq!(store.remove(["b", "zzz"]), 1);
        assert_eq!(store.ids().collect::<Vec<_>>(), vec!["a", "c"]);
    }
}

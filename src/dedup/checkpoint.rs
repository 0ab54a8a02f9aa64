// src/dedup/checkpoint.rs

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{BaitError, Result};
use crate::types::{DuplicateSet, Selection};

pub const CHECKPOINT_VERSION: u32 = 1;

/// Duplicate sets and the selections made so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub sets: Vec<DuplicateSet>,
}

impl Checkpoint {
    pub fn new(sets: Vec<DuplicateSet>) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            sets,
        }
    }

    /// Written through a sibling `.partial` file, then renamed into place.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let tmp = path.with_extension("partial");
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut out, self)
                .map_err(|e| BaitError::checkpoint(path, e.to_string()))?;
            out.flush()?;
        }
        fs::rename(&tmp, path)?;
        log::info!("Checkpoint with {} duplicate set(s) written to {}", self.sets.len(), path.display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| BaitError::checkpoint(path, e.to_string()))?;
        let checkpoint: Checkpoint = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| BaitError::checkpoint(path, format!("corrupt checkpoint: {}", e)))?;
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(BaitError::checkpoint(
                path,
                format!(
                    "unsupported checkpoint version {} (expected {})",
                    checkpoint.version, CHECKPOINT_VERSION
                ),
            ));
        }
        checkpoint.validate().map_err(|msg| BaitError::checkpoint(path, msg))?;
        Ok(checkpoint)
    }

    /// Every set has at least two members with distinct ordinals, and a
    /// kept member must exist.
    fn validate(&self) -> std::result::Result<(), String> {
        for set in &self.sets {
            if set.members.len() < 2 {
                return Err(format!("duplicate set {} has fewer than 2 members", set.set_id));
            }
            let mut ordinals: Vec<usize> = set.members.iter().map(|m| m.ordinal).collect();
            ordinals.sort_unstable();
            if ordinals.windows(2).any(|w| w[0] == w[1]) {
                return Err(format!("duplicate set {} repeats a member ordinal", set.set_id));
            }
            if let Selection::Member(n) = set.selection {
                if set.member(n).is_none() {
                    return Err(format!("duplicate set {} selects missing member {}", set.set_id, n));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DuplicateMember;

    fn sample() -> Checkpoint {
        let member = |ordinal: usize, id: &str| DuplicateMember {
            ordinal,
            sequence_id: id.to_string(),
            taxonomic_name: "Salmo salar".to_string(),
            sequence_length: 650,
            lineage: vec!["Eukaryota".to_string(), "Salmo".to_string()],
            taxonomy_match_score: 0.5,
        };
        Checkpoint::new(vec![
            DuplicateSet {
                set_id: 1,
                members: vec![member(1, "a"), member(2, "b")],
                best_guess_lineage: vec!["Eukaryota".to_string()],
                selection: Selection::Member(2),
            },
            DuplicateSet {
                set_id: 2,
                members: vec![member(1, "c"), member(2, "d")],
                best_guess_lineage: Vec::new(),
                selection: Selection::Unset,
            },
        ])
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.checkpoint.json");
        let checkpoint = sample();
        checkpoint.save(&path).unwrap();
        assert_eq!(Checkpoint::load(&path).unwrap(), checkpoint);
        assert!(!path.with_extension("partial").exists());
    }

    #[test]
    fn test_schema_is_stable() {
        let text = serde_json::to_string(&sample()).unwrap();
        assert!(text.contains(r#""version":1"#));
        assert!(text.contains(r#""selection":{"member":2}"#));
        assert!(text.contains(r#""selection":"unset""#));
    }

    #[test]
    fn test_rejects_corrupt_and_future_versions() {
        let dir = tempfile::tempdir().unwrap();
        let corrupt = dir.path().join("corrupt.json");
        fs::write(&corrupt, "{not json").unwrap();
        assert!(matches!(Checkpoint::load(&corrupt), Err(BaitError::Checkpoint { .. })));

        let future = dir.path().join("future.json");
        fs::write(&future, r#"{"version":7,"sets":[]}"#).unwrap();
        assert!(matches!(Checkpoint::load(&future), Err(BaitError::Checkpoint { .. })));

        let missing = dir.path().join("missing.json");
        assert!(matches!(Checkpoint::load(&missing), Err(BaitError::Checkpoint { .. })));

        let broken = |name: &str, edit: fn(&mut Checkpoint)| {
            let mut checkpoint = sample();
            edit(&mut checkpoint);
            let path = dir.path().join(name);
            checkpoint.save(&path).unwrap();
            Checkpoint::load(&path)
        };
        let out_of_range = broken("range.json", |c| c.sets[0].selection = Selection::Member(9));
        assert!(matches!(out_of_range, Err(BaitError::Checkpoint { .. })));
        let lone = broken("lone.json", |c| {
            c.sets[1].members.truncate(1);
            c.sets[1].selection = Selection::DeleteAll;
        });
        assert!(matches!(lone, Err(BaitError::Checkpoint { .. })));
        let repeated = broken("repeated.json", |c| c.sets[1].members[1].ordinal = 1);
        assert!(matches!(repeated, Err(BaitError::Checkpoint { .. })));
    }
}

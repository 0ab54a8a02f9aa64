// src/dedup/resolver.rs

use std::fmt::Write as FmtWrite;
use std::path::{Path, PathBuf};

use crate::error::{BaitError, Result};
use crate::seqstore::SequenceStore;
use crate::types::{AuditAction, AuditRecord, DuplicateSet, Selection};
use super::checkpoint::Checkpoint;

/// Where a duplicate set is in its resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetState {
    Pending,
    AutoResolved(Selection),
    InteractiveResolved(Selection),
    Resumed(Selection),
    Applied,
    /// Stop everything; the checkpoint is written before halting.
    Quit,
}

/// A parsed answer at the interactive prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Keep(usize),
    DeleteAll,
    KeepAll,
    Quit,
}

pub fn parse_command(answer: &str, set: &DuplicateSet) -> Result<Command> {
    let answer = answer.trim().to_ascii_lowercase();
    match answer.as_str() {
        "d" | "delete" | "delete-all" => Ok(Command::DeleteAll),
        "k" | "keep" | "keep-all" => Ok(Command::KeepAll),
        "q" | "quit" => Ok(Command::Quit),
        other => match other.parse::<usize>() {
            Ok(n) if set.member(n).is_some() => Ok(Command::Keep(n)),
            Ok(n) => Err(BaitError::InteractiveInput(format!(
                "set {} has no member {}",
                set.set_id, n
            ))),
            Err(_) => Err(BaitError::InteractiveInput(format!("'{}' is not a choice", other))),
        },
    }
}

/// Line-oriented conversation with whoever resolves duplicates.
pub trait Prompt {
    fn show(&mut self, text: &str);
    fn ask(&mut self, question: &str) -> Result<String>;
}

/// Prompts on the controlling terminal.
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn show(&mut self, text: &str) {
        println!("{}", text);
    }

    fn ask(&mut self, question: &str) -> Result<String> {
        dialoguer::Input::<String>::new()
            .with_prompt(question)
            .allow_empty(true)
            .interact_text()
            .map_err(|e| BaitError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
    }
}

/// Keeps the member with the highest taxonomy-match score when it is
/// positive and strictly ahead of the runner-up; otherwise deletes all.
pub fn auto_select(set: &DuplicateSet) -> Selection {
    let mut ranked: Vec<_> = set.members.iter().collect();
    ranked.sort_by(|a, b| b.taxonomy_match_score.total_cmp(&a.taxonomy_match_score));
    let runner_up = ranked.get(1).map(|m| m.taxonomy_match_score).unwrap_or(0.0);
    match ranked.first() {
        Some(top) if top.taxonomy_match_score > 0.0 && top.taxonomy_match_score > runner_up => {
            Selection::Member(top.ordinal)
        }
        _ => Selection::DeleteAll,
    }
}

/// Human-readable summary of a set for the prompt.
pub fn describe_set(set: &DuplicateSet, total: usize) -> String {
    let mut out = String::new();
    writeln!(out, "Duplicate set {} of {}", set.set_id, total).unwrap();
    if !set.best_guess_lineage.is_empty() {
        writeln!(out, "  BLAST best guess: {}", set.best_guess_lineage.join("; ")).unwrap();
    }
    for m in &set.members {
        writeln!(
            out,
            "  [{}] {}\t{} bp\t{}\tscore {:.2}\t{}",
            m.ordinal,
            m.sequence_id,
            m.sequence_length,
            m.taxonomic_name,
            m.taxonomy_match_score,
            if m.lineage.is_empty() { "NA".to_string() } else { m.lineage.join("; ") }
        )
        .unwrap();
    }
    out.push_str("  <n> keep member n | d delete all | k keep all | q save and quit");
    out
}

/// How a resolution pass ended.
#[derive(Debug)]
pub enum Resolution {
    /// Every set has a selection.
    Completed(Vec<DuplicateSet>),
    /// The user quit; nothing further should run.
    Halted {
        checkpoint: Option<PathBuf>,
        resolved: usize,
    },
}

/// Drives every duplicate set from `Pending` to a selection.
pub struct DuplicateResolver<'a> {
    interactive: bool,
    checkpoint: Option<&'a Path>,
    prompt: &'a mut dyn Prompt,
}

impl<'a> DuplicateResolver<'a> {
    pub fn new(interactive: bool, checkpoint: Option<&'a Path>, prompt: &'a mut dyn Prompt) -> Self {
        Self {
            interactive,
            checkpoint,
            prompt,
        }
    }

    /// Leaves `Pending`. A selection carried in from a checkpoint wins,
    /// non-interactive runs decide by score, everything else asks.
    pub fn step(&mut self, set: &DuplicateSet, total: usize) -> Result<SetState> {
        if set.selection != Selection::Unset {
            return Ok(SetState::Resumed(set.selection));
        }
        if !self.interactive {
            return Ok(SetState::AutoResolved(auto_select(set)));
        }

        self.prompt.show(&describe_set(set, total));
        loop {
            let answer = self.prompt.ask("Choice")?;
            match parse_command(&answer, set) {
                Ok(Command::Keep(n)) => return Ok(SetState::InteractiveResolved(Selection::Member(n))),
                Ok(Command::DeleteAll) => return Ok(SetState::InteractiveResolved(Selection::DeleteAll)),
                Ok(Command::KeepAll) => return Ok(SetState::InteractiveResolved(Selection::KeepAll)),
                Ok(Command::Quit) => return Ok(SetState::Quit),
                Err(BaitError::InteractiveInput(msg)) => self.prompt.show(&msg),
                Err(e) => return Err(e),
            }
        }
    }

    pub fn resolve(&mut self, mut sets: Vec<DuplicateSet>) -> Result<Resolution> {
        let total = sets.len();
        for i in 0..total {
            let state = self.step(&sets[i], total)?;
            match state {
                SetState::AutoResolved(selection)
                | SetState::InteractiveResolved(selection)
                | SetState::Resumed(selection) => {
                    log::debug!("Duplicate set {} -> {:?}", sets[i].set_id, state);
                    sets[i].selection = selection;
                }
                SetState::Quit => {
                    let checkpoint = match self.checkpoint {
                        Some(path) => {
                            Checkpoint::new(sets).save(path)?;
                            Some(path.to_path_buf())
                        }
                        None => {
                            log::warn!("Quit requested but no checkpoint path was configured");
                            None
                        }
                    };
                    return Ok(Resolution::Halted { checkpoint, resolved: i });
                }
                SetState::Pending | SetState::Applied => unreachable!("step never yields {:?}", state),
            }
        }
        if let Some(path) = self.checkpoint {
            Checkpoint::new(sets.clone()).save(path)?;
        }
        Ok(Resolution::Completed(sets))
    }
}

fn audit(set: &DuplicateSet, action_for: impl Fn(usize) -> AuditAction) -> Vec<AuditRecord> {
    set.members
        .iter()
        .map(|m| AuditRecord {
            set_id: set.set_id,
            ordinal: m.ordinal,
            sequence_id: m.sequence_id.clone(),
            length: m.sequence_length,
            taxonomic_name: m.taxonomic_name.clone(),
            blast_lineage: set.best_guess_lineage.clone(),
            supplied_lineage: m.lineage.clone(),
            action: action_for(m.ordinal),
        })
        .collect()
}

/// Commits every selection to `baits` once all sets are resolved and
/// returns the audit trail.
pub fn apply_selections(sets: &[DuplicateSet], baits: &mut SequenceStore) -> Vec<AuditRecord> {
    let mut records = Vec::new();
    for set in sets {
        let set_records = match set.selection {
            Selection::Member(keep) => audit(set, |o| {
                if o == keep { AuditAction::Selected } else { AuditAction::Deleted }
            }),
            Selection::DeleteAll => audit(set, |_| AuditAction::Deleted),
            Selection::KeepAll => audit(set, |_| AuditAction::Kept),
            Selection::Unset => {
                log::warn!("Duplicate set {} has no selection; keeping all members", set.set_id);
                audit(set, |_| AuditAction::Kept)
            }
        };
        records.extend(set_records);
    }

    let deleted: Vec<&str> = records
        .iter()
        .filter(|r| r.action == AuditAction::Deleted)
        .map(|r| r.sequence_id.as_str())
        .collect();
    let removed = baits.remove(deleted.iter().copied());
    log::info!(
        "Removed {} duplicate bait(s) across {} set(s); {} bait(s) remain",
        removed,
        sets.len(),
        baits.len()
    );
    records
}

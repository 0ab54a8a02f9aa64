//src/types.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// One row of BLAST tabular output. Only the columns that were requested
/// are populated; the rest keep their default value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HitRecord {
    pub query_id: String,
    pub subject_id: String,
    pub subject_accession: String,
    pub percent_identity: f64,
    pub alignment_length: u32,
    pub e_value: f64,
    pub bit_score: f64,
}

/// What to do with a duplicate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Selection {
    Unset,
    /// Keep the member with this ordinal, delete the others.
    Member(usize),
    DeleteAll,
    KeepAll,
}

impl Default for Selection {
    fn default() -> Self {
        Selection::Unset
    }
}

/// A bait sequence that belongs to a duplicate set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateMember {
    /// 1-based position inside the set, used at the prompt.
    pub ordinal: usize,
    pub sequence_id: String,
    pub taxonomic_name: String,
    pub sequence_length: usize,
    /// Lineage supplied with the taxonomy table for this member's name.
    pub lineage: Vec<String>,
    pub taxonomy_match_score: f64,
}

/// A group of near-identical baits, resolved to at most one survivor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateSet {
    pub set_id: usize,
    pub members: Vec<DuplicateMember>,
    /// Best-guess lineage from BLAST hits; empty means no taxonomy available.
    #[serde(default)]
    pub best_guess_lineage: Vec<String>,
    #[serde(default)]
    pub selection: Selection,
}

impl DuplicateSet {
    pub fn member(&self, ordinal: usize) -> Option<&DuplicateMember> {
        self.members.iter().find(|m| m.ordinal == ordinal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Selected,
    Deleted,
    Kept,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuditAction::Selected => "selected",
            AuditAction::Deleted => "deleted",
            AuditAction::Kept => "kept",
        })
    }
}

/// One line of the duplicate-resolution audit log.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub set_id: usize,
    pub ordinal: usize,
    pub sequence_id: String,
    pub length: usize,
    pub taxonomic_name: String,
    pub blast_lineage: Vec<String>,
    pub supplied_lineage: Vec<String>,
    pub action: AuditAction,
}

/// Why a contig did or did not receive a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criterion {
    NoMatch,
    OnlyMatch,
    OnlyNameMatch,
    TopIdentity,
    TopNameBatch,
    NoDistinctMatch,
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Criterion::NoMatch => "no-match",
            Criterion::OnlyMatch => "only-match",
            Criterion::OnlyNameMatch => "only-name-match",
            Criterion::TopIdentity => "top-identity",
            Criterion::TopNameBatch => "top-name-batch",
            Criterion::NoDistinctMatch => "no-distinct-match",
        })
    }
}

/// A reference sequence hit by a contig.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceMatch {
    pub reference_id: String,
    pub taxonomic_name: String,
    pub percent_identity: f64,
}

/// Classification of one contig.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub contig_id: String,
    pub matches: Vec<ReferenceMatch>,
    pub assigned_name: Option<String>,
    pub criterion: Criterion,
    /// Matching reference id, or a batch summary, when a name was assigned.
    pub representative: Option<String>,
}

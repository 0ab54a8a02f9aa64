// src/taxonomy.rs

use ahash::{AHashMap, AHashSet};
use serde_json::Value as JsonValue;
use std::path::Path;
use std::time::Duration;

use crate::blast::Aligner;
use crate::config::AlignOptions;
use crate::error::{BaitError, Result};
use crate::names::split_lineage;
use crate::seqstore::SequenceStore;
use crate::types::DuplicateSet;

pub const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Read-only lookups against a remote sequence/taxonomy database.
pub trait TaxonomyService {
    /// Accession -> taxon id, for every accession the service knows.
    fn taxon_ids(&self, accessions: &[String]) -> Result<AHashMap<String, String>>;

    /// Taxon id -> lineage, root first.
    fn lineages(&self, taxon_ids: &[String]) -> Result<AHashMap<String, Vec<String>>>;
}

/// NCBI E-utilities over blocking HTTP, with a bounded timeout and one retry.
pub struct EntrezClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl EntrezClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent("blastbait/0.1")
            .build()
            .map_err(|e| BaitError::RemoteLookup(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn post(&self, endpoint: &str, params: &[(&str, String)]) -> Result<String> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let attempt = || -> std::result::Result<String, reqwest::Error> {
            self.client
                .post(&url)
                .form(params)
                .send()?
                .error_for_status()?
                .text()
        };
        match attempt() {
            Ok(body) => Ok(body),
            Err(first) => {
                log::warn!("{} failed ({}), retrying once", endpoint, first);
                std::thread::sleep(Duration::from_millis(500));
                attempt().map_err(|e| BaitError::RemoteLookup(format!("{}: {}", endpoint, e)))
            }
        }
    }
}

impl TaxonomyService for EntrezClient {
    fn taxon_ids(&self, accessions: &[String]) -> Result<AHashMap<String, String>> {
        let body = self.post(
            "esummary.fcgi",
            &[
                ("db", "nuccore".to_string()),
                ("id", accessions.join(",")),
                ("retmode", "json".to_string()),
            ],
        )?;
        parse_esummary_taxids(&body)
    }

    fn lineages(&self, taxon_ids: &[String]) -> Result<AHashMap<String, Vec<String>>> {
        let body = self.post(
            "efetch.fcgi",
            &[
                ("db", "taxonomy".to_string()),
                ("id", taxon_ids.join(",")),
                ("retmode", "xml".to_string()),
            ],
        )?;
        let lineages = parse_taxa_xml(&body);
        if lineages.is_empty() {
            return Err(BaitError::RemoteLookup("taxonomy efetch returned no taxa".to_string()));
        }
        Ok(lineages)
    }
}

/// Pulls accession -> taxid pairs out of a nuccore esummary JSON document.
/// Both the bare accession and the versioned one are keyed.
pub fn parse_esummary_taxids(body: &str) -> Result<AHashMap<String, String>> {
    let json: JsonValue = serde_json::from_str(body)
        .map_err(|e| BaitError::RemoteLookup(format!("esummary json parse failed: {}", e)))?;
    let result = json
        .get("result")
        .ok_or_else(|| BaitError::RemoteLookup("esummary response has no result".to_string()))?;

    let mut taxids = AHashMap::new();
    let uids = result.get("uids").and_then(JsonValue::as_array).cloned().unwrap_or_default();
    for uid in uids.iter().filter_map(JsonValue::as_str) {
        let Some(doc) = result.get(uid) else { continue };
        let taxid = match doc.get("taxid") {
            Some(JsonValue::Number(n)) => n.to_string(),
            Some(JsonValue::String(s)) if !s.is_empty() => s.clone(),
            _ => continue,
        };
        for key in ["caption", "accessionversion"] {
            if let Some(acc) = doc.get(key).and_then(JsonValue::as_str) {
                taxids.insert(acc.to_string(), taxid.clone());
            }
        }
    }
    if taxids.is_empty() {
        return Err(BaitError::RemoteLookup("esummary returned no taxon ids".to_string()));
    }
    Ok(taxids)
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Character data at the start of `rest`, either plain (unescaped) or a
/// single CDATA section.
fn element_text(rest: &str) -> String {
    let trimmed = rest.trim_start();
    if let Some(cdata) = trimmed.strip_prefix("<![CDATA[") {
        let end = cdata.find("]]>").unwrap_or(cdata.len());
        return cdata[..end].trim().to_string();
    }
    unescape_xml(rest[..rest.find('<').unwrap_or(rest.len())].trim())
}

/// Reads top-level `<Taxon>` records from a taxonomy efetch XML document.
/// The lineage is `<Lineage>` followed by the taxon's own scientific name.
pub fn parse_taxa_xml(body: &str) -> AHashMap<String, Vec<String>> {
    let mut lineages = AHashMap::new();
    let mut depth = 0usize;
    let mut taxid: Option<String> = None;
    let mut name: Option<String> = None;
    let mut lineage: Option<String> = None;

    let mut rest = body;
    while let Some(open) = rest.find('<') {
        let after = &rest[open + 1..];
        // markup whose body may itself contain '>'
        let skipped = [("!--", "-->"), ("![CDATA[", "]]>"), ("?", "?>")]
            .iter()
            .find(|(start, _)| after.starts_with(start))
            .map(|(_, end)| after.find(end).map(|i| i + end.len()).unwrap_or(after.len()));
        if let Some(skip) = skipped {
            rest = &after[skip..];
            continue;
        }

        let Some(close) = after.find('>') else { break };
        let raw = &after[..close];
        rest = &after[close + 1..];
        if raw.starts_with('!') || raw.ends_with('/') {
            continue;
        }
        let tag = raw.split_whitespace().next().unwrap_or_default();

        match tag {
            "Taxon" => {
                depth += 1;
                if depth == 1 {
                    taxid = None;
                    name = None;
                    lineage = None;
                }
            }
            "/Taxon" => {
                if depth == 1 {
                    if let Some(id) = taxid.take() {
                        let mut ranks = lineage.take().map(|l| split_lineage(&l)).unwrap_or_default();
                        if let Some(own) = name.take() {
                            ranks.push(own);
                        }
                        lineages.insert(id, ranks);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            "TaxId" if depth == 1 && taxid.is_none() => taxid = Some(element_text(rest)),
            "ScientificName" if depth == 1 && name.is_none() => name = Some(element_text(rest)),
            "Lineage" if depth == 1 => lineage = Some(element_text(rest)),
            _ => {}
        }
    }
    lineages
}

/// Longest prefix of the first lineage on which more than `taxmin` of the
/// other lineages agree, rank by rank from the root.
pub fn best_guess_lineage(lineages: &[Vec<String>], taxmin: f64) -> Vec<String> {
    let Some((reference, others)) = lineages.split_first() else {
        return Vec::new();
    };
    if others.is_empty() {
        return reference.clone();
    }

    let mut depth = 0;
    for (rank, reference_name) in reference.iter().enumerate() {
        let agreeing = others
            .iter()
            .filter(|other| other.get(rank) == Some(reference_name))
            .count();
        let fraction = agreeing as f64 / others.len() as f64;
        if fraction <= taxmin {
            break;
        }
        depth = rank + 1;
    }
    reference[..depth].to_vec()
}

/// Fraction of `supplied` ranks that appear anywhere in `best_guess`.
pub fn taxonomy_match_score(supplied: &[String], best_guess: &[String]) -> f64 {
    if supplied.is_empty() {
        return 0.0;
    }
    let guess: AHashSet<&str> = best_guess.iter().map(String::as_str).collect();
    let shared = supplied.iter().filter(|rank| guess.contains(rank.as_str())).count();
    shared as f64 / supplied.len() as f64
}

/// Works out a best-guess lineage for a group of sequences by searching a
/// large reference database and intersecting the hits' lineages.
pub struct TaxonomyResolver<'a> {
    aligner: &'a dyn Aligner,
    service: &'a dyn TaxonomyService,
    database: &'a Path,
    options: AlignOptions,
    taxmin: f64,
}

impl<'a> TaxonomyResolver<'a> {
    pub fn new(
        aligner: &'a dyn Aligner,
        service: &'a dyn TaxonomyService,
        database: &'a Path,
        options: AlignOptions,
        taxmin: f64,
    ) -> Self {
        Self {
            aligner,
            service,
            database,
            options,
            taxmin,
        }
    }

    /// Aligns each sequence on its own and collects the distinct subject
    /// accessions in discovery order.
    fn accessions(&self, sequences: &SequenceStore) -> Result<Vec<String>> {
        let mut seen = AHashSet::new();
        let mut accessions = Vec::new();
        for (id, bases) in sequences.iter() {
            let single = SequenceStore::from_pairs([(id, bases)]);
            for hit in self.aligner.align(&single, self.database, &self.options)? {
                let acc = if hit.subject_accession.is_empty() {
                    hit.subject_id
                } else {
                    hit.subject_accession
                };
                if !acc.is_empty() && seen.insert(acc.clone()) {
                    accessions.push(acc);
                }
            }
        }
        Ok(accessions)
    }

    fn remote_lineages(&self, accessions: &[String]) -> Result<Vec<Vec<String>>> {
        let taxids = self.service.taxon_ids(accessions)?;
        let mut distinct: Vec<String> = Vec::new();
        for acc in accessions {
            if let Some(taxid) = taxids.get(acc) {
                if !distinct.contains(taxid) {
                    distinct.push(taxid.clone());
                }
            }
        }
        if distinct.is_empty() {
            return Err(BaitError::RemoteLookup("no accession resolved to a taxon".to_string()));
        }
        let by_taxid = self.service.lineages(&distinct)?;
        Ok(accessions
            .iter()
            .filter_map(|acc| taxids.get(acc))
            .filter_map(|taxid| by_taxid.get(taxid))
            .filter(|lineage| !lineage.is_empty())
            .cloned()
            .collect())
    }

    /// Best-guess lineage for `sequences`; empty when nothing could be found.
    /// Aligner failures propagate, lookup failures only degrade the result.
    pub fn resolve(&self, sequences: &SequenceStore) -> Result<Vec<String>> {
        let accessions = self.accessions(sequences)?;
        if accessions.is_empty() {
            log::info!("No reference hits for {} sequence(s); no taxonomy available", sequences.len());
            return Ok(Vec::new());
        }
        match self.remote_lineages(&accessions) {
            Ok(lineages) => Ok(best_guess_lineage(&lineages, self.taxmin)),
            Err(e) => {
                log::warn!("Taxonomy lookup failed, continuing without lineage: {}", e);
                Ok(Vec::new())
            }
        }
    }

    /// Fills the best-guess lineage and every member's match score.
    pub fn annotate(&self, set: &mut DuplicateSet, baits: &SequenceStore) -> Result<()> {
        let members = SequenceStore::from_pairs(
            set.members
                .iter()
                .filter_map(|m| baits.get(&m.sequence_id).map(|seq| (m.sequence_id.clone(), seq.to_string()))),
        );
        set.best_guess_lineage = self.resolve(&members)?;
        for member in &mut set.members {
            member.taxonomy_match_score = taxonomy_match_score(&member.lineage, &set.best_guess_lineage);
        }
        Ok(())
    }
}

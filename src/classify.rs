// src/classify.rs

use ahash::AHashMap;
use std::cmp::Ordering;

use crate::names::NameMapping;
use crate::seqstore::SequenceStore;
use crate::types::{ClassificationResult, Criterion, HitRecord, ReferenceMatch};

/// Evidence for one taxonomic name within a contig's hits.
#[derive(Debug, Clone)]
struct NameEvidence<'m> {
    name: &'m str,
    matches: Vec<&'m ReferenceMatch>,
    mean_identity: f64,
    /// Matched references over all references carrying this name.
    proportion: f64,
    total_references: usize,
}

impl NameEvidence<'_> {
    fn rank(&self, other: &Self) -> Ordering {
        self.mean_identity
            .total_cmp(&other.mean_identity)
            .then(self.proportion.total_cmp(&other.proportion))
    }
}

/// Labels contigs from their hits against the deduplicated barcodes.
pub struct BaitClassifier<'a> {
    names: &'a NameMapping,
    reference_counts: AHashMap<String, usize>,
    min_identity: f64,
    min_length: u32,
}

impl<'a> BaitClassifier<'a> {
    pub fn new(names: &'a NameMapping, references: &SequenceStore, min_identity: f64, min_length: u32) -> Self {
        Self {
            names,
            reference_counts: names.counts(references.ids()),
            min_identity,
            min_length,
        }
    }

    /// One result per contig, in contig order.
    pub fn classify(&self, contigs: &SequenceStore, hits: &[HitRecord]) -> Vec<ClassificationResult> {
        let mut per_contig: AHashMap<&str, Vec<ReferenceMatch>> = AHashMap::new();
        for hit in hits {
            if hit.percent_identity < self.min_identity || hit.alignment_length < self.min_length {
                continue;
            }
            let matches = per_contig.entry(hit.query_id.as_str()).or_default();
            // one match per reference; blastn lists the best HSP first
            if matches.iter().any(|m| m.reference_id == hit.subject_id) {
                continue;
            }
            matches.push(ReferenceMatch {
                reference_id: hit.subject_id.clone(),
                taxonomic_name: self.names.name(&hit.subject_id).unwrap_or("NA").to_string(),
                percent_identity: hit.percent_identity,
            });
        }

        contigs
            .ids()
            .map(|id| self.classify_contig(id, per_contig.remove(id).unwrap_or_default()))
            .collect()
    }

    pub fn classify_contig(&self, contig_id: &str, matches: Vec<ReferenceMatch>) -> ClassificationResult {
        let (assigned_name, criterion, representative) = self.decide(&matches);
        ClassificationResult {
            contig_id: contig_id.to_string(),
            matches,
            assigned_name,
            criterion,
            representative,
        }
    }

    fn decide(&self, matches: &[ReferenceMatch]) -> (Option<String>, Criterion, Option<String>) {
        match matches {
            [] => return (None, Criterion::NoMatch, None),
            [only] => {
                return (
                    Some(only.taxonomic_name.clone()),
                    Criterion::OnlyMatch,
                    Some(only.reference_id.clone()),
                )
            }
            _ => {}
        }

        let mut evidence = self.evidence(matches);
        if let [single] = evidence.as_slice() {
            return (
                Some(single.name.to_string()),
                Criterion::OnlyNameMatch,
                Some(summary(single)),
            );
        }

        evidence.sort_by(|a, b| a.rank(b));
        let top = &evidence[evidence.len() - 1];
        let runner_up = &evidence[evidence.len() - 2];
        if top.mean_identity > runner_up.mean_identity && top.proportion > runner_up.proportion {
            match top.matches.as_slice() {
                [one] => (
                    Some(top.name.to_string()),
                    Criterion::TopIdentity,
                    Some(one.reference_id.clone()),
                ),
                _ => (Some(top.name.to_string()), Criterion::TopNameBatch, Some(summary(top))),
            }
        } else {
            (None, Criterion::NoDistinctMatch, None)
        }
    }

    fn evidence<'m>(&self, matches: &'m [ReferenceMatch]) -> Vec<NameEvidence<'m>> {
        let mut grouped: Vec<(&'m str, Vec<&'m ReferenceMatch>)> = Vec::new();
        for m in matches {
            match grouped.iter_mut().find(|(name, _)| *name == m.taxonomic_name) {
                Some((_, group)) => group.push(m),
                None => grouped.push((m.taxonomic_name.as_str(), vec![m])),
            }
        }

        grouped
            .into_iter()
            .map(|(name, group)| {
                let mean_identity =
                    group.iter().map(|m| m.percent_identity).sum::<f64>() / group.len() as f64;
                let total_references = self
                    .reference_counts
                    .get(name)
                    .copied()
                    .unwrap_or(0)
                    .max(group.len());
                NameEvidence {
                    name,
                    proportion: group.len() as f64 / total_references as f64,
                    mean_identity,
                    total_references,
                    matches: group,
                }
            })
            .collect()
    }
}

fn summary(evidence: &NameEvidence<'_>) -> String {
    format!(
        "{} of {} references of {}, mean identity {:.2}",
        evidence.matches.len(),
        evidence.total_references,
        evidence.name,
        evidence.mean_identity
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NameSource;

    fn hit(contig: &str, reference: &str, identity: f64) -> HitRecord {
        HitRecord {
            query_id: contig.to_string(),
            subject_id: reference.to_string(),
            percent_identity: identity,
            alignment_length: 300,
            ..HitRecord::default()
        }
    }

    /// References are named `<Name>|<n>`.
    fn setup(refs: &[&str]) -> (SequenceStore, NameMapping) {
        let store = SequenceStore::from_pairs(refs.iter().map(|r| (*r, "ACGT")));
        let source = NameSource::Field {
            delimiter: "|".to_string(),
            index: 0,
        };
        let names = NameMapping::build(store.ids(), &[], &source).unwrap();
        (store, names)
    }

    #[test]
    fn test_no_match_and_only_match() {
        let (refs, names) = setup(&["Foo|1", "Foo|2"]);
        let contigs = SequenceStore::from_pairs([("C1", "AC"), ("C2", "AC")]);
        let classifier = BaitClassifier::new(&names, &refs, 99.0, 100);
        let results = classifier.classify(&contigs, &[hit("C1", "Foo|2", 99.5), hit("C2", "Foo|1", 98.0)]);
        assert_eq!(results[0].criterion, Criterion::OnlyMatch);
        assert_eq!(results[0].assigned_name.as_deref(), Some("Foo"));
        assert_eq!(results[0].representative.as_deref(), Some("Foo|2"));
        // below the identity floor
        assert_eq!(results[1].criterion, Criterion::NoMatch);
        assert_eq!(results[1].assigned_name, None);
    }

    #[test]
    fn test_only_name_match() {
        let (refs, names) = setup(&["Foo|1", "Foo|2", "Foo|3"]);
        let contigs = SequenceStore::from_pairs([("C1", "AC")]);
        let classifier = BaitClassifier::new(&names, &refs, 0.0, 0);
        let results = classifier.classify(&contigs, &[hit("C1", "Foo|1", 99.0), hit("C1", "Foo|3", 97.0)]);
        assert_eq!(results[0].criterion, Criterion::OnlyNameMatch);
        assert_eq!(
            results[0].representative.as_deref(),
            Some("2 of 3 references of Foo, mean identity 98.00")
        );
    }

    #[test]
    fn test_top_identity_single_reference() {
        let (refs, names) = setup(&["Foo|1", "Foo|2", "Foo|3", "Bar|1"]);
        let contigs = SequenceStore::from_pairs([("C1", "AC")]);
        let classifier = BaitClassifier::new(&names, &refs, 0.0, 0);
        let hits = [hit("C1", "Foo|1", 98.0), hit("C1", "Foo|2", 97.0), hit("C1", "Bar|1", 99.0)];
        let result = &classifier.classify(&contigs, &hits)[0];
        assert_eq!(result.criterion, Criterion::TopIdentity);
        assert_eq!(result.assigned_name.as_deref(), Some("Bar"));
        assert_eq!(result.representative.as_deref(), Some("Bar|1"));
        assert_eq!(result.matches.len(), 3);
    }

    #[test]
    fn test_top_name_batch() {
        let (refs, names) = setup(&["Foo|1", "Foo|2", "Bar|1", "Bar|2", "Bar|3", "Bar|4"]);
        let contigs = SequenceStore::from_pairs([("C1", "AC")]);
        let classifier = BaitClassifier::new(&names, &refs, 0.0, 0);
        let hits = [
            hit("C1", "Foo|1", 100.0),
            hit("C1", "Foo|2", 99.8),
            hit("C1", "Bar|1", 99.0),
        ];
        let result = &classifier.classify(&contigs, &hits)[0];
        assert_eq!(result.criterion, Criterion::TopNameBatch);
        assert_eq!(result.assigned_name.as_deref(), Some("Foo"));
        assert_eq!(
            result.representative.as_deref(),
            Some("2 of 2 references of Foo, mean identity 99.90")
        );
    }

    #[test]
    fn test_tie_is_no_distinct_match() {
        let (refs, names) = setup(&["Foo|1", "Foo|2", "Bar|1", "Bar|2"]);
        let contigs = SequenceStore::from_pairs([("C1", "AC"), ("C2", "AC")]);
        let classifier = BaitClassifier::new(&names, &refs, 0.0, 0);
        let hits = [
            // full tie
            hit("C1", "Foo|1", 99.0),
            hit("C1", "Bar|1", 99.0),
            // Foo leads on identity, Bar on proportion
            hit("C2", "Foo|1", 100.0),
            hit("C2", "Bar|1", 99.0),
            hit("C2", "Bar|2", 99.0),
        ];
        let results = classifier.classify(&contigs, &hits);
        for result in &results {
            assert_eq!(result.criterion, Criterion::NoDistinctMatch);
            assert_eq!(result.assigned_name, None);
        }
    }

    #[test]
    fn test_repeated_hsps_count_once() {
        let (refs, names) = setup(&["Foo|1"]);
        let contigs = SequenceStore::from_pairs([("C1", "AC")]);
        let classifier = BaitClassifier::new(&names, &refs, 0.0, 0);
        let results = classifier.classify(&contigs, &[hit("C1", "Foo|1", 99.0), hit("C1", "Foo|1", 95.0)]);
        assert_eq!(results[0].criterion, Criterion::OnlyMatch);
    }
}

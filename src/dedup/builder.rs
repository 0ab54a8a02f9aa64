// src/dedup/builder.rs

use ahash::AHashMap;

use crate::config::{ClusterMode, DedupConfig};
use crate::names::{LineageTable, NameMapping};
use crate::seqstore::SequenceStore;
use crate::types::{DuplicateMember, DuplicateSet, HitRecord, Selection};

/// Self-alignment hits that pass the duplicate thresholds, as (query, subject).
pub fn qualifying_pairs<'h>(hits: &'h [HitRecord], config: &DedupConfig) -> Vec<(&'h str, &'h str)> {
    hits.iter()
        .filter(|hit| hit.query_id != hit.subject_id)
        .filter(|hit| hit.percent_identity >= config.min_identity)
        .filter(|hit| hit.alignment_length >= config.min_length)
        .map(|hit| (hit.query_id.as_str(), hit.subject_id.as_str()))
        .collect()
}

/// One pass over the pairs: a subject that already keys a set pulls the
/// query into it, otherwise the subject joins the query's set.
///
/// Order dependent: `X->Y, Y->Z` yields `{X,Y}` and `{Y,Z}`, while
/// `Y->Z, X->Y` yields `{Y,Z,X}`.
pub fn cluster_online(pairs: &[(&str, &str)]) -> Vec<Vec<String>> {
    let mut sets: Vec<Vec<String>> = Vec::new();
    let mut by_key: AHashMap<&str, usize> = AHashMap::new();

    fn add(set: &mut Vec<String>, id: &str) {
        if !set.iter().any(|m| m == id) {
            set.push(id.to_string());
        }
    }

    for &(query, subject) in pairs {
        if let Some(&idx) = by_key.get(subject) {
            add(&mut sets[idx], query);
        } else {
            let idx = *by_key.entry(query).or_insert_with(|| {
                sets.push(vec![query.to_string()]);
                sets.len() - 1
            });
            add(&mut sets[idx], subject);
        }
    }

    sets.retain(|set| set.len() >= 2);
    sets
}

/// Disjoint-set clustering: every connected component becomes one set,
/// members listed in discovery order.
pub fn cluster_transitive(pairs: &[(&str, &str)]) -> Vec<Vec<String>> {
    let mut ids: Vec<&str> = Vec::new();
    let mut index: AHashMap<&str, usize> = AHashMap::new();
    let mut parent: Vec<usize> = Vec::new();

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    for &(query, subject) in pairs {
        let mut slot = |id| {
            *index.entry(id).or_insert_with(|| {
                ids.push(id);
                parent.push(parent.len());
                parent.len() - 1
            })
        };
        let a = slot(query);
        let b = slot(subject);
        let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
        if ra != rb {
            // lower index stays root so output order follows discovery
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            parent[child] = root;
        }
    }

    let mut groups: Vec<Vec<String>> = Vec::new();
    let mut group_of_root: AHashMap<usize, usize> = AHashMap::new();
    for (i, id) in ids.iter().enumerate() {
        let root = find(&mut parent, i);
        let g = *group_of_root.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[g].push(id.to_string());
    }
    groups.retain(|set| set.len() >= 2);
    groups
}

/// Turns self-alignment hits into numbered duplicate sets.
pub struct DuplicateSetBuilder<'a> {
    config: &'a DedupConfig,
    names: &'a NameMapping,
    lineages: Option<&'a LineageTable>,
}

impl<'a> DuplicateSetBuilder<'a> {
    pub fn new(config: &'a DedupConfig, names: &'a NameMapping, lineages: Option<&'a LineageTable>) -> Self {
        Self {
            config,
            names,
            lineages,
        }
    }

    pub fn build(&self, hits: &[HitRecord], baits: &SequenceStore) -> Vec<DuplicateSet> {
        let pairs = qualifying_pairs(hits, self.config);
        let groups = match self.config.cluster_mode {
            ClusterMode::Online => cluster_online(&pairs),
            ClusterMode::Transitive => cluster_transitive(&pairs),
        };

        groups
            .into_iter()
            .enumerate()
            .map(|(i, ids)| DuplicateSet {
                set_id: i + 1,
                members: ids
                    .into_iter()
                    .enumerate()
                    .map(|(j, id)| self.member(j + 1, id, baits))
                    .collect(),
                best_guess_lineage: Vec::new(),
                selection: Selection::Unset,
            })
            .collect()
    }

    fn member(&self, ordinal: usize, sequence_id: String, baits: &SequenceStore) -> DuplicateMember {
        let taxonomic_name = self.names.name(&sequence_id).unwrap_or_default().to_string();
        let lineage = self
            .lineages
            .and_then(|table| table.get(&taxonomic_name))
            .cloned()
            .unwrap_or_default();
        DuplicateMember {
            ordinal,
            sequence_length: baits.get(&sequence_id).map(str::len).unwrap_or(0),
            sequence_id,
            taxonomic_name,
            lineage,
            taxonomy_match_score: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NameSource;

    fn hit(q: &str, s: &str, identity: f64, length: u32) -> HitRecord {
        HitRecord {
            query_id: q.to_string(),
            subject_id: s.to_string(),
            percent_identity: identity,
            alignment_length: length,
            ..HitRecord::default()
        }
    }

    #[test]
    fn test_pair_clusters_in_either_order() {
        for pairs in [vec![("A", "B"), ("B", "A")], vec![("B", "A"), ("A", "B")]] {
            let sets = cluster_online(&pairs);
            assert_eq!(sets.len(), 1);
            let mut members = sets[0].clone();
            members.sort();
            assert_eq!(members, vec!["A", "B"]);
        }
    }

    #[test]
    fn test_online_chains_depend_on_discovery_order() {
        let forward = cluster_online(&[("X", "Y"), ("Y", "Z")]);
        assert_eq!(forward, vec![vec!["X", "Y"], vec!["Y", "Z"]]);

        let reversed = cluster_online(&[("Y", "Z"), ("X", "Y")]);
        assert_eq!(reversed, vec![vec!["Y", "Z", "X"]]);
    }

    #[test]
    fn test_transitive_closes_chains() {
        let sets = cluster_transitive(&[("X", "Y"), ("Y", "Z"), ("P", "Q")]);
        assert_eq!(sets, vec![vec!["X", "Y", "Z"], vec!["P", "Q"]]);
        let sets = cluster_transitive(&[("Y", "Z"), ("X", "Y")]);
        assert_eq!(sets, vec![vec!["Y", "Z", "X"]]);
    }

    #[test]
    fn test_build_applies_thresholds_and_fills_members() {
        let baits = SequenceStore::from_pairs([("A1", "ACGTACGT"), ("A2", "ACGTACGT"), ("B1", "TTTT")]);
        let source = NameSource::Field {
            delimiter: "_".to_string(),
            index: 0,
        };
        // ids without the delimiter map to themselves
        let names = NameMapping::build(["A1", "A2", "B1"], &[], &source).unwrap();
        let config = DedupConfig::default();
        let hits = vec![
            hit("A1", "A1", 100.0, 150),
            hit("A1", "A2", 100.0, 150),
            hit("A1", "B1", 100.0, 50),
            hit("B1", "A2", 98.0, 150),
        ];
        let sets = DuplicateSetBuilder::new(&config, &names, None).build(&hits, &baits);
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].set_id, 1);
        let ids: Vec<&str> = sets[0].members.iter().map(|m| m.sequence_id.as_str()).collect();
        assert_eq!(ids, vec!["A1", "A2"]);
        assert_eq!(sets[0].members[1].ordinal, 2);
        assert_eq!(sets[0].members[1].sequence_length, 8);
        assert_eq!(sets[0].members[0].taxonomic_name, "A1");
    }
}

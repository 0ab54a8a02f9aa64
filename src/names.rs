// src/names.rs

use ahash::AHashMap;
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::config::NameSource;
use crate::error::{BaitError, Result};

/// Taxonomic name -> supplied lineage (root first).
pub type LineageTable = AHashMap<String, Vec<String>>;

/// Splits a `;`-separated lineage string into trimmed, non-empty ranks.
pub fn split_lineage(text: &str) -> Vec<String> {
    text.split(';')
        .map(str::trim)
        .filter(|rank| !rank.is_empty())
        .map(str::to_string)
        .collect()
}

fn meaningful_lines<P: AsRef<Path>>(path: P) -> Result<Vec<(usize, String)>> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        lines.push((idx + 1, trimmed.to_string()));
    }
    Ok(lines)
}

/// Parses a taxonomy table in the format:
/// ```text
/// <name>\t<rank1; rank2; ...>
/// ```
pub fn parse_lineage_table<P: AsRef<Path>>(path: P) -> Result<LineageTable> {
    let path = path.as_ref();
    let mut table = LineageTable::new();
    for (line_no, line) in meaningful_lines(path)? {
        let (name, lineage) = line
            .split_once('\t')
            .ok_or_else(|| BaitError::format(path, line_no, "expected <name>\\t<lineage>"))?;
        table.insert(name.trim().to_string(), split_lineage(lineage));
    }
    Ok(table)
}

/// Reads one taxonomic name per line.
pub fn parse_name_list<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    Ok(meaningful_lines(path)?.into_iter().map(|(_, name)| name).collect())
}

/// Sequence id -> taxonomic name. Every id maps to exactly one name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NameMapping {
    names: AHashMap<String, String>,
}

impl NameMapping {
    /// Builds the mapping for `ids` according to `source`. `names` is only
    /// consulted for [`NameSource::Match`].
    pub fn build<'a, I>(ids: I, names: &[String], source: &NameSource) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        match source {
            NameSource::Match => Self::by_match(ids, names),
            NameSource::Field { delimiter, index } => Self::by_field(ids, delimiter, *index),
        }
    }

    fn by_match<'a, I>(ids: I, names: &[String]) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let patterns = names
            .iter()
            .map(|name| name_pattern(name).map(|re| (name, re)))
            .collect::<Result<Vec<_>>>()?;

        let mut mapping = AHashMap::new();
        for id in ids {
            let hits: Vec<&String> = patterns
                .iter()
                .filter(|(_, re)| re.is_match(id))
                .map(|(name, _)| *name)
                .collect();
            match hits.as_slice() {
                [name] => {
                    mapping.insert(id.to_string(), (*name).clone());
                }
                [] => {
                    return Err(BaitError::Identifier(format!(
                        "sequence '{}' matches none of the supplied names",
                        id
                    )))
                }
                many => {
                    let listed: Vec<&str> = many.iter().map(|n| n.as_str()).collect();
                    return Err(BaitError::Identifier(format!(
                        "sequence '{}' matches several names: {}",
                        id,
                        listed.join(", ")
                    )));
                }
            }
        }
        Ok(Self { names: mapping })
    }

    fn by_field<'a, I>(ids: I, delimiter: &str, index: usize) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut mapping = AHashMap::new();
        for id in ids {
            let field = id
                .split(delimiter)
                .nth(index)
                .filter(|f| !f.is_empty())
                .ok_or_else(|| {
                    BaitError::Identifier(format!(
                        "sequence '{}' has no field {} when split on '{}'",
                        id, index, delimiter
                    ))
                })?;
            mapping.insert(id.to_string(), field.to_string());
        }
        Ok(Self { names: mapping })
    }

    pub fn name(&self, id: &str) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// How many of `ids` carry each name.
    pub fn counts<'a, I>(&self, ids: I) -> AHashMap<String, usize>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut counts = AHashMap::new();
        for id in ids {
            if let Some(name) = self.name(id) {
                *counts.entry(name.to_string()).or_insert(0) += 1;
            }
        }
        counts
    }
}

/// Case-insensitive literal match where spaces and underscores are
/// interchangeable and the name is not part of a longer word.
fn name_pattern(name: &str) -> Result<Regex> {
    let body: String = regex::escape(name.trim())
        .chars()
        .map(|c| match c {
            ' ' | '_' => "[ _]".to_string(),
            other => other.to_string(),
        })
        .collect();
    let pattern = format!("(?i)(?:^|[^[:alnum:]]){}(?:$|[^[:alnum:]])", body);
    Regex::new(&pattern)
        .map_err(|e| BaitError::Identifier(format!("bad name pattern for '{}': {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_match_mode_ties_ids_to_names() {
        let library = names(&["Gadus morhua", "Salmo salar"]);
        let ids = ["COI_Gadus_morhua_01", "salmo_salar|x"];
        let mapping = NameMapping::build(ids, &library, &NameSource::Match).unwrap();
        assert_eq!(mapping.name("COI_Gadus_morhua_01"), Some("Gadus morhua"));
        assert_eq!(mapping.name("salmo_salar|x"), Some("Salmo salar"));
    }

    #[test]
    fn test_match_mode_rejects_unmatched_and_ambiguous() {
        let library = names(&["Salmo", "Salmo salar"]);
        assert!(matches!(
            NameMapping::build(["Gadus_1"], &library, &NameSource::Match),
            Err(BaitError::Identifier(_))
        ));
        assert!(matches!(
            NameMapping::build(["Salmo_salar_1"], &library, &NameSource::Match),
            Err(BaitError::Identifier(_))
        ));
        let mapping = NameMapping::build(["Salmo_x"], &library, &NameSource::Match).unwrap();
        assert_eq!(mapping.name("Salmo_x"), Some("Salmo"));
    }

    #[test]
    fn test_field_mode() {
        let source = NameSource::Field {
            delimiter: "|".to_string(),
            index: 1,
        };
        let mapping = NameMapping::build(["a|Foo|1", "b|Bar|2"], &[], &source).unwrap();
        assert_eq!(mapping.name("b|Bar|2"), Some("Bar"));
        assert_eq!(mapping.counts(["a|Foo|1", "b|Bar|2"]).get("Foo"), Some(&1));
        assert!(NameMapping::build(["nofield"], &[], &source).is_err());
    }

    #[test]
    fn test_split_lineage_trims_ranks() {
        assert_eq!(
            split_lineage("Eukaryota; Chordata ;;Actinopteri"),
            vec!["Eukaryota", "Chordata", "Actinopteri"]
        );
    }
}

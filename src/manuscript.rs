use std::collections::HashMap;

use serde::Serialize;

use crate::model::{Entry, MarginPosition, Property, Version, Versioned};
use crate::thesaurus::Thesaurus;

/// All assembled entries, sorted by identity.
#[derive(Debug, Clone, Default)]
pub struct Manuscript {
    entries: Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criterion {
    /// At least one term of the property in some version.
    Any,
    /// Some version's terms include every listed term.
    Terms(Vec<String>),
}

/// Property criteria combined with AND.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    criteria: Vec<(Property, Criterion)>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn any(mut self, property: Property) -> Self {
        self.criteria.push((property, Criterion::Any));
        self
    }

    pub fn terms<I, S>(mut self, property: Property, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let terms = terms.into_iter().map(Into::into).collect();
        self.criteria.push((property, Criterion::Terms(terms)));
        self
    }

    fn matches(&self, entry: &Entry) -> bool {
        self.criteria.iter().all(|(property, criterion)| {
            Version::ALL.into_iter().any(|version| {
                let found = entry.terms(*property, version);
                match criterion {
                    Criterion::Any => !found.is_empty(),
                    Criterion::Terms(wanted) => wanted.iter().all(|w| found.contains(w)),
                }
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountMismatch {
    pub property: Property,
    pub counts: Versioned<usize>,
}

/// Problems found in one entry. Only entries with at least one are reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyIssue {
    pub identity: String,
    pub missing: Vec<Version>,
    pub unbalanced: Vec<Version>,
    pub mismatched: Vec<CountMismatch>,
}

/// One term of a property: how often it is tagged and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermStats {
    pub term: String,
    pub count: usize,
    /// Entries containing the term, each once.
    pub entries: Vec<TermEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermEntry {
    pub identity: String,
    pub title: String,
}

impl Manuscript {
    pub fn new(mut entries: Vec<Entry>) -> Self {
        entries.sort_by(|a, b| a.identity.cmp(&b.identity));
        Manuscript { entries }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, identity: &str) -> Option<&Entry> {
        self.entries
            .binary_search_by(|e| e.identity.as_str().cmp(identity))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Only the listed identities; unknown ones are ignored.
    pub fn filter(&self, identities: &[String]) -> Manuscript {
        let entries = identities
            .iter()
            .filter_map(|id| self.entry(id))
            .cloned()
            .collect();
        Manuscript::new(entries)
    }

    pub fn with_thesaurus(self, thesaurus: &Thesaurus) -> Manuscript {
        Manuscript {
            entries: self
                .entries
                .into_iter()
                .map(|e| e.with_thesaurus(thesaurus))
                .collect(),
        }
    }

    pub fn search(&self, query: &SearchQuery) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| query.matches(e))
            .map(|e| e.identity.clone())
            .collect()
    }

    /// Identities with a margin in `version` whose text contains `term`,
    /// ignoring case, optionally restricted to one position.
    pub fn search_margins(
        &self,
        version: Version,
        term: &str,
        position: Option<MarginPosition>,
    ) -> Vec<String> {
        let needle = term.to_lowercase();
        self.entries
            .iter()
            .filter(|e| {
                e.margins.get(version).iter().any(|m| {
                    position.map_or(true, |p| p == m.position)
                        && m.text.to_lowercase().contains(&needle)
                })
            })
            .map(|e| e.identity.clone())
            .collect()
    }

    /// Every term of `property` in `version` with its count and the entries
    /// containing it, in order of first occurrence across the manuscript.
    pub fn term_frequencies(&self, property: Property, version: Version) -> Vec<TermStats> {
        let mut order: Vec<TermStats> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for entry in &self.entries {
            for term in entry.terms(property, version) {
                let i = *index.entry(term.clone()).or_insert_with(|| {
                    order.push(TermStats {
                        term: term.clone(),
                        count: 0,
                        entries: Vec::new(),
                    });
                    order.len() - 1
                });
                order[i].count += 1;
            }
            for term in entry.dedup_terms(property, version) {
                if let Some(&i) = index.get(&term) {
                    order[i].entries.push(TermEntry {
                        identity: entry.identity.clone(),
                        title: entry.title.get(version).clone(),
                    });
                }
            }
        }
        order
    }

    /// Missing versions, unbalanced markup and property counts that differ
    /// between the versions an entry is present in.
    pub fn consistency_report(&self) -> Vec<ConsistencyIssue> {
        self.entries
            .iter()
            .filter_map(|entry| {
                let present: Vec<Version> = Version::ALL
                    .into_iter()
                    .filter(|v| !entry.missing.contains(v))
                    .collect();
                let unbalanced = present
                    .iter()
                    .copied()
                    .filter(|v| !entry.balanced.get(*v))
                    .collect::<Vec<_>>();
                let mismatched = Property::ALL
                    .into_iter()
                    .filter_map(|property| {
                        let counts = Versioned::from_fn(|v| entry.terms(property, v).len());
                        let first = present.first().map(|v| *counts.get(*v))?;
                        present
                            .iter()
                            .any(|v| *counts.get(*v) != first)
                            .then_some(CountMismatch { property, counts })
                    })
                    .collect::<Vec<_>>();

                let clean = entry.missing.is_empty() && unbalanced.is_empty() && mismatched.is_empty();
                (!clean).then(|| ConsistencyIssue {
                    identity: entry.identity.clone(),
                    missing: entry.missing.clone(),
                    unbalanced,
                    mismatched,
                })
            })
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.entries.iter().map(Entry::to_json).collect())
    }
}

// ── Tests ──

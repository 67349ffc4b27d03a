use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use tracing::{info, warn};

use crate::error::ThesaurusError;
use crate::model::{Entry, Property};

/// Per-property mapping from verbatim terms to canonical labels.
///
/// Built elsewhere (clustering term frequencies) and consumed here as a
/// finished table.
#[derive(Debug, Clone, Default)]
pub struct Thesaurus {
    labels: HashMap<Property, HashMap<String, String>>,
}

impl Thesaurus {
    pub fn load(path: &Path) -> Result<Self, ThesaurusError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ThesaurusError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let thesaurus = Self::from_json(&raw)?;
        if thesaurus.is_empty() {
            warn!(path = %path.display(), "thesaurus has no labels, terms left verbatim");
        } else {
            info!(path = %path.display(), labels = thesaurus.len(), "thesaurus loaded");
        }
        Ok(thesaurus)
    }

    /// `{"<property>": {"<verbatim>": "<label>", ...}, ...}`
    pub fn from_json(raw: &str) -> Result<Self, ThesaurusError> {
        let parsed: BTreeMap<String, HashMap<String, String>> = serde_json::from_str(raw)?;
        let mut labels = HashMap::new();
        for (name, table) in parsed {
            let property = name
                .parse::<Property>()
                .map_err(|_| ThesaurusError::UnknownProperty(name))?;
            labels.insert(property, table);
        }
        Ok(Thesaurus { labels })
    }

    pub fn label(&self, property: Property, verbatim: &str) -> Option<&str> {
        self.labels
            .get(&property)
            .and_then(|table| table.get(verbatim))
            .map(String::as_str)
    }

    /// Replace every mapped term; unmapped terms pass through. Order and
    /// multiplicity are kept.
    pub fn normalize(&self, property: Property, terms: &[String]) -> Vec<String> {
        terms
            .iter()
            .map(|t| self.label(property, t).unwrap_or(t).to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.labels.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Entry {
    /// This entry with every version's terms passed through `thesaurus`.
    pub fn with_thesaurus(mut self, thesaurus: &Thesaurus) -> Entry {
        let versions = &mut self.properties;
        for properties in [&mut versions.tc, &mut versions.tcn, &mut versions.tl] {
            for (property, terms) in properties.iter_mut() {
                *terms = thesaurus.normalize(*property, terms);
            }
        }
        self
    }
}

// ── Tests ──

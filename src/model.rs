use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::parser::markup::Element;

// ── Versions ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Version {
    Tc,
    Tcn,
    Tl,
}

impl Version {
    pub const ALL: [Version; 3] = [Version::Tc, Version::Tcn, Version::Tl];

    /// Version whose first block supplies categories and folio.
    pub const CANONICAL: Version = Version::Tl;

    pub fn as_str(self) -> &'static str {
        match self {
            Version::Tc => "tc",
            Version::Tcn => "tcn",
            Version::Tl => "tl",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tc" => Ok(Version::Tc),
            "tcn" => Ok(Version::Tcn),
            "tl" => Ok(Version::Tl),
            other => Err(format!("unknown version {other:?} (expected tc, tcn or tl)")),
        }
    }
}

/// One value per manuscript version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Versioned<T> {
    pub tc: T,
    pub tcn: T,
    pub tl: T,
}

impl<T> Versioned<T> {
    pub fn from_fn(mut f: impl FnMut(Version) -> T) -> Self {
        Versioned {
            tc: f(Version::Tc),
            tcn: f(Version::Tcn),
            tl: f(Version::Tl),
        }
    }

    pub fn get(&self, version: Version) -> &T {
        match version {
            Version::Tc => &self.tc,
            Version::Tcn => &self.tcn,
            Version::Tl => &self.tl,
        }
    }

    pub fn get_mut(&mut self, version: Version) -> &mut T {
        match version {
            Version::Tc => &mut self.tc,
            Version::Tcn => &mut self.tcn,
            Version::Tl => &mut self.tl,
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(Version, &T) -> U) -> Versioned<U> {
        Versioned::from_fn(|v| f(v, self.get(v)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Version, &T)> {
        Version::ALL.into_iter().map(move |v| (v, self.get(v)))
    }
}

// ── Properties ──

/// Semantic and language-marker categories that can be tagged inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Property {
    Animal,
    BodyPart,
    Currency,
    Definition,
    Environment,
    Material,
    Medical,
    Measurement,
    Music,
    Plant,
    Place,
    PersonalName,
    Profession,
    Sensory,
    Tool,
    Time,
    Weapon,
    German,
    Greek,
    Italian,
    Latin,
    Occitan,
    Poitevin,
}

impl Property {
    pub const ALL: [Property; 23] = [
        Property::Animal,
        Property::BodyPart,
        Property::Currency,
        Property::Definition,
        Property::Environment,
        Property::Material,
        Property::Medical,
        Property::Measurement,
        Property::Music,
        Property::Plant,
        Property::Place,
        Property::PersonalName,
        Property::Profession,
        Property::Sensory,
        Property::Tool,
        Property::Time,
        Property::Weapon,
        Property::German,
        Property::Greek,
        Property::Italian,
        Property::Latin,
        Property::Occitan,
        Property::Poitevin,
    ];

    /// Categories whose context is worth locating: everything but definitions
    /// and language markers.
    pub const CONTEXTUAL: [Property; 16] = [
        Property::Animal,
        Property::BodyPart,
        Property::Currency,
        Property::Environment,
        Property::Material,
        Property::Medical,
        Property::Measurement,
        Property::Music,
        Property::Plant,
        Property::Place,
        Property::PersonalName,
        Property::Profession,
        Property::Sensory,
        Property::Tool,
        Property::Time,
        Property::Weapon,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Property::Animal => "animal",
            Property::BodyPart => "body_part",
            Property::Currency => "currency",
            Property::Definition => "definition",
            Property::Environment => "environment",
            Property::Material => "material",
            Property::Medical => "medical",
            Property::Measurement => "measurement",
            Property::Music => "music",
            Property::Plant => "plant",
            Property::Place => "place",
            Property::PersonalName => "personal_name",
            Property::Profession => "profession",
            Property::Sensory => "sensory",
            Property::Tool => "tool",
            Property::Time => "time",
            Property::Weapon => "weapon",
            Property::German => "german",
            Property::Greek => "greek",
            Property::Italian => "italian",
            Property::Latin => "latin",
            Property::Occitan => "occitan",
            Property::Poitevin => "poitevin",
        }
    }

    /// Tag names marking this category. The first is the preferred spelling;
    /// the rest are variants found in older transcriptions.
    pub fn tags(self) -> &'static [&'static str] {
        match self {
            Property::Animal => &["al"],
            Property::BodyPart => &["bp"],
            Property::Currency => &["cn"],
            Property::Definition => &["def", "df"],
            Property::Environment => &["env"],
            Property::Material => &["m"],
            Property::Medical => &["md"],
            Property::Measurement => &["ms"],
            Property::Music => &["mu"],
            Property::Plant => &["pa"],
            Property::Place => &["pl"],
            Property::PersonalName => &["pn"],
            Property::Profession => &["pro"],
            Property::Sensory => &["sn"],
            Property::Tool => &["tl"],
            Property::Time => &["tmp"],
            Property::Weapon => &["wp"],
            Property::German => &["de"],
            Property::Greek => &["el", "ge"],
            Property::Italian => &["it"],
            Property::Latin => &["la"],
            Property::Occitan => &["oc"],
            Property::Poitevin => &["po"],
        }
    }

    pub fn from_tag(tag: &str) -> Option<Property> {
        Property::ALL.into_iter().find(|p| p.tags().contains(&tag))
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Property {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Property::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| format!("unknown property {s:?}"))
    }
}

/// Category → tagged terms in document order, duplicates kept.
pub type Properties = BTreeMap<Property, Vec<String>>;

// ── Margins ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarginPosition {
    LeftTop,
    LeftMiddle,
    LeftBottom,
    Top,
    Bottom,
    RightTop,
    RightMiddle,
    RightBottom,
}

impl MarginPosition {
    pub fn as_str(self) -> &'static str {
        match self {
            MarginPosition::LeftTop => "left-top",
            MarginPosition::LeftMiddle => "left-middle",
            MarginPosition::LeftBottom => "left-bottom",
            MarginPosition::Top => "top",
            MarginPosition::Bottom => "bottom",
            MarginPosition::RightTop => "right-top",
            MarginPosition::RightMiddle => "right-middle",
            MarginPosition::RightBottom => "right-bottom",
        }
    }
}

impl FromStr for MarginPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "left-top" => Ok(MarginPosition::LeftTop),
            "left-middle" => Ok(MarginPosition::LeftMiddle),
            "left-bottom" => Ok(MarginPosition::LeftBottom),
            "top" => Ok(MarginPosition::Top),
            "bottom" => Ok(MarginPosition::Bottom),
            "right-top" => Ok(MarginPosition::RightTop),
            "right-middle" => Ok(MarginPosition::RightMiddle),
            "right-bottom" => Ok(MarginPosition::RightBottom),
            other => Err(format!("unknown margin position {other:?}")),
        }
    }
}

impl fmt::Display for MarginPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Margin {
    pub position: MarginPosition,
    pub render: Option<String>,
    pub text: String,
    pub length: usize,
}

// ── Entries ──

/// One reconstructed manuscript entry across all three versions.
///
/// Every derived field is computed once by `parser::extract::build_entry`;
/// downstream code only reads.
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    pub identity: String,
    pub folio: String,
    #[serde(skip)]
    pub xml: Versioned<Element>,
    pub source: Versioned<String>,
    pub text: Versioned<String>,
    pub title: Versioned<String>,
    pub categories: Vec<String>,
    pub properties: Versioned<Properties>,
    pub margins: Versioned<Vec<Margin>>,
    pub length: Versioned<usize>,
    pub balanced: Versioned<bool>,
    pub missing: Vec<Version>,
}

impl Entry {
    pub fn terms(&self, property: Property, version: Version) -> &[String] {
        self.properties
            .get(version)
            .get(&property)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Terms with repeats removed, keeping first-occurrence order.
    pub fn dedup_terms(&self, property: Property, version: Version) -> Vec<String> {
        dedup_terms(self.terms(property, version))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Folio without leading zeros, for display: `"007v"` → `"7v"`.
pub fn folio_display(folio: &str) -> &str {
    let trimmed = folio.trim_start_matches('0');
    if trimmed.is_empty() {
        folio
    } else {
        trimmed
    }
}

pub fn dedup_terms(terms: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    terms
        .iter()
        .filter(|t| seen.insert(t.as_str()))
        .cloned()
        .collect()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_tags_resolve_back() {
        for p in Property::ALL {
            for tag in p.tags() {
                assert_eq!(Property::from_tag(tag), Some(p));
            }
        }
        assert_eq!(Property::from_tag("df"), Some(Property::Definition));
        assert_eq!(Property::from_tag("head"), None);
    }

    #[test]
    fn folio_without_leading_zeros() {
        assert_eq!(folio_display("007v"), "7v");
        assert_eq!(folio_display("120r"), "120r");
        assert_eq!(folio_display("000"), "000");
    }

    #[test]
    fn property_names_parse() {
        assert_eq!("personal_name".parse::<Property>(), Ok(Property::PersonalName));
        assert!("colour".parse::<Property>().is_err());
    }

    #[test]
    fn margin_positions_parse() {
        assert_eq!("left-middle".parse::<MarginPosition>(), Ok(MarginPosition::LeftMiddle));
        assert!("center".parse::<MarginPosition>().is_err());
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let terms: Vec<String> = ["foo", "bar", "foo", "baz", "bar"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(dedup_terms(&terms), vec!["foo", "bar", "baz"]);
    }

    #[test]
    fn versioned_iterates_in_order() {
        let v = Versioned::from_fn(|v| v.as_str().len());
        let order: Vec<_> = v.iter().map(|(v, _)| v).collect();
        assert_eq!(order, Version::ALL);
        assert_eq!(*v.get(Version::Tcn), 3);
    }
}

use std::collections::{BTreeMap, HashMap};

use super::segment::EntryFragment;
use crate::model::{Version, Versioned};

/// Sort key for folios like `"012v"`: page number, then recto before verso.
/// Folios that do not follow the pattern sort after all others, by text.
pub fn folio_key(folio: &str) -> (u32, u8, String) {
    let digits: String = folio.chars().take_while(char::is_ascii_digit).collect();
    let side = &folio[digits.len()..];
    match (digits.parse::<u32>(), side) {
        (Ok(n), "r") => (n, 0, String::new()),
        (Ok(n), "v") => (n, 1, String::new()),
        _ => (u32::MAX, 2, folio.to_string()),
    }
}

/// Merge the per-page fragments of one version into one fragment per
/// identity, in order of first appearance. Pages are walked in folio order;
/// fragments sharing an identity are concatenated across page boundaries.
pub fn merge_version(mut pages: Vec<(String, Vec<EntryFragment>)>) -> Vec<EntryFragment> {
    pages.sort_by_cached_key(|(folio, _)| folio_key(folio));

    let mut merged: Vec<EntryFragment> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for fragment in pages.into_iter().flat_map(|(_, fragments)| fragments) {
        match index.get(&fragment.identity) {
            Some(&i) => merged[i].append(fragment),
            None => {
                index.insert(fragment.identity.clone(), merged.len());
                merged.push(fragment);
            }
        }
    }
    merged
}

/// One identity's fragments across the three versions; `None` where the
/// identity does not occur.
pub type Assembled = Versioned<Option<EntryFragment>>;

/// Union the merged versions by identity, sorted lexicographically.
pub fn union_versions(versions: Versioned<Vec<EntryFragment>>) -> Vec<(String, Assembled)> {
    let mut by_identity: BTreeMap<String, Assembled> = BTreeMap::new();
    let Versioned { tc, tcn, tl } = versions;
    for (version, fragments) in [(Version::Tc, tc), (Version::Tcn, tcn), (Version::Tl, tl)] {
        for fragment in fragments {
            let identity = fragment.identity.clone();
            *by_identity.entry(identity).or_default().get_mut(version) = Some(fragment);
        }
    }
    by_identity.into_iter().collect()
}

// ── Tests ──

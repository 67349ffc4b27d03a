use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use super::properties::term_text;
use crate::error::LocateError;
use crate::model::{Entry, Property, Version};
use crate::parser::markup::Element;
use crate::parser::render::{render, AnnotationPolicy};

pub const DEFAULT_WINDOW: usize = 10;

/// Replaced by a space before splitting into words, in this order.
const SEPARATORS: [&str; 10] = ["\n", "'", "’", "\t", "+", " -", "- ", "\"", ",", "."];

/// Short words that must never be cut out of a longer word ("in" inside "rain").
const NEVER_SPLIT_TL: &[&str] = &["a", "in", "on", "or", "at", "as", "the"];
const NEVER_SPLIT_FR: &[&str] = &["de", "le", "la", "du", "a", "verd", "gris", "huille"];

pub fn normalize_words(text: &str) -> Vec<String> {
    let cleaned = SEPARATORS
        .iter()
        .fold(text.to_string(), |acc, sep| acc.replace(sep, " "));
    cleaned.split_whitespace().map(str::to_string).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextWindow {
    pub before: Vec<String>,
    pub after: Vec<String>,
}

/// Finds the words around a tagged term inside the plain text of its block.
#[derive(Debug, Clone)]
pub struct ContextLocator {
    pub version: Version,
    pub window: usize,
    never_split: &'static [&'static str],
}

impl ContextLocator {
    pub fn for_version(version: Version, window: usize) -> Self {
        let never_split = match version {
            Version::Tl => NEVER_SPLIT_TL,
            Version::Tc | Version::Tcn => NEVER_SPLIT_FR,
        };
        ContextLocator {
            version,
            window,
            never_split,
        }
    }

    /// Window around the `occurrence`-th (1-based) match of `term` in
    /// `block_text`.
    pub fn locate(
        &self,
        term: &str,
        block_text: &str,
        occurrence: usize,
    ) -> Result<ContextWindow, LocateError> {
        let term_words = normalize_words(term);
        if term_words.is_empty() {
            return Err(LocateError::EmptyTerm);
        }
        let words = self.repair_seams(normalize_words(block_text), &term_words);

        let start = span_starts(&words, &term_words)
            .nth(occurrence.saturating_sub(1))
            .ok_or_else(|| LocateError::NotFound {
                term: term.to_string(),
                occurrence,
            })?;
        let end = start + term_words.len();

        Ok(ContextWindow {
            before: words[start.saturating_sub(self.window)..start].to_vec(),
            after: words[end..(end + self.window).min(words.len())].to_vec(),
        })
    }

    /// Number of places `term` matches in the repaired word list of `block_text`.
    pub fn count_matches(&self, term: &str, block_text: &str) -> usize {
        let term_words = normalize_words(term);
        if term_words.is_empty() {
            return 0;
        }
        let words = self.repair_seams(normalize_words(block_text), &term_words);
        span_starts(&words, &term_words).count()
    }

    /// Split block words that had the term's first or last word fused into
    /// them when markup was removed, e.g. `somegoldthing` → `some gold thing`.
    fn repair_seams(&self, words: Vec<String>, term: &[String]) -> Vec<String> {
        let anchors: Vec<(&str, Vec<&str>)> = term_anchors(term)
            .into_iter()
            .map(|anchor| (anchor, other_words(term, anchor)))
            .collect();

        let mut repaired = Vec::with_capacity(words.len());
        for word in words {
            let seam = anchors.iter().find_map(|(anchor, others)| {
                if word == *anchor
                    || others.contains(&word.as_str())
                    || self.never_split.contains(anchor)
                {
                    return None;
                }
                word.find(anchor).map(|at| (at, at + anchor.len()))
            });
            match seam {
                Some((at, end)) => repaired.extend(
                    [&word[..at], &word[at..end], &word[end..]]
                        .into_iter()
                        .filter(|piece| !piece.is_empty())
                        .map(str::to_string),
                ),
                None => repaired.push(word),
            }
        }
        repaired
    }
}

fn term_anchors(term: &[String]) -> Vec<&str> {
    match term {
        [] => Vec::new(),
        [only] => vec![only.as_str()],
        [first, .., last] => vec![first.as_str(), last.as_str()],
    }
}

/// The term's words with one instance of `anchor` removed.
fn other_words<'a>(term: &'a [String], anchor: &str) -> Vec<&'a str> {
    let mut others: Vec<&str> = term.iter().map(String::as_str).collect();
    if let Some(i) = others.iter().position(|w| *w == anchor) {
        others.remove(i);
    }
    others
}

fn span_starts<'a>(words: &'a [String], term: &'a [String]) -> impl Iterator<Item = usize> + 'a {
    words
        .windows(term.len())
        .enumerate()
        .filter(move |(_, window)| *window == term)
        .map(|(i, _)| i)
}

// ── Block scanner ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextRow {
    pub identity: String,
    pub folio: String,
    pub version: Version,
    pub property: Property,
    pub term: String,
    pub occurrence: usize,
    pub before: Vec<String>,
    pub after: Vec<String>,
    pub located: bool,
    pub reason: Option<String>,
    /// Match count in the block differs from the number of tagged
    /// occurrences, so the occurrence tie-break may have picked the wrong one.
    pub ambiguous: bool,
}

/// A block's plain text, the search space for `terms`.
struct ScanUnit<'a> {
    text: String,
    terms: Vec<&'a Element>,
}

impl<'a> ScanUnit<'a> {
    fn whole(block: &'a Element, policy: &AnnotationPolicy) -> Self {
        ScanUnit {
            text: render(block, policy),
            terms: block.descendants().collect(),
        }
    }
}

enum Part<'a> {
    Ab(&'a Element),
    Outside(&'a Element),
}

/// Every `ab` element, plus one unit per top-level block for the elements
/// outside any `ab`, searched in the block's text with its `ab`s cut out.
/// Units come in document order; the outside unit sits where its first
/// element does.
fn scan_units<'a>(root: &'a Element, policy: &AnnotationPolicy) -> Vec<ScanUnit<'a>> {
    let mut units = Vec::new();
    for top in &root.children {
        if top.tag == "ab" {
            units.push(ScanUnit::whole(top, policy));
            continue;
        }
        let mut parts = Vec::new();
        partition_by_ab(top, &mut parts);
        let mut outside: Option<usize> = None;
        for part in parts {
            match part {
                Part::Ab(ab) => units.push(ScanUnit::whole(ab, policy)),
                Part::Outside(el) => {
                    let i = *outside.get_or_insert_with(|| {
                        units.push(ScanUnit {
                            text: render(&without_abs(top), policy),
                            terms: Vec::new(),
                        });
                        units.len() - 1
                    });
                    units[i].terms.push(el);
                }
            }
        }
    }
    units
}

fn partition_by_ab<'a>(el: &'a Element, parts: &mut Vec<Part<'a>>) {
    for child in &el.children {
        if child.tag == "ab" {
            parts.push(Part::Ab(child));
        } else {
            parts.push(Part::Outside(child));
            partition_by_ab(child, parts);
        }
    }
}

/// `el` with every `ab` subtree removed. A removed `ab` leaves a space so
/// the words around it stay apart.
fn without_abs(el: &Element) -> Element {
    let mut pruned = Element {
        tag: el.tag.clone(),
        attrs: el.attrs.clone(),
        text: el.text.clone(),
        children: Vec::new(),
        tail: el.tail.clone(),
        span: el.span.clone(),
    };
    for child in &el.children {
        if child.tag == "ab" {
            let gap = format!(" {}", child.tail);
            match pruned.children.last_mut() {
                Some(prev) => prev.tail.push_str(&gap),
                None => pruned.text.push_str(&gap),
            }
        } else {
            pruned.children.push(without_abs(child));
        }
    }
    pruned
}

/// Locate every occurrence of the selected properties' tags in one version
/// of `entry`. Failures are reported as rows, never as errors.
pub fn scan_entry(entry: &Entry, locator: &ContextLocator, properties: &[Property]) -> Vec<ContextRow> {
    let plain = AnnotationPolicy::plain();
    let version = locator.version;
    let mut rows = Vec::new();

    for unit in scan_units(entry.xml.get(version), &plain) {
        let block_text = unit.text.as_str();

        for &property in properties {
            let terms: Vec<String> = unit
                .terms
                .iter()
                .filter(|el| property.tags().contains(&el.tag.as_str()))
                .map(|el| term_text(el, &plain))
                .collect();
            if terms.is_empty() {
                continue;
            }

            let mut tagged: HashMap<&str, usize> = HashMap::new();
            for term in &terms {
                *tagged.entry(term.as_str()).or_default() += 1;
            }
            let mut found: HashMap<&str, usize> = HashMap::new();

            for term in &terms {
                let occurrence = 1 + found.get(term.as_str()).copied().unwrap_or(0);
                let matches = locator.count_matches(term, block_text);
                let ambiguous = matches != tagged[term.as_str()];
                if ambiguous {
                    debug!(
                        identity = %entry.identity,
                        %version,
                        %property,
                        term = %term,
                        matches,
                        tagged = tagged[term.as_str()],
                        "occurrence count mismatch"
                    );
                }

                let mut row = ContextRow {
                    identity: entry.identity.clone(),
                    folio: entry.folio.clone(),
                    version,
                    property,
                    term: term.clone(),
                    occurrence,
                    before: Vec::new(),
                    after: Vec::new(),
                    located: false,
                    reason: None,
                    ambiguous,
                };
                match locator.locate(term, block_text, occurrence) {
                    Ok(window) => {
                        *found.entry(term.as_str()).or_default() += 1;
                        row.before = window.before;
                        row.after = window.after;
                        row.located = true;
                    }
                    Err(err) => {
                        warn!(identity = %entry.identity, %version, %property, "{err}");
                        row.reason = Some(err.to_string());
                    }
                }
                rows.push(row);
            }
        }
    }
    rows
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::extract::build_entry;
    use crate::parser::segment::{segment_page, RawPage};
    use crate::model::Versioned;

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    fn tl() -> ContextLocator {
        ContextLocator::for_version(Version::Tl, DEFAULT_WINDOW)
    }

    #[test]
    fn normalization_splits_on_punctuation() {
        assert_eq!(normalize_words("l'eau, et.le\n+sel - x"), words("l eau et le sel x"));
    }

    #[test]
    fn plain_window() {
        let w = tl().locate("brown", "the quick brown fox", 1).unwrap();
        assert_eq!(w.before, words("the quick"));
        assert_eq!(w.after, words("fox"));
    }

    #[test]
    fn window_clipped_to_k() {
        let locator = ContextLocator::for_version(Version::Tl, 2);
        let w = locator.locate("e", "a b c d e f g h", 1).unwrap();
        assert_eq!(w.before, words("c d"));
        assert_eq!(w.after, words("f g"));
    }

    #[test]
    fn second_occurrence() {
        let locator = ContextLocator::for_version(Version::Tl, 3);
        let block = "w0 w1 gold w3 w4 w5 w6 gold w8 w9 w10";
        let w = locator.locate("gold", block, 2).unwrap();
        assert_eq!(w.before, words("w4 w5 w6"));
        assert_eq!(w.after, words("w8 w9 w10"));
        assert!(matches!(
            locator.locate("gold", block, 3),
            Err(LocateError::NotFound { occurrence: 3, .. })
        ));
    }

    #[test]
    fn fused_word_is_split() {
        let w = tl().locate("gold", "somegoldthing", 1).unwrap();
        assert_eq!(w.before, words("some"));
        assert_eq!(w.after, words("thing"));
    }

    #[test]
    fn multi_word_term_anchors() {
        let w = tl().locate("black pepper", "grind blackpepper finely", 1).unwrap();
        assert_eq!(w.before, words("grind"));
        assert_eq!(w.after, words("finely"));
    }

    #[test]
    fn never_split_words_stay_whole() {
        assert!(tl().locate("in", "raining", 1).is_err());
        let tc = ContextLocator::for_version(Version::Tc, DEFAULT_WINDOW);
        assert!(tc.locate("in", "raining", 1).is_ok());
        assert!(tc.locate("gris", "verdgris", 1).is_err());
    }

    #[test]
    fn other_term_words_are_not_cut() {
        let tc = ContextLocator::for_version(Version::Tc, DEFAULT_WINDOW);
        let w = tc.locate("or dor", "l or dor fin", 1).unwrap();
        assert_eq!(w.before, words("l"));
        assert_eq!(w.after, words("fin"));
    }

    #[test]
    fn empty_term() {
        assert_eq!(tl().locate(", .", "a b", 1), Err(LocateError::EmptyTerm));
    }

    fn entry_from(tl_source: &str) -> Entry {
        let page = RawPage {
            version: Version::Tl,
            folio: "004v".to_string(),
            source: tl_source.to_string(),
        };
        let fragment = segment_page(&page).unwrap().remove(0);
        let identity = fragment.identity.clone();
        build_entry(
            &identity,
            Versioned {
                tc: None,
                tcn: None,
                tl: Some(fragment),
            },
        )
    }

    #[test]
    fn scanner_counts_repeats_per_block() {
        let entry = entry_from(
            r#"<div id="p004v_1"><ab>melt <m>gold</m> with <m>lead</m>, then more <m>gold</m> again</ab></div>"#,
        );
        let rows = scan_entry(&entry, &tl(), &[Property::Material]);
        assert_eq!(rows.len(), 3);
        let terms: Vec<_> = rows.iter().map(|r| (r.term.as_str(), r.occurrence)).collect();
        assert_eq!(terms, [("gold", 1), ("lead", 1), ("gold", 2)]);
        assert_eq!(rows[2].before, words("melt gold with lead then more"));
        assert_eq!(rows[2].after, words("again"));
        assert!(rows.iter().all(|r| r.located && !r.ambiguous));
        assert_eq!(rows[0].folio, "004v");
    }

    #[test]
    fn scanner_reports_failures_and_ambiguity() {
        let entry = entry_from(
            r#"<div id="p004v_2"><ab>ra<m>in</m>ing gold <m>gold</m></ab></div>"#,
        );
        let rows = scan_entry(&entry, &tl(), &[Property::Material]);
        assert_eq!(rows.len(), 2);
        assert!(!rows[0].located);
        assert!(rows[0].reason.is_some());
        assert!(rows[0].before.is_empty());
        assert!(rows[1].located);
        assert!(rows[1].ambiguous);
    }

    #[test]
    fn terms_outside_ab_use_top_level_block() {
        let entry = entry_from(
            r#"<div id="p004v_3"><head>On <m>wax</m></head><ab>take <m>wax</m></ab></div>"#,
        );
        let rows = scan_entry(&entry, &tl(), &[Property::Material]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].before, words("On"));
        assert!(rows[0].after.is_empty());
        assert_eq!(rows[1].before, words("take"));
        assert!(rows[1].after.is_empty());
        assert!(rows.iter().all(|r| r.located && !r.ambiguous));
    }

    #[test]
    fn heading_after_ab_keeps_its_own_context() {
        let entry = entry_from(
            r#"<div id="p004v_4"><ab>take <m>wax</m> now</ab><head>On <m>wax</m> again</head></div>"#,
        );
        let rows = scan_entry(&entry, &tl(), &[Property::Material]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].before, words("take"));
        assert_eq!(rows[0].after, words("now"));
        assert_eq!(rows[1].before, words("On"));
        assert_eq!(rows[1].after, words("again"));
        assert!(rows.iter().all(|r| r.located && !r.ambiguous));
    }
}

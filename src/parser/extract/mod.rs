pub mod context;
pub mod margins;
pub mod properties;

use tracing::debug;

use super::aggregate::Assembled;
use super::balance::is_balanced;
use super::markup::Element;
use super::render::{render, AnnotationPolicy};
use super::segment::EntryFragment;
use crate::model::{Entry, Version};

/// Build the complete record for one identity. Every derived field is
/// computed here, once.
pub fn build_entry(identity: &str, fragments: Assembled) -> Entry {
    let annotated = AnnotationPolicy::annotated();
    let plain = AnnotationPolicy::plain();

    let xml = fragments.map(|_, f| {
        f.as_ref()
            .map(EntryFragment::to_element)
            .unwrap_or_else(|| Element::new("entry"))
    });
    let source = fragments.map(|_, f| f.as_ref().map(|f| f.source.clone()).unwrap_or_default());
    let text = xml.map(|_, root| render(root, &annotated));
    let title = xml.map(|_, root| find_title(root));
    let properties = xml.map(|_, root| properties::extract(root, &plain));
    let margins = xml.map(|_, root| margins::extract(root));
    let length = text.map(|_, t| t.chars().count());
    let balanced = source.map(|_, s| is_balanced(s));

    let missing: Vec<Version> = fragments
        .iter()
        .filter(|(_, f)| f.is_none())
        .map(|(v, _)| v)
        .collect();
    let folio = fragments
        .get(Version::CANONICAL)
        .as_ref()
        .or_else(|| fragments.iter().find_map(|(_, f)| f.as_ref()))
        .map(|f| f.folio.clone())
        .unwrap_or_default();
    let categories = parse_categories(xml.get(Version::CANONICAL));

    if !missing.is_empty() {
        debug!(identity, ?missing, "entry absent from some versions");
    }

    Entry {
        identity: identity.to_string(),
        folio,
        xml,
        source,
        text,
        title,
        categories,
        properties,
        margins,
        length,
        balanced,
        missing,
    }
}

/// First heading with deleted text left out, line breaks as spaces.
fn find_title(root: &Element) -> String {
    root.find_all(&["head"])
        .next()
        .map(|head| properties::term_text(head, &AnnotationPolicy::title()).trim().to_string())
        .unwrap_or_default()
}

/// `categories` of the first block, split on `;`, in order, without repeats.
fn parse_categories(root: &Element) -> Vec<String> {
    let Some(raw) = root.children.first().and_then(|block| block.attr("categories")) else {
        return Vec::new();
    };
    let mut categories: Vec<String> = Vec::new();
    for category in raw.split(';').map(str::trim).filter(|c| !c.is_empty()) {
        if !categories.iter().any(|c| c == category) {
            categories.push(category.to_string());
        }
    }
    categories
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MarginPosition, Property, Versioned};
    use crate::parser::segment::{segment_page, RawPage};

    fn fragment(version: Version, folio: &str, source: &str) -> Option<EntryFragment> {
        let page = RawPage {
            version,
            folio: folio.to_string(),
            source: source.to_string(),
        };
        segment_page(&page).unwrap().into_iter().next()
    }

    const TL: &str = r#"<div id="p001r_1" categories="metal process;casting;metal process">
        <head>Casting <del>lead</del> <sup>in</sup> sand</head>
        <ab>Take <m>lead</m> and <m>tin</m>, <ill/> then <m>lead</m> again.</ab>
        <ab margin="left-middle">note <del>this</del></ab>
    </div>"#;

    const TC: &str = r#"<div id="p001r_1"><head>Gecter en sable</head><ab>Prends <m>plomb</m> et <m>estain</m></ab></div>"#;

    fn sample() -> Entry {
        build_entry(
            "p001r_1",
            Versioned {
                tc: fragment(Version::Tc, "001r", TC),
                tcn: None,
                tl: fragment(Version::Tl, "001r", TL),
            },
        )
    }

    #[test]
    fn derived_fields() {
        let e = sample();
        assert_eq!(e.identity, "p001r_1");
        assert_eq!(e.folio, "001r");
        assert_eq!(e.missing, [Version::Tcn]);
        assert_eq!(e.categories, ["metal process", "casting"]);
        assert_eq!(e.title.tl, "Casting  [in] sand");
        assert_eq!(e.title.tc, "Gecter en sable");
        assert_eq!(e.title.tcn, "");
        assert!(e.text.tl.contains("Casting <-lead-> [in] sand"));
        assert!(e.text.tl.contains("[illegible] then lead again."));
        assert_eq!(e.length.tl, e.text.tl.chars().count());
        assert_eq!(e.length.tcn, 0);
        assert!(e.balanced.tl && e.balanced.tc && e.balanced.tcn);
    }

    #[test]
    fn properties_and_margins_per_version() {
        let e = sample();
        assert_eq!(e.terms(Property::Material, Version::Tl), ["lead", "tin", "lead"]);
        assert_eq!(e.terms(Property::Material, Version::Tc), ["plomb", "estain"]);
        assert!(e.terms(Property::Material, Version::Tcn).is_empty());
        assert_eq!(e.margins.tl.len(), 1);
        assert_eq!(e.margins.tl[0].position, MarginPosition::LeftMiddle);
        assert_eq!(e.margins.tl[0].text, "note this");
        assert!(e.margins.tc.is_empty());
    }

    #[test]
    fn folio_falls_back_to_first_present_version() {
        let e = build_entry(
            "x",
            Versioned {
                tc: None,
                tcn: fragment(Version::Tcn, "007v", r#"<div id="x"><ab>y</ab></div>"#),
                tl: None,
            },
        );
        assert_eq!(e.folio, "007v");
        assert_eq!(e.missing, [Version::Tc, Version::Tl]);
        assert!(e.categories.is_empty());
    }

    #[test]
    fn unbalanced_source_is_flagged() {
        let mut frag = fragment(Version::Tl, "001r", r#"<div id="z"><ab>y</ab></div>"#);
        if let Some(f) = frag.as_mut() {
            f.source.push_str("<ab>");
        }
        let e = build_entry("z", Versioned { tc: None, tcn: None, tl: frag });
        assert!(!e.balanced.tl);
    }
}

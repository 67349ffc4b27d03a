use crate::model::{Properties, Property};
use crate::parser::markup::Element;
use crate::parser::render::{render, AnnotationPolicy};

/// Render one tagged term: annotations per `policy`, line breaks as spaces.
pub fn term_text(el: &Element, policy: &AnnotationPolicy) -> String {
    render(el, policy).replace('\n', " ")
}

/// Every property's tagged terms in document order, duplicates kept. Every
/// property has an entry, possibly empty.
pub fn extract(root: &Element, policy: &AnnotationPolicy) -> Properties {
    let mut properties: Properties = Property::ALL.into_iter().map(|p| (p, Vec::new())).collect();
    for el in root.descendants() {
        if let Some(property) = Property::from_tag(&el.tag) {
            properties.entry(property).or_default().push(term_text(el, policy));
        }
    }
    properties
}

// ── Tests ──

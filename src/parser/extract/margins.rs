use tracing::warn;

use crate::model::{Margin, MarginPosition};
use crate::parser::markup::{normalize_whitespace, Element};
use crate::parser::render::{render, AnnotationPolicy};

/// Marginal blocks of one version tree, in document order.
pub fn extract(root: &Element) -> Vec<Margin> {
    root.descendants()
        .filter_map(|el| {
            let raw = el.attr("margin")?;
            let position = match raw.parse::<MarginPosition>() {
                Ok(position) => position,
                Err(err) => {
                    warn!(tag = %el.tag, "{err}, margin skipped");
                    return None;
                }
            };
            let text = normalize_whitespace(&render(el, &AnnotationPolicy::plain()))
                .trim()
                .to_string();
            Some(Margin {
                position,
                render: el.attr_nonempty("render").map(str::to_string),
                length: text.split_whitespace().count(),
                text,
            })
        })
        .collect()
}

// ── Tests ──

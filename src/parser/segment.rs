use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use super::markup::{normalize_whitespace, parse, top_level_blocks, Element};
use crate::error::MarkupError;
use crate::model::Version;

/// Separator installed between continued fragments of one entry.
pub const PARAGRAPH_BREAK: &str = "\n\n";

/// One version's markup for one physical page.
#[derive(Debug, Clone)]
pub struct RawPage {
    pub version: Version,
    pub folio: String,
    pub source: String,
}

/// The blocks of one entry within one version, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFragment {
    pub identity: String,
    /// Page the first block was found on.
    pub folio: String,
    pub blocks: Vec<Element>,
    /// Raw markup of `blocks`, joined by `PARAGRAPH_BREAK`.
    pub source: String,
}

impl EntryFragment {
    /// Append a continuation. Existing blocks are never reordered or replaced.
    pub fn append(&mut self, continuation: EntryFragment) {
        if continuation.blocks.is_empty() {
            return;
        }
        if let Some(last) = self.blocks.last_mut() {
            last.tail = PARAGRAPH_BREAK.to_string();
        }
        if !self.source.is_empty() {
            self.source.push_str(PARAGRAPH_BREAK);
        }
        self.source.push_str(&continuation.source);
        self.blocks.extend(continuation.blocks);
    }

    /// The blocks under a synthetic `entry` root.
    pub fn to_element(&self) -> Element {
        Element {
            children: self.blocks.clone(),
            ..Element::new("entry")
        }
    }
}

static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<div\b.*?</div>").unwrap());

/// Split a page into entry fragments, in order of first appearance.
///
/// Blocks without an `id` are dropped. A block sharing an identity with an
/// earlier block on the page is appended to it, whether or not it carries
/// `continues="yes"`. When the page as a whole does not parse, each `div`
/// is parsed on its own and the ones that fail are skipped; the page fails
/// only if no block survives.
pub fn segment_page(page: &RawPage) -> Result<Vec<EntryFragment>, MarkupError> {
    let normalized = normalize_whitespace(&page.source);
    let blocks = match parse(&normalized) {
        Ok(root) => owned_blocks(&normalized, &root),
        Err(err) => {
            warn!(
                version = %page.version,
                folio = %page.folio,
                "page does not parse ({err}), parsing blocks one by one"
            );
            let recovered = recover_blocks(page, &normalized);
            if recovered.is_empty() {
                return Err(err);
            }
            recovered
        }
    };

    let mut fragments: Vec<EntryFragment> = Vec::new();
    for (mut block, source) in blocks {
        let Some(identity) = block.attr_nonempty("id").map(str::to_string) else {
            warn!(
                version = %page.version,
                folio = %page.folio,
                tag = %block.tag,
                "block without id dropped"
            );
            continue;
        };

        let continues = block.flag("continues");
        block.tail.clear();
        let fragment = EntryFragment {
            identity,
            folio: page.folio.clone(),
            blocks: vec![block],
            source: source.to_string(),
        };

        match fragments.iter_mut().find(|f| f.identity == fragment.identity) {
            Some(existing) => {
                if !continues {
                    debug!(
                        version = %page.version,
                        folio = %page.folio,
                        identity = %fragment.identity,
                        "repeated id without continues flag, appending"
                    );
                }
                existing.append(fragment);
            }
            None => fragments.push(fragment),
        }
    }

    Ok(fragments)
}

/// Top-level blocks of `root`, each with the text it was parsed from.
fn owned_blocks<'a>(text: &'a str, root: &Element) -> Vec<(Element, &'a str)> {
    top_level_blocks(root)
        .iter()
        .map(|block| (block.clone(), text.get(block.span.clone()).unwrap_or_default()))
        .collect()
}

fn recover_blocks<'a>(page: &RawPage, text: &'a str) -> Vec<(Element, &'a str)> {
    let mut blocks = Vec::new();
    for m in BLOCK_RE.find_iter(text) {
        match parse(m.as_str()) {
            Ok(root) => blocks.extend(owned_blocks(m.as_str(), &root)),
            Err(err) => warn!(
                version = %page.version,
                folio = %page.folio,
                "block skipped: {err}"
            ),
        }
    }
    blocks
}

// ── Tests ──

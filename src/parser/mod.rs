pub mod aggregate;
pub mod balance;
pub mod extract;
pub mod markup;
pub mod render;
pub mod segment;

use rayon::prelude::*;
use tracing::{error, info};

use crate::error::MarkupError;
use crate::manuscript::Manuscript;
use crate::model::{Entry, Version, Versioned};
use segment::{EntryFragment, RawPage};

/// One page split into entry fragments.
#[derive(Debug)]
pub struct SegmentedPage {
    pub version: Version,
    pub folio: String,
    pub fragments: Vec<EntryFragment>,
}

#[derive(Debug)]
pub struct PageFailure {
    pub version: Version,
    pub folio: String,
    pub error: MarkupError,
}

pub fn process_page(page: &RawPage) -> Result<SegmentedPage, PageFailure> {
    match segment::segment_page(page) {
        Ok(fragments) => Ok(SegmentedPage {
            version: page.version,
            folio: page.folio.clone(),
            fragments,
        }),
        Err(error) => Err(PageFailure {
            version: page.version,
            folio: page.folio.clone(),
            error,
        }),
    }
}

/// Merge segmented pages per version, union by identity and build every
/// entry. Output is sorted by identity.
pub fn assemble(pages: Vec<SegmentedPage>) -> Vec<Entry> {
    let mut per_version: Versioned<Vec<(String, Vec<EntryFragment>)>> = Versioned::default();
    for page in pages {
        per_version
            .get_mut(page.version)
            .push((page.folio, page.fragments));
    }
    let Versioned { tc, tcn, tl } = per_version;
    let merged = Versioned {
        tc: aggregate::merge_version(tc),
        tcn: aggregate::merge_version(tcn),
        tl: aggregate::merge_version(tl),
    };

    aggregate::union_versions(merged)
        .into_par_iter()
        .map(|(identity, fragments)| extract::build_entry(&identity, fragments))
        .collect()
}

/// Whole pipeline over already-read pages. A page none of whose blocks
/// parse is logged, left out and returned; other pages are unaffected.
pub fn build_manuscript(
    pages: &[RawPage],
    on_page: impl Fn() + Sync + Send,
) -> (Manuscript, Vec<PageFailure>) {
    let results: Vec<_> = pages
        .par_iter()
        .map(|page| {
            let result = process_page(page);
            on_page();
            result
        })
        .collect();

    let mut segmented = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(page) => segmented.push(page),
            Err(failure) => {
                error!(
                    version = %failure.version,
                    folio = %failure.folio,
                    "page skipped: {}",
                    failure.error
                );
                failures.push(failure);
            }
        }
    }

    let entries = assemble(segmented);
    info!(
        pages = pages.len(),
        failed = failures.len(),
        entries = entries.len(),
        "manuscript assembled"
    );
    (Manuscript::new(entries), failures)
}

// ── Tests ──

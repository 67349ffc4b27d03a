use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Context;
use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::PageError;
use crate::model::Version;
use crate::parser::aggregate::folio_key;
use crate::parser::segment::RawPage;

static PAGE_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(tc|tcn|tl)_p(\d{3}[rv])_preTEI\.xml$").unwrap());

/// `tl_p012v_preTEI.xml` → (tl, "012v").
pub fn parse_file_name(name: &str) -> Result<(Version, String), PageError> {
    let caps = PAGE_FILE_RE
        .captures(name)
        .ok_or_else(|| PageError::BadFileName(name.to_string()))?;
    let version = caps[1]
        .parse::<Version>()
        .map_err(|_| PageError::BadFileName(name.to_string()))?;
    Ok((version, caps[2].to_string()))
}

/// Page files of one version under `<data_dir>/<version>/`, in folio order.
pub fn discover(data_dir: &Path, version: Version) -> Vec<(String, PathBuf)> {
    let dir = data_dir.join(version.as_str());
    if !dir.is_dir() {
        warn!(dir = %dir.display(), "version directory not found");
        return Vec::new();
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(&dir).max_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("error accessing entry: {e}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        match parse_file_name(&name) {
            Ok((v, folio)) if v == version => found.push((folio, entry.path().to_path_buf())),
            Ok((v, _)) => warn!(file = %name, dir = %version, found = %v, "page filed under wrong version, skipped"),
            Err(e) => warn!("{e}, skipped"),
        }
    }
    found.sort_by_cached_key(|(folio, _)| folio_key(folio));
    debug!(%version, pages = found.len(), "pages discovered");
    found
}

/// Read every page of every version.
pub fn load_pages(data_dir: &Path) -> anyhow::Result<Vec<RawPage>> {
    let mut pages = Vec::new();
    for version in Version::ALL {
        for (folio, path) in discover(data_dir, version) {
            let source = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            pages.push(RawPage {
                version,
                folio,
                source,
            });
        }
    }
    Ok(pages)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names() {
        assert_eq!(parse_file_name("tcn_p162v_preTEI.xml").unwrap(), (Version::Tcn, "162v".to_string()));
        assert!(matches!(parse_file_name("tl_p1r_preTEI.xml"), Err(PageError::BadFileName(_))));
        assert!(parse_file_name("notes.txt").is_err());
    }

    #[test]
    fn fixture_directory() {
        let pages = load_pages(Path::new("tests/fixtures")).unwrap();
        assert_eq!(pages.len(), 6);
        let tl: Vec<_> = pages
            .iter()
            .filter(|p| p.version == Version::Tl)
            .map(|p| p.folio.as_str())
            .collect();
        assert_eq!(tl, ["001r", "001v"]);
    }

    #[test]
    fn stray_files_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let tl = dir.path().join("tl");
        std::fs::create_dir(&tl).unwrap();
        std::fs::write(tl.join("tl_p002r_preTEI.xml"), "<div id=\"a\"/>").unwrap();
        std::fs::write(tl.join("tl_p001v_preTEI.xml"), "<div id=\"b\"/>").unwrap();
        std::fs::write(tl.join("tc_p001r_preTEI.xml"), "<div id=\"c\"/>").unwrap();
        std::fs::write(tl.join("README.md"), "notes").unwrap();

        let found: Vec<_> = discover(dir.path(), Version::Tl)
            .into_iter()
            .map(|(folio, _)| folio)
            .collect();
        assert_eq!(found, ["001v", "002r"]);
        assert!(discover(dir.path(), Version::Tc).is_empty());
    }
}

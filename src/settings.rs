use std::path::{Path, PathBuf};

use anyhow::Context;
use config::Config;
use serde::Deserialize;

use crate::parser::extract::context::DEFAULT_WINDOW;

/// Optional settings file, read from the working directory.
pub const SETTINGS_FILE: &str = "manuscript.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Root holding one directory of page files per version.
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub context_window: usize,
    /// Verbatim → label table applied to extracted terms.
    pub thesaurus: Option<PathBuf>,
}

/// Defaults, then `manuscript.toml`, then `MS_*` environment variables.
pub fn load() -> anyhow::Result<Settings> {
    load_from(Path::new(SETTINGS_FILE))
}

pub fn load_from(file: &Path) -> anyhow::Result<Settings> {
    Config::builder()
        .set_default("data_dir", "data/ms-xml")?
        .set_default("db_path", "data/manuscript.sqlite")?
        .set_default("context_window", DEFAULT_WINDOW as i64)?
        .add_source(config::File::from(file).required(false))
        .add_source(config::Environment::with_prefix("MS").try_parsing(true))
        .build()
        .context("failed to load settings")?
        .try_deserialize()
        .context("invalid settings")
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let s = load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(s.data_dir, PathBuf::from("data/ms-xml"));
        assert_eq!(s.db_path, PathBuf::from("data/manuscript.sqlite"));
        assert_eq!(s.context_window, 10);
        assert!(s.thesaurus.is_none());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manuscript.toml");
        std::fs::write(&path, "context_window = 4\nthesaurus = \"data/thesaurus.json\"\n").unwrap();
        let s = load_from(&path).unwrap();
        assert_eq!(s.context_window, 4);
        assert_eq!(s.thesaurus, Some(PathBuf::from("data/thesaurus.json")));
        assert_eq!(s.data_dir, PathBuf::from("data/ms-xml"));
    }
}

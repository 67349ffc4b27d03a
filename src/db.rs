use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::model::{Entry, Property, Version};
use crate::parser::extract::context::ContextRow;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS runs (
            id           INTEGER PRIMARY KEY,
            started_at   TEXT NOT NULL,
            pages        INTEGER NOT NULL,
            failed_pages INTEGER NOT NULL,
            entries      INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS entries (
            identity    TEXT PRIMARY KEY,
            folio       TEXT NOT NULL,
            categories  TEXT NOT NULL,
            missing     TEXT NOT NULL,
            run_id      INTEGER REFERENCES runs(id),
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_entries_folio ON entries(folio);

        CREATE TABLE IF NOT EXISTS entry_versions (
            identity  TEXT NOT NULL REFERENCES entries(identity),
            version   TEXT NOT NULL CHECK(version IN ('tc','tcn','tl')),
            title     TEXT NOT NULL,
            text      TEXT NOT NULL,
            source    TEXT NOT NULL,
            length    INTEGER NOT NULL,
            balanced  BOOLEAN NOT NULL,
            PRIMARY KEY (identity, version)
        );

        CREATE TABLE IF NOT EXISTS properties (
            id        INTEGER PRIMARY KEY,
            identity  TEXT NOT NULL REFERENCES entries(identity),
            version   TEXT NOT NULL,
            property  TEXT NOT NULL,
            position  INTEGER NOT NULL,
            term      TEXT NOT NULL,
            UNIQUE(identity, version, property, position)
        );
        CREATE INDEX IF NOT EXISTS idx_properties_term ON properties(property, term);

        CREATE TABLE IF NOT EXISTS margins (
            id        INTEGER PRIMARY KEY,
            identity  TEXT NOT NULL REFERENCES entries(identity),
            version   TEXT NOT NULL,
            seq       INTEGER NOT NULL,
            position  TEXT NOT NULL,
            render    TEXT,
            text      TEXT NOT NULL,
            length    INTEGER NOT NULL,
            UNIQUE(identity, version, seq)
        );

        CREATE TABLE IF NOT EXISTS contexts (
            id          INTEGER PRIMARY KEY,
            identity    TEXT NOT NULL REFERENCES entries(identity),
            version     TEXT NOT NULL,
            seq         INTEGER NOT NULL,
            folio       TEXT NOT NULL,
            property    TEXT NOT NULL,
            term        TEXT NOT NULL,
            occurrence  INTEGER NOT NULL,
            before      TEXT NOT NULL,
            after       TEXT NOT NULL,
            located     BOOLEAN NOT NULL,
            reason      TEXT,
            ambiguous   BOOLEAN NOT NULL,
            UNIQUE(identity, version, property, seq)
        );
        CREATE INDEX IF NOT EXISTS idx_contexts_term ON contexts(property, term);
        ",
    )?;
    Ok(())
}

// ── Runs ──

pub fn start_run(conn: &Connection, pages: usize, failed_pages: usize) -> Result<i64> {
    conn.execute(
        "INSERT INTO runs (started_at, pages, failed_pages) VALUES (?1, ?2, ?3)",
        rusqlite::params![chrono::Utc::now().to_rfc3339(), pages, failed_pages],
    )?;
    Ok(conn.last_insert_rowid())
}

// ── Entries ──

/// Replace every stored row of the given entries. Returns entries written.
pub fn save_entries(conn: &Connection, run_id: i64, entries: &[Entry]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut clear_props = tx.prepare("DELETE FROM properties WHERE identity = ?1")?;
        let mut clear_margins = tx.prepare("DELETE FROM margins WHERE identity = ?1")?;
        let mut e_stmt = tx.prepare(
            "INSERT INTO entries (identity, folio, categories, missing, run_id)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(identity) DO UPDATE SET
                folio = excluded.folio,
                categories = excluded.categories,
                missing = excluded.missing,
                run_id = excluded.run_id,
                updated_at = datetime('now')",
        )?;
        let mut v_stmt = tx.prepare(
            "INSERT OR REPLACE INTO entry_versions
             (identity, version, title, text, source, length, balanced)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        let mut p_stmt = tx.prepare(
            "INSERT INTO properties (identity, version, property, position, term)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        let mut m_stmt = tx.prepare(
            "INSERT INTO margins (identity, version, seq, position, render, text, length)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;

        for e in entries {
            clear_props.execute([&e.identity])?;
            clear_margins.execute([&e.identity])?;

            let missing: Vec<&str> = e.missing.iter().map(|v| v.as_str()).collect();
            e_stmt.execute(rusqlite::params![
                e.identity,
                e.folio,
                e.categories.join(";"),
                missing.join(";"),
                run_id,
            ])?;

            for version in Version::ALL {
                let v = version.as_str();
                v_stmt.execute(rusqlite::params![
                    e.identity,
                    v,
                    e.title.get(version),
                    e.text.get(version),
                    e.source.get(version),
                    e.length.get(version),
                    e.balanced.get(version),
                ])?;
                for (property, terms) in e.properties.get(version) {
                    for (position, term) in terms.iter().enumerate() {
                        p_stmt.execute(rusqlite::params![e.identity, v, property.name(), position, term])?;
                    }
                }
                for (seq, m) in e.margins.get(version).iter().enumerate() {
                    m_stmt.execute(rusqlite::params![
                        e.identity,
                        v,
                        seq,
                        m.position.as_str(),
                        m.render,
                        m.text,
                        m.length,
                    ])?;
                }
            }
        }
        tx.execute(
            "UPDATE runs SET entries = ?1 WHERE id = ?2",
            rusqlite::params![entries.len(), run_id],
        )?;
    }
    tx.commit()?;
    Ok(entries.len())
}

pub fn stored_identities(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT identity FROM entries ORDER BY identity")?;
    let rows = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Contexts ──

/// Replace the context rows of every (identity, version, property) present
/// in `rows`. Stored rows of other properties are kept.
pub fn save_contexts(conn: &Connection, rows: &[ContextRow]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut clear =
            tx.prepare("DELETE FROM contexts WHERE identity = ?1 AND version = ?2 AND property = ?3")?;
        let mut stmt = tx.prepare(
            "INSERT INTO contexts
             (identity, version, seq, folio, property, term, occurrence, before, after, located, reason, ambiguous)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;

        let mut seqs: HashMap<(&str, Version, Property), usize> = HashMap::new();
        for r in rows {
            let key = (r.identity.as_str(), r.version, r.property);
            if !seqs.contains_key(&key) {
                clear.execute(rusqlite::params![r.identity, r.version.as_str(), r.property.name()])?;
            }
            let seq = seqs.entry(key).or_insert(0);
            count += stmt.execute(rusqlite::params![
                r.identity,
                r.version.as_str(),
                *seq,
                r.folio,
                r.property.name(),
                r.term,
                r.occurrence,
                r.before.join(" "),
                r.after.join(" "),
                r.located,
                r.reason,
                r.ambiguous,
            ])?;
            *seq += 1;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Overview ──

pub struct OverviewRow {
    pub identity: String,
    pub folio: String,
    pub title: String,
    pub categories: String,
    pub missing: String,
    pub length: usize,
    pub terms: usize,
    pub margins: usize,
}

/// Entries with their `tl` heading, ordered by folio then identity.
pub fn fetch_overview(conn: &Connection, category: Option<&str>, limit: usize) -> Result<Vec<OverviewRow>> {
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let where_clause = match category {
        Some(c) => {
            params.push(Box::new(c.to_string()));
            " WHERE (';' || e.categories || ';') LIKE ('%;' || ?1 || ';%')"
        }
        None => "",
    };

    let sql = format!(
        "SELECT e.identity, e.folio, COALESCE(v.title,''), e.categories, e.missing,
                COALESCE(v.length, 0),
                (SELECT COUNT(*) FROM properties p WHERE p.identity = e.identity AND p.version = 'tl'),
                (SELECT COUNT(*) FROM margins m WHERE m.identity = e.identity AND m.version = 'tl')
         FROM entries e
         LEFT JOIN entry_versions v ON v.identity = e.identity AND v.version = 'tl'{}
         ORDER BY e.folio, e.identity
         LIMIT {}",
        where_clause, limit
    );

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(OverviewRow {
                identity: row.get(0)?,
                folio: row.get(1)?,
                title: row.get(2)?,
                categories: row.get(3)?,
                missing: row.get(4)?,
                length: row.get(5)?,
                terms: row.get(6)?,
                margins: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub runs: usize,
    pub last_run: Option<String>,
    pub entries: usize,
    pub incomplete: usize,
    pub unbalanced: usize,
    pub terms: usize,
    pub margins: usize,
    pub contexts: usize,
    pub unlocated: usize,
    pub ambiguous: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    Ok(Stats {
        runs: count("SELECT COUNT(*) FROM runs")?,
        last_run: conn.query_row("SELECT MAX(started_at) FROM runs", [], |r| r.get(0))?,
        entries: count("SELECT COUNT(*) FROM entries")?,
        incomplete: count("SELECT COUNT(*) FROM entries WHERE missing != ''")?,
        unbalanced: count("SELECT COUNT(*) FROM entry_versions WHERE balanced = 0 AND source != ''")?,
        terms: count("SELECT COUNT(*) FROM properties")?,
        margins: count("SELECT COUNT(*) FROM margins")?,
        contexts: count("SELECT COUNT(*) FROM contexts")?,
        unlocated: count("SELECT COUNT(*) FROM contexts WHERE located = 0")?,
        ambiguous: count("SELECT COUNT(*) FROM contexts WHERE ambiguous = 1")?,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::build_manuscript;
    use crate::parser::extract::context::{scan_entry, ContextLocator};
    use crate::parser::segment::RawPage;

    fn entries() -> Vec<Entry> {
        let pages = vec![
            RawPage {
                version: Version::Tl,
                folio: "002r".to_string(),
                source: r#"<div id="p002r_1" categories="casting;metal process"><head>Molds</head>
                    <ab><m>plaster</m> and <m>sand</m></ab><ab margin="top">good</ab></div>
                    <div id="p002r_2" categories="painting"><ab><m>ochre</m></ab></div>"#
                    .to_string(),
            },
            RawPage {
                version: Version::Tc,
                folio: "002r".to_string(),
                source: r#"<div id="p002r_1"><ab><m>plastre</m> et <m>sable</m></ab></div>"#.to_string(),
            },
        ];
        build_manuscript(&pages, || {}).0.entries().to_vec()
    }

    fn open() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = connect(&dir.path().join("db/test.sqlite")).unwrap();
        init_schema(&conn).unwrap();
        (dir, conn)
    }

    #[test]
    fn entries_round_trip() {
        let (_dir, conn) = open();
        let entries = entries();
        let run = start_run(&conn, 2, 0).unwrap();
        assert_eq!(save_entries(&conn, run, &entries).unwrap(), 2);

        let rows = fetch_overview(&conn, None, 50).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].identity, "p002r_1");
        assert_eq!(rows[0].title, "Molds");
        assert_eq!(rows[0].terms, 2);
        assert_eq!(rows[0].margins, 1);
        assert_eq!(rows[1].missing, "tc;tcn");

        let painting = fetch_overview(&conn, Some("painting"), 50).unwrap();
        assert_eq!(painting.len(), 1);
        assert_eq!(painting[0].identity, "p002r_2");
        assert!(fetch_overview(&conn, Some("metal"), 50).unwrap().is_empty());
    }

    #[test]
    fn rebuild_replaces_rows() {
        let (_dir, conn) = open();
        let entries = entries();
        for _ in 0..2 {
            let run = start_run(&conn, 2, 0).unwrap();
            save_entries(&conn, run, &entries).unwrap();
        }
        let s = get_stats(&conn).unwrap();
        assert_eq!(s.runs, 2);
        assert!(s.last_run.is_some());
        assert_eq!(s.entries, 2);
        assert_eq!(s.incomplete, 2);
        assert_eq!(s.unbalanced, 0);
        assert_eq!(s.terms, 5);
        assert_eq!(s.margins, 1);
    }

    #[test]
    fn contexts_saved() {
        let (_dir, conn) = open();
        let entries = entries();
        let run = start_run(&conn, 2, 0).unwrap();
        save_entries(&conn, run, &entries).unwrap();

        let locator = ContextLocator::for_version(Version::Tl, 10);
        let rows: Vec<_> = entries
            .iter()
            .flat_map(|e| scan_entry(e, &locator, &[Property::Material]))
            .collect();
        assert_eq!(save_contexts(&conn, &rows).unwrap(), 3);
        assert_eq!(save_contexts(&conn, &rows).unwrap(), 3);

        let s = get_stats(&conn).unwrap();
        assert_eq!(s.contexts, 3);
        assert_eq!(s.unlocated, 0);
        let after: String = conn
            .query_row(
                "SELECT after FROM contexts WHERE term = 'plaster'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(after, "and sand");
    }

    #[test]
    fn contexts_of_other_properties_survive_a_rescan() {
        let (_dir, conn) = open();
        let entries = entries();
        let run = start_run(&conn, 2, 0).unwrap();
        save_entries(&conn, run, &entries).unwrap();

        let locator = ContextLocator::for_version(Version::Tl, 10);
        let materials: Vec<_> = entries
            .iter()
            .flat_map(|e| scan_entry(e, &locator, &[Property::Material]))
            .collect();
        let plants: Vec<_> = materials
            .iter()
            .take(2)
            .cloned()
            .map(|mut r| {
                r.property = Property::Plant;
                r
            })
            .collect();

        save_contexts(&conn, &materials).unwrap();
        save_contexts(&conn, &plants).unwrap();
        assert_eq!(get_stats(&conn).unwrap().contexts, 5);

        save_contexts(&conn, &materials).unwrap();
        assert_eq!(get_stats(&conn).unwrap().contexts, 5);
        let stored_plants: usize = conn
            .query_row(
                "SELECT COUNT(*) FROM contexts WHERE property = 'plant'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(stored_plants, 2);
    }
}

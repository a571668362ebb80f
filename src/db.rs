use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::normalize;

const DB_FILE: &str = "optcg.db";

// ── Rows ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Series {
    pub series_id: String,
    pub series_name: String,
}

/// One scraped image of a card. Alternate arts share `card_id` and differ by `img_src`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawCardFace {
    pub card_id: String,
    pub card_name: String,
    pub card_species: String,
    pub card_type: String,
    pub img_src: String,
    pub cost: i64,
    pub attribute: String,
    pub power: i64,
    pub counter: i64,
    pub color: String,
    pub feature: String,
    pub effect: String,
    pub get_info: String,
    pub series_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalCard {
    pub cid: i64,
    pub card_id: String,
    pub card_name: String,
    pub card_species: String,
    pub card_type: String,
    pub cost: i64,
    pub attribute: String,
    pub power: i64,
    pub counter: i64,
    pub color: String,
    pub feature: String,
    pub effect: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageVariant {
    pub cid: i64,
    pub img_src: String,
    pub get_info: String,
    pub series_id: String,
    pub is_diff: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub cid: i64,
    pub img_src: String,
    pub series_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeSummary {
    pub raw_faces: usize,
    pub cards: usize,
    pub images: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub series: usize,
    pub cards: usize,
    pub images: usize,
    pub alternate_arts: usize,
    pub files: usize,
}

// ── Handle ──

/// SQLite store. Every call opens its own connection and closes it on return.
///
/// Storage failures never escape: they are logged as `<op> : <error>` and the
/// call returns an empty or zero result.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Database { path: path.into() }
    }

    /// `<dir>/optcg.db`
    pub fn in_dir(dir: &Path) -> Self {
        Database::new(dir.join(DB_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the database directory if present and recreate it empty.
    pub fn reset(&self) -> Result<()> {
        let Some(dir) = self.path.parent() else {
            return Ok(());
        };
        if dir.exists() {
            fs::remove_dir_all(dir).with_context(|| format!("Failed to remove {:?}", dir))?;
            info!("Removed {:?}", dir);
        }
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
        Ok(())
    }

    fn connect(&self) -> Result<Connection> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(&self.path)
            .with_context(|| format!("Failed to open {:?}", self.path))?;
        Ok(conn)
    }

    pub fn save_series(&self, series: &[Series]) -> usize {
        logged("save_series", self.try_save_series(series))
    }

    pub fn load_series(&self) -> BTreeMap<String, String> {
        logged("load_series", self.try_load_series())
    }

    pub fn save_raw_cards(&self, cards: &[RawCardFace]) -> usize {
        logged("save_raw_cards", self.try_save_raw_cards(cards))
    }

    /// Drop the card, image and file tables so the next scrape rebuilds them from scratch.
    pub fn clear_cards(&self) {
        logged("clear_cards", self.try_clear_cards())
    }

    pub fn normalize(&self) -> NormalizeSummary {
        logged("normalize", self.try_normalize())
    }

    pub fn fetch_download_tasks(&self) -> Vec<DownloadTask> {
        logged("fetch_download_tasks", self.try_fetch_download_tasks())
    }

    pub fn record_download(&self, cid: i64, file_path: &Path) {
        logged("record_download", self.try_record_download(cid, file_path))
    }

    pub fn stats(&self) -> Stats {
        logged("stats", self.try_stats())
    }

    #[cfg(test)]
    pub fn canonical_cards(&self) -> Vec<CanonicalCard> {
        logged("canonical_cards", self.try_canonical_cards())
    }

    #[cfg(test)]
    pub fn image_variants(&self) -> Vec<ImageVariant> {
        logged("image_variants", self.try_image_variants())
    }

    // ── Series ──

    fn try_save_series(&self, series: &[Series]) -> Result<usize> {
        let conn = self.connect()?;
        create_series_table(&conn)?;
        let tx = conn.unchecked_transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO series_cardlist (series_id, series_name) VALUES (?1, ?2)",
            )?;
            for s in series {
                count += stmt.execute(params![s.series_id, s.series_name])?;
            }
        }
        tx.commit()?;
        Ok(count)
    }

    fn try_load_series(&self) -> Result<BTreeMap<String, String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT series_id, series_name FROM series_cardlist")?;
        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let name: String = row.get(1)?;
                Ok((name, id))
            })?
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(rows)
    }

    // ── Raw cards ──

    fn try_save_raw_cards(&self, cards: &[RawCardFace]) -> Result<usize> {
        let conn = self.connect()?;
        create_raw_cards_table(&conn)?;
        let tx = conn.unchecked_transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO cards_info
                 (card_id, card_name, card_species, card_type, img_src, cost, attribute,
                  power, counter, color, feature, effect, get_info, series_id)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
            )?;
            for c in cards {
                count += stmt.execute(params![
                    c.card_id, c.card_name, c.card_species, c.card_type, c.img_src, c.cost,
                    c.attribute, c.power, c.counter, c.color, c.feature, c.effect, c.get_info,
                    c.series_id,
                ])?;
            }
        }
        tx.commit()?;
        Ok(count)
    }

    fn try_clear_cards(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            "DROP TABLE IF EXISTS cards_info;
             DROP TABLE IF EXISTS cards_image_info;
             DROP TABLE IF EXISTS files_info;",
        )?;
        Ok(())
    }

    // ── Normalization ──

    fn try_normalize(&self) -> Result<NormalizeSummary> {
        let mut conn = self.connect()?;
        create_raw_cards_table(&conn)?;
        if !has_column(&conn, "cards_info", "img_src")? {
            warn!("cards_info is already normalized, skipping");
            return Ok(NormalizeSummary::default());
        }

        let tx = conn.transaction()?;
        let raw = {
            let mut stmt = tx.prepare(
                "SELECT card_id, card_name, card_species, card_type, img_src, cost, attribute,
                        power, counter, color, feature, effect, get_info, series_id
                 FROM cards_info ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(RawCardFace {
                        card_id: row.get(0)?,
                        card_name: row.get(1)?,
                        card_species: row.get(2)?,
                        card_type: row.get(3)?,
                        img_src: row.get(4)?,
                        cost: row.get(5)?,
                        attribute: row.get(6)?,
                        power: row.get(7)?,
                        counter: row.get(8)?,
                        color: row.get(9)?,
                        feature: row.get(10)?,
                        effect: row.get(11)?,
                        get_info: row.get(12)?,
                        series_id: row.get(13)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let normalized = normalize::normalize(&raw);

        tx.execute_batch(
            "
            DROP TABLE IF EXISTS new_cards_info;
            CREATE TABLE new_cards_info (
                cid          INTEGER PRIMARY KEY,
                card_id      TEXT,
                card_name    TEXT,
                card_species TEXT,
                card_type    TEXT,
                cost         INT,
                attribute    TEXT,
                power        INT,
                counter      INT,
                color        TEXT,
                feature      TEXT,
                effect       TEXT
            );
            DROP TABLE IF EXISTS cards_image_info;
            CREATE TABLE cards_image_info (
                cid      INTEGER,
                img_src  TEXT,
                get_info TEXT,
                series_id TEXT,
                is_diff  INTEGER
            );
            ",
        )?;
        {
            let mut c_stmt = tx.prepare(
                "INSERT INTO new_cards_info
                 (cid, card_id, card_name, card_species, card_type, cost, attribute,
                  power, counter, color, feature, effect)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            )?;
            for c in &normalized.cards {
                c_stmt.execute(params![
                    c.cid, c.card_id, c.card_name, c.card_species, c.card_type, c.cost,
                    c.attribute, c.power, c.counter, c.color, c.feature, c.effect,
                ])?;
            }

            let mut i_stmt = tx.prepare(
                "INSERT INTO cards_image_info (cid, img_src, get_info, series_id, is_diff)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for i in &normalized.images {
                i_stmt.execute(params![i.cid, i.img_src, i.get_info, i.series_id, i.is_diff])?;
            }
        }
        tx.execute_batch(
            "DROP TABLE cards_info;
             ALTER TABLE new_cards_info RENAME TO cards_info;",
        )?;
        tx.commit()?;

        Ok(NormalizeSummary {
            raw_faces: raw.len(),
            cards: normalized.cards.len(),
            images: normalized.images.len(),
        })
    }

    #[cfg(test)]
    fn try_canonical_cards(&self) -> Result<Vec<CanonicalCard>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT cid, card_id, card_name, card_species, card_type, cost, attribute,
                    power, counter, color, feature, effect
             FROM cards_info ORDER BY cid",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CanonicalCard {
                    cid: row.get(0)?,
                    card_id: row.get(1)?,
                    card_name: row.get(2)?,
                    card_species: row.get(3)?,
                    card_type: row.get(4)?,
                    cost: row.get(5)?,
                    attribute: row.get(6)?,
                    power: row.get(7)?,
                    counter: row.get(8)?,
                    color: row.get(9)?,
                    feature: row.get(10)?,
                    effect: row.get(11)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    #[cfg(test)]
    fn try_image_variants(&self) -> Result<Vec<ImageVariant>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT cid, img_src, get_info, series_id, is_diff
             FROM cards_image_info ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ImageVariant {
                    cid: row.get(0)?,
                    img_src: row.get(1)?,
                    get_info: row.get(2)?,
                    series_id: row.get(3)?,
                    is_diff: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Downloads ──

    fn try_fetch_download_tasks(&self) -> Result<Vec<DownloadTask>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT ci.cid, cii.img_src, sc.series_name
             FROM cards_image_info cii
             INNER JOIN cards_info ci ON ci.cid = cii.cid
             INNER JOIN series_cardlist sc ON cii.series_id = sc.series_id
             ORDER BY sc.series_name, sc.series_id, cii.rowid",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(DownloadTask {
                    cid: row.get(0)?,
                    img_src: row.get(1)?,
                    series_name: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn try_record_download(&self, cid: i64, file_path: &Path) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS files_info (
                cid       INTEGER,
                file_path TEXT
            )",
            [],
        )?;
        conn.execute(
            "INSERT INTO files_info (cid, file_path) VALUES (?1, ?2)",
            params![cid, file_path.to_string_lossy().into_owned()],
        )?;
        Ok(())
    }

    // ── Stats ──

    fn try_stats(&self) -> Result<Stats> {
        let conn = self.connect()?;
        Ok(Stats {
            series: count(&conn, "series_cardlist", None)?,
            cards: count(&conn, "cards_info", None)?,
            images: count(&conn, "cards_image_info", None)?,
            alternate_arts: count(&conn, "cards_image_info", Some("is_diff = 1"))?,
            files: count(&conn, "files_info", None)?,
        })
    }
}

fn logged<T: Default>(op: &str, result: Result<T>) -> T {
    result.unwrap_or_else(|e| {
        error!("{} : {:#}", op, e);
        T::default()
    })
}

fn create_series_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS series_cardlist (
            series_id   TEXT PRIMARY KEY,
            series_name TEXT
        )",
        [],
    )?;
    Ok(())
}

fn create_raw_cards_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cards_info (
            cid          INTEGER PRIMARY KEY AUTOINCREMENT,
            card_id      TEXT,
            card_name    TEXT,
            card_species TEXT,
            card_type    TEXT,
            img_src      TEXT,
            cost         INT,
            attribute    TEXT,
            power        INT,
            counter      INT,
            color        TEXT,
            feature      TEXT,
            effect       TEXT,
            get_info     TEXT,
            series_id    TEXT
        )",
        [],
    )?;
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        [table, column],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

/// Row count, treating a missing table as empty.
fn count(conn: &Connection, table: &str, filter: Option<&str>) -> Result<usize> {
    if !table_exists(conn, table)? {
        return Ok(0);
    }
    let sql = match filter {
        Some(f) => format!("SELECT COUNT(*) FROM {} WHERE {}", table, f),
        None => format!("SELECT COUNT(*) FROM {}", table),
    };
    let n: usize = conn.query_row(&sql, [], |r| r.get(0))?;
    Ok(n)
}

// ── Tests ──

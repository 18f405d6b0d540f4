//! Façade over the embedded SQL engine: schema, item/chunk CRUD, full-text
//! search, health, and the feedback/interaction tables (§4.9).

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::types::{
    Feedback, FeedbackAction, Frequency, FtsHit, Interaction, Item, ItemKind, MatchType, Sensitivity,
};

pub struct FtsStore {
    conn: Connection,
}

#[derive(Debug, Clone, Default)]
pub struct HealthReport {
    pub is_healthy: bool,
    pub total_indexed_items: i64,
    pub total_chunks: i64,
    pub total_failures: i64,
    pub last_index_time: Option<f64>,
    pub index_age_secs: Option<f64>,
    pub fts_index_size: i64,
    pub items_without_content: i64,
}

impl FtsStore {
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open(path: &std::path::Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                ext TEXT NOT NULL,
                kind TEXT NOT NULL,
                size INTEGER NOT NULL,
                created_at REAL NOT NULL,
                modified_at REAL NOT NULL,
                indexed_at REAL NOT NULL,
                content_hash TEXT NOT NULL DEFAULT '',
                sensitivity TEXT NOT NULL DEFAULT 'normal',
                pinned INTEGER NOT NULL DEFAULT 0,
                parent_path TEXT NOT NULL DEFAULT ''
            );
            CREATE INDEX IF NOT EXISTS idx_items_parent ON items(parent_path);

            CREATE VIRTUAL TABLE IF NOT EXISTS search_index_fts USING fts5(
                path, name, content, tokenize='porter'
            );

            CREATE TABLE IF NOT EXISTS chunk_meta (
                chunk_id TEXT PRIMARY KEY,
                item_id INTEGER NOT NULL,
                chunk_index INTEGER NOT NULL,
                byte_offset INTEGER NOT NULL,
                fts_rowid INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chunk_meta_item ON chunk_meta(item_id);

            CREATE TABLE IF NOT EXISTS failures (
                item_id INTEGER PRIMARY KEY,
                stage TEXT NOT NULL,
                message TEXT NOT NULL,
                timestamp REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS frequency (
                item_id INTEGER PRIMARY KEY,
                open_count INTEGER NOT NULL DEFAULT 0,
                last_opened_at REAL NOT NULL DEFAULT 0,
                total_interactions INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS interactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                normalized_query TEXT NOT NULL,
                item_id INTEGER NOT NULL,
                path TEXT NOT NULL,
                match_type TEXT NOT NULL,
                result_position INTEGER NOT NULL,
                frontmost_app TEXT,
                timestamp REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_interactions_query_item ON interactions(normalized_query, item_id);

            CREATE TABLE IF NOT EXISTS feedback (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_id INTEGER NOT NULL,
                action TEXT NOT NULL,
                query TEXT NOT NULL,
                timestamp REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn upsert_item(
        &self,
        path: &str,
        name: &str,
        ext: &str,
        kind: ItemKind,
        size: u64,
        created_at: f64,
        modified_at: f64,
        existing_hash: &str,
        sensitivity: Sensitivity,
        parent_path: &str,
        now: f64,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO items (path, name, ext, kind, size, created_at, modified_at, indexed_at, content_hash, sensitivity, pinned, parent_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, ?11)
             ON CONFLICT(path) DO UPDATE SET
                name=excluded.name, ext=excluded.ext, kind=excluded.kind, size=excluded.size,
                created_at=excluded.created_at, modified_at=excluded.modified_at, indexed_at=excluded.indexed_at,
                parent_path=excluded.parent_path",
            params![path, name, ext, kind.as_str(), size as i64, created_at, modified_at, now, existing_hash, sensitivity.as_str(), parent_path],
        )?;
        let id: i64 = self.conn.query_row("SELECT id FROM items WHERE path = ?1", params![path], |r| r.get(0))?;
        Ok(id)
    }

    pub fn delete_item_by_path(&self, path: &str) -> Result<()> {
        let id: Option<i64> =
            self.conn.query_row("SELECT id FROM items WHERE path = ?1", params![path], |r| r.get(0)).optional()?;
        if let Some(item_id) = id {
            self.delete_chunks_for_item(item_id, path)?;
            self.conn.execute("DELETE FROM failures WHERE item_id = ?1", params![item_id])?;
            self.conn.execute("DELETE FROM frequency WHERE item_id = ?1", params![item_id])?;
            self.conn.execute("DELETE FROM items WHERE id = ?1", params![item_id])?;
        }
        Ok(())
    }

    pub fn insert_chunks(&self, item_id: i64, name: &str, path: &str, chunks: &[(String, usize, String)]) -> Result<()> {
        self.delete_chunks_for_item(item_id, path)?;
        for (chunk_id, index, content) in chunks {
            self.conn.execute(
                "INSERT INTO search_index_fts (rowid, path, name, content) VALUES (NULL, ?1, ?2, ?3)",
                params![path, name, content],
            )?;
            let fts_rowid = self.conn.last_insert_rowid();
            self.conn.execute(
                "INSERT INTO chunk_meta (chunk_id, item_id, chunk_index, byte_offset, fts_rowid) VALUES (?1, ?2, ?3, 0, ?4)",
                params![chunk_id, item_id, *index as i64, fts_rowid],
            )?;
        }
        Ok(())
    }

    pub fn delete_chunks_for_item(&self, item_id: i64, _path: &str) -> Result<()> {
        let rowids: Vec<i64> = {
            let mut stmt = self.conn.prepare("SELECT fts_rowid FROM chunk_meta WHERE item_id = ?1")?;
            let rows = stmt.query_map(params![item_id], |r| r.get(0))?;
            rows.collect::<std::result::Result<Vec<i64>, _>>()?
        };
        for rowid in rowids {
            self.conn.execute("DELETE FROM search_index_fts WHERE rowid = ?1", params![rowid])?;
        }
        self.conn.execute("DELETE FROM chunk_meta WHERE item_id = ?1", params![item_id])?;
        Ok(())
    }

    pub fn update_content_hash(&self, item_id: i64, hash: &str) -> Result<()> {
        self.conn.execute("UPDATE items SET content_hash = ?1 WHERE id = ?2", params![hash, item_id])?;
        Ok(())
    }

    pub fn record_failure(&self, item_id: i64, stage: &str, message: &str, now: f64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO failures (item_id, stage, message, timestamp) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(item_id) DO UPDATE SET stage=excluded.stage, message=excluded.message, timestamp=excluded.timestamp",
            params![item_id, stage, message, now],
        )?;
        Ok(())
    }

    pub fn clear_failures(&self, item_id: i64) -> Result<()> {
        self.conn.execute("DELETE FROM failures WHERE item_id = ?1", params![item_id])?;
        Ok(())
    }

    /// Strict: pass the query verbatim to the FTS virtual table. Relaxed:
    /// split into tokens, append `*` to each, OR them together.
    pub fn search_fts5(&self, query: &str, limit: usize, relaxed: bool) -> Result<Vec<FtsHit>> {
        let match_expr = if relaxed {
            query
                .split_whitespace()
                .map(|t| format!("{}*", t.replace(['"', '\''], "")))
                .collect::<Vec<_>>()
                .join(" OR ")
        } else {
            query.to_string()
        };

        if match_expr.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            "SELECT rowid, path, bm25(search_index_fts), snippet(search_index_fts, 2, '<b>', '</b>', '...', 12)
             FROM search_index_fts WHERE search_index_fts MATCH ?1 ORDER BY bm25(search_index_fts) LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![match_expr, limit as i64], |row| {
            let fts_rowid: i64 = row.get(0)?;
            let bm25: f64 = row.get(2)?;
            let snippet: String = row.get(3)?;
            Ok((fts_rowid, bm25, snippet))
        })?;

        let mut hits = Vec::new();
        for row in rows {
            let (fts_rowid, bm25, snippet) = row?;
            let item_id: Option<i64> = self
                .conn
                .query_row("SELECT item_id FROM chunk_meta WHERE fts_rowid = ?1", params![fts_rowid], |r| r.get(0))
                .optional()?;
            if let Some(item_id) = item_id {
                hits.push(FtsHit { item_id, bm25_score: bm25, snippet });
            }
        }
        Ok(hits)
    }

    pub fn search_by_name_fuzzy(&self, q: &str, limit: usize) -> Result<Vec<(i64, String)>> {
        let pattern = format!("%{}%", q.to_lowercase());
        let mut stmt = self.conn.prepare("SELECT id, name FROM items WHERE lower(name) LIKE ?1 LIMIT ?2")?;
        let rows = stmt.query_map(params![pattern, limit as i64], |r| Ok((r.get(0)?, r.get(1)?)))?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn get_item_by_path(&self, path: &str) -> Result<Option<Item>> {
        self.conn
            .query_row("SELECT * FROM items WHERE path = ?1", params![path], Self::row_to_item)
            .optional()
            .map_err(Into::into)
    }

    pub fn get_item_by_id(&self, id: i64) -> Result<Option<Item>> {
        self.conn.query_row("SELECT * FROM items WHERE id = ?1", params![id], Self::row_to_item).optional().map_err(Into::into)
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<Item> {
        Ok(Item {
            id: row.get("id")?,
            path: row.get("path")?,
            name: row.get("name")?,
            ext: row.get("ext")?,
            kind: ItemKind::from_str(&row.get::<_, String>("kind")?),
            size: row.get::<_, i64>("size")? as u64,
            created_at: row.get("created_at")?,
            modified_at: row.get("modified_at")?,
            indexed_at: row.get("indexed_at")?,
            content_hash: row.get("content_hash")?,
            sensitivity: Sensitivity::from_str(&row.get::<_, String>("sensitivity")?),
            pinned: row.get::<_, i64>("pinned")? != 0,
            parent_path: row.get("parent_path")?,
        })
    }

    pub fn get_frequency(&self, item_id: i64) -> Result<Frequency> {
        self.conn
            .query_row(
                "SELECT item_id, open_count, last_opened_at, total_interactions FROM frequency WHERE item_id = ?1",
                params![item_id],
                |r| {
                    Ok(Frequency {
                        item_id: r.get(0)?,
                        open_count: r.get::<_, i64>(1)? as u64,
                        last_opened_at: r.get(2)?,
                        total_interactions: r.get::<_, i64>(3)? as u64,
                    })
                },
            )
            .optional()
            .map(|f| f.unwrap_or(Frequency { item_id, ..Default::default() }))
            .map_err(Into::into)
    }

    pub fn get_health(&self, now: f64) -> Result<HealthReport> {
        let total_indexed_items: i64 = self.conn.query_row("SELECT COUNT(*) FROM items", [], |r| r.get(0))?;
        let total_chunks: i64 = self.conn.query_row("SELECT COUNT(*) FROM chunk_meta", [], |r| r.get(0))?;
        let total_failures: i64 = self.conn.query_row("SELECT COUNT(*) FROM failures", [], |r| r.get(0))?;
        let last_index_time: Option<f64> = self.conn.query_row("SELECT MAX(indexed_at) FROM items", [], |r| r.get(0)).unwrap_or(None);
        let fts_index_size: i64 = self.conn.query_row("SELECT COUNT(*) FROM search_index_fts", [], |r| r.get(0))?;
        let items_without_content: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM items i WHERE NOT EXISTS (SELECT 1 FROM chunk_meta c WHERE c.item_id = i.id)",
            [],
            |r| r.get(0),
        )?;

        Ok(HealthReport {
            is_healthy: true,
            total_indexed_items,
            total_chunks,
            total_failures,
            last_index_time,
            index_age_secs: last_index_time.map(|t| (now - t).max(0.0)),
            fts_index_size,
            items_without_content,
        })
    }

    pub fn begin_transaction(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    pub fn commit_transaction(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    pub fn delete_all(&self) -> Result<()> {
        self.conn.execute_batch(
            "DELETE FROM items; DELETE FROM search_index_fts; DELETE FROM chunk_meta;
             DELETE FROM failures; DELETE FROM frequency;",
        )?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.conn.query_row("SELECT value FROM settings WHERE key = ?1", params![key], |r| r.get(0)).optional().map_err(Into::into)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn record_interaction(&self, interaction: &Interaction) -> Result<()> {
        self.conn.execute(
            "INSERT INTO interactions (normalized_query, item_id, path, match_type, result_position, frontmost_app, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                interaction.normalized_query,
                interaction.item_id,
                interaction.path,
                interaction.match_type.as_str(),
                interaction.result_position as i64,
                interaction.frontmost_app,
                interaction.timestamp
            ],
        )?;
        Ok(())
    }

    pub fn record_feedback(&self, feedback: &Feedback) -> Result<()> {
        self.conn.execute(
            "INSERT INTO feedback (item_id, action, query, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![feedback.item_id, feedback.action.as_str(), feedback.query, feedback.timestamp],
        )?;
        Ok(())
    }

    pub fn recent_interactions(&self, limit: usize) -> Result<Vec<Interaction>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, normalized_query, item_id, path, match_type, result_position, frontmost_app, timestamp
             FROM interactions ORDER BY timestamp DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], Self::row_to_interaction)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    fn row_to_interaction(row: &rusqlite::Row) -> rusqlite::Result<Interaction> {
        let match_type_str: String = row.get(4)?;
        Ok(Interaction {
            id: row.get(0)?,
            normalized_query: row.get(1)?,
            item_id: row.get(2)?,
            path: row.get(3)?,
            match_type: match match_type_str.as_str() {
                "exact_name" => MatchType::ExactName,
                "prefix_name" => MatchType::PrefixName,
                "contains_name" => MatchType::ContainsName,
                "exact_path" => MatchType::ExactPath,
                "prefix_path" => MatchType::PrefixPath,
                "fuzzy" => MatchType::Fuzzy,
                _ => MatchType::Content,
            },
            result_position: row.get::<_, i64>(5)? as usize,
            frontmost_app: row.get(6)?,
            timestamp: row.get(7)?,
        })
    }

    pub fn prune_interactions(&self, cutoff: f64) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM interactions WHERE timestamp < ?1", params![cutoff])?)
    }

    pub fn prune_feedback(&self, cutoff: f64) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM feedback WHERE timestamp < ?1", params![cutoff])?)
    }

    pub fn export_interaction_data(&self) -> Result<Vec<Interaction>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, normalized_query, item_id, path, match_type, result_position, frontmost_app, timestamp FROM interactions ORDER BY id",
        )?;
        let rows = stmt.query_map([], Self::row_to_interaction)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn opens_by_parent_dir(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT i.parent_path, COUNT(*) FROM feedback f JOIN items i ON i.id = f.item_id
             WHERE f.action = 'open' GROUP BY i.parent_path",
        )?;
        let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn opens_by_extension(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT i.ext, COUNT(*) FROM feedback f JOIN items i ON i.id = f.item_id
             WHERE f.action = 'open' GROUP BY i.ext",
        )?;
        let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn recompute_frequency(&self) -> Result<()> {
        self.conn.execute_batch(
            "DELETE FROM frequency;
             INSERT INTO frequency (item_id, open_count, last_opened_at, total_interactions)
             SELECT f.item_id, COUNT(*), MAX(f.timestamp), COALESCE((SELECT COUNT(*) FROM interactions i WHERE i.item_id = f.item_id), 0)
             FROM feedback f WHERE f.action = 'open' GROUP BY f.item_id;",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> FtsStore {
        FtsStore::open_in_memory().unwrap()
    }

    #[test]
    fn upsert_and_fetch_item_roundtrips() {
        let s = store();
        let id = s.upsert_item("/a/b.txt", "b.txt", "txt", ItemKind::Text, 100, 1.0, 2.0, "", Sensitivity::Normal, "/a", 3.0).unwrap();
        let item = s.get_item_by_id(id).unwrap().unwrap();
        assert_eq!(item.path, "/a/b.txt");
        assert_eq!(item.size, 100);
    }

    #[test]
    fn insert_chunks_and_search() {
        let s = store();
        let id = s.upsert_item("/a/report.txt", "report.txt", "txt", ItemKind::Text, 10, 1.0, 2.0, "", Sensitivity::Normal, "/a", 3.0).unwrap();
        s.insert_chunks(id, "report.txt", "/a/report.txt", &[("c0".into(), 0, "quarterly financial report".into())]).unwrap();

        let hits = s.search_fts5("financial", 10, false).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item_id, id);
        assert!(hits[0].bm25_score <= 0.0);
    }

    #[test]
    fn delete_item_cascades_chunks() {
        let s = store();
        let id = s.upsert_item("/a/x.txt", "x.txt", "txt", ItemKind::Text, 10, 1.0, 2.0, "", Sensitivity::Normal, "/a", 3.0).unwrap();
        s.insert_chunks(id, "x.txt", "/a/x.txt", &[("c0".into(), 0, "content here".into())]).unwrap();
        s.delete_item_by_path("/a/x.txt").unwrap();

        assert!(s.get_item_by_path("/a/x.txt").unwrap().is_none());
        assert!(s.search_fts5("content", 10, false).unwrap().is_empty());
    }

    #[test]
    fn relaxed_search_tokenizes_and_ors() {
        let s = store();
        let id = s.upsert_item("/a/y.txt", "y.txt", "txt", ItemKind::Text, 10, 1.0, 2.0, "", Sensitivity::Normal, "/a", 3.0).unwrap();
        s.insert_chunks(id, "y.txt", "/a/y.txt", &[("c0".into(), 0, "budget spreadsheet numbers".into())]).unwrap();

        let hits = s.search_fts5("budg numb", 10, true).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn interaction_and_feedback_round_trip() {
        let s = store();
        let id = s.upsert_item("/a/z.txt", "z.txt", "txt", ItemKind::Text, 10, 1.0, 2.0, "", Sensitivity::Normal, "/a", 3.0).unwrap();

        s.record_interaction(&Interaction {
            id: 0,
            normalized_query: "report".into(),
            item_id: id,
            path: "/a/z.txt".into(),
            match_type: MatchType::ExactName,
            result_position: 0,
            frontmost_app: None,
            timestamp: 10.0,
        })
        .unwrap();
        s.record_feedback(&Feedback { id: 0, item_id: id, action: FeedbackAction::Open, query: "report".into(), timestamp: 10.0 }).unwrap();

        assert_eq!(s.recent_interactions(10).unwrap().len(), 1);
        s.recompute_frequency().unwrap();
        let freq = s.get_frequency(id).unwrap();
        assert_eq!(freq.open_count, 1);
    }

    #[test]
    fn prune_removes_old_rows() {
        let s = store();
        let id = s.upsert_item("/a/w.txt", "w.txt", "txt", ItemKind::Text, 10, 1.0, 2.0, "", Sensitivity::Normal, "/a", 3.0).unwrap();
        s.record_interaction(&Interaction {
            id: 0,
            normalized_query: "old".into(),
            item_id: id,
            path: "/a/w.txt".into(),
            match_type: MatchType::ExactName,
            result_position: 0,
            frontmost_app: None,
            timestamp: 1.0,
        })
        .unwrap();
        let pruned = s.prune_interactions(5.0).unwrap();
        assert_eq!(pruned, 1);
        assert!(s.recent_interactions(10).unwrap().is_empty());
    }
}

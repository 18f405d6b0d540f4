//! SQL-backed mapping between items and vector-index labels, scoped by
//! embedding generation (§4.11).

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::types::{GenerationLifecycle, GenerationState, VectorMapping, VectorMappingState};

pub struct VectorStore<'a> {
    conn: &'a Connection,
}

impl<'a> VectorStore<'a> {
    pub fn new(conn: &'a Connection) -> Result<Self> {
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS vector_map (
                item_id INTEGER NOT NULL,
                hnsw_label INTEGER NOT NULL,
                model_id TEXT NOT NULL,
                generation_id TEXT NOT NULL,
                dimensions INTEGER NOT NULL,
                provider TEXT NOT NULL,
                passage_ordinal INTEGER NOT NULL DEFAULT 0,
                state TEXT NOT NULL DEFAULT 'active',
                embedded_at REAL NOT NULL,
                UNIQUE(item_id, generation_id),
                UNIQUE(hnsw_label, generation_id)
            );

            CREATE TABLE IF NOT EXISTS generation_state (
                generation_id TEXT PRIMARY KEY,
                model_id TEXT NOT NULL,
                dimensions INTEGER NOT NULL,
                provider TEXT NOT NULL,
                state TEXT NOT NULL,
                progress_pct REAL NOT NULL DEFAULT 0,
                active INTEGER NOT NULL DEFAULT 0
            );
            ",
        )?;

        // Legacy single-column `vector_map(item_id, label)` migration.
        let has_legacy_shape: bool = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('vector_map') WHERE name = 'label'",
                [],
                |r| r.get::<_, i64>(0),
            )
            .unwrap_or(0)
            > 0;
        if has_legacy_shape {
            self.conn.execute_batch(
                "INSERT OR IGNORE INTO vector_map (item_id, hnsw_label, model_id, generation_id, dimensions, provider, passage_ordinal, state, embedded_at)
                 SELECT item_id, label, '', 'legacy', 0, '', 0, 'active', 0 FROM vector_map_legacy;",
            )
            .ok();
        }
        Ok(())
    }

    pub fn add_mapping(&self, mapping: &VectorMapping) -> Result<()> {
        if mapping.hnsw_label > i64::MAX - 1 {
            return Err(Error::InvalidInput("hnsw_label exceeds i64::MAX".into()));
        }
        if mapping.passage_ordinal < 0 {
            return Err(Error::InvalidInput("passage_ordinal must be non-negative".into()));
        }
        let state_str = match mapping.state {
            VectorMappingState::Active => "active",
            VectorMappingState::Stale => "stale",
        };
        self.conn.execute(
            "INSERT INTO vector_map (item_id, hnsw_label, model_id, generation_id, dimensions, provider, passage_ordinal, state, embedded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(item_id, generation_id) DO UPDATE SET
                hnsw_label=excluded.hnsw_label, state=excluded.state, embedded_at=excluded.embedded_at",
            params![
                mapping.item_id,
                mapping.hnsw_label,
                mapping.model_id,
                mapping.generation_id,
                mapping.dimensions as i64,
                mapping.provider,
                mapping.passage_ordinal,
                state_str,
                mapping.embedded_at
            ],
        )?;
        Ok(())
    }

    pub fn remove_mapping(&self, item_id: i64, generation_id: &str) -> Result<()> {
        self.conn.execute("DELETE FROM vector_map WHERE item_id = ?1 AND generation_id = ?2", params![item_id, generation_id])?;
        Ok(())
    }

    pub fn remove_generation(&self, generation_id: &str) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM vector_map WHERE generation_id = ?1", params![generation_id])?)
    }

    /// Empty `generation_id` means "the active generation".
    pub fn get_label(&self, item_id: i64, generation_id: &str) -> Result<Option<i64>> {
        let gen_id = self.resolve_generation(generation_id)?;
        self.conn
            .query_row("SELECT hnsw_label FROM vector_map WHERE item_id = ?1 AND generation_id = ?2", params![item_id, gen_id], |r| r.get(0))
            .optional()
            .map_err(Into::into)
    }

    pub fn get_item_id(&self, label: i64, generation_id: &str) -> Result<Option<i64>> {
        let gen_id = self.resolve_generation(generation_id)?;
        self.conn
            .query_row("SELECT item_id FROM vector_map WHERE hnsw_label = ?1 AND generation_id = ?2", params![label, gen_id], |r| r.get(0))
            .optional()
            .map_err(Into::into)
    }

    pub fn count_mappings(&self) -> Result<i64> {
        Ok(self.conn.query_row("SELECT COUNT(*) FROM vector_map", [], |r| r.get(0))?)
    }

    pub fn count_mappings_for_generation(&self, generation_id: &str) -> Result<i64> {
        Ok(self.conn.query_row("SELECT COUNT(*) FROM vector_map WHERE generation_id = ?1", params![generation_id], |r| r.get(0))?)
    }

    pub fn get_all_mappings(&self) -> Result<Vec<VectorMapping>> {
        let mut stmt = self.conn.prepare(
            "SELECT item_id, hnsw_label, model_id, generation_id, dimensions, provider, passage_ordinal, state, embedded_at FROM vector_map",
        )?;
        let rows = stmt.query_map([], Self::row_to_mapping)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn get_all_mappings_for_generation(&self, generation_id: &str) -> Result<Vec<VectorMapping>> {
        let mut stmt = self.conn.prepare(
            "SELECT item_id, hnsw_label, model_id, generation_id, dimensions, provider, passage_ordinal, state, embedded_at FROM vector_map WHERE generation_id = ?1",
        )?;
        let rows = stmt.query_map(params![generation_id], Self::row_to_mapping)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    fn row_to_mapping(row: &rusqlite::Row) -> rusqlite::Result<VectorMapping> {
        let state_str: String = row.get(7)?;
        Ok(VectorMapping {
            item_id: row.get(0)?,
            hnsw_label: row.get(1)?,
            model_id: row.get(2)?,
            generation_id: row.get(3)?,
            dimensions: row.get::<_, i64>(4)? as usize,
            provider: row.get(5)?,
            passage_ordinal: row.get(6)?,
            state: if state_str == "active" { VectorMappingState::Active } else { VectorMappingState::Stale },
            embedded_at: row.get(8)?,
        })
    }

    pub fn upsert_generation_state(&self, state: &GenerationState) -> Result<()> {
        let lifecycle_str = match state.state {
            GenerationLifecycle::Building => "building",
            GenerationLifecycle::Active => "active",
            GenerationLifecycle::Retired => "retired",
        };
        self.conn.execute(
            "INSERT INTO generation_state (generation_id, model_id, dimensions, provider, state, progress_pct, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(generation_id) DO UPDATE SET
                model_id=excluded.model_id, dimensions=excluded.dimensions, provider=excluded.provider,
                state=excluded.state, progress_pct=excluded.progress_pct, active=excluded.active",
            params![state.generation_id, state.model_id, state.dimensions as i64, state.provider, lifecycle_str, state.progress_pct, state.active as i64],
        )?;
        Ok(())
    }

    pub fn list_generation_states(&self) -> Result<Vec<GenerationState>> {
        let mut stmt = self.conn.prepare("SELECT generation_id, model_id, dimensions, provider, state, progress_pct, active FROM generation_state")?;
        let rows = stmt.query_map([], Self::row_to_generation)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn active_generation_state(&self) -> Result<Option<GenerationState>> {
        self.conn
            .query_row(
                "SELECT generation_id, model_id, dimensions, provider, state, progress_pct, active FROM generation_state WHERE active = 1",
                [],
                Self::row_to_generation,
            )
            .optional()
            .map_err(Into::into)
    }

    fn row_to_generation(row: &rusqlite::Row) -> rusqlite::Result<GenerationState> {
        let lifecycle_str: String = row.get(4)?;
        Ok(GenerationState {
            generation_id: row.get(0)?,
            model_id: row.get(1)?,
            dimensions: row.get::<_, i64>(2)? as usize,
            provider: row.get(3)?,
            state: match lifecycle_str.as_str() {
                "building" => GenerationLifecycle::Building,
                "retired" => GenerationLifecycle::Retired,
                _ => GenerationLifecycle::Active,
            },
            progress_pct: row.get(5)?,
            active: row.get::<_, i64>(6)? != 0,
        })
    }

    pub fn set_active_generation(&self, generation_id: &str) -> Result<()> {
        let exists: bool = self.conn.query_row(
            "SELECT COUNT(*) FROM generation_state WHERE generation_id = ?1",
            params![generation_id],
            |r| r.get::<_, i64>(0),
        )? > 0;
        if !exists {
            self.upsert_generation_state(&GenerationState {
                generation_id: generation_id.to_string(),
                model_id: String::new(),
                dimensions: 0,
                provider: String::new(),
                state: GenerationLifecycle::Active,
                progress_pct: 100.0,
                active: true,
            })?;
        }
        self.conn.execute("UPDATE generation_state SET active = 0 WHERE generation_id != ?1", params![generation_id])?;
        self.conn.execute("UPDATE generation_state SET active = 1, state = 'active' WHERE generation_id = ?1", params![generation_id])?;
        Ok(())
    }

    pub fn clear_all(&self) -> Result<()> {
        self.conn.execute_batch("DELETE FROM vector_map; DELETE FROM generation_state;")?;
        Ok(())
    }

    fn resolve_generation(&self, generation_id: &str) -> Result<String> {
        if !generation_id.is_empty() {
            return Ok(generation_id.to_string());
        }
        match self.active_generation_state()? {
            Some(state) => Ok(state.generation_id),
            None => Ok(String::new()),
        }
    }
}

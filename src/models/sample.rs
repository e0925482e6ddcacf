use rusqlite::{params, Connection, Result, Row};

/// One raw observation of the focused window over one poll tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub id: Option<i64>,
    pub timestamp_ms: i64,
    pub app_id: String,
    pub title: String,
    pub duration_ms: i64,
}

impl Sample {
    pub fn new(timestamp_ms: i64, app_id: &str, title: &str, duration_ms: i64) -> Self {
        Self {
            id: None,
            timestamp_ms,
            app_id: app_id.to_string(),
            title: title.to_string(),
            duration_ms,
        }
    }

    pub fn save(&mut self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO screen_time (timestamp_ms, app_id, title, duration_ms)
             VALUES (?1, ?2, ?3, ?4)",
            params![self.timestamp_ms, self.app_id, self.title, self.duration_ms],
        )?;
        self.id = Some(conn.last_insert_rowid());
        Ok(())
    }

    /// Insert every sample with one cached statement. Callers wrap this in a
    /// transaction; ids are not written back.
    pub fn insert_all(conn: &Connection, samples: &[Self]) -> Result<()> {
        let mut stmt = conn.prepare_cached(
            "INSERT INTO screen_time (timestamp_ms, app_id, title, duration_ms)
             VALUES (?1, ?2, ?3, ?4)",
        )?;

        for sample in samples {
            stmt.execute(params![
                sample.timestamp_ms,
                sample.app_id,
                sample.title,
                sample.duration_ms,
            ])?;
        }

        Ok(())
    }

    /// Samples with `from <= timestamp <= to`, oldest first.
    pub fn find_in_range(conn: &Connection, from_ms: i64, to_ms: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, timestamp_ms, app_id, title, duration_ms
             FROM screen_time WHERE timestamp_ms BETWEEN ?1 AND ?2
             ORDER BY timestamp_ms, id",
        )?;

        let rows = stmt.query_map(params![from_ms, to_ms], Self::from_row)?;
        rows.collect()
    }

    pub fn find_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, timestamp_ms, app_id, title, duration_ms
             FROM screen_time ORDER BY timestamp_ms, id",
        )?;

        let rows = stmt.query_map([], Self::from_row)?;
        rows.collect()
    }

    pub fn delete(conn: &Connection, id: i64) -> Result<usize> {
        conn.execute("DELETE FROM screen_time WHERE id = ?1", params![id])
    }

    pub fn delete_many(conn: &Connection, ids: &[i64]) -> Result<usize> {
        let mut stmt = conn.prepare_cached("DELETE FROM screen_time WHERE id = ?1")?;
        let mut deleted = 0;
        for id in ids {
            deleted += stmt.execute(params![id])?;
        }
        Ok(deleted)
    }

    pub fn delete_before(conn: &Connection, before_ms: i64) -> Result<usize> {
        conn.execute("DELETE FROM screen_time WHERE timestamp_ms < ?1", params![before_ms])
    }

    fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            timestamp_ms: row.get(1)?,
            app_id: row.get(2)?,
            title: row.get(3)?,
            duration_ms: row.get(4)?,
        })
    }
}

use rusqlite::{params, Connection, Result, Row};

use super::Sample;

/// Contiguous same-window samples collapsed into one duration-summed row.
/// `timestamp_ms` is the timestamp of the last sample folded in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub timestamp_ms: i64,
    pub app_id: String,
    pub title: String,
    pub duration_ms: i64,
}

impl Aggregate {
    pub fn from_sample(sample: &Sample) -> Self {
        Self {
            timestamp_ms: sample.timestamp_ms,
            app_id: sample.app_id.clone(),
            title: sample.title.clone(),
            duration_ms: sample.duration_ms,
        }
    }

    /// Extend the aggregate with the next sample of the same run.
    pub fn absorb(&mut self, sample: &Sample) {
        self.timestamp_ms = sample.timestamp_ms;
        self.duration_ms += sample.duration_ms;
    }

    pub fn save(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO aggregated_screen_time (timestamp_ms, app_id, title, duration_ms)
             VALUES (?1, ?2, ?3, ?4)",
            params![self.timestamp_ms, self.app_id, self.title, self.duration_ms],
        )?;
        Ok(())
    }

    pub fn insert_all(conn: &Connection, aggregates: &[Self]) -> Result<()> {
        let mut stmt = conn.prepare_cached(
            "INSERT INTO aggregated_screen_time (timestamp_ms, app_id, title, duration_ms)
             VALUES (?1, ?2, ?3, ?4)",
        )?;

        for aggregate in aggregates {
            stmt.execute(params![
                aggregate.timestamp_ms,
                aggregate.app_id,
                aggregate.title,
                aggregate.duration_ms,
            ])?;
        }

        Ok(())
    }

    pub fn find_in_range(conn: &Connection, from_ms: i64, to_ms: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT timestamp_ms, app_id, title, duration_ms
             FROM aggregated_screen_time WHERE timestamp_ms BETWEEN ?1 AND ?2
             ORDER BY timestamp_ms",
        )?;

        let rows = stmt.query_map(params![from_ms, to_ms], Self::from_row)?;
        rows.collect()
    }

    pub fn delete_before(conn: &Connection, before_ms: i64) -> Result<usize> {
        conn.execute(
            "DELETE FROM aggregated_screen_time WHERE timestamp_ms < ?1",
            params![before_ms],
        )
    }

    fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            timestamp_ms: row.get(0)?,
            app_id: row.get(1)?,
            title: row.get(2)?,
            duration_ms: row.get(3)?,
        })
    }
}

use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

use crate::error::ServeError;
use crate::labels;
use crate::model::Mode;
use crate::sampling;

/// Persistent distribution cache keyed by `(mode, normalized state)`.
///
/// A hit is re-sampled from the stored distribution on every read, so
/// repeated queries stay as stochastic as a fresh evaluation. Writes are
/// first-writer-wins: the unique constraints absorb racing inserts.
///
/// The connection mutex is the cache-wide lock. It is held for one
/// `get` or `put` at a time, never across the evaluation that fills a
/// miss.
pub struct MoveCache {
    conn: Mutex<Connection>,
}

impl MoveCache {
    pub fn open(path: &Path) -> Result<Self, ServeError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, ServeError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, ServeError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS Cache (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mode TEXT NOT NULL,
                state TEXT NOT NULL,
                UNIQUE(mode, state)
            );
            CREATE TABLE IF NOT EXISTS ActionProbs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cache_id INTEGER NOT NULL,
                action_index INTEGER NOT NULL,
                probability REAL NOT NULL,
                confidence REAL NOT NULL,
                UNIQUE(cache_id, action_index),
                FOREIGN KEY(cache_id) REFERENCES Cache(id)
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Sample one `(action_index, confidence)` from the stored
    /// distribution for the key. Absent, empty, or massless records read
    /// as `None`.
    pub fn get(&self, mode: Mode, state: &str) -> Result<Option<(usize, f32)>, ServeError> {
        let triples = {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare_cached(
                "SELECT a.action_index, a.probability, a.confidence
                 FROM ActionProbs a JOIN Cache c ON a.cache_id = c.id
                 WHERE c.mode = ?1 AND c.state = ?2",
            )?;
            let rows = stmt.query_map(params![mode.as_str(), state], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, f64>(1)? as f32,
                    row.get::<_, f64>(2)? as f32,
                ))
            })?;
            let mut triples: Vec<(usize, f32, f32)> = Vec::new();
            for row in rows {
                let (idx, prob, conf) = row?;
                // Indices must address the action space; anything else is
                // a foreign row and does not get to pick a move.
                if (0..labels::count() as i64).contains(&idx) {
                    triples.push((idx as usize, prob, conf));
                }
            }
            triples
        };

        if triples.is_empty() {
            return Ok(None);
        }
        let weights: Vec<f32> = triples.iter().map(|t| t.1).collect();
        let pick = sampling::weighted_choice(&weights, &mut rand::thread_rng());
        Ok(pick.map(|i| (triples[i].0, triples[i].2)))
    }

    /// Store the distribution for a key. Losing the insert race is a
    /// silent no-op, as is any individual triple that collides with a
    /// half-populated record. Zero-probability actions are not stored.
    pub fn put(
        &self,
        mode: Mode,
        state: &str,
        policy: &[f32],
        confidence: &[f32],
    ) -> Result<(), ServeError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO Cache(mode, state) VALUES (?1, ?2)",
            params![mode.as_str(), state],
        )?;
        if inserted == 0 {
            log::debug!("cache record exists for {} {:?}, dropping ours", mode.as_str(), state);
            return Ok(());
        }
        let cache_id = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO ActionProbs(cache_id, action_index, probability, confidence)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (idx, &prob) in policy.iter().enumerate() {
                if prob <= 0.0 {
                    continue;
                }
                let conf = confidence.get(idx).copied().unwrap_or(0.0);
                stmt.execute(params![cache_id, idx as i64, prob as f64, conf as f64])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Number of cache records. Used by accounting and tests.
    pub fn entry_count(&self) -> Result<i64, ServeError> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row("SELECT COUNT(*) FROM Cache", [], |row| row.get(0))?;
        Ok(count)
    }
}

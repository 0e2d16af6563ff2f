use std::path::PathBuf;
use std::time::Duration;

/// Serving parameters. The CLI populates this.
#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub port: u16,
    /// Request-handling threads sharing the HTTP accept loop.
    pub http_workers: usize,
    /// Evaluation pipes per pool entry.
    pub search_threads: usize,
    /// Unix socket the evaluation worker listens on.
    pub socket_path: PathBuf,
    /// SQLite file backing the move cache.
    pub db_path: PathBuf,
    /// Upper bound on a single evaluation round trip.
    pub eval_timeout_ms: u64,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            port: 23456,
            http_workers: 8,
            search_threads: 16,
            socket_path: std::env::temp_dir().join("castellan-model.sock"),
            db_path: PathBuf::from("cache.db"),
            eval_timeout_ms: 60_000,
        }
    }
}

impl ServeConfig {
    pub fn eval_timeout(&self) -> Duration {
        Duration::from_millis(self.eval_timeout_ms)
    }
}

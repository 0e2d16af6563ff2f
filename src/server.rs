use anyhow::{anyhow, Result};
use serde::Serialize;
use std::io::Read;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tiny_http::{Header, Method, Response, Server};

use crate::cache::MoveCache;
use crate::config::ServeConfig;
use crate::error::ServeError;
use crate::fen;
use crate::infer;
use crate::labels;
use crate::model::Mode;
use crate::pool::PipePool;

/// Success payload of `POST /{mode}`.
#[derive(Debug, Clone, Serialize)]
pub struct MoveResponse {
    pub action: String,
    pub confidence: f32,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
}

/// Per-process request counters, logged and exposed for tests.
#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evals: AtomicU64,
    rejected: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evals: u64,
    pub rejected: u64,
}

/// The request orchestrator. One instance serves every request; all of
/// its shared state sits behind the pool's and the cache's own locks.
pub struct AiServer {
    pool: PipePool,
    cache: MoveCache,
    config: ServeConfig,
    counters: Counters,
}

impl AiServer {
    pub fn new(pool: PipePool, cache: MoveCache, config: ServeConfig) -> Self {
        Self {
            pool,
            cache,
            config,
            counters: Counters::default(),
        }
    }

    pub fn pool(&self) -> &PipePool {
        &self.pool
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evals: self.counters.evals.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    /// Serve one request: validate, normalize, try the cache, fall back
    /// to an isolated evaluation on a pooled pipe group.
    pub fn respond(&self, mode_str: &str, body: &str) -> Result<MoveResponse, ServeError> {
        let result = self.handle(mode_str, body);
        if matches!(result, Err(ServeError::InvalidRequest(_))) {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    fn handle(&self, mode_str: &str, body: &str) -> Result<MoveResponse, ServeError> {
        // Fail closed before touching any resource.
        let mode = Mode::from_str(mode_str)?;
        let raw_fen = extract_fen(body)?;
        let key = fen::normalize(&raw_fen)?;
        fen::parse(&key)?;

        match self.cache.get(mode, &key) {
            Ok(Some((action_index, confidence))) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                log::debug!("cache hit for {} {:?}", mode.as_str(), key);
                return reply(action_index, confidence);
            }
            Ok(None) => {}
            // A broken cache degrades to a miss; evaluation still works.
            Err(e) => log::warn!("cache lookup failed, treating as miss: {e}"),
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let mut group = self.pool.acquire()?;
        let outcome = infer::run(&mut group, mode, &key, self.config.eval_timeout());
        // Release is unconditional: a failed evaluation does not cost the
        // pool an entry.
        self.pool.release(group);
        let decision = outcome?;
        self.counters.evals.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = self.cache.put(mode, &key, &decision.policy, &decision.confidence) {
            log::warn!("cache store failed for {} {:?}: {e}", mode.as_str(), key);
        }
        reply(decision.action_index, decision.confidence[decision.action_index])
    }

    /// Bind and serve forever on `addr` with the configured worker count.
    pub fn serve(self, addr: &str) -> Result<()> {
        let server =
            Server::http(addr).map_err(|e| anyhow!("failed to bind {}: {}", addr, e))?;
        log::info!("serving on {}", addr);
        self.serve_on(server)
    }

    /// Run the accept loop on an already-bound server. Split out so the
    /// tests can bind to an ephemeral port first.
    pub fn serve_on(self, server: Server) -> Result<()> {
        let server = Arc::new(server);
        let core = Arc::new(self);
        let mut handles = Vec::new();
        for id in 0..core.config.http_workers.max(1) {
            let server = Arc::clone(&server);
            let core = Arc::clone(&core);
            let handle = std::thread::Builder::new()
                .name(format!("http-{id}"))
                .spawn(move || {
                    for request in server.incoming_requests() {
                        core.dispatch(request);
                    }
                })?;
            handles.push(handle);
        }
        for handle in handles {
            let _ = handle.join();
        }
        Ok(())
    }

    fn dispatch(&self, mut request: tiny_http::Request) {
        let mode_str = request.url().trim_matches('/').to_string();

        if *request.method() != Method::Post {
            let _ = request.respond(json_response(405, &ErrorResponse {
                message: "POST only".to_string(),
            }));
            return;
        }

        let mut body = String::new();
        if request.as_reader().read_to_string(&mut body).is_err() {
            let _ = request.respond(json_response(400, &ErrorResponse {
                message: "unreadable body".to_string(),
            }));
            return;
        }

        match self.respond(&mode_str, &body) {
            Ok(response) => {
                let _ = request.respond(json_response(200, &response));
            }
            Err(e) => {
                log::info!("request to /{} failed: {}", mode_str, e);
                let _ = request.respond(json_response(
                    e.status_code(),
                    &ErrorResponse {
                        message: e.to_string(),
                    },
                ));
            }
        }
    }
}

fn extract_fen(body: &str) -> Result<String, ServeError> {
    // The body is examined as a generic document so a missing field and
    // unparseable JSON report differently.
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|_| ServeError::InvalidRequest("malformed request body".to_string()))?;
    value
        .get("fen")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| ServeError::InvalidRequest("there is no fen in the request".to_string()))
}

fn reply(action_index: usize, confidence: f32) -> Result<MoveResponse, ServeError> {
    let action = labels::all().get(action_index).ok_or_else(|| {
        ServeError::EvaluationFailed(format!("action index {action_index} out of range"))
    })?;
    Ok(MoveResponse {
        action: action.clone(),
        confidence,
    })
}

fn json_response(status: u16, payload: &impl Serialize) -> Response<std::io::Cursor<Vec<u8>>> {
    let body = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
    let header = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
        .expect("static header");
    Response::from_string(body)
        .with_status_code(status)
        .with_header(header)
}

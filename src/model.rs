use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::error::ServeError;

/// Play strength requested by the client. The evaluator decides what the
/// modes mean; the serving core only routes and keys the cache on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Easy,
    Hard,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Easy => "easy",
            Mode::Hard => "hard",
        }
    }
}

impl FromStr for Mode {
    type Err = ServeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Mode::Easy),
            "hard" => Ok(Mode::Hard),
            _ => Err(ServeError::InvalidRequest("wrong mode".to_string())),
        }
    }
}

/// One evaluation request on the worker wire. Newline-delimited JSON;
/// both ends are always built from the same tree.
#[derive(Debug, Serialize, Deserialize)]
pub struct EvalRequest {
    pub mode: Mode,
    pub fen: String,
}

/// Full evaluation result: one probability and one confidence per action
/// in the fixed action space.
#[derive(Debug, Serialize, Deserialize)]
pub struct EvalReply {
    pub policy: Vec<f32>,
    pub confidence: Vec<f32>,
}

/// A single duplex channel to the worker process.
pub struct EvalPipe {
    writer: UnixStream,
    reader: BufReader<UnixStream>,
}

impl EvalPipe {
    fn connect(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path)?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self { writer: stream, reader })
    }

    /// Send one request and block for the reply, bounded by `timeout` on
    /// both directions.
    pub fn roundtrip(&mut self, req: &EvalRequest, timeout: Duration) -> Result<EvalReply> {
        self.writer.set_write_timeout(Some(timeout))?;
        self.reader.get_ref().set_read_timeout(Some(timeout))?;

        let mut line = serde_json::to_string(req)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;

        let mut buf = String::new();
        let n = self.reader.read_line(&mut buf)?;
        if n == 0 {
            bail!("evaluation pipe closed by worker");
        }
        Ok(serde_json::from_str(buf.trim_end())?)
    }
}

/// A pool entry: a group of evaluation pipes sized to the configured
/// search thread count. Long-lived and recycled, never torn down on a
/// failed evaluation.
pub struct PipeGroup {
    pipes: Vec<EvalPipe>,
}

impl PipeGroup {
    pub fn len(&self) -> usize {
        self.pipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipes.is_empty()
    }

    /// The pipe a single evaluation is submitted on.
    pub fn primary_mut(&mut self) -> &mut EvalPipe {
        &mut self.pipes[0]
    }
}

/// Connection-side handle to the worker: knows where the socket lives
/// and how wide a pipe group should be.
#[derive(Debug, Clone)]
pub struct ModelHandle {
    socket: PathBuf,
    search_threads: usize,
}

impl ModelHandle {
    pub fn new(socket: impl Into<PathBuf>, search_threads: usize) -> Self {
        Self {
            socket: socket.into(),
            search_threads: search_threads.max(1),
        }
    }

    /// Provision a fresh pipe group. Expensive relative to pool reuse;
    /// the pool manager serializes calls behind its provisioning lock.
    pub fn get_pipes(&self) -> Result<PipeGroup, ServeError> {
        let mut pipes = Vec::with_capacity(self.search_threads);
        for _ in 0..self.search_threads {
            let pipe = EvalPipe::connect(&self.socket)
                .map_err(|e| ServeError::PoolProvisioningFailed(e.to_string()))?;
            pipes.push(pipe);
        }
        Ok(PipeGroup { pipes })
    }
}

/// Child-process handle for the evaluation worker. Killing the serving
/// process tears the worker down with it.
pub struct ModelProcess {
    child: Child,
    socket: PathBuf,
}

impl ModelProcess {
    /// Spawn `exe worker --socket <path>` and wait for the socket to
    /// appear before returning.
    pub fn spawn(exe: &Path, socket: &Path) -> Result<Self> {
        if socket.exists() {
            std::fs::remove_file(socket)?;
        }
        let child = Command::new(exe)
            .arg("worker")
            .arg("--socket")
            .arg(socket)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| anyhow!("failed to spawn worker {}: {}", exe.display(), e))?;

        let process = Self {
            child,
            socket: socket.to_path_buf(),
        };
        process.wait_for_socket(Duration::from_secs(10))?;
        log::info!("worker ready on {}", process.socket.display());
        Ok(process)
    }

    fn wait_for_socket(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while !self.socket.exists() {
            if Instant::now() >= deadline {
                bail!("worker socket {} never appeared", self.socket.display());
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        Ok(())
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }
}

impl Drop for ModelProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_file(&self.socket);
    }
}

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use castellan::cache::MoveCache;
use castellan::config::ServeConfig;
use castellan::model::{ModelHandle, ModelProcess};
use castellan::pool::PipePool;
use castellan::server::AiServer;
use castellan::worker::{self, BaselineEvaluator};

#[derive(Parser, Debug)]
#[command(author, version, about = "Chess inference server with pooled evaluation pipes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP front end (spawns its evaluation worker)
    Serve {
        /// Port to listen on
        #[arg(long, default_value_t = 23456)]
        port: u16,

        /// Request-handling threads
        #[arg(long, default_value_t = 8)]
        workers: usize,

        /// Evaluation pipes per pool entry
        #[arg(long, default_value_t = 16)]
        search_threads: usize,

        /// Worker socket path (defaults under the temp dir)
        #[arg(long)]
        socket: Option<PathBuf>,

        /// SQLite file backing the move cache
        #[arg(long, default_value = "cache.db")]
        db: PathBuf,

        /// Upper bound on a single evaluation, in milliseconds
        #[arg(long, default_value_t = 60_000)]
        timeout_ms: u64,
    },

    /// Evaluation worker process (spawned by `serve`)
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        socket: PathBuf,

        /// Seed for the baseline evaluator (entropy when absent)
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    match Cli::parse().command {
        Command::Serve {
            port,
            workers,
            search_threads,
            socket,
            db,
            timeout_ms,
        } => {
            let defaults = ServeConfig::default();
            let config = ServeConfig {
                port,
                http_workers: workers,
                search_threads,
                socket_path: socket.unwrap_or(defaults.socket_path),
                db_path: db,
                eval_timeout_ms: timeout_ms,
            };
            serve(config)
        }
        Command::Worker { socket, seed } => {
            let evaluator = match seed {
                Some(seed) => BaselineEvaluator::with_seed(seed),
                None => BaselineEvaluator::new(),
            };
            worker::serve(&socket, Arc::new(evaluator))
        }
    }
}

fn serve(config: ServeConfig) -> Result<()> {
    let exe = std::env::current_exe()?;
    // The worker is this same binary in its hidden mode; its process is
    // the isolation boundary for the model.
    let process = ModelProcess::spawn(&exe, &config.socket_path)?;
    let model = ModelHandle::new(process.socket(), config.search_threads);
    let pool = PipePool::new(model);
    let cache = MoveCache::open(&config.db_path)?;
    let addr = format!("0.0.0.0:{}", config.port);
    let server = AiServer::new(pool, cache, config);

    // Keep the worker child alive for as long as we serve.
    let _process = process;
    server.serve(&addr)
}

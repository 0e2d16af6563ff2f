use anyhow::{anyhow, bail, Context, Result};
use cozy_chess::{Board, Move, Piece};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Gamma};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::labels;
use crate::model::{EvalReply, EvalRequest, Mode};

/// Seam to the search/model library. Implementations return one
/// probability and one confidence per action in the fixed action space.
pub trait Evaluate: Send + Sync {
    fn evaluate(&self, mode: Mode, board: &Board) -> (Vec<f32>, Vec<f32>);
}

/// Accept loop of the evaluation worker process. One thread per pipe;
/// a panicking or killed worker takes this process down, never the
/// serving front end on the other side of the socket.
pub fn serve(socket: &Path, evaluator: Arc<dyn Evaluate>) -> Result<()> {
    if socket.exists() {
        std::fs::remove_file(socket)?;
    }
    let listener = UnixListener::bind(socket)
        .with_context(|| format!("binding worker socket {}", socket.display()))?;
    log::info!("evaluation worker listening on {}", socket.display());

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let evaluator = Arc::clone(&evaluator);
                std::thread::spawn(move || {
                    if let Err(e) = handle_pipe(stream, evaluator) {
                        log::debug!("pipe finished: {e}");
                    }
                });
            }
            Err(e) => log::warn!("accept failed: {e}"),
        }
    }
    Ok(())
}

fn handle_pipe(stream: UnixStream, evaluator: Arc<dyn Evaluate>) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let request: EvalRequest = serde_json::from_str(line.trim_end())?;
        let board = Board::from_fen(&request.fen, false)
            .map_err(|e| anyhow!("unparseable fen on pipe: {e:?}"))?;
        let (policy, confidence) = evaluator.evaluate(request.mode, &board);
        if policy.len() != labels::count() {
            bail!("evaluator returned {} probabilities", policy.len());
        }
        let mut reply = serde_json::to_string(&EvalReply { policy, confidence })?;
        reply.push('\n');
        writer.write_all(reply.as_bytes())?;
        writer.flush()?;
    }
}

const DIRICHLET_ALPHA: f64 = 0.3;
const DIRICHLET_EPSILON: f32 = 0.25;

/// Stand-in for the external model library behind the `Evaluate` seam.
///
/// Scores legal moves by captured material, sharpens the distribution in
/// hard mode and flattens it with Dirichlet noise in easy mode. Hard
/// confidences are negated, matching the sign convention downstream
/// aggregation expects from that mode.
pub struct BaselineEvaluator {
    rng: Mutex<SmallRng>,
}

impl BaselineEvaluator {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(SmallRng::from_entropy()),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
        }
    }
}

impl Default for BaselineEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn piece_value(piece: Piece) -> f32 {
    match piece {
        Piece::Pawn => 1.0,
        Piece::Knight => 3.0,
        Piece::Bishop => 3.0,
        Piece::Rook => 5.0,
        Piece::Queen => 9.0,
        Piece::King => 0.0,
    }
}

impl Evaluate for BaselineEvaluator {
    fn evaluate(&self, mode: Mode, board: &Board) -> (Vec<f32>, Vec<f32>) {
        let n = labels::count();
        let mut policy = vec![0.0f32; n];
        let mut confidence = vec![0.0f32; n];

        let mut moves: Vec<Move> = Vec::new();
        board.generate_moves(|ml| {
            for mv in ml {
                moves.push(mv);
            }
            false
        });
        if moves.is_empty() {
            return (policy, confidence);
        }

        let stm = board.side_to_move();
        let scored: Vec<(usize, f32)> = moves
            .iter()
            .filter_map(|mv| {
                let idx = labels::index_of(&mv.to_string())?;
                let mut score = 0.0f32;
                if board.color_on(mv.to) == Some(!stm) {
                    if let Some(piece) = board.piece_on(mv.to) {
                        score += piece_value(piece);
                    }
                }
                if mv.promotion.is_some() {
                    score += 8.0;
                }
                Some((idx, score))
            })
            .collect();

        let temperature = match mode {
            Mode::Hard => 0.5,
            Mode::Easy => 2.0,
        };
        let mut weights: Vec<f32> = scored
            .iter()
            .map(|&(_, score)| (score / temperature).exp())
            .collect();
        let base_sum: f32 = weights.iter().sum();

        if mode == Mode::Easy {
            // Dirichlet noise via normalized Gamma draws, mixed in the
            // usual (1-eps)*p + eps*noise shape.
            let gamma = Gamma::new(DIRICHLET_ALPHA, 1.0).unwrap();
            let mut rng = self.rng.lock().unwrap();
            let mut noise: Vec<f32> = (0..weights.len())
                .map(|_| gamma.sample(&mut *rng) as f32)
                .collect();
            let noise_sum: f32 = noise.iter().sum();
            if noise_sum > 0.0 {
                for x in &mut noise {
                    *x /= noise_sum;
                }
            }
            for (w, nz) in weights.iter_mut().zip(noise) {
                *w = (1.0 - DIRICHLET_EPSILON) * (*w / base_sum) + DIRICHLET_EPSILON * nz;
            }
        }

        let total: f32 = weights.iter().sum();
        let max_score = scored
            .iter()
            .map(|&(_, s)| s)
            .fold(0.0f32, f32::max)
            .max(1.0);
        for (&(idx, score), &weight) in scored.iter().zip(&weights) {
            policy[idx] = weight / total;
            let strength = score / max_score;
            confidence[idx] = match mode {
                Mode::Easy => strength,
                Mode::Hard => -strength,
            };
        }
        (policy, confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn startpos() -> Board {
        Board::default()
    }

    #[test]
    fn test_policy_covers_exactly_the_legal_moves() {
        let evaluator = BaselineEvaluator::with_seed(1);
        let (policy, _) = evaluator.evaluate(Mode::Hard, &startpos());
        let nonzero = policy.iter().filter(|&&p| p > 0.0).count();
        assert_eq!(nonzero, 20);
        let sum: f32 = policy.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4, "policy sums to {}", sum);
    }

    #[test]
    fn test_easy_mode_noise_keeps_distribution_normalized() {
        let evaluator = BaselineEvaluator::with_seed(2);
        let (policy, _) = evaluator.evaluate(Mode::Easy, &startpos());
        let sum: f32 = policy.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4, "policy sums to {}", sum);
        assert!(policy.iter().all(|&p| p >= 0.0));
    }

    #[test]
    fn test_hard_mode_prefers_the_capture() {
        // After 1.e4 d5 the capture exd5 is available.
        let board = Board::from_fen(
            "rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2",
            false,
        )
        .unwrap();
        let evaluator = BaselineEvaluator::with_seed(3);
        let (policy, confidence) = evaluator.evaluate(Mode::Hard, &board);
        let capture = labels::index_of("e4d5").unwrap();
        let quiet = labels::index_of("a2a3").unwrap();
        assert!(policy[capture] > policy[quiet]);
        assert!(confidence[capture] < 0.0, "hard confidences are negated");
    }

    #[test]
    fn test_mate_position_has_no_mass() {
        // Fool's mate: black has delivered mate, no legal replies.
        let board = Board::from_fen(
            "rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3",
            false,
        )
        .unwrap();
        let evaluator = BaselineEvaluator::with_seed(4);
        let (policy, _) = evaluator.evaluate(Mode::Hard, &board);
        assert!(policy.iter().all(|&p| p == 0.0));
    }
}

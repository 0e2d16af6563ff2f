use std::time::Duration;

use crate::error::ServeError;
use crate::labels;
use crate::model::{EvalReply, EvalRequest, Mode, PipeGroup};
use crate::sampling;

/// Outcome of one isolated evaluation: the sampled action plus the full
/// distribution the cache will be populated with.
pub struct Decision {
    pub action_index: usize,
    pub policy: Vec<f32>,
    pub confidence: Vec<f32>,
}

/// Run one evaluation on the worker over a borrowed pipe group, blocking
/// up to `timeout`. The worker lives in its own process, so a crash over
/// there surfaces here as a closed pipe, not a dead server.
///
/// The caller owns the group for the duration and must release it to the
/// pool on every exit path, this function failing included.
pub fn run(
    group: &mut PipeGroup,
    mode: Mode,
    fen: &str,
    timeout: Duration,
) -> Result<Decision, ServeError> {
    let request = EvalRequest {
        mode,
        fen: fen.to_string(),
    };
    let reply = group
        .primary_mut()
        .roundtrip(&request, timeout)
        .map_err(|e| ServeError::EvaluationFailed(e.to_string()))?;
    decide(reply)
}

fn decide(reply: EvalReply) -> Result<Decision, ServeError> {
    let n = labels::count();
    if reply.policy.len() != n || reply.confidence.len() != n {
        return Err(ServeError::EvaluationFailed(format!(
            "malformed evaluation: {} probabilities and {} confidences for {} actions",
            reply.policy.len(),
            reply.confidence.len(),
            n
        )));
    }
    let action_index = sampling::weighted_choice(&reply.policy, &mut rand::thread_rng())
        .ok_or_else(|| {
            ServeError::EvaluationFailed("policy carries no probability mass".to_string())
        })?;
    Ok(Decision {
        action_index,
        policy: reply.policy,
        confidence: reply.confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_hot(idx: usize) -> EvalReply {
        let n = labels::count();
        let mut policy = vec![0.0; n];
        policy[idx] = 1.0;
        EvalReply {
            policy,
            confidence: vec![0.25; n],
        }
    }

    #[test]
    fn test_decide_samples_the_only_action() {
        let decision = decide(one_hot(42)).unwrap();
        assert_eq!(decision.action_index, 42);
        assert_eq!(decision.confidence[42], 0.25);
    }

    #[test]
    fn test_decide_rejects_short_vectors() {
        let reply = EvalReply {
            policy: vec![1.0; 3],
            confidence: vec![0.0; 3],
        };
        assert!(matches!(
            decide(reply),
            Err(ServeError::EvaluationFailed(_))
        ));
    }

    #[test]
    fn test_decide_rejects_empty_mass() {
        let n = labels::count();
        let reply = EvalReply {
            policy: vec![0.0; n],
            confidence: vec![0.0; n],
        };
        assert!(matches!(
            decide(reply),
            Err(ServeError::EvaluationFailed(_))
        ));
    }
}

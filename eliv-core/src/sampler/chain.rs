//! Chain state and posterior summaries.

use serde::{Deserialize, Serialize};

/// Current point of the Markov chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainState {
    /// Coefficient vector β
    pub beta: Vec<f64>,
    /// Cached potential U(β)
    pub potential: f64,
    /// Calibrated multiplier λ(β)
    pub lambda: Vec<f64>,
}

/// Posterior mean over the trailing window and acceptance rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosteriorSummary {
    /// Mean of the last `window` recorded draws
    pub mean: Vec<f64>,
    /// Accepted proposals / chain steps
    pub acceptance_rate: f64,
}

/// Summarize a chain history.
///
/// `history` holds the starting point followed by one draw per step, so
/// `window` may be at most `history.len()`.
pub fn posterior_summary(history: &[Vec<f64>], window: usize, accepted: usize, steps: usize) -> PosteriorSummary {
    assert!(window >= 1 && window <= history.len());
    let p = history[0].len();

    let tail = &history[history.len() - window..];
    let mut mean = vec![0.0; p];
    for draw in tail {
        for (m, b) in mean.iter_mut().zip(draw) {
            *m += b;
        }
    }
    for m in mean.iter_mut() {
        *m /= window as f64;
    }

    let acceptance_rate = if steps == 0 { 0.0 } else { accepted as f64 / steps as f64 };
    PosteriorSummary { mean, acceptance_rate }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_window_mean() {
        let history = vec![vec![0.0, 10.0], vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 30.0]];
        let s = posterior_summary(&history, 2, 3, 3);
        assert_eq!(s.mean, vec![2.5, 25.0]);
        assert_eq!(s.acceptance_rate, 1.0);

        let all = posterior_summary(&history, 4, 1, 3);
        assert_eq!(all.mean, vec![1.5, 17.5]);
        assert!((all.acceptance_rate - 1.0 / 3.0).abs() < 1e-15);
    }

    #[test]
    fn test_summary_serializes() {
        let s = PosteriorSummary { mean: vec![1.0, 0.5], acceptance_rate: 0.25 };
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"acceptance_rate\":0.25"));
    }
}

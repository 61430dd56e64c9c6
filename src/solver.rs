use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Solver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Pivots smaller than this, relative to the largest matrix entry (or 1
    /// when every entry is smaller), are treated as singular
    pub pivot_epsilon: f64,
    /// Conductance added to a singular pivot's diagonal
    pub perturbation: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            pivot_epsilon: 1e-12,
            perturbation: 1e-12,
        }
    }
}

/// Solver statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolverStats {
    pub size: usize,
    /// Number of pivots that needed a diagonal perturbation
    pub perturbed_pivots: usize,
    pub residual_norm: f64,
    pub solve_time: f64,
}

/// Dense Gaussian elimination with partial pivoting.
///
/// Always produces a solution: a near-zero pivot (an ungrounded island)
/// gets a tiny conductance added instead of failing the solve.
#[derive(Debug, Clone, Default)]
pub struct LinearSolver {
    config: SolverConfig,
}

impl LinearSolver {
    /// Create a new solver with default configuration
    pub fn new() -> Self {
        LinearSolver {
            config: SolverConfig::default(),
        }
    }

    /// Create a new solver with custom configuration
    pub fn with_config(config: SolverConfig) -> Self {
        LinearSolver { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Solve `matrix · x = rhs`
    pub fn solve(&self, matrix: &DMatrix<f64>, rhs: &DVector<f64>) -> (DVector<f64>, SolverStats) {
        let start_time = Instant::now();
        let n = rhs.len();
        debug_assert_eq!(matrix.nrows(), n);
        debug_assert_eq!(matrix.ncols(), n);

        if n == 0 {
            return (DVector::zeros(0), SolverStats::default());
        }

        // Roundoff left in a singular block scales with the largest entry
        let threshold = self.config.pivot_epsilon * matrix.amax().max(1.0);

        let mut a = matrix.clone();
        let mut b = rhs.clone();
        let mut perturbed_pivots = 0;

        for k in 0..n {
            let pivot_row = (k..n)
                .max_by(|&r, &s| a[(r, k)].abs().total_cmp(&a[(s, k)].abs()))
                .unwrap_or(k);
            if pivot_row != k {
                a.swap_rows(k, pivot_row);
                b.swap_rows(k, pivot_row);
            }

            if a[(k, k)].abs() < threshold {
                a[(k, k)] += self.config.perturbation;
                perturbed_pivots += 1;
            }

            let pivot = a[(k, k)];
            for r in (k + 1)..n {
                let factor = a[(r, k)] / pivot;
                if factor == 0.0 {
                    continue;
                }
                a[(r, k)] = 0.0;
                for c in (k + 1)..n {
                    a[(r, c)] -= factor * a[(k, c)];
                }
                b[r] -= factor * b[k];
            }
        }

        let mut x = DVector::zeros(n);
        for k in (0..n).rev() {
            let mut sum = b[k];
            for c in (k + 1)..n {
                sum -= a[(k, c)] * x[c];
            }
            x[k] = sum / a[(k, k)];
        }

        if perturbed_pivots > 0 {
            debug!(
                "Perturbed {} singular pivot(s) in a {}x{} system",
                perturbed_pivots, n, n
            );
        }

        let residual_norm = (matrix * &x - rhs).norm();
        let stats = SolverStats {
            size: n,
            perturbed_pivots,
            residual_norm,
            solve_time: start_time.elapsed().as_secs_f64(),
        };
        (x, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_solve() {
        let solver = LinearSolver::new();

        // [2 1; 1 2] * [x; y] = [3; 3]
        let matrix = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 2.0]);
        let rhs = DVector::from_vec(vec![3.0, 3.0]);

        let (solution, stats) = solver.solve(&matrix, &rhs);

        assert!((solution[0] - 1.0).abs() < 1e-10);
        assert!((solution[1] - 1.0).abs() < 1e-10);
        assert_eq!(stats.perturbed_pivots, 0);
        assert!(stats.residual_norm < 1e-12);
    }

    #[test]
    fn test_zero_leading_entry_needs_pivoting() {
        let solver = LinearSolver::new();
        let matrix = DMatrix::from_row_slice(3, 3, &[0.0, 2.0, 1.0, 1.0, 1.0, 0.0, 3.0, 0.0, 1.0]);
        let expected = DVector::from_vec(vec![1.0, -2.0, 4.0]);
        let rhs = &matrix * &expected;

        let (solution, stats) = solver.solve(&matrix, &rhs);
        assert!((solution - expected).amax() < 1e-12);
        assert_eq!(stats.perturbed_pivots, 0);
    }

    #[test]
    fn test_badly_scaled_system() {
        // Penalty-source scale next to kilo-ohm resistors
        let solver = LinearSolver::new();
        let g = 1e6;
        let matrix = DMatrix::from_row_slice(2, 2, &[g + 1e-3, -1e-3, -1e-3, 2e-3]);
        let rhs = DVector::from_vec(vec![g * 5.0, 0.0]);

        let (solution, _) = solver.solve(&matrix, &rhs);
        assert!((solution[0] - 5.0).abs() < 1e-6);
        assert!((solution[1] - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_singular_system_is_perturbed() {
        // Floating resistor loop: rows sum to zero
        let solver = LinearSolver::new();
        let matrix = DMatrix::from_row_slice(2, 2, &[1e-3, -1e-3, -1e-3, 1e-3]);
        let rhs = DVector::zeros(2);

        let (solution, stats) = solver.solve(&matrix, &rhs);
        assert_eq!(stats.perturbed_pivots, 1);
        assert!(solution.iter().all(|v| v.is_finite()));
        assert_eq!(solution, DVector::zeros(2));
    }

    #[test]
    fn test_singular_block_next_to_penalty_source() {
        // Battery (1e6 penalty) across a 330 + 470 ohm chain with no reference:
        // the block is singular but elimination leaves roundoff, not zero
        let solver = LinearSolver::new();
        let g = 1e6;
        let (g1, g2) = (1.0 / 330.0, 1.0 / 470.0);
        #[rustfmt::skip]
        let matrix = DMatrix::from_row_slice(3, 3, &[
            g + g1, -g1,      -g,
            -g1,    g1 + g2,  -g2,
            -g,     -g2,      g + g2,
        ]);
        let rhs = DVector::from_vec(vec![g * 7.3, 0.0, -g * 7.3]);

        let (solution, stats) = solver.solve(&matrix, &rhs);
        assert_eq!(stats.perturbed_pivots, 1);
        assert!(solution.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_empty_system() {
        let solver = LinearSolver::new();
        let (solution, stats) = solver.solve(&DMatrix::zeros(0, 0), &DVector::zeros(0));
        assert_eq!(solution.len(), 0);
        assert_eq!(stats.size, 0);
    }
}

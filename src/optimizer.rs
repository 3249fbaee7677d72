//! Numerical maximization of a [`LogLikelihood`] objective.
//!
//! The minimizer is treated as a black box over the negative log-likelihood:
//! L-BFGS-B (the `lbfgsb` crate) by default with a Nelder-Mead fallback, or
//! argmin's L-BFGS / Nelder-Mead directly. Gradients come from forward finite
//! differences of the objective.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use argmin::core::{CostFunction, Executor, Gradient, IterState, State, TerminationReason};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::neldermead::NelderMead;
use argmin::solver::quasinewton::LBFGS;
use finitediff::FiniteDiff;
use tracing::{debug, warn};

use crate::error::{Result, TsaError};
use crate::likelihood::LogLikelihood;
use crate::types::Solver;

/// Cost assigned to infeasible parameters.
const PENALTY: f64 = f64::MAX / 2.0;

/// Outcome of one optimizer run, in optimizer space.
#[derive(Debug, Clone)]
pub struct OptimResult {
    pub params: Vec<f64>,
    /// Log-likelihood at `params` (negated best cost).
    pub loglike: f64,
    /// Objective evaluations for L-BFGS-B, iterations for the argmin solvers.
    pub n_iter: u64,
    pub converged: bool,
    pub solver: String,
}

// ---------------------------------------------------------------------------
// argmin adapter
// ---------------------------------------------------------------------------

/// Negative log-likelihood with infeasible points mapped to a finite penalty.
#[derive(Clone)]
struct NegLogLike<L> {
    objective: L,
}

impl<L: LogLikelihood> NegLogLike<L> {
    fn negloglike(&self, x: &[f64]) -> f64 {
        let ll = self.objective.loglike(x);
        if ll.is_finite() {
            -ll
        } else {
            PENALTY
        }
    }

    fn forward_gradient(&self, x: &[f64]) -> Vec<f64> {
        let theta = x.to_vec();
        let f = |p: &Vec<f64>| self.negloglike(p);
        let mut grad = theta.forward_diff(&f);
        for g in grad.iter_mut() {
            if !g.is_finite() || g.abs() > 1e100 {
                *g = 0.0;
            }
        }
        grad
    }
}

impl<L: LogLikelihood> CostFunction for NegLogLike<L> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Vec<f64>) -> std::result::Result<f64, argmin::core::Error> {
        Ok(self.negloglike(param))
    }
}

impl<L: LogLikelihood> Gradient for NegLogLike<L> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, param: &Vec<f64>) -> std::result::Result<Vec<f64>, argmin::core::Error> {
        Ok(self.forward_gradient(param))
    }
}

/// Minimizer outcome in optimizer space: best point, its cost, work done.
struct Run {
    params: Vec<f64>,
    cost: f64,
    n_iter: u64,
    converged: bool,
}

fn failed(solver: &str, e: impl std::fmt::Display) -> TsaError {
    TsaError::OptimizationFailed(format!("{}: {}", solver, e))
}

fn summarize<S>(state: &S, solver: &str) -> Result<Run>
where
    S: State<Param = Vec<f64>, Float = f64>,
{
    let params = state
        .get_best_param()
        .cloned()
        .ok_or_else(|| failed(solver, "no best parameter recorded"))?;
    let reason = state.get_termination_reason();
    Ok(Run {
        params,
        cost: state.get_best_cost(),
        n_iter: state.get_iter(),
        converged: matches!(
            reason,
            Some(TerminationReason::SolverConverged) | Some(TerminationReason::TargetCostReached)
        ),
    })
}

// ---------------------------------------------------------------------------
// L-BFGS
// ---------------------------------------------------------------------------

fn run_lbfgs<L: LogLikelihood>(objective: NegLogLike<L>, start: Vec<f64>, maxiter: u64) -> Result<Run> {
    let solver = LBFGS::new(MoreThuenteLineSearch::new(), 10)
        .with_tolerance_grad(1e-7)
        .and_then(|s| s.with_tolerance_cost(1e-12))
        .map_err(|e| failed("lbfgs", e))?;

    let result = Executor::new(objective, solver)
        .configure(|state: IterState<Vec<f64>, Vec<f64>, (), (), (), f64>| {
            state.param(start).max_iters(maxiter)
        })
        .run()
        .map_err(|e| failed("lbfgs", e))?;
    summarize(result.state(), "lbfgs")
}

// ---------------------------------------------------------------------------
// Nelder-Mead
// ---------------------------------------------------------------------------

/// Initial simplex: the start point plus one vertex per coordinate, moved
/// by 5% of the coordinate (0.00025 for zero entries).
fn initial_simplex(start: &[f64]) -> Vec<Vec<f64>> {
    std::iter::once(start.to_vec())
        .chain((0..start.len()).map(|i| {
            let mut vertex = start.to_vec();
            vertex[i] += if vertex[i].abs() > 1e-8 {
                0.05 * vertex[i]
            } else {
                0.00025
            };
            vertex
        }))
        .collect()
}

fn run_nelder_mead<L: LogLikelihood>(objective: NegLogLike<L>, start: Vec<f64>, maxiter: u64) -> Result<Run> {
    let solver = NelderMead::new(initial_simplex(&start))
        .with_sd_tolerance(1e-8)
        .map_err(|e| failed("nelder-mead", e))?;

    let result = Executor::new(objective, solver)
        .configure(|state: IterState<Vec<f64>, (), (), (), (), f64>| state.max_iters(maxiter))
        .run()
        .map_err(|e| failed("nelder-mead", e))?;
    summarize(result.state(), "nelder-mead")
}

// ---------------------------------------------------------------------------
// L-BFGS-B
// ---------------------------------------------------------------------------

/// L-BFGS-B with memory 30, `pgtol = 1e-7`, `factr = 1e3` and no bounds.
///
/// `maxiter` caps objective evaluations: past the budget the callback
/// returns a zero gradient, which terminates the minimizer, and the run is
/// reported as not converged.
fn run_lbfgsb<L: LogLikelihood + Clone + 'static>(
    objective: &NegLogLike<L>,
    start: Vec<f64>,
    maxiter: u64,
) -> Result<Run> {
    let n = start.len();
    let obj = objective.clone();
    let eval_count = Arc::new(AtomicU64::new(0));
    let eval_count_inner = eval_count.clone();
    let hit_limit = Arc::new(AtomicBool::new(false));
    let hit_limit_inner = hit_limit.clone();

    let evaluate = move |x: &[f64], g: &mut [f64]| -> anyhow::Result<f64> {
        let count = eval_count_inner.load(Ordering::Relaxed);
        if count >= maxiter {
            hit_limit_inner.store(true, Ordering::Relaxed);
            for g_i in g.iter_mut() {
                *g_i = 0.0;
            }
            return Ok(obj.negloglike(x));
        }
        eval_count_inner.fetch_add(1, Ordering::Relaxed);

        let cost = obj.negloglike(x);
        if cost >= PENALTY {
            for g_i in g.iter_mut() {
                *g_i = 0.0;
            }
            return Ok(cost);
        }
        let grad = obj.forward_gradient(x);
        g[..n].copy_from_slice(&grad);
        Ok(cost)
    };

    let param = lbfgsb::LbfgsbParameter {
        m: 30,
        factr: 1e3,
        pgtol: 1e-7,
        iprint: -1,
    };

    let mut problem = lbfgsb::LbfgsbProblem::build(start, evaluate);
    problem.set_bounds(vec![(None, None); n]);

    let mut state = lbfgsb::LbfgsbState::new(problem, param);
    state.minimize().map_err(|e| failed("lbfgsb", e))?;

    Ok(Run {
        params: state.x().to_vec(),
        cost: state.fx(),
        n_iter: eval_count.load(Ordering::Relaxed),
        converged: !hit_limit.load(Ordering::Relaxed),
    })
}

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Maximize `objective` from `start` (optimizer space).
///
/// Non-convergence is reported through [`OptimResult::converged`]; only a
/// solver that cannot run at all yields [`TsaError::OptimizationFailed`].
pub fn maximize<L>(objective: &L, start: Vec<f64>, solver: Solver, maxiter: u64) -> Result<OptimResult>
where
    L: LogLikelihood + Clone + 'static,
{
    if start.len() != objective.n_params() {
        return Err(TsaError::ParamLengthMismatch {
            expected: objective.n_params(),
            got: start.len(),
        });
    }

    let neg = NegLogLike {
        objective: objective.clone(),
    };

    // Nothing to optimize: evaluate once.
    if start.is_empty() || maxiter == 0 {
        let cost = neg.negloglike(&start);
        return Ok(OptimResult {
            params: start,
            loglike: to_loglike(cost),
            n_iter: 0,
            converged: maxiter > 0,
            solver: solver.as_str().to_string(),
        });
    }

    let fallback = |primary: &str, e: TsaError, start: Vec<f64>| {
        warn!(error = %e, "{} failed, falling back to Nelder-Mead", primary);
        run_nelder_mead(neg.clone(), start, maxiter).map(|run| (run, "nelder-mead (fallback)"))
    };
    let (run, used) = match solver {
        Solver::NelderMead => (run_nelder_mead(neg.clone(), start, maxiter)?, "nelder-mead"),
        Solver::Lbfgs => match run_lbfgs(neg.clone(), start.clone(), maxiter) {
            Ok(run) => (run, "lbfgs"),
            Err(e) => fallback("L-BFGS", e, start)?,
        },
        Solver::Lbfgsb => match run_lbfgsb(&neg, start.clone(), maxiter) {
            Ok(run) => (run, "lbfgsb"),
            Err(e) => fallback("L-BFGS-B", e, start)?,
        },
    };
    let Run {
        params,
        cost,
        n_iter,
        converged,
    } = run;

    debug!(solver = %used, n_iter, converged, cost, "optimizer finished");
    if !converged {
        warn!(solver = %used, n_iter, "optimizer did not converge");
    }

    Ok(OptimResult {
        params,
        loglike: to_loglike(cost),
        n_iter,
        converged,
        solver: used.to_string(),
    })
}

fn to_loglike(cost: f64) -> f64 {
    if cost.is_finite() && cost < PENALTY {
        -cost
    } else {
        f64::NEG_INFINITY
    }
}

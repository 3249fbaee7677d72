use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector};

use crate::error::{Result, TsaError};
use crate::initialization::KalmanInit;
use crate::state_space::StateSpace;

/// Treatment of the disturbance variance sigma2.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scale {
    /// sigma2 is known; Q = sigma2 and the initial covariance is expected to
    /// be scaled accordingly (see [`KalmanInit::stationary_scaled`]).
    Known(f64),
    /// sigma2 is profiled out; Q = 1 and the likelihood is evaluated at
    /// `sigma2_hat = (1/n_eff) Σ v²/F`.
    Concentrated,
}

/// Output of the Kalman filter log-likelihood computation.
#[derive(Debug, Clone)]
pub struct KalmanOutput {
    /// Log-likelihood value.
    pub loglike: f64,
    /// Disturbance variance: the known value or sigma2_hat.
    pub scale: f64,
    /// One-step forecast errors v_t for every observation.
    pub innovations: Vec<f64>,
    /// Forecast variances F_t in the units of the recursion (unit Q when concentrated).
    pub innovation_vars: Vec<f64>,
    /// Number of observations contributing to the likelihood (n - burn_in).
    pub n_obs_effective: usize,
}

/// Filter output with the predicted state trajectory.
#[derive(Debug, Clone)]
pub struct FilterOutput {
    pub output: KalmanOutput,
    /// a_{t|t-1} for t = 0..n.
    pub predicted_states: Vec<DVector<f64>>,
    /// a_{n|n-1}, the prediction one step past the sample.
    pub final_state: DVector<f64>,
    /// P_{n|n-1} in the units of the recursion.
    pub final_state_cov: DMatrix<f64>,
}

struct Recursion {
    innovations: Vec<f64>,
    innovation_vars: Vec<f64>,
    sum_log_f: f64,
    sum_v2_f: f64,
    states: Vec<DVector<f64>>,
    final_state: DVector<f64>,
    final_state_cov: DMatrix<f64>,
}

/// Forward recursion shared by [`kalman_loglike`] and [`kalman_filter`].
///
/// The state is updated at every step; only steps `t >= burn_in` add to the
/// likelihood sums.
fn recurse(
    endog: &[f64],
    ss: &StateSpace,
    init: &KalmanInit,
    q: f64,
    burn_in: usize,
    keep_states: bool,
) -> Result<Recursion> {
    let n = endog.len();
    if init.initial_state.len() != ss.k_states || init.initial_state_cov.nrows() != ss.k_states {
        return Err(TsaError::DimensionMismatch(format!(
            "initial state has dimension {}, state space has {}",
            init.initial_state.len(),
            ss.k_states
        )));
    }

    let mut a = init.initial_state.clone();
    let mut p = init.initial_state_cov.clone();

    let t_mat = &ss.transition;
    let z = &ss.design;
    let rqr = ss.rrt() * q;

    let mut innovations = Vec::with_capacity(n);
    let mut innovation_vars = Vec::with_capacity(n);
    let mut states = Vec::with_capacity(if keep_states { n } else { 0 });
    let mut sum_log_f = 0.0;
    let mut sum_v2_f = 0.0;

    for (t, &y_t) in endog.iter().enumerate() {
        if keep_states {
            states.push(a.clone());
        }

        // v_t = y_t - Z' a_{t|t-1}
        let v_t = y_t - z.dot(&a);
        // F_t = Z' P_{t|t-1} Z
        let p_z = &p * z;
        let f_t = z.dot(&p_z);
        if !(f_t > 0.0) || !f_t.is_finite() {
            return Err(TsaError::NonPositiveVariance { t, value: f_t });
        }

        // K = T P Z' / F
        let k_gain = (t_mat * &p_z) / f_t;
        // a_{t+1|t} = T a + K v
        a = t_mat * &a + &k_gain * v_t;
        // P_{t+1|t} = T P L' + R Q R', L = T - K Z'
        let l_mat = t_mat - &k_gain * z.transpose();
        p = t_mat * &p * l_mat.transpose() + &rqr;

        innovations.push(v_t);
        innovation_vars.push(f_t);

        if t >= burn_in {
            sum_log_f += f_t.ln();
            sum_v2_f += v_t * v_t / f_t;
        }
    }

    Ok(Recursion {
        innovations,
        innovation_vars,
        sum_log_f,
        sum_v2_f,
        states,
        final_state: a,
        final_state_cov: p,
    })
}

fn finish(rec: &Recursion, n: usize, burn_in: usize, scale: Scale) -> Result<(f64, f64, usize)> {
    if n <= burn_in {
        return Err(TsaError::InsufficientData {
            n,
            min: burn_in + 1,
        });
    }
    let n_eff = n - burn_in;
    let nf = n_eff as f64;
    let ln_2pi = (2.0 * PI).ln();

    let (loglike, sigma2) = match scale {
        Scale::Known(sigma2) => {
            let ll = -0.5 * nf * ln_2pi - 0.5 * rec.sum_log_f - 0.5 * rec.sum_v2_f;
            (ll, sigma2)
        }
        Scale::Concentrated => {
            let sigma2_hat = rec.sum_v2_f / nf;
            if !(sigma2_hat > 0.0) {
                return Err(TsaError::NonPositiveVariance {
                    t: n - 1,
                    value: sigma2_hat,
                });
            }
            let ll = -0.5 * nf * (ln_2pi + sigma2_hat.ln() + 1.0) - 0.5 * rec.sum_log_f;
            (ll, sigma2_hat)
        }
    };
    Ok((loglike, sigma2, n_eff))
}

fn disturbance_variance(scale: Scale) -> Result<f64> {
    match scale {
        Scale::Known(sigma2) if sigma2 > 0.0 && sigma2.is_finite() => Ok(sigma2),
        Scale::Known(sigma2) => Err(TsaError::InvalidConfig(format!(
            "disturbance variance must be positive, got {}",
            sigma2
        ))),
        Scale::Concentrated => Ok(1.0),
    }
}

/// Exact Gaussian log-likelihood by the prediction error decomposition.
///
/// Known scale:
///   loglike = Σ_{t>=burn} ( -½ ln 2π - ½ ln F_t - ½ v_t²/F_t )
///
/// Concentrated scale:
///   sigma2_hat = (1/n_eff) Σ v_t²/F_t
///   loglike = -n_eff/2 (ln 2π + ln sigma2_hat + 1) - ½ Σ ln F_t
///
/// A non-positive forecast variance aborts the evaluation with
/// [`TsaError::NonPositiveVariance`].
pub fn kalman_loglike(
    endog: &[f64],
    ss: &StateSpace,
    init: &KalmanInit,
    scale: Scale,
    burn_in: usize,
) -> Result<KalmanOutput> {
    let q = disturbance_variance(scale)?;
    let rec = recurse(endog, ss, init, q, burn_in, false)?;
    let (loglike, scale, n_obs_effective) = finish(&rec, endog.len(), burn_in, scale)?;
    Ok(KalmanOutput {
        loglike,
        scale,
        innovations: rec.innovations,
        innovation_vars: rec.innovation_vars,
        n_obs_effective,
    })
}

/// [`kalman_loglike`] that also keeps the predicted state trajectory and the
/// final one-step-ahead state, as used for residuals and forecasting.
pub fn kalman_filter(
    endog: &[f64],
    ss: &StateSpace,
    init: &KalmanInit,
    scale: Scale,
    burn_in: usize,
) -> Result<FilterOutput> {
    let q = disturbance_variance(scale)?;
    let rec = recurse(endog, ss, init, q, burn_in, true)?;
    let (loglike, scale, n_obs_effective) = finish(&rec, endog.len(), burn_in, scale)?;
    Ok(FilterOutput {
        output: KalmanOutput {
            loglike,
            scale,
            innovations: rec.innovations,
            innovation_vars: rec.innovation_vars,
            n_obs_effective,
        },
        predicted_states: rec.states,
        final_state: rec.final_state,
        final_state_cov: rec.final_state_cov,
    })
}

//! Likelihood objectives.
//!
//! Each model variant implements [`LogLikelihood`]: a scalar log-likelihood
//! plus numerical gradient and Hessian. The orchestrators in `arma` and `ar`
//! compose these with the optimizer instead of sharing a base type.

use std::f64::consts::PI;

use finitediff::FiniteDiff;
use nalgebra::{DMatrix, DVector};

use crate::error::{Result, TsaError};
use crate::initialization::KalmanInit;
use crate::kalman::{kalman_loglike, KalmanOutput, Scale};
use crate::params::{constrain_stationary, transform_params, ArmaParams};
use crate::state_space::StateSpace;
use crate::types::{ArmaOrder, Trace};

/// Capability interface shared by the ARMA, CSS-ARMA and AR objectives.
pub trait LogLikelihood {
    /// Length of the parameter vector.
    fn n_params(&self) -> usize;

    /// Log-likelihood at `params`; `-inf` when the parameters are infeasible.
    fn loglike(&self, params: &[f64]) -> f64;

    /// Central-difference score.
    fn gradient(&self, params: &[f64]) -> Vec<f64> {
        let x = params.to_vec();
        let f = |x: &Vec<f64>| self.loglike(x);
        x.central_diff(&f)
    }

    /// Numerical Hessian from second-order function differences.
    fn hessian(&self, params: &[f64]) -> DMatrix<f64> {
        approx_hessian(&|x: &[f64]| self.loglike(x), params)
    }
}

/// Four-point second differences with step `eps^(1/4) * max(|x_i|, 0.1)`.
///
/// H_ij = [f(x+h_i+h_j) - f(x+h_i-h_j) - f(x-h_i+h_j) + f(x-h_i-h_j)] / (4 h_i h_j)
pub fn approx_hessian(f: &dyn Fn(&[f64]) -> f64, x: &[f64]) -> DMatrix<f64> {
    let n = x.len();
    let base = f64::EPSILON.powf(0.25);
    let h: Vec<f64> = x.iter().map(|v| base * v.abs().max(0.1)).collect();
    let mut hess = DMatrix::<f64>::zeros(n, n);
    let mut work = x.to_vec();

    let eval = |work: &mut Vec<f64>, i: usize, si: f64, j: usize, sj: f64| {
        work[i] += si * h[i];
        work[j] += sj * h[j];
        let v = f(work.as_slice());
        work[i] = x[i];
        work[j] = x[j];
        v
    };

    for i in 0..n {
        for j in i..n {
            let fpp = eval(&mut work, i, 1.0, j, 1.0);
            let fpm = eval(&mut work, i, 1.0, j, -1.0);
            let fmp = eval(&mut work, i, -1.0, j, 1.0);
            let fmm = eval(&mut work, i, -1.0, j, -1.0);
            let v = (fpp - fpm - fmp + fmm) / (4.0 * h[i] * h[j]);
            hess[(i, j)] = v;
            hess[(j, i)] = v;
        }
    }
    hess
}

/// `y - X beta`, or a copy of `y` when there are no regressors.
pub fn regression_residual(endog: &[f64], exog: Option<&DMatrix<f64>>, beta: &[f64]) -> Vec<f64> {
    match exog {
        Some(x) if !beta.is_empty() => {
            let fitted = x * DVector::from_column_slice(beta);
            endog.iter().zip(fitted.iter()).map(|(y, f)| y - f).collect()
        }
        _ => endog.to_vec(),
    }
}

fn record(trace: &Option<Trace>, params: &[f64], ll: f64) {
    if let Some(trace) = trace {
        trace.record(params, ll);
    }
}

// ---------------------------------------------------------------------------
// Exact ARMA likelihood
// ---------------------------------------------------------------------------

/// Exact ARMA(p, q) log-likelihood with regression errors, evaluated by the
/// Kalman filter on `y - X beta` with the scale concentrated out.
#[derive(Debug, Clone)]
pub struct ExactArma {
    pub endog: Vec<f64>,
    pub exog: Option<DMatrix<f64>>,
    pub order: ArmaOrder,
    pub k: usize,
    /// Parameters arrive in optimizer space and are transformed first.
    pub transparams: bool,
    pub burn_in: usize,
    pub trace: Option<Trace>,
}

impl ExactArma {
    pub fn new(endog: Vec<f64>, exog: Option<DMatrix<f64>>, order: ArmaOrder) -> Self {
        let k = exog.as_ref().map_or(0, |x| x.ncols());
        Self {
            endog,
            exog,
            order,
            k,
            transparams: false,
            burn_in: 0,
            trace: None,
        }
    }

    pub fn with_transparams(mut self, transparams: bool) -> Self {
        self.transparams = transparams;
        self
    }

    pub fn with_burn_in(mut self, burn_in: usize) -> Self {
        self.burn_in = burn_in;
        self
    }

    pub fn with_trace(mut self, trace: Option<Trace>) -> Self {
        self.trace = trace;
        self
    }

    /// Coefficients in model space, applying the transform when enabled.
    pub fn coefficients(&self, params: &[f64]) -> Result<ArmaParams> {
        let (p, q, k) = (self.order.p, self.order.q, self.k);
        let flat = if self.transparams {
            transform_params(params, p, q, k)?
        } else {
            params.to_vec()
        };
        ArmaParams::from_flat(&flat, p, q, k)
    }

    /// Full Kalman output at `params`.
    pub fn evaluate(&self, params: &[f64]) -> Result<KalmanOutput> {
        let coeffs = self.coefficients(params)?;
        let y = regression_residual(&self.endog, self.exog.as_ref(), &coeffs.exog_coeffs);
        let ss = StateSpace::arma(&coeffs.ar_coeffs, &coeffs.ma_coeffs)?;
        let init = KalmanInit::stationary(&ss)?;
        kalman_loglike(&y, &ss, &init, Scale::Concentrated, self.burn_in)
    }
}

impl LogLikelihood for ExactArma {
    fn n_params(&self) -> usize {
        self.k + self.order.p + self.order.q
    }

    fn loglike(&self, params: &[f64]) -> f64 {
        let ll = match self.evaluate(params) {
            Ok(out) if out.loglike.is_finite() => out.loglike,
            _ => f64::NEG_INFINITY,
        };
        record(&self.trace, params, ll);
        ll
    }
}

// ---------------------------------------------------------------------------
// Conditional sum of squares
// ---------------------------------------------------------------------------

/// Result of a CSS evaluation.
#[derive(Debug, Clone)]
pub struct CssOutput {
    pub loglike: f64,
    pub sigma2: f64,
    /// Residuals e_t for t = p..n.
    pub errors: Vec<f64>,
}

/// Conditional sum of squares ARMA log-likelihood.
///
/// Residuals follow the ARMA difference equation from t = p with q
/// presample errors set to zero:
///   e_t = y_t - Σ φ_i y_{t-i} - Σ θ_j e_{t-j}
/// and the likelihood is Gaussian with `sigma2 = ssr / (n - p)`.
#[derive(Debug, Clone)]
pub struct CssArma {
    pub endog: Vec<f64>,
    pub exog: Option<DMatrix<f64>>,
    pub order: ArmaOrder,
    pub k: usize,
    pub transparams: bool,
    pub trace: Option<Trace>,
}

impl CssArma {
    pub fn new(endog: Vec<f64>, exog: Option<DMatrix<f64>>, order: ArmaOrder) -> Self {
        let k = exog.as_ref().map_or(0, |x| x.ncols());
        Self {
            endog,
            exog,
            order,
            k,
            transparams: false,
            trace: None,
        }
    }

    pub fn with_transparams(mut self, transparams: bool) -> Self {
        self.transparams = transparams;
        self
    }

    pub fn with_trace(mut self, trace: Option<Trace>) -> Self {
        self.trace = trace;
        self
    }

    pub fn evaluate(&self, params: &[f64]) -> Result<CssOutput> {
        let (p, q, k) = (self.order.p, self.order.q, self.k);
        let flat = if self.transparams {
            transform_params(params, p, q, k)?
        } else {
            params.to_vec()
        };
        let coeffs = ArmaParams::from_flat(&flat, p, q, k)?;
        let y = regression_residual(&self.endog, self.exog.as_ref(), &coeffs.exog_coeffs);
        let n = y.len();
        if n <= p {
            return Err(TsaError::InsufficientData { n, min: p + 1 });
        }

        // errors[0..q] is the zero presample; errors[q + (t - p)] is e_t
        let mut errors = vec![0.0; q];
        errors.reserve(n - p);
        for t in p..n {
            let idx = errors.len();
            let mut e = y[t];
            for (i, phi) in coeffs.ar_coeffs.iter().enumerate() {
                e -= phi * y[t - 1 - i];
            }
            for (j, theta) in coeffs.ma_coeffs.iter().enumerate() {
                e -= theta * errors[idx - 1 - j];
            }
            errors.push(e);
        }
        let errors = errors.split_off(q);

        let ssr: f64 = errors.iter().map(|e| e * e).sum();
        let nf = (n - p) as f64;
        let sigma2 = ssr / nf;
        if !(sigma2 > 0.0) || !sigma2.is_finite() {
            return Err(TsaError::NonPositiveVariance {
                t: n - 1,
                value: sigma2,
            });
        }
        let loglike = -0.5 * nf * ((2.0 * PI).ln() + sigma2.ln()) - ssr / (2.0 * sigma2);
        Ok(CssOutput {
            loglike,
            sigma2,
            errors,
        })
    }
}

impl LogLikelihood for CssArma {
    fn n_params(&self) -> usize {
        self.k + self.order.p + self.order.q
    }

    fn loglike(&self, params: &[f64]) -> f64 {
        let ll = match self.evaluate(params) {
            Ok(out) => out.loglike,
            Err(_) => f64::NEG_INFINITY,
        };
        record(&self.trace, params, ll);
        ll
    }
}

// ---------------------------------------------------------------------------
// Exact AR likelihood
// ---------------------------------------------------------------------------

/// Exact AR(p) log-likelihood with an optional constant.
///
/// Parameters are `[c?, φ_1..φ_p]`. The series is centred at the process
/// mean `μ = c / (1 - Σφ)` and filtered with the scale concentrated out.
#[derive(Debug, Clone)]
pub struct ExactAr {
    pub endog: Vec<f64>,
    pub p: usize,
    /// 0 or 1.
    pub k_trend: usize,
    pub transparams: bool,
    pub trace: Option<Trace>,
}

impl ExactAr {
    pub fn new(endog: Vec<f64>, p: usize, k_trend: usize) -> Self {
        Self {
            endog,
            p,
            k_trend,
            transparams: false,
            trace: None,
        }
    }

    pub fn with_transparams(mut self, transparams: bool) -> Self {
        self.transparams = transparams;
        self
    }

    pub fn with_trace(mut self, trace: Option<Trace>) -> Self {
        self.trace = trace;
        self
    }

    /// `[c?, φ]` in model space.
    pub fn coefficients(&self, params: &[f64]) -> Result<Vec<f64>> {
        let expected = self.k_trend + self.p;
        if params.len() != expected {
            return Err(TsaError::ParamLengthMismatch {
                expected,
                got: params.len(),
            });
        }
        let mut out = params[..self.k_trend].to_vec();
        if self.transparams {
            out.extend(constrain_stationary(&params[self.k_trend..]));
        } else {
            out.extend_from_slice(&params[self.k_trend..]);
        }
        Ok(out)
    }

    pub fn evaluate(&self, params: &[f64]) -> Result<KalmanOutput> {
        let coeffs = self.coefficients(params)?;
        let ar = &coeffs[self.k_trend..];
        let mu = if self.k_trend == 1 {
            let denom = 1.0 - ar.iter().sum::<f64>();
            if denom.abs() < 1e-12 {
                return Err(TsaError::BoundaryParameter);
            }
            coeffs[0] / denom
        } else {
            0.0
        };
        let y: Vec<f64> = self.endog.iter().map(|v| v - mu).collect();
        let ss = StateSpace::arma(ar, &[])?;
        let init = KalmanInit::stationary(&ss)?;
        kalman_loglike(&y, &ss, &init, Scale::Concentrated, 0)
    }
}

impl LogLikelihood for ExactAr {
    fn n_params(&self) -> usize {
        self.k_trend + self.p
    }

    fn loglike(&self, params: &[f64]) -> f64 {
        let ll = match self.evaluate(params) {
            Ok(out) if out.loglike.is_finite() => out.loglike,
            _ => f64::NEG_INFINITY,
        };
        record(&self.trace, params, ll);
        ll
    }
}

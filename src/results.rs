//! Fitted ARMA model.
//!
//! Derived statistics that need extra likelihood evaluations (the Hessian
//! and the final filter pass) are computed on first access and cached with
//! the result.

use std::sync::OnceLock;

use nalgebra::{Complex, DMatrix, DVector};
use tracing::warn;

use crate::error::{Result, TsaError};
use crate::forecast::{compute_residuals, forecast, ForecastResult, ResidualOutput};
use crate::initialization::KalmanInit;
use crate::kalman::{kalman_filter, FilterOutput, Scale};
use crate::likelihood::{regression_residual, CssArma, ExactArma, LogLikelihood};
use crate::polynomial::{ar_roots, is_invertible, is_stationary, ma_roots};
use crate::regression::trend_columns_from;
use crate::state_space::StateSpace;
use crate::types::{ArmaMethod, ArmaOrder, Trend};

#[derive(Debug, Clone)]
pub struct ArmaResults {
    /// `[exog(k) | ar(p) | ma(q)]` in coefficient space. The first
    /// `trend.k_trend()` exogenous entries are the trend coefficients.
    pub params: Vec<f64>,
    pub order: ArmaOrder,
    pub trend: Trend,
    /// Regression columns including trend terms.
    pub k: usize,
    pub method: ArmaMethod,
    pub loglike: f64,
    pub sigma2: f64,
    pub n_obs: usize,
    pub n_iter: u64,
    pub converged: bool,
    pub solver: String,
    pub burn_in: usize,
    endog: Vec<f64>,
    exog: Option<DMatrix<f64>>,
    cov: OnceLock<Result<DMatrix<f64>>>,
    filter: OnceLock<Result<FilterOutput>>,
}

impl ArmaResults {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        params: Vec<f64>,
        order: ArmaOrder,
        trend: Trend,
        method: ArmaMethod,
        loglike: f64,
        sigma2: f64,
        n_iter: u64,
        converged: bool,
        solver: String,
        burn_in: usize,
        endog: Vec<f64>,
        exog: Option<DMatrix<f64>>,
    ) -> Self {
        let k = exog.as_ref().map_or(0, |x| x.ncols());
        Self {
            params,
            order,
            trend,
            k,
            method,
            loglike,
            sigma2,
            n_obs: endog.len(),
            n_iter,
            converged,
            solver,
            burn_in,
            endog,
            exog,
            cov: OnceLock::new(),
            filter: OnceLock::new(),
        }
    }

    pub fn exogparams(&self) -> &[f64] {
        &self.params[..self.k]
    }

    pub fn arparams(&self) -> &[f64] {
        &self.params[self.k..self.k + self.order.p]
    }

    pub fn maparams(&self) -> &[f64] {
        &self.params[self.k + self.order.p..]
    }

    /// Roots of `1 - Σ φ_i z^i`.
    pub fn arroots(&self) -> Vec<Complex<f64>> {
        ar_roots(self.arparams())
    }

    /// Roots of `1 + Σ θ_i z^i`.
    pub fn maroots(&self) -> Vec<Complex<f64>> {
        ma_roots(self.maparams())
    }

    pub fn is_stationary(&self) -> bool {
        is_stationary(self.arparams())
    }

    pub fn is_invertible(&self) -> bool {
        is_invertible(self.maparams())
    }

    // ---------------------------------------------------------------------
    // Information criteria
    // ---------------------------------------------------------------------

    /// Estimated parameters including sigma2.
    pub fn n_params(&self) -> usize {
        self.k + self.order.p + self.order.q + 1
    }

    pub fn aic(&self) -> f64 {
        -2.0 * self.loglike + 2.0 * self.n_params() as f64
    }

    /// Observations whose terms enter the log-likelihood.
    pub fn n_obs_effective(&self) -> usize {
        self.n_obs.saturating_sub(self.burn_in)
    }

    pub fn bic(&self) -> f64 {
        -2.0 * self.loglike + self.n_params() as f64 * (self.n_obs_effective() as f64).ln()
    }

    pub fn hqic(&self) -> f64 {
        let n = self.n_obs_effective() as f64;
        -2.0 * self.loglike + 2.0 * self.n_params() as f64 * n.ln().ln()
    }

    // ---------------------------------------------------------------------
    // Inference
    // ---------------------------------------------------------------------

    /// `(-H)^{-1}` with H the numerical Hessian of the fitted objective
    /// in coefficient space.
    pub fn cov_params(&self) -> Result<DMatrix<f64>> {
        self.cov.get_or_init(|| self.compute_cov()).clone()
    }

    fn compute_cov(&self) -> Result<DMatrix<f64>> {
        let endog = self.endog.clone();
        let exog = self.exog.clone();
        let hess = match self.method {
            ArmaMethod::Css => CssArma::new(endog, exog, self.order).hessian(&self.params),
            ArmaMethod::Mle | ArmaMethod::CssMle => ExactArma::new(endog, exog, self.order)
                .with_burn_in(self.burn_in)
                .hessian(&self.params),
        };
        if hess.iter().any(|v| !v.is_finite()) {
            warn!("Hessian is not finite at the estimate");
            return Err(TsaError::SingularMatrix(
                "non-finite Hessian of the log-likelihood".into(),
            ));
        }
        (-hess).try_inverse().ok_or_else(|| {
            warn!("Hessian is singular at the estimate");
            TsaError::SingularMatrix("Hessian of the log-likelihood".into())
        })
    }

    pub fn bse(&self) -> Result<Vec<f64>> {
        standard_errors(&self.cov_params()?)
    }

    pub fn tvalues(&self) -> Result<Vec<f64>> {
        let bse = self.bse()?;
        Ok(self.params.iter().zip(bse.iter()).map(|(b, s)| b / s).collect())
    }

    // ---------------------------------------------------------------------
    // Filter-based output
    // ---------------------------------------------------------------------

    fn state_space(&self) -> Result<StateSpace> {
        StateSpace::arma(self.arparams(), self.maparams())
    }

    /// Kalman pass over `y - X beta` at the estimate, in units of sigma2.
    pub fn filter(&self) -> Result<&FilterOutput> {
        self.filter
            .get_or_init(|| {
                let ss = self.state_space()?;
                let init = KalmanInit::stationary(&ss)?;
                let y = regression_residual(&self.endog, self.exog.as_ref(), self.exogparams());
                kalman_filter(&y, &ss, &init, Scale::Concentrated, self.burn_in)
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    /// One-step forecast errors.
    pub fn resid(&self) -> Result<Vec<f64>> {
        Ok(self.filter()?.output.innovations.clone())
    }

    pub fn standardized_resid(&self) -> Result<ResidualOutput> {
        Ok(compute_residuals(&self.filter()?.output, self.sigma2))
    }

    /// `y - resid`: regression mean plus the one-step ARMA prediction.
    pub fn fittedvalues(&self) -> Result<Vec<f64>> {
        let resid = &self.filter()?.output.innovations;
        Ok(self
            .endog
            .iter()
            .zip(resid.iter())
            .map(|(y, v)| y - v)
            .collect())
    }

    /// Regression mean for the `steps` periods after the sample.
    ///
    /// `future_exog` is column-major and must cover every step for each
    /// user regressor.
    fn future_regression(&self, steps: usize, future_exog: Option<&[Vec<f64>]>) -> Result<Vec<f64>> {
        if self.k == 0 {
            return Ok(vec![]);
        }
        let kt = self.trend.k_trend();
        let n_exog = self.k - kt;
        let cols = future_exog.unwrap_or(&[]);
        if cols.len() != n_exog {
            return Err(TsaError::DimensionMismatch(format!(
                "model has {} exogenous regressors, {} future columns supplied",
                n_exog,
                cols.len()
            )));
        }
        if let Some(short) = cols.iter().position(|c| c.len() < steps) {
            return Err(TsaError::DimensionMismatch(format!(
                "future exog column {} has {} rows, {} steps requested",
                short,
                cols[short].len(),
                steps
            )));
        }

        let trend = trend_columns_from(self.trend, self.n_obs + 1, steps);
        let beta = self.exogparams();
        let trend_beta = DVector::from_column_slice(&beta[..kt]);
        let mut mean: Vec<f64> = (&trend * trend_beta).iter().copied().collect();
        for (col, b) in cols.iter().zip(beta[kt..].iter()) {
            for (m, x) in mean.iter_mut().zip(col.iter()) {
                *m += b * x;
            }
        }
        Ok(mean)
    }

    /// H-step forecasts with `1 - alpha` normal intervals.
    pub fn forecast(
        &self,
        steps: usize,
        alpha: f64,
        future_exog: Option<&[Vec<f64>]>,
    ) -> Result<ForecastResult> {
        let regression = self.future_regression(steps, future_exog)?;
        let ss = self.state_space()?;
        forecast(&ss, self.filter()?, self.sigma2, steps, alpha, &regression)
    }
}

/// Square roots of the covariance diagonal. A non-positive variance means
/// the Hessian is not negative definite at the estimate.
pub(crate) fn standard_errors(cov: &DMatrix<f64>) -> Result<Vec<f64>> {
    let diag = cov.diagonal();
    if let Some(i) = diag.iter().position(|v| !(*v > 0.0) || !v.is_finite()) {
        warn!(index = i, variance = diag[i], "non-positive parameter variance");
        return Err(TsaError::SingularMatrix(format!(
            "parameter variance {} at index {} is not positive",
            diag[i], i
        )));
    }
    Ok(diag.iter().map(|v| v.sqrt()).collect())
}

//! ARMA(p, q) model with regression errors and its fit orchestrator.
//!
//! Stages of [`ArmaModel::fit`]:
//! 1. start parameters (user supplied or Hannan-Rissanen)
//! 2. CSS pre-fit (`css-mle` without user start values), or the CSS fit itself
//! 3. exact likelihood maximization (`mle`, `css-mle`)
//! 4. packaging into [`ArmaResults`]

use nalgebra::DMatrix;
use tracing::{debug, warn};

use crate::error::{Result, TsaError};
use crate::initialization::KalmanInit;
use crate::kalman::{kalman_loglike, Scale};
use crate::likelihood::{regression_residual, CssArma, ExactArma, LogLikelihood};
use crate::optimizer::{maximize, OptimResult};
use crate::params::{invtransform_params, transform_params, ArmaParams};
use crate::regression::design_matrix;
use crate::results::ArmaResults;
use crate::start_params::hannan_rissanen;
use crate::state_space::StateSpace;
use crate::types::{ArmaConfig, ArmaMethod};

#[derive(Debug, Clone)]
pub struct ArmaModel {
    endog: Vec<f64>,
    /// Column-major user regressors, `exog[j][t]`.
    exog: Option<Vec<Vec<f64>>>,
}

impl ArmaModel {
    pub fn new(endog: &[f64], exog: Option<&[Vec<f64>]>) -> Result<Self> {
        if endog.is_empty() {
            return Err(TsaError::InsufficientData { n: 0, min: 1 });
        }
        if endog.iter().any(|v| !v.is_finite()) {
            return Err(TsaError::NonFiniteData);
        }
        // validates row counts and finiteness of the regressors
        design_matrix(crate::types::Trend::None, exog, endog.len())?;
        Ok(Self {
            endog: endog.to_vec(),
            exog: exog.map(|cols| cols.to_vec()),
        })
    }

    pub fn nobs(&self) -> usize {
        self.endog.len()
    }

    /// Trend and user regressors for `config`.
    fn regressors(&self, config: &ArmaConfig) -> Result<Option<DMatrix<f64>>> {
        design_matrix(config.trend, self.exog.as_deref(), self.endog.len())
    }

    /// Size of `[exog | ar | ma]` under `config`.
    pub fn n_params(&self, config: &ArmaConfig) -> usize {
        let n_exog = self.exog.as_ref().map_or(0, |cols| cols.len());
        config.trend.k_trend() + n_exog + config.order.p + config.order.q
    }

    /// Hannan-Rissanen starting values used by [`ArmaModel::fit`] when none
    /// are supplied.
    pub fn start_params(&self, config: &ArmaConfig) -> Result<Vec<f64>> {
        let x = self.regressors(config)?;
        hannan_rissanen(&self.endog, x.as_ref(), config.order)
    }

    /// Exact log-likelihood at coefficient-space `params`.
    ///
    /// With `sigma2 = None` the scale is concentrated out; otherwise the
    /// known-variance form is used.
    pub fn loglike(&self, config: &ArmaConfig, params: &[f64], sigma2: Option<f64>) -> Result<f64> {
        let x = self.regressors(config)?;
        let k = x.as_ref().map_or(0, |x| x.ncols());
        let coeffs = ArmaParams::from_flat(params, config.order.p, config.order.q, k)?;
        let y = regression_residual(&self.endog, x.as_ref(), &coeffs.exog_coeffs);
        let ss = StateSpace::arma(&coeffs.ar_coeffs, &coeffs.ma_coeffs)?;
        let out = match sigma2 {
            Some(s2) => {
                let init = KalmanInit::stationary_scaled(&ss, s2)?;
                kalman_loglike(&y, &ss, &init, Scale::Known(s2), config.burn_in)?
            }
            None => {
                let init = KalmanInit::stationary(&ss)?;
                kalman_loglike(&y, &ss, &init, Scale::Concentrated, config.burn_in)?
            }
        };
        Ok(out.loglike)
    }

    /// Package coefficient-space `params` as a result without optimizing.
    pub fn results_at(&self, config: &ArmaConfig, params: &[f64]) -> Result<ArmaResults> {
        let x = self.regressors(config)?;
        let (loglike, sigma2) = self.evaluate_final(config, x.as_ref(), params)?;
        Ok(ArmaResults::new(
            params.to_vec(),
            config.order,
            config.trend,
            config.method,
            loglike,
            sigma2,
            0,
            true,
            "none".to_string(),
            config.burn_in,
            self.endog.clone(),
            x,
        ))
    }

    /// Fit the model. `start_params` are in coefficient space.
    #[tracing::instrument(skip_all, fields(
        nobs = self.endog.len(),
        p = config.order.p,
        q = config.order.q,
        method = config.method.as_str(),
    ))]
    pub fn fit(&self, config: &ArmaConfig, start_params: Option<&[f64]>) -> Result<ArmaResults> {
        let (p, q) = (config.order.p, config.order.q);
        let x = self.regressors(config)?;
        let k = x.as_ref().map_or(0, |x| x.ncols());
        let n = self.endog.len();
        let min = config.burn_in + k + p + q + 1;
        if n < min {
            return Err(TsaError::InsufficientData { n, min });
        }

        // 1. start parameters
        let user_start = start_params.is_some();
        let start = match start_params {
            Some(sp) => {
                if sp.len() != k + p + q {
                    return Err(TsaError::ParamLengthMismatch {
                        expected: k + p + q,
                        got: sp.len(),
                    });
                }
                if sp.iter().any(|v| !v.is_finite()) {
                    return Err(TsaError::NonFiniteData);
                }
                sp.to_vec()
            }
            None => hannan_rissanen(&self.endog, x.as_ref(), config.order)?,
        };
        debug!(?start, user_start, "start parameters");

        let css = CssArma::new(self.endog.clone(), x.clone(), config.order)
            .with_transparams(config.transparams)
            .with_trace(config.trace.clone());

        let (params, opt) = match config.method {
            ArmaMethod::Css => self.optimize(&css, &start, config, k)?,
            ArmaMethod::Mle | ArmaMethod::CssMle => {
                let exact = ExactArma::new(self.endog.clone(), x.clone(), config.order)
                    .with_transparams(config.transparams)
                    .with_burn_in(config.burn_in)
                    .with_trace(config.trace.clone());

                // 2. CSS pre-fit
                let mle_start = if config.method == ArmaMethod::CssMle && !user_start {
                    debug!("CSS pre-fit");
                    match self.optimize(&css, &start, config, k) {
                        Ok((css_params, _)) if self.is_feasible(&exact, &css_params, config, k) => {
                            css_params
                        }
                        Ok(_) => {
                            warn!("CSS estimates infeasible for the exact likelihood, using Hannan-Rissanen values");
                            start
                        }
                        Err(e) => {
                            warn!(error = %e, "CSS pre-fit failed, using Hannan-Rissanen values");
                            start
                        }
                    }
                } else {
                    start
                };

                // 3. exact likelihood
                debug!("exact MLE");
                self.optimize(&exact, &mle_start, config, k)?
            }
        };

        // 4. packaging
        let (loglike, sigma2) = self.evaluate_final(config, x.as_ref(), &params)?;
        debug!(loglike, sigma2, n_iter = opt.n_iter, converged = opt.converged, "fit finished");

        Ok(ArmaResults::new(
            params,
            config.order,
            config.trend,
            config.method,
            loglike,
            sigma2,
            opt.n_iter,
            opt.converged,
            opt.solver,
            config.burn_in,
            self.endog.clone(),
            x,
        ))
    }

    fn is_feasible(&self, exact: &ExactArma, params: &[f64], config: &ArmaConfig, k: usize) -> bool {
        let point = if config.transparams {
            match invtransform_params(params, config.order.p, config.order.q, k) {
                Ok(u) => u,
                Err(_) => return false,
            }
        } else {
            params.to_vec()
        };
        exact.loglike(&point).is_finite()
    }

    /// Maximize `objective` from coefficient-space `start` and map the
    /// optimum back to coefficient space.
    fn optimize<L>(
        &self,
        objective: &L,
        start: &[f64],
        config: &ArmaConfig,
        k: usize,
    ) -> Result<(Vec<f64>, OptimResult)>
    where
        L: LogLikelihood + Clone + 'static,
    {
        let (p, q) = (config.order.p, config.order.q);
        let point = if config.transparams {
            invtransform_params(start, p, q, k)?
        } else {
            start.to_vec()
        };
        if !objective.loglike(&point).is_finite() {
            return Err(TsaError::InfeasibleStart);
        }
        let opt = maximize(objective, point, config.solver, config.maxiter)?;
        let params = if config.transparams {
            transform_params(&opt.params, p, q, k)?
        } else {
            opt.params.clone()
        };
        Ok((params, opt))
    }

    /// Reported log-likelihood and sigma2 at coefficient-space `params`.
    fn evaluate_final(
        &self,
        config: &ArmaConfig,
        x: Option<&DMatrix<f64>>,
        params: &[f64],
    ) -> Result<(f64, f64)> {
        let x = x.cloned();
        match config.method {
            ArmaMethod::Css => {
                let out = CssArma::new(self.endog.clone(), x, config.order).evaluate(params)?;
                Ok((out.loglike, out.sigma2))
            }
            ArmaMethod::Mle | ArmaMethod::CssMle => {
                let out = ExactArma::new(self.endog.clone(), x, config.order)
                    .with_burn_in(config.burn_in)
                    .evaluate(params)?;
                Ok((out.loglike, out.scale))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArmaOrder, Solver, Trace, Trend};
    use std::f64::consts::PI;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn normals(n: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        let mut next = || {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 11) as f64 + 0.5) / (1u64 << 53) as f64
        };
        (0..n)
            .map(|_| {
                let u1 = next();
                let u2 = next();
                (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
            })
            .collect()
    }

    fn simulate_arma11(n: usize, mu: f64, phi: f64, theta: f64, seed: u64) -> Vec<f64> {
        let e = normals(n + 200, seed);
        let mut y = vec![0.0; n + 200];
        for t in 1..n + 200 {
            y[t] = phi * y[t - 1] + e[t] + theta * e[t - 1];
        }
        y.split_off(200).into_iter().map(|v| v + mu).collect()
    }

    fn make_config(p: usize, q: usize, method: ArmaMethod) -> ArmaConfig {
        ArmaConfig {
            order: ArmaOrder::new(p, q),
            method,
            ..ArmaConfig::default()
        }
    }

    #[test]
    fn test_css_mle_recovers_arma11() {
        let y = simulate_arma11(800, 3.0, 0.6, 0.3, 21);
        let model = ArmaModel::new(&y, None).unwrap();
        let res = model.fit(&make_config(1, 1, ArmaMethod::CssMle), None).unwrap();
        assert_eq!(res.params.len(), 3);
        assert!((res.exogparams()[0] - 3.0).abs() < 0.4, "{:?}", res.params);
        assert!((res.arparams()[0] - 0.6).abs() < 0.15, "{:?}", res.params);
        assert!((res.maparams()[0] - 0.3).abs() < 0.15, "{:?}", res.params);
        assert!((res.sigma2 - 1.0).abs() < 0.15);
        assert!(res.is_stationary() && res.is_invertible());
    }

    #[test]
    fn test_reported_loglike_is_exact() {
        let y = simulate_arma11(300, 0.0, 0.5, 0.0, 22);
        let model = ArmaModel::new(&y, None).unwrap();
        let config = ArmaConfig {
            trend: Trend::None,
            ..make_config(1, 0, ArmaMethod::Mle)
        };
        let res = model.fit(&config, None).unwrap();
        let ll = model.loglike(&config, &res.params, None).unwrap();
        assert!((res.loglike - ll).abs() < 1e-10);
        // known-scale form at sigma2_hat equals the concentrated value
        let known = model.loglike(&config, &res.params, Some(res.sigma2)).unwrap();
        assert!((known - ll).abs() < 1e-8);
    }

    #[test]
    fn test_css_reports_css_variance() {
        let y = simulate_arma11(400, 0.0, 0.5, 0.0, 23);
        let model = ArmaModel::new(&y, None).unwrap();
        let config = ArmaConfig {
            trend: Trend::None,
            ..make_config(1, 0, ArmaMethod::Css)
        };
        let res = model.fit(&config, None).unwrap();
        // AR(1) CSS is least squares on the lag
        let sxy: f64 = (1..400).map(|t| y[t] * y[t - 1]).sum();
        let sxx: f64 = (1..400).map(|t| y[t - 1] * y[t - 1]).sum();
        assert!((res.arparams()[0] - sxy / sxx).abs() < 1e-3, "{:?}", res.params);
        let ssr: f64 = (1..400).map(|t| (y[t] - res.arparams()[0] * y[t - 1]).powi(2)).sum();
        assert!((res.sigma2 - ssr / 399.0).abs() < 1e-10);
    }

    #[test]
    fn test_information_criteria() {
        let y = simulate_arma11(200, 1.0, 0.4, 0.0, 24);
        let res = ArmaModel::new(&y, None)
            .unwrap()
            .fit(&make_config(1, 0, ArmaMethod::Mle), None)
            .unwrap();
        assert_eq!(res.n_params(), 3);
        assert!((res.aic() - (-2.0 * res.loglike + 6.0)).abs() < 1e-10);
        assert!((res.bic() - (-2.0 * res.loglike + 3.0 * (200f64).ln())).abs() < 1e-10);
        assert!((res.hqic() - (-2.0 * res.loglike + 6.0 * (200f64).ln().ln())).abs() < 1e-10);
    }

    #[test]
    fn test_bse_and_residuals() {
        let y = simulate_arma11(500, 0.0, 0.7, 0.0, 25);
        let res = ArmaModel::new(&y, None)
            .unwrap()
            .fit(&make_config(1, 0, ArmaMethod::Mle), None)
            .unwrap();
        let bse = res.bse().unwrap();
        // asymptotic sd of phi: sqrt((1 - phi^2) / n)
        let expected = ((1.0 - 0.49) / 500.0f64).sqrt();
        assert!((bse[1] - expected).abs() < 0.01, "bse = {:?}", bse);
        assert!(res.tvalues().unwrap()[1] > 10.0);

        let resid = res.resid().unwrap();
        let fitted = res.fittedvalues().unwrap();
        assert_eq!(resid.len(), 500);
        for t in 0..500 {
            assert!((fitted[t] + resid[t] - y[t]).abs() < 1e-12);
        }
        let std = res.standardized_resid().unwrap();
        let var: f64 = std.standardized_residuals.iter().map(|v| v * v).sum::<f64>() / 500.0;
        assert!((var - 1.0).abs() < 1e-8);
    }

    #[test]
    fn test_forecast_with_trend_and_exog() {
        let n = 300;
        let e = normals(n, 26);
        let x: Vec<f64> = (0..n).map(|t| (t as f64 * 0.1).sin()).collect();
        let y: Vec<f64> = (0..n).map(|t| 2.0 + 1.5 * x[t] + e[t]).collect();
        let exog = vec![x];
        let model = ArmaModel::new(&y, Some(&exog)).unwrap();
        let config = make_config(0, 0, ArmaMethod::Mle);
        let res = model.fit(&config, None).unwrap();
        assert_eq!(res.k, 2);
        assert!((res.exogparams()[1] - 1.5).abs() < 0.2);

        let fx = vec![vec![0.0, 1.0]];
        let fc = res.forecast(2, 0.05, Some(&fx)).unwrap();
        let b = res.exogparams();
        assert!((fc.mean[0] - b[0]).abs() < 1e-10);
        assert!((fc.mean[1] - (b[0] + b[1])).abs() < 1e-10);
        assert!((fc.variance[0] - res.sigma2).abs() < 1e-10);
        assert!(res.forecast(2, 0.05, None).is_err());
    }

    #[test]
    fn test_user_start_params() {
        let y = simulate_arma11(300, 0.0, 0.5, 0.0, 27);
        let model = ArmaModel::new(&y, None).unwrap();
        let config = ArmaConfig {
            trend: Trend::None,
            ..make_config(1, 0, ArmaMethod::CssMle)
        };
        let res = model.fit(&config, Some(&[0.2])).unwrap();
        assert!((res.arparams()[0] - 0.5).abs() < 0.15);

        let err = model.fit(&config, Some(&[1.5])).unwrap_err();
        assert_eq!(err, TsaError::BoundaryParameter);
        let err = model.fit(&config, Some(&[0.1, 0.2])).unwrap_err();
        assert!(matches!(err, TsaError::ParamLengthMismatch { expected: 1, got: 2 }));
    }

    #[test]
    fn test_unit_root_start_is_infeasible() {
        let y = simulate_arma11(200, 0.0, 0.5, 0.0, 31);
        let model = ArmaModel::new(&y, None).unwrap();
        let config = ArmaConfig {
            trend: Trend::None,
            transparams: false,
            ..make_config(1, 0, ArmaMethod::Mle)
        };
        // phi = 1 has no stationary initial covariance
        let err = model.fit(&config, Some(&[1.0])).unwrap_err();
        assert_eq!(err, TsaError::InfeasibleStart);
    }

    #[test]
    fn test_iteration_budget_is_not_fatal() {
        let y = simulate_arma11(400, 0.0, 0.75, -0.25, 32);
        let model = ArmaModel::new(&y, None).unwrap();
        for solver in [Solver::Lbfgs, Solver::NelderMead] {
            let config = ArmaConfig {
                trend: Trend::None,
                solver,
                maxiter: 2,
                ..make_config(1, 1, ArmaMethod::Mle)
            };
            let res = model.fit(&config, None).unwrap();
            assert!(!res.converged, "{:?} reported convergence", solver);
            assert!(res.n_iter > 0);
            assert_eq!(res.params.len(), 2);
            assert!(res.params.iter().all(|v| v.is_finite()), "{:?}", res.params);
        }
    }

    #[test]
    fn test_burn_in_criteria_use_effective_sample() {
        let y = simulate_arma11(200, 0.0, 0.4, 0.0, 33);
        let config = ArmaConfig {
            trend: Trend::None,
            burn_in: 20,
            ..make_config(1, 0, ArmaMethod::Mle)
        };
        let res = ArmaModel::new(&y, None).unwrap().fit(&config, None).unwrap();
        assert_eq!(res.n_obs_effective(), 180);
        assert!((res.bic() - (-2.0 * res.loglike + 2.0 * (180f64).ln())).abs() < 1e-10);
        assert!((res.hqic() - (-2.0 * res.loglike + 4.0 * (180f64).ln().ln())).abs() < 1e-10);
    }

    #[test]
    fn test_trace_sees_every_evaluation() {
        let y = simulate_arma11(150, 0.0, 0.3, 0.0, 28);
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        let config = ArmaConfig {
            trend: Trend::None,
            solver: Solver::NelderMead,
            maxiter: 50,
            trace: Some(Trace::new(move |_p, _ll| {
                inner.fetch_add(1, Ordering::Relaxed);
            })),
            ..make_config(1, 0, ArmaMethod::Mle)
        };
        ArmaModel::new(&y, None).unwrap().fit(&config, None).unwrap();
        assert!(count.load(Ordering::Relaxed) > 10);
    }

    #[test]
    fn test_setup_errors() {
        let y = vec![0.1, 0.2, 0.3];
        let model = ArmaModel::new(&y, None).unwrap();
        let err = model.fit(&make_config(2, 1, ArmaMethod::Mle), None).unwrap_err();
        assert!(matches!(err, TsaError::InsufficientData { n: 3, .. }));

        let bad_exog = vec![vec![1.0, 2.0]];
        assert!(matches!(
            ArmaModel::new(&y, Some(&bad_exog)).unwrap_err(),
            TsaError::DimensionMismatch(_)
        ));
        assert_eq!(
            ArmaModel::new(&[1.0, f64::INFINITY], None).unwrap_err(),
            TsaError::NonFiniteData
        );
    }

    #[test]
    fn test_white_noise_model() {
        let y: Vec<f64> = normals(200, 29).iter().map(|v| 5.0 + 2.0 * v).collect();
        let model = ArmaModel::new(&y, None).unwrap();
        let res = model.fit(&make_config(0, 0, ArmaMethod::Mle), None).unwrap();
        let mean = y.iter().sum::<f64>() / 200.0;
        let var = y.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 200.0;
        assert!((res.params[0] - mean).abs() < 1e-4);
        assert!((res.sigma2 - var).abs() < 1e-4);
        assert!(res.arroots().is_empty() && res.maroots().is_empty());
    }

    #[test]
    fn test_default_start_params_shape() {
        let y = simulate_arma11(400, 1.0, 0.5, 0.2, 30);
        let model = ArmaModel::new(&y, None).unwrap();
        let start = model.start_params(&make_config(1, 1, ArmaMethod::CssMle)).unwrap();
        assert_eq!(start.len(), 3);
        assert!(start.iter().all(|v| v.is_finite()));
    }
}

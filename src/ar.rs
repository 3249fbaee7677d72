//! Univariate AR(p) model.
//!
//! Three estimators share one regression layout, `y_t` on
//! `[trend(t), y_{t-1}, ..., y_{t-p}]` for `t = p..n`:
//! conditional MLE (OLS), Yule-Walker, and exact MLE through the Kalman
//! filter. The lag length can be chosen by an information criterion.

use std::f64::consts::PI;
use std::sync::OnceLock;

use nalgebra::{Complex, DMatrix, DVector};
use tracing::{debug, warn};

use crate::error::{Result, TsaError};
use crate::likelihood::{ExactAr, LogLikelihood};
use crate::optimizer::maximize;
use crate::params::unconstrain_stationary;
use crate::polynomial::ar_roots;
use crate::regression::{add_trend, lagmat, normalized_cov, ols, yule_walker, YuleWalkerMethod};
use crate::results::standard_errors;
use crate::types::{ArConfig, FitMethod, InfoCriterion, Trend};

/// One-sided 5% normal quantile used by the t-stat lag selection.
const TSTAT_STOP: f64 = 1.6448536269514722;

/// Default lag length `round(12 * (nobs / 100)^(1/4))`.
pub fn default_maxlag(nobs: usize) -> usize {
    (12.0 * (nobs as f64 / 100.0).powf(0.25)).round() as usize
}

#[derive(Debug, Clone)]
pub struct ArModel {
    endog: Vec<f64>,
}

impl ArModel {
    pub fn new(endog: &[f64]) -> Result<Self> {
        if endog.is_empty() {
            return Err(TsaError::InsufficientData { n: 0, min: 1 });
        }
        if endog.iter().any(|v| !v.is_finite()) {
            return Err(TsaError::NonFiniteData);
        }
        Ok(Self {
            endog: endog.to_vec(),
        })
    }

    pub fn nobs(&self) -> usize {
        self.endog.len()
    }

    /// Fit with the lag length `config.maxlag`, or the best lag up to it
    /// when `config.ic` is set.
    #[tracing::instrument(skip_all, fields(nobs = self.endog.len(), method = config.method.as_str()))]
    pub fn fit(&self, config: &ArConfig) -> Result<ArResults> {
        let n = self.nobs();
        let kt = config.trend.k_trend();
        if config.method != FitMethod::Cmle && kt > 1 {
            return Err(TsaError::InvalidConfig(format!(
                "method '{}' supports only trend 'nc' or 'c'",
                config.method.as_str()
            )));
        }

        let maxlag = config.maxlag.unwrap_or_else(|| default_maxlag(n));
        let min = 2 * maxlag + kt + 1;
        if n < min {
            return Err(TsaError::InsufficientData { n, min });
        }

        let laglen = match config.ic {
            Some(ic) => self.select_lag(maxlag, ic, config)?,
            None => maxlag,
        };
        debug!(laglen, maxlag, "fitting AR");
        fit_lag(&self.endog, laglen, config)
    }

    /// Every candidate is fit on `endog[maxlag - lag..]` so all of them use
    /// the same `n - maxlag` observations.
    fn select_lag(&self, maxlag: usize, ic: InfoCriterion, config: &ArConfig) -> Result<usize> {
        let startlag = config.trend.k_trend();
        let endog = &self.endog;

        let criterion: fn(&ArResults) -> f64 = match ic {
            InfoCriterion::Aic => ArResults::aic,
            InfoCriterion::Bic => ArResults::bic,
            InfoCriterion::Hqic => ArResults::hqic,
            InfoCriterion::TStat => {
                for lag in (startlag.max(1)..=maxlag).rev() {
                    let fit = fit_lag(&endog[maxlag - lag..], lag, config)?;
                    match fit.tvalues() {
                        Ok(t) if t.last().is_some_and(|v| v.abs() >= TSTAT_STOP) => return Ok(lag),
                        Ok(_) => {}
                        Err(e) => warn!(lag, error = %e, "t-statistics unavailable, dropping lag"),
                    }
                }
                return Ok(startlag);
            }
        };

        let mut best: Option<(f64, usize)> = None;
        for lag in startlag..=maxlag {
            let fit = fit_lag(&endog[maxlag - lag..], lag, config)?;
            let value = criterion(&fit);
            debug!(lag, value, "lag candidate");
            if best.map_or(true, |(b, _)| value < b) {
                best = Some((value, lag));
            }
        }
        Ok(best.map_or(startlag, |(_, lag)| lag))
    }
}

fn fit_lag(endog: &[f64], laglen: usize, config: &ArConfig) -> Result<ArResults> {
    let n = endog.len();
    let kt = config.trend.k_trend();
    if n < 2 * laglen + kt + 1 {
        return Err(TsaError::InsufficientData {
            n,
            min: 2 * laglen + kt + 1,
        });
    }
    let avobs = n - laglen;
    let y = DVector::from_column_slice(&endog[laglen..]);
    let x = add_trend(&lagmat(endog, laglen)?, config.trend);

    let mut n_iter = 0;
    let mut converged = true;
    let params: Vec<f64> = match config.method {
        FitMethod::Cmle => ols(&y, &x)?.iter().copied().collect(),
        FitMethod::YuleWalker => {
            let demean = kt == 1;
            let (rho, _) = yule_walker(endog, laglen, YuleWalkerMethod::Mle, demean)?;
            let mut params = Vec::with_capacity(kt + laglen);
            if demean {
                let mean = endog.iter().sum::<f64>() / n as f64;
                params.push(mean * (1.0 - rho.iter().sum::<f64>()));
            }
            params.extend(rho);
            params
        }
        FitMethod::Mle => {
            let objective = ExactAr::new(endog.to_vec(), laglen, kt).with_transparams(config.transparams);
            let mut start: Vec<f64> = ols(&y, &x)?.iter().copied().collect();
            if config.transparams {
                let ar = unconstrain_stationary(&start[kt..]);
                if ar.iter().all(|v| v.is_finite()) {
                    start[kt..].copy_from_slice(&ar);
                } else {
                    warn!(ar = ?&start[kt..], "OLS start values not stationary, using zeros");
                    start[kt..].iter_mut().for_each(|v| *v = 0.0);
                }
            }
            if !objective.loglike(&start).is_finite() {
                return Err(TsaError::InfeasibleStart);
            }
            let opt = maximize(&objective, start, config.solver, config.maxiter)?;
            n_iter = opt.n_iter;
            converged = opt.converged;
            objective.coefficients(&opt.params)?
        }
    };

    let fitted = &x * DVector::from_column_slice(&params);
    let resid: Vec<f64> = (&y - &fitted).iter().copied().collect();
    let ssr: f64 = resid.iter().map(|e| e * e).sum();
    let sigma2 = ssr / avobs as f64;

    let loglike = match config.method {
        FitMethod::Cmle => {
            -0.5 * avobs as f64 * ((2.0 * PI).ln() + sigma2.ln()) - ssr / (2.0 * sigma2)
        }
        FitMethod::YuleWalker | FitMethod::Mle => ExactAr::new(endog.to_vec(), laglen, kt)
            .evaluate(&params)
            .map_or(f64::NEG_INFINITY, |out| out.loglike),
    };

    Ok(ArResults {
        params,
        laglen,
        k_trend: kt,
        trend: config.trend,
        method: config.method,
        nobs: n,
        avobs,
        sigma2,
        ssr,
        loglike,
        resid,
        n_iter,
        converged,
        endog: endog.to_vec(),
        x,
        bse: OnceLock::new(),
    })
}

/// Fitted AR model.
#[derive(Debug, Clone)]
pub struct ArResults {
    /// `[trend(k_trend) | φ_1..φ_p]`.
    pub params: Vec<f64>,
    pub laglen: usize,
    pub k_trend: usize,
    pub trend: Trend,
    pub method: FitMethod,
    pub nobs: usize,
    /// Observations used in the regression, `nobs - laglen`.
    pub avobs: usize,
    /// Innovation variance `ssr / avobs`.
    pub sigma2: f64,
    pub ssr: f64,
    pub loglike: f64,
    /// `y_t - x_t' β` for `t = laglen..nobs`.
    pub resid: Vec<f64>,
    pub n_iter: u64,
    pub converged: bool,
    endog: Vec<f64>,
    x: DMatrix<f64>,
    bse: OnceLock<Result<Vec<f64>>>,
}

impl ArResults {
    pub fn trendparams(&self) -> &[f64] {
        &self.params[..self.k_trend]
    }

    pub fn arparams(&self) -> &[f64] {
        &self.params[self.k_trend..]
    }

    pub fn aic(&self) -> f64 {
        self.sigma2.ln() + 2.0 * (1 + self.laglen) as f64 / self.avobs as f64
    }

    pub fn bic(&self) -> f64 {
        let avobs = self.avobs as f64;
        self.sigma2.ln() + (1 + self.laglen) as f64 * avobs.ln() / avobs
    }

    pub fn hqic(&self) -> f64 {
        let avobs = self.avobs as f64;
        self.sigma2.ln() + 2.0 * avobs.ln().ln() / avobs * (1 + self.laglen) as f64
    }

    /// Final prediction error.
    pub fn fpe(&self) -> f64 {
        let avobs = self.avobs as f64;
        let k = (self.laglen + self.k_trend) as f64;
        (avobs + k) / (avobs - k) * self.sigma2
    }

    /// Roots of `1 - Σ φ_i z^i`.
    pub fn roots(&self) -> Vec<Complex<f64>> {
        ar_roots(self.arparams())
    }

    /// Standard errors, computed on first use.
    ///
    /// * cmle: OLS errors with scale `ssr / (avobs - p - k)`
    /// * yw: `sigma2 (X'X)^{-1}`
    /// * mle: inverse negative Hessian of the exact log-likelihood
    pub fn bse(&self) -> Result<Vec<f64>> {
        self.bse.get_or_init(|| self.compute_bse()).clone()
    }

    fn compute_bse(&self) -> Result<Vec<f64>> {
        let cov = match self.method {
            FitMethod::Cmle => {
                let df = self.avobs as f64 - self.params.len() as f64;
                normalized_cov(&self.x)? * (self.ssr / df)
            }
            FitMethod::YuleWalker => normalized_cov(&self.x)? * self.sigma2,
            FitMethod::Mle => {
                let objective = ExactAr::new(self.endog.clone(), self.laglen, self.k_trend);
                let neg_hess = -objective.hessian(&self.params);
                neg_hess.try_inverse().ok_or_else(|| {
                    TsaError::SingularMatrix("Hessian of the AR log-likelihood".into())
                })?
            }
        };
        standard_errors(&cov)
    }

    pub fn tvalues(&self) -> Result<Vec<f64>> {
        let bse = self.bse()?;
        Ok(self.params.iter().zip(bse.iter()).map(|(b, s)| b / s).collect())
    }

    /// `X β` for `t = laglen..nobs`.
    pub fn fittedvalues(&self) -> Vec<f64> {
        (&self.x * DVector::from_column_slice(&self.params))
            .iter()
            .copied()
            .collect()
    }

    /// Predictions for `t = start..start + n`.
    ///
    /// Inside the sample these are one-step predictions from the observed
    /// lags. Past the end of the sample earlier predictions replace the
    /// missing observations.
    pub fn predict(&self, start: usize, n: usize) -> Result<Vec<f64>> {
        if start < self.laglen {
            return Err(TsaError::InvalidConfig(format!(
                "prediction start {} is before the first usable observation {}",
                start, self.laglen
            )));
        }
        let end = start + n;
        let mut path = self.endog.clone();
        let mut out = Vec::with_capacity(n);
        for t in self.laglen..end {
            let value = self.one_step(t, &path);
            if t >= self.nobs {
                path.push(value);
            }
            if t >= start {
                out.push(value);
            }
        }
        Ok(out)
    }

    fn one_step(&self, t: usize, path: &[f64]) -> f64 {
        // trend columns run t = 1.. over the regression rows
        let trend_t = (t - self.laglen + 1) as f64;
        let trend: f64 = self
            .trendparams()
            .iter()
            .enumerate()
            .map(|(j, b)| b * trend_t.powi(j as i32))
            .sum();
        let lags: f64 = self
            .arparams()
            .iter()
            .enumerate()
            .map(|(i, phi)| phi * path[t - 1 - i])
            .sum();
        trend + lags
    }
}

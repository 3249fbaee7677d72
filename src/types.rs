use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::TsaError;

/// ARMA model order. The exogenous count `k` is derived from the trend and
/// the regressors supplied at fit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArmaOrder {
    pub p: usize, // AR order
    pub q: usize, // MA order
}

impl ArmaOrder {
    pub fn new(p: usize, q: usize) -> Self {
        Self { p, q }
    }

    /// State dimension r = max(p, q + 1).
    pub fn k_states(&self) -> usize {
        std::cmp::max(self.p, self.q + 1)
    }
}

impl TryFrom<(i64, i64)> for ArmaOrder {
    type Error = TsaError;

    fn try_from((p, q): (i64, i64)) -> Result<Self, Self::Error> {
        if p < 0 || q < 0 {
            return Err(TsaError::InvalidOrder(format!(
                "lag counts must be non-negative, got (p={}, q={})",
                p, q
            )));
        }
        Ok(Self::new(p as usize, q as usize))
    }
}

/// Deterministic trend terms prepended to the regressors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Trend {
    None,     // 'nc': k_trend = 0
    #[default]
    Constant, // 'c': k_trend = 1
    ConstantLinear,          // 'ct': k_trend = 2
    ConstantLinearQuadratic, // 'ctt': k_trend = 3
}

impl Trend {
    pub fn k_trend(&self) -> usize {
        match self {
            Trend::None => 0,
            Trend::Constant => 1,
            Trend::ConstantLinear => 2,
            Trend::ConstantLinearQuadratic => 3,
        }
    }
}

impl FromStr for Trend {
    type Err = TsaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nc" | "n" => Ok(Trend::None),
            "c" => Ok(Trend::Constant),
            "ct" => Ok(Trend::ConstantLinear),
            "ctt" => Ok(Trend::ConstantLinearQuadratic),
            other => Err(TsaError::InvalidConfig(format!(
                "trend '{}' not understood",
                other
            ))),
        }
    }
}

/// ARMA estimation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArmaMethod {
    /// Conditional sum of squares only.
    Css,
    /// Exact likelihood from Hannan-Rissanen starting values.
    Mle,
    /// CSS pre-fit, then exact likelihood.
    #[default]
    CssMle,
}

impl ArmaMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArmaMethod::Css => "css",
            ArmaMethod::Mle => "mle",
            ArmaMethod::CssMle => "css-mle",
        }
    }
}

impl FromStr for ArmaMethod {
    type Err = TsaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "css" => Ok(ArmaMethod::Css),
            "mle" => Ok(ArmaMethod::Mle),
            "css-mle" | "css_mle" => Ok(ArmaMethod::CssMle),
            other => Err(TsaError::InvalidConfig(format!(
                "method '{}' not recognized; use 'css', 'mle' or 'css-mle'",
                other
            ))),
        }
    }
}

/// AR estimation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMethod {
    /// Conditional MLE (OLS on lagged values).
    #[default]
    Cmle,
    YuleWalker,
    /// Exact (unconditional) MLE via the Kalman filter.
    Mle,
}

impl FitMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            FitMethod::Cmle => "cmle",
            FitMethod::YuleWalker => "yw",
            FitMethod::Mle => "mle",
        }
    }
}

impl FromStr for FitMethod {
    type Err = TsaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cmle" => Ok(FitMethod::Cmle),
            "yw" => Ok(FitMethod::YuleWalker),
            "mle" => Ok(FitMethod::Mle),
            other => Err(TsaError::InvalidConfig(format!(
                "method '{}' not recognized; use 'cmle', 'yw' or 'mle'",
                other
            ))),
        }
    }
}

/// Criterion for AR lag-length selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoCriterion {
    Aic,
    Bic,
    Hqic,
    /// Drop lags from maxlag until the last one is significant at 5% (one-sided normal).
    TStat,
}

impl FromStr for InfoCriterion {
    type Err = TsaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aic" => Ok(InfoCriterion::Aic),
            "bic" => Ok(InfoCriterion::Bic),
            "hqic" | "hq" => Ok(InfoCriterion::Hqic),
            "t-stat" | "tstat" => Ok(InfoCriterion::TStat),
            other => Err(TsaError::InvalidConfig(format!(
                "ic option '{}' not understood",
                other
            ))),
        }
    }
}

/// Numerical minimizer used by the likelihood fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Solver {
    /// L-BFGS-B (m=30, pgtol=1e-7, factr=1e3) with Nelder-Mead fallback.
    #[default]
    Lbfgsb,
    Lbfgs,
    NelderMead,
}

impl Solver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Solver::Lbfgsb => "lbfgsb",
            Solver::Lbfgs => "lbfgs",
            Solver::NelderMead => "nelder-mead",
        }
    }
}

impl FromStr for Solver {
    type Err = TsaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lbfgsb" | "l_bfgs" | "l-bfgs-b" => Ok(Solver::Lbfgsb),
            "lbfgs" => Ok(Solver::Lbfgs),
            "nm" | "nelder-mead" => Ok(Solver::NelderMead),
            other => Err(TsaError::InvalidConfig(format!(
                "unknown solver '{}'. Use 'lbfgsb', 'lbfgs' or 'nelder-mead'",
                other
            ))),
        }
    }
}

/// Caller-owned callback invoked once per objective evaluation with the
/// parameters seen by the optimizer and the resulting log-likelihood.
#[derive(Clone)]
pub struct Trace(Arc<dyn Fn(&[f64], f64) + Send + Sync>);

impl Trace {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[f64], f64) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn record(&self, params: &[f64], loglike: f64) {
        (self.0)(params, loglike)
    }
}

impl fmt::Debug for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Trace(..)")
    }
}

/// ARMA model configuration.
#[derive(Debug, Clone)]
pub struct ArmaConfig {
    pub order: ArmaOrder,
    pub trend: Trend,
    pub method: ArmaMethod,
    /// Apply the Jones (1980) reparameterization during optimization.
    pub transparams: bool,
    pub solver: Solver,
    /// Objective evaluation budget per optimizer run.
    pub maxiter: u64,
    /// Observations whose likelihood terms are skipped (state still updated).
    pub burn_in: usize,
    pub trace: Option<Trace>,
}

impl Default for ArmaConfig {
    fn default() -> Self {
        Self {
            order: ArmaOrder::new(1, 0),
            trend: Trend::Constant,
            method: ArmaMethod::CssMle,
            transparams: true,
            solver: Solver::Lbfgsb,
            maxiter: 500,
            burn_in: 0,
            trace: None,
        }
    }
}

/// AR model configuration.
#[derive(Debug, Clone)]
pub struct ArConfig {
    /// Lag length, or the largest candidate when `ic` is set.
    /// `None` means `round(12 * (nobs / 100)^(1/4))`.
    pub maxlag: Option<usize>,
    pub method: FitMethod,
    pub ic: Option<InfoCriterion>,
    pub trend: Trend,
    pub transparams: bool,
    pub solver: Solver,
    pub maxiter: u64,
}

impl Default for ArConfig {
    fn default() -> Self {
        Self {
            maxlag: None,
            method: FitMethod::Cmle,
            ic: None,
            trend: Trend::Constant,
            transparams: true,
            solver: Solver::Lbfgsb,
            maxiter: 500,
        }
    }
}

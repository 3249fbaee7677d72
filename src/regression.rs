//! Regression helpers used for starting values and the AR estimators.
//!
//! Lag matrices, deterministic trend columns, least squares and the
//! Yule-Walker equations.

use nalgebra::{DMatrix, DVector};

use crate::error::{Result, TsaError};
use crate::types::Trend;

/// Lagged design matrix with trimmed edges.
///
/// Row `i` corresponds to observation `t = i + maxlag` and holds
/// `[x[t-1], x[t-2], ..., x[t-maxlag]]`.
pub fn lagmat(x: &[f64], maxlag: usize) -> Result<DMatrix<f64>> {
    let n = x.len();
    if maxlag >= n {
        return Err(TsaError::InsufficientData {
            n,
            min: maxlag + 1,
        });
    }
    Ok(DMatrix::from_fn(n - maxlag, maxlag, |i, j| x[i + maxlag - j - 1]))
}

/// Deterministic trend columns `[1, t, t^2]` (t = 1..n), truncated to `trend.k_trend()`.
pub fn trend_columns(trend: Trend, n: usize) -> DMatrix<f64> {
    trend_columns_from(trend, 1, n)
}

/// Trend columns for `t = start..start + n`, used when extending past the sample.
pub fn trend_columns_from(trend: Trend, start: usize, n: usize) -> DMatrix<f64> {
    DMatrix::from_fn(n, trend.k_trend(), |i, j| ((start + i) as f64).powi(j as i32))
}

/// Prepend trend columns to `x`.
pub fn add_trend(x: &DMatrix<f64>, trend: Trend) -> DMatrix<f64> {
    let kt = trend.k_trend();
    if kt == 0 {
        return x.clone();
    }
    let n = x.nrows();
    let trend_cols = trend_columns(trend, n);
    DMatrix::from_fn(n, kt + x.ncols(), |i, j| {
        if j < kt {
            trend_cols[(i, j)]
        } else {
            x[(i, j - kt)]
        }
    })
}

/// Regression matrix `[trend | exog]` for an ARMA model, or `None` when k = 0.
///
/// `exog` is column-major: `exog[j][t]`.
pub fn design_matrix(
    trend: Trend,
    exog: Option<&[Vec<f64>]>,
    n: usize,
) -> Result<Option<DMatrix<f64>>> {
    let cols = exog.unwrap_or(&[]);
    for (j, col) in cols.iter().enumerate() {
        if col.len() != n {
            return Err(TsaError::DimensionMismatch(format!(
                "exog column {} has {} rows, endog has {}",
                j,
                col.len(),
                n
            )));
        }
        if col.iter().any(|v| !v.is_finite()) {
            return Err(TsaError::NonFiniteData);
        }
    }
    let kt = trend.k_trend();
    let k = kt + cols.len();
    if k == 0 {
        return Ok(None);
    }
    let trend_cols = trend_columns(trend, n);
    Ok(Some(DMatrix::from_fn(n, k, |i, j| {
        if j < kt {
            trend_cols[(i, j)]
        } else {
            cols[j - kt][i]
        }
    })))
}

/// Ordinary least squares through the SVD (minimum-norm solution when
/// `x` is rank deficient).
pub fn ols(y: &DVector<f64>, x: &DMatrix<f64>) -> Result<DVector<f64>> {
    if y.len() != x.nrows() {
        return Err(TsaError::DimensionMismatch(format!(
            "regressand has {} rows, design has {}",
            y.len(),
            x.nrows()
        )));
    }
    if x.ncols() == 0 {
        return Ok(DVector::zeros(0));
    }
    x.clone()
        .svd(true, true)
        .solve(y, 1e-12)
        .map_err(|e| TsaError::SingularMatrix(e.to_string()))
}

/// Unscaled parameter covariance `pinv(X) pinv(X)'`, i.e. `(X'X)^{-1}`.
pub fn normalized_cov(x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    if x.ncols() == 0 {
        return Ok(DMatrix::zeros(0, 0));
    }
    let pinv = x
        .clone()
        .pseudo_inverse(1e-12)
        .map_err(|e| TsaError::SingularMatrix(e.to_string()))?;
    Ok(&pinv * pinv.transpose())
}

/// Denominator used for the autocovariances in [`yule_walker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YuleWalkerMethod {
    /// Divide lag-k sums by `n - k`.
    Unbiased,
    /// Divide by `n`.
    Mle,
}

/// Yule-Walker AR(order) estimates.
///
/// Returns `(rho, sigma)`, where `sigma` is the innovation standard
/// deviation implied by the autocovariances.
pub fn yule_walker(
    x: &[f64],
    order: usize,
    method: YuleWalkerMethod,
    demean: bool,
) -> Result<(Vec<f64>, f64)> {
    let n = x.len();
    if n <= order {
        return Err(TsaError::InsufficientData { n, min: order + 1 });
    }
    let mean = if demean {
        x.iter().sum::<f64>() / n as f64
    } else {
        0.0
    };
    let xc: Vec<f64> = x.iter().map(|&v| v - mean).collect();

    let gammas: Vec<f64> = (0..=order)
        .map(|k| {
            let s: f64 = (0..n - k).map(|i| xc[i] * xc[i + k]).sum();
            match method {
                YuleWalkerMethod::Unbiased => s / (n - k) as f64,
                YuleWalkerMethod::Mle => s / n as f64,
            }
        })
        .collect();

    let rho = levinson(&gammas, order).ok_or_else(|| {
        TsaError::SingularMatrix("Yule-Walker Toeplitz system is singular".into())
    })?;
    let sigma2 = gammas[0]
        - gammas[1..]
            .iter()
            .zip(rho.iter())
            .map(|(g, r)| g * r)
            .sum::<f64>();
    Ok((rho, sigma2.max(0.0).sqrt()))
}

/// Solve the Toeplitz system `R(gamma_0..gamma_{p-1}) phi = gamma_1..gamma_p`
/// by the Levinson-Durbin recursion.
fn levinson(gammas: &[f64], p: usize) -> Option<Vec<f64>> {
    if p == 0 {
        return Some(vec![]);
    }
    if gammas.len() <= p || gammas[0].abs() < 1e-15 {
        return None;
    }

    let mut phi = vec![0.0; p];
    let mut phi_prev = vec![0.0; p];
    let mut var = gammas[0];

    for k in 0..p {
        let mut num = gammas[k + 1];
        for j in 0..k {
            num -= phi[j] * gammas[k - j];
        }
        if var.abs() < 1e-15 {
            return None;
        }
        let lambda = num / var;

        phi_prev.copy_from_slice(&phi);
        phi[k] = lambda;
        for j in 0..k {
            phi[j] = phi_prev[j] - lambda * phi_prev[k - 1 - j];
        }
        var *= 1.0 - lambda * lambda;
    }

    Some(phi)
}

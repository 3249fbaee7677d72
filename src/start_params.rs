//! Starting values for the ARMA optimizer.
//!
//! Hannan-Rissanen (1982):
//! 1. Regress the series on the k regressors by OLS and remove the fit
//! 2. For p, q > 0: fit a long AR by conditional MLE (lag length by BIC),
//!    take its residuals and regress y_t on its own lags and lagged residuals
//! 3. For pure AR or pure MA: Yule-Walker coefficients of the given order
//! 4. Blocks that cannot be estimated, or that are not stationary /
//!    invertible, fall back to zeros

use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use crate::ar::{default_maxlag, ArModel};
use crate::error::{Result, TsaError};
use crate::polynomial::{is_invertible, is_stationary};
use crate::regression::{lagmat, ols, yule_walker, YuleWalkerMethod};
use crate::types::{ArConfig, ArmaOrder, FitMethod, InfoCriterion, Trend};

/// ARMA coefficients from the long-AR residual regression (p > 0, q > 0).
fn long_ar_regression(y: &[f64], p: usize, q: usize) -> Result<Vec<f64>> {
    let n = y.len();
    let maxlag = default_maxlag(n).min(n.saturating_sub(1) / 3);
    let ar_fit = ArModel::new(y)?.fit(&ArConfig {
        maxlag: Some(maxlag),
        method: FitMethod::Cmle,
        ic: Some(InfoCriterion::Bic),
        trend: Trend::None,
        ..ArConfig::default()
    })?;
    let p_tmp = ar_fit.laglen;
    debug!(p_tmp, "long AR lag length selected by BIC");

    // resid[j] is the long-AR residual at time j + p_tmp
    let fitted = lagmat(y, p_tmp)? * DVector::from_column_slice(&ar_fit.params);
    let resid: Vec<f64> = y[p_tmp..]
        .iter()
        .zip(fitted.iter())
        .map(|(v, f)| v - f)
        .collect();

    let start_t = std::cmp::max(p, p_tmp + q);
    if n <= start_t + p + q {
        return Err(TsaError::InsufficientData {
            n,
            min: start_t + p + q + 1,
        });
    }
    let rows = n - start_t;
    let x = DMatrix::from_fn(rows, p + q, |i, j| {
        let t = start_t + i;
        if j < p {
            y[t - 1 - j]
        } else {
            resid[t - 1 - (j - p) - p_tmp]
        }
    });
    let rhs = DVector::from_column_slice(&y[start_t..]);
    Ok(ols(&rhs, &x)?.iter().copied().collect())
}

fn arma_block(y: &[f64], p: usize, q: usize) -> Result<Vec<f64>> {
    let mut block = vec![0.0; p + q];
    if q > 0 {
        if p > 0 {
            block = long_ar_regression(y, p, q)?;
        } else {
            let (ma, _) = yule_walker(y, q, YuleWalkerMethod::Unbiased, true)?;
            block[..q].copy_from_slice(&ma);
        }
    } else if p > 0 {
        let (ar, _) = yule_walker(y, p, YuleWalkerMethod::Unbiased, true)?;
        block[..p].copy_from_slice(&ar);
    }
    Ok(block)
}

/// Hannan-Rissanen starting values `[exog(k) | ar(p) | ma(q)]`.
///
/// Never fails on estimation problems: the ARMA block falls back to zeros
/// with a warning. Errors only for inconsistent dimensions.
pub fn hannan_rissanen(
    endog: &[f64],
    exog: Option<&DMatrix<f64>>,
    order: ArmaOrder,
) -> Result<Vec<f64>> {
    let (p, q) = (order.p, order.q);
    let k = exog.map_or(0, |x| x.ncols());
    let mut start = vec![0.0; k + p + q];

    let mut y = endog.to_vec();
    if let Some(x) = exog.filter(|x| x.ncols() > 0) {
        if x.nrows() != endog.len() {
            return Err(TsaError::DimensionMismatch(format!(
                "exog has {} rows, endog has {}",
                x.nrows(),
                endog.len()
            )));
        }
        let beta = ols(&DVector::from_column_slice(endog), x)?;
        start[..k].copy_from_slice(beta.as_slice());
        let fitted = x * &beta;
        for (v, f) in y.iter_mut().zip(fitted.iter()) {
            *v -= f;
        }
    }

    if p + q == 0 {
        return Ok(start);
    }

    match arma_block(&y, p, q) {
        Ok(block) => start[k..].copy_from_slice(&block),
        Err(e) => warn!(error = %e, p, q, "Hannan-Rissanen failed, using zero ARMA start values"),
    }
    Ok(sanitize(start, p, q, k))
}

/// Zero any AR block that is not stationary and any MA block that is not
/// invertible so the start vector lies inside the transform domain.
pub fn sanitize(mut start: Vec<f64>, p: usize, q: usize, k: usize) -> Vec<f64> {
    if start[k..k + p].iter().any(|v| !v.is_finite()) || !is_stationary(&start[k..k + p]) {
        warn!(ar = ?&start[k..k + p], "non-stationary AR start values, using zeros");
        start[k..k + p].iter_mut().for_each(|v| *v = 0.0);
    }
    let ma = k + p..k + p + q;
    if start[ma.clone()].iter().any(|v| !v.is_finite()) || !is_invertible(&start[ma.clone()]) {
        warn!(ma = ?&start[ma.clone()], "non-invertible MA start values, using zeros");
        start[ma].iter_mut().for_each(|v| *v = 0.0);
    }
    start
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

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

    fn simulate_arma11(n: usize, phi: f64, theta: f64, seed: u64) -> Vec<f64> {
        let e = normals(n + 100, seed);
        let mut y = vec![0.0; n + 100];
        for t in 1..n + 100 {
            y[t] = phi * y[t - 1] + e[t] + theta * e[t - 1];
        }
        y.split_off(100)
    }

    #[test]
    fn test_ar1_start_near_truth() {
        let y = simulate_arma11(800, 0.6, 0.0, 1);
        let start = hannan_rissanen(&y, None, ArmaOrder::new(1, 0)).unwrap();
        assert_eq!(start.len(), 1);
        assert!((start[0] - 0.6).abs() < 0.1, "start = {:?}", start);
    }

    #[test]
    fn test_arma11_start_near_truth() {
        let y = simulate_arma11(1000, 0.7, 0.3, 2);
        let start = hannan_rissanen(&y, None, ArmaOrder::new(1, 1)).unwrap();
        assert_eq!(start.len(), 2);
        assert!((start[0] - 0.7).abs() < 0.15, "start = {:?}", start);
        assert!((start[1] - 0.3).abs() < 0.15, "start = {:?}", start);
    }

    #[test]
    fn test_exog_block_is_ols() {
        let e = normals(300, 3);
        let y: Vec<f64> = e.iter().map(|v| 5.0 + 0.1 * v).collect();
        let x = DMatrix::from_element(300, 1, 1.0);
        let start = hannan_rissanen(&y, Some(&x), ArmaOrder::new(1, 0)).unwrap();
        let mean = y.iter().sum::<f64>() / 300.0;
        assert!((start[0] - mean).abs() < 1e-10);
        assert!(start[1].abs() < 0.3);
    }

    #[test]
    fn test_short_series_falls_back() {
        let y = vec![0.1, -0.2, 0.3, 0.0, 0.5];
        let start = hannan_rissanen(&y, None, ArmaOrder::new(2, 2)).unwrap();
        assert_eq!(start.len(), 4);
        assert!(start.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_sanitize_zeroes_offending_block() {
        let start = sanitize(vec![9.0, 1.2, 0.4], 1, 1, 1);
        assert_eq!(start, vec![9.0, 0.0, 0.4]);
        let start = sanitize(vec![0.5, -1.5], 1, 1, 0);
        assert_eq!(start, vec![0.5, 0.0]);
    }
}

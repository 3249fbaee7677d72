use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::{Result, TsaError};

/// Simulate `nsample` draws of an ARMA process
///
///   y_t = Σ φ_i y_{t-i} + e_t + Σ θ_j e_{t-j},   e_t ~ N(0, sigma²)
///
/// started from zeros. The first `burnin` draws are discarded.
///
/// # Errors
///
/// Returns [`TsaError::InvalidConfig`] if `sigma` is not positive and finite
/// and [`TsaError::NonFiniteData`] if a coefficient is not finite.
pub fn arma_generate_sample(
    ar: &[f64],
    ma: &[f64],
    nsample: usize,
    sigma: f64,
    burnin: usize,
    rng: &mut impl Rng,
) -> Result<Vec<f64>> {
    if ar.iter().chain(ma.iter()).any(|v| !v.is_finite()) {
        return Err(TsaError::NonFiniteData);
    }
    if !(sigma > 0.0) {
        return Err(TsaError::InvalidConfig(format!(
            "innovation sd must be positive, got {}",
            sigma
        )));
    }
    let normal = Normal::new(0.0, sigma).map_err(|e| {
        TsaError::InvalidConfig(format!("innovation sd {}: {}", sigma, e))
    })?;

    let total = nsample + burnin;
    let errors: Vec<f64> = (0..total).map(|_| normal.sample(&mut *rng)).collect();
    let mut y = vec![0.0; total];
    for t in 0..total {
        let mut v = errors[t];
        for (i, phi) in ar.iter().enumerate().take(t) {
            v += phi * y[t - 1 - i];
        }
        for (j, theta) in ma.iter().enumerate().take(t) {
            v += theta * errors[t - 1 - j];
        }
        y[t] = v;
    }
    Ok(y.split_off(burnin))
}

use crate::error::{Result, TsaError};

/// Unpacked ARMA parameters.
///
/// Flat layout: `[exog(k) | ar(p) | ma(q)]`, where the `k` regression
/// coefficients include the trend terms.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmaParams {
    pub exog_coeffs: Vec<f64>,
    pub ar_coeffs: Vec<f64>,
    pub ma_coeffs: Vec<f64>,
}

impl ArmaParams {
    /// Unpack a flat parameter vector into structured fields.
    pub fn from_flat(flat: &[f64], p: usize, q: usize, k: usize) -> Result<Self> {
        let expected = k + p + q;
        if flat.len() != expected {
            return Err(TsaError::ParamLengthMismatch {
                expected,
                got: flat.len(),
            });
        }
        Ok(Self {
            exog_coeffs: flat[..k].to_vec(),
            ar_coeffs: flat[k..k + p].to_vec(),
            ma_coeffs: flat[k + p..].to_vec(),
        })
    }

    /// Pack structured fields back into a flat vector.
    pub fn to_flat(&self) -> Vec<f64> {
        let mut v = Vec::with_capacity(
            self.exog_coeffs.len() + self.ar_coeffs.len() + self.ma_coeffs.len(),
        );
        v.extend(&self.exog_coeffs);
        v.extend(&self.ar_coeffs);
        v.extend(&self.ma_coeffs);
        v
    }
}

// ---------------------------------------------------------------------------
// Jones (1980) reparameterization
// ---------------------------------------------------------------------------

/// Map a real number into (-1, 1): `(1 - e^{-u}) / (1 + e^{-u})`.
fn bounded(u: f64) -> f64 {
    // identical to the logistic form, without overflow for large |u|
    (0.5 * u).tanh()
}

/// Inverse of [`bounded`]: `-ln((1 - c) / (1 + c))`. Infinite at |c| = 1.
fn unbounded(c: f64) -> f64 {
    2.0 * c.atanh()
}

/// Levinson-Durbin step from partial correlations to polynomial coefficients.
///
/// `sign = 1` gives AR coefficients (roots of `1 - Σφ z^i` outside the unit
/// circle), `sign = -1` gives MA coefficients for `1 + Σθ z^i`.
fn pacf_to_coeffs(pacf: &[f64], sign: f64) -> Vec<f64> {
    let mut coeffs = pacf.to_vec();
    let mut tmp = pacf.to_vec();
    for j in 1..coeffs.len() {
        let a = coeffs[j];
        for kiter in 0..j {
            tmp[kiter] -= sign * a * coeffs[j - kiter - 1];
        }
        coeffs[..j].copy_from_slice(&tmp[..j]);
    }
    coeffs
}

/// Reverse Levinson-Durbin recursion: coefficients back to partial correlations.
fn coeffs_to_pacf(coeffs: &[f64], sign: f64) -> Vec<f64> {
    let mut pacf = coeffs.to_vec();
    let mut tmp = coeffs.to_vec();
    for j in (1..pacf.len()).rev() {
        let a = pacf[j];
        let denom = 1.0 - a * a;
        for kiter in 0..j {
            tmp[kiter] = (pacf[kiter] + sign * a * pacf[j - kiter - 1]) / denom;
        }
        pacf[..j].copy_from_slice(&tmp[..j]);
    }
    pacf
}

/// Unconstrained values to stationary AR coefficients.
pub fn constrain_stationary(unconstrained: &[f64]) -> Vec<f64> {
    let pacf: Vec<f64> = unconstrained.iter().map(|&u| bounded(u)).collect();
    pacf_to_coeffs(&pacf, 1.0)
}

/// Stationary AR coefficients to unconstrained values.
///
/// Coefficients outside the stationary region yield non-finite entries.
pub fn unconstrain_stationary(constrained: &[f64]) -> Vec<f64> {
    coeffs_to_pacf(constrained, 1.0)
        .into_iter()
        .map(unbounded)
        .collect()
}

/// Unconstrained values to invertible MA coefficients.
pub fn constrain_invertible(unconstrained: &[f64]) -> Vec<f64> {
    let pacf: Vec<f64> = unconstrained.iter().map(|&u| bounded(u)).collect();
    pacf_to_coeffs(&pacf, -1.0)
}

/// Invertible MA coefficients to unconstrained values.
pub fn unconstrain_invertible(constrained: &[f64]) -> Vec<f64> {
    coeffs_to_pacf(constrained, -1.0)
        .into_iter()
        .map(unbounded)
        .collect()
}

/// Optimizer space to coefficient space, `[exog | ar | ma]`.
///
/// The exogenous block passes through unchanged.
pub fn transform_params(unconstrained: &[f64], p: usize, q: usize, k: usize) -> Result<Vec<f64>> {
    let expected = k + p + q;
    if unconstrained.len() != expected {
        return Err(TsaError::ParamLengthMismatch {
            expected,
            got: unconstrained.len(),
        });
    }
    let mut out = Vec::with_capacity(expected);
    out.extend_from_slice(&unconstrained[..k]);
    out.extend(constrain_stationary(&unconstrained[k..k + p]));
    out.extend(constrain_invertible(&unconstrained[k + p..]));
    Ok(out)
}

/// Coefficient space to optimizer space. Inverse of [`transform_params`].
///
/// Returns [`TsaError::BoundaryParameter`] when the AR part is not
/// stationary or the MA part is not invertible.
pub fn invtransform_params(constrained: &[f64], p: usize, q: usize, k: usize) -> Result<Vec<f64>> {
    let expected = k + p + q;
    if constrained.len() != expected {
        return Err(TsaError::ParamLengthMismatch {
            expected,
            got: constrained.len(),
        });
    }
    let mut out = Vec::with_capacity(expected);
    out.extend_from_slice(&constrained[..k]);
    out.extend(unconstrain_stationary(&constrained[k..k + p]));
    out.extend(unconstrain_invertible(&constrained[k + p..]));
    if out[k..].iter().any(|v| !v.is_finite()) {
        return Err(TsaError::BoundaryParameter);
    }
    Ok(out)
}

use nalgebra::{DMatrix, DVector};

use crate::error::{Result, TsaError};

/// Harvey-representation state space for an ARMA(p, q) disturbance.
///
/// State equation:  alpha_{t+1} = T * alpha_t + R * eta_t
/// Observation:     y_t          = Z' * alpha_t
///
/// with eta_t ~ N(0, sigma2) and no measurement error. The regression part
/// `X beta` is subtracted from the series before filtering.
#[derive(Debug, Clone)]
pub struct StateSpace {
    pub k_states: usize,
    pub transition: DMatrix<f64>, // T: r × r
    pub selection: DVector<f64>,  // R: r
    pub design: DVector<f64>,     // Z: r (single observation row)
}

impl StateSpace {
    /// Build T, R, Z for the given (already transformed) coefficients.
    ///
    /// r = max(p, q + 1). The AR coefficients fill the first column of T,
    /// padded with zeros to length r, and T carries ones on the
    /// superdiagonal. R = [1, theta_1, ..., theta_q, 0, ...], Z = e_1.
    pub fn arma(ar: &[f64], ma: &[f64]) -> Result<Self> {
        if ar.iter().chain(ma.iter()).any(|v| !v.is_finite()) {
            return Err(TsaError::BoundaryParameter);
        }
        let k_states = std::cmp::max(ar.len(), ma.len() + 1);

        let transition = Self::build_transition(ar, k_states);
        let selection = Self::build_selection(ma, k_states);
        let mut design = DVector::<f64>::zeros(k_states);
        design[0] = 1.0;

        Ok(Self {
            k_states,
            transition,
            selection,
            design,
        })
    }

    fn build_transition(ar: &[f64], k_states: usize) -> DMatrix<f64> {
        let mut t = DMatrix::<f64>::zeros(k_states, k_states);
        for (i, &phi) in ar.iter().enumerate() {
            t[(i, 0)] = phi;
        }
        // Superdiagonal ones
        for i in 0..k_states.saturating_sub(1) {
            t[(i, i + 1)] = 1.0;
        }
        t
    }

    fn build_selection(ma: &[f64], k_states: usize) -> DVector<f64> {
        let mut r = DVector::<f64>::zeros(k_states);
        r[0] = 1.0;
        for (i, &theta) in ma.iter().enumerate() {
            r[i + 1] = theta;
        }
        r
    }

    /// R R' (time-invariant disturbance covariance with unit variance).
    pub fn rrt(&self) -> DMatrix<f64> {
        &self.selection * self.selection.transpose()
    }
}

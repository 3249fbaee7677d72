use nalgebra::{DMatrix, DVector};

use crate::error::{Result, TsaError};
use crate::state_space::StateSpace;

/// Kalman filter initial state and covariance.
#[derive(Debug, Clone)]
pub struct KalmanInit {
    /// Initial state vector a_0 (zeros).
    pub initial_state: DVector<f64>,
    /// Initial state covariance P_0, unconditional covariance of the state
    /// for unit disturbance variance.
    pub initial_state_cov: DMatrix<f64>,
}

impl KalmanInit {
    /// Stationary initialization.
    ///
    /// Solves the discrete Lyapunov equation `P = T P T' + R R'` through
    /// `vec(P) = (I - T⊗T)^{-1} vec(RR')`. Both `vec` and the reshape are
    /// column-major, which is the nalgebra storage order, so the Kronecker
    /// product and `from_column_slice` agree.
    pub fn stationary(ss: &StateSpace) -> Result<Self> {
        let r = ss.k_states;
        let t = &ss.transition;
        let rrt = ss.rrt();

        let lhs = DMatrix::<f64>::identity(r * r, r * r) - t.kronecker(t);
        let rhs = DVector::from_column_slice(rrt.as_slice());
        let vec_p = lhs
            .lu()
            .solve(&rhs)
            .ok_or(TsaError::SingularInitialCovariance)?;
        if vec_p.iter().any(|v| !v.is_finite()) {
            return Err(TsaError::SingularInitialCovariance);
        }

        let p0 = DMatrix::from_column_slice(r, r, vec_p.as_slice());
        // symmetrize away round-off
        let p0 = (&p0 + p0.transpose()) * 0.5;

        Ok(Self {
            initial_state: DVector::zeros(r),
            initial_state_cov: p0,
        })
    }

    /// Same initialization with P_0 scaled by a known disturbance variance.
    pub fn stationary_scaled(ss: &StateSpace, sigma2: f64) -> Result<Self> {
        let mut init = Self::stationary(ss)?;
        init.initial_state_cov *= sigma2;
        Ok(init)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ar1_unconditional_variance() {
        let phi: f64 = 0.6;
        let ss = StateSpace::arma(&[phi], &[]).unwrap();
        let init = KalmanInit::stationary(&ss).unwrap();
        assert_eq!(init.initial_state.len(), 1);
        assert!(init.initial_state[0].abs() < 1e-15);
        let expected = 1.0 / (1.0 - phi * phi);
        assert!((init.initial_state_cov[(0, 0)] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_scaled_by_sigma2() {
        let ss = StateSpace::arma(&[0.5], &[]).unwrap();
        let init = KalmanInit::stationary_scaled(&ss, 2.0).unwrap();
        assert!((init.initial_state_cov[(0, 0)] - 2.0 / 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_satisfies_lyapunov_equation() {
        let ss = StateSpace::arma(&[0.5, -0.2], &[0.3, 0.1]).unwrap();
        let init = KalmanInit::stationary(&ss).unwrap();
        let p = &init.initial_state_cov;
        let resid = p - (&ss.transition * p * ss.transition.transpose() + ss.rrt());
        for v in resid.iter() {
            assert!(v.abs() < 1e-10, "Lyapunov residual {}", v);
        }
    }

    #[test]
    fn test_ma1_state_covariance() {
        // y_t = e_t + theta e_{t-1}: Var(y) = 1 + theta^2
        let theta = 0.4;
        let ss = StateSpace::arma(&[], &[theta]).unwrap();
        let init = KalmanInit::stationary(&ss).unwrap();
        let p = &init.initial_state_cov;
        assert!((p[(0, 0)] - (1.0 + theta * theta)).abs() < 1e-12);
        assert!((p[(0, 1)] - theta).abs() < 1e-12);
        assert!((p[(1, 1)] - theta * theta).abs() < 1e-12);
    }

    #[test]
    fn test_unit_root_is_singular() {
        let ss = StateSpace::arma(&[1.0], &[]).unwrap();
        assert_eq!(
            KalmanInit::stationary(&ss).unwrap_err(),
            TsaError::SingularInitialCovariance
        );
    }
}

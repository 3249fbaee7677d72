use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::{Result, TsaError};
use crate::kalman::{FilterOutput, KalmanOutput};
use crate::state_space::StateSpace;

/// H-step ahead forecast result.
#[derive(Debug, Clone)]
pub struct ForecastResult {
    /// Forecast means E[y_{n+h}] for h = 1..steps.
    pub mean: Vec<f64>,
    /// Forecast variances Var[y_{n+h}].
    pub variance: Vec<f64>,
    /// Lower confidence interval bounds.
    pub ci_lower: Vec<f64>,
    /// Upper confidence interval bounds.
    pub ci_upper: Vec<f64>,
}

/// Residual diagnostics output.
#[derive(Debug, Clone)]
pub struct ResidualOutput {
    /// Raw innovations v_t.
    pub residuals: Vec<f64>,
    /// Standardized residuals v_t / sqrt(F_t * scale).
    pub standardized_residuals: Vec<f64>,
}

/// Two-sided normal critical value for a `1 - alpha` interval.
pub fn critical_value(alpha: f64) -> Result<f64> {
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(TsaError::InvalidConfig(format!(
            "alpha must lie in (0, 1), got {}",
            alpha
        )));
    }
    let normal = Normal::new(0.0, 1.0).map_err(|e| TsaError::InvalidConfig(e.to_string()))?;
    Ok(normal.inverse_cdf(1.0 - alpha / 2.0))
}

/// H-step forecast from the state one step past the sample.
///
/// `regression` holds the trend / exogenous mean for each future period
/// (empty when the model has none). With the concentrated recursion the
/// state covariance is in units of sigma2:
///   y_hat_h = Z' a_h + d_h
///   F_h     = Z' P_h Z * sigma2
///   a_{h+1} = T a_h
///   P_{h+1} = T P_h T' + R R'
pub fn forecast(
    ss: &StateSpace,
    filter_output: &FilterOutput,
    sigma2: f64,
    steps: usize,
    alpha: f64,
    regression: &[f64],
) -> Result<ForecastResult> {
    if !regression.is_empty() && regression.len() < steps {
        return Err(TsaError::DimensionMismatch(format!(
            "future regression mean has {} periods, {} requested",
            regression.len(),
            steps
        )));
    }
    let z_alpha = critical_value(alpha)?;

    let z = &ss.design;
    let t_mat = &ss.transition;
    let rrt = ss.rrt();

    let mut a = filter_output.final_state.clone();
    let mut p = filter_output.final_state_cov.clone();

    let mut mean = Vec::with_capacity(steps);
    let mut variance = Vec::with_capacity(steps);
    let mut ci_lower = Vec::with_capacity(steps);
    let mut ci_upper = Vec::with_capacity(steps);

    for h in 0..steps {
        let d_h = regression.get(h).copied().unwrap_or(0.0);
        let y_hat = z.dot(&a) + d_h;

        let f_h = (z.dot(&(&p * z)) * sigma2).max(0.0);
        let se = f_h.sqrt();
        mean.push(y_hat);
        variance.push(f_h);
        ci_lower.push(y_hat - z_alpha * se);
        ci_upper.push(y_hat + z_alpha * se);

        a = t_mat * &a;
        p = t_mat * &p * t_mat.transpose() + &rrt;
    }

    Ok(ForecastResult {
        mean,
        variance,
        ci_lower,
        ci_upper,
    })
}

/// Residuals and standardized residuals from Kalman filter output.
///
/// `sigma2` rescales the forecast variances of a concentrated recursion;
/// pass 1.0 when the recursion ran with a known scale.
pub fn compute_residuals(output: &KalmanOutput, sigma2: f64) -> ResidualOutput {
    let standardized = output
        .innovations
        .iter()
        .zip(output.innovation_vars.iter())
        .map(|(&v, &f)| {
            let var = f * sigma2;
            if var > 0.0 {
                v / var.sqrt()
            } else {
                0.0
            }
        })
        .collect();

    ResidualOutput {
        residuals: output.innovations.clone(),
        standardized_residuals: standardized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initialization::KalmanInit;
    use crate::kalman::{kalman_filter, Scale};

    fn ar1_filter(phi: f64, y: &[f64]) -> (StateSpace, FilterOutput) {
        let ss = StateSpace::arma(&[phi], &[]).unwrap();
        let init = KalmanInit::stationary(&ss).unwrap();
        let fo = kalman_filter(y, &ss, &init, Scale::Concentrated, 0).unwrap();
        (ss, fo)
    }

    #[test]
    fn test_critical_value() {
        assert!((critical_value(0.05).unwrap() - 1.959963984540054).abs() < 1e-8);
        assert!((critical_value(0.10).unwrap() - 1.6448536269514722).abs() < 1e-8);
        assert!(critical_value(0.0).is_err());
        assert!(critical_value(1.5).is_err());
    }

    #[test]
    fn test_ar1_forecast_decays() {
        let phi = 0.8;
        let y = [0.5, -0.3, 1.2, 0.9, 2.0];
        let (ss, fo) = ar1_filter(phi, &y);
        let fc = forecast(&ss, &fo, 2.0, 3, 0.05, &[]).unwrap();
        // mean: phi^h y_n
        assert!((fc.mean[0] - phi * 2.0).abs() < 1e-12);
        assert!((fc.mean[1] - phi * phi * 2.0).abs() < 1e-12);
        // variance: sigma2 (1 + phi^2 + ... )
        assert!((fc.variance[0] - 2.0).abs() < 1e-10);
        assert!((fc.variance[1] - 2.0 * (1.0 + phi * phi)).abs() < 1e-10);
        assert!(fc.ci_lower[2] < fc.mean[2] && fc.mean[2] < fc.ci_upper[2]);
    }

    #[test]
    fn test_forecast_adds_regression_mean() {
        let y = [0.1, 0.2, -0.4];
        let (ss, fo) = ar1_filter(0.5, &y);
        let base = forecast(&ss, &fo, 1.0, 2, 0.05, &[]).unwrap();
        let shifted = forecast(&ss, &fo, 1.0, 2, 0.05, &[10.0, 20.0]).unwrap();
        assert!((shifted.mean[0] - base.mean[0] - 10.0).abs() < 1e-12);
        assert!((shifted.mean[1] - base.mean[1] - 20.0).abs() < 1e-12);
        assert_eq!(shifted.variance, base.variance);
        assert!(forecast(&ss, &fo, 1.0, 3, 0.05, &[1.0]).is_err());
    }

    #[test]
    fn test_zero_steps() {
        let (ss, fo) = ar1_filter(0.5, &[1.0, 2.0]);
        let fc = forecast(&ss, &fo, 1.0, 0, 0.05, &[]).unwrap();
        assert!(fc.mean.is_empty());
    }

    #[test]
    fn test_standardized_residuals() {
        let y = [1.0, 0.5, -0.2, 0.3];
        let (_, fo) = ar1_filter(0.5, &y);
        let out = compute_residuals(&fo.output, 4.0);
        assert_eq!(out.residuals, fo.output.innovations);
        // first innovation: y_0 with F = 1 / (1 - phi^2)
        let expected = 1.0 / (4.0 / 0.75f64).sqrt();
        assert!((out.standardized_residuals[0] - expected).abs() < 1e-12);
    }
}

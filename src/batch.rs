//! Rayon-based parallel batch processing for multiple time series.
//!
//! Every series is handled independently and carries its own `Result`, so
//! one bad series does not abort the batch.

use rayon::prelude::*;

use crate::arma::ArmaModel;
use crate::error::{Result, TsaError};
use crate::forecast::ForecastResult;
use crate::results::ArmaResults;
use crate::types::ArmaConfig;

fn exog_at(exog_list: Option<&[Vec<Vec<f64>>]>, i: usize) -> Result<Option<&[Vec<f64>]>> {
    match exog_list {
        Some(list) => list
            .get(i)
            .map(|cols| Some(cols.as_slice()))
            .ok_or_else(|| TsaError::DimensionMismatch(format!("no exog for series {}", i))),
        None => Ok(None),
    }
}

/// Exact (concentrated) log-likelihood of each series at shared parameters.
///
/// If `exog_list` is provided, `exog_list[i]` is the exog for `series[i]`.
pub fn batch_loglike(
    series: &[Vec<f64>],
    config: &ArmaConfig,
    params: &[f64],
    exog_list: Option<&[Vec<Vec<f64>>]>,
) -> Vec<Result<f64>> {
    series
        .par_iter()
        .enumerate()
        .map(|(i, endog)| {
            let model = ArmaModel::new(endog, exog_at(exog_list, i)?)?;
            model.loglike(config, params, None)
        })
        .collect()
}

/// Fit one ARMA model per series in parallel with a shared config.
pub fn batch_fit(
    series: &[Vec<f64>],
    config: &ArmaConfig,
    exog_list: Option<&[Vec<Vec<f64>>]>,
) -> Vec<Result<ArmaResults>> {
    series
        .par_iter()
        .enumerate()
        .map(|(i, endog)| {
            let model = ArmaModel::new(endog, exog_at(exog_list, i)?)?;
            model.fit(config, None)
        })
        .collect()
}

/// Forecast each series from its own parameter vector.
///
/// `params_list[i]` is the coefficient vector for `series[i]`;
/// `exog_list[i]` and `future_exog_list[i]` are its past and future
/// regressors.
pub fn batch_forecast(
    series: &[Vec<f64>],
    config: &ArmaConfig,
    params_list: &[Vec<f64>],
    steps: usize,
    alpha: f64,
    exog_list: Option<&[Vec<Vec<f64>>]>,
    future_exog_list: Option<&[Vec<Vec<f64>>]>,
) -> Vec<Result<ForecastResult>> {
    series
        .par_iter()
        .enumerate()
        .map(|(i, endog)| {
            let params = params_list.get(i).ok_or_else(|| {
                TsaError::DimensionMismatch(format!("no parameters for series {}", i))
            })?;
            let model = ArmaModel::new(endog, exog_at(exog_list, i)?)?;
            let results = model.results_at(config, params)?;
            results.forecast(steps, alpha, exog_at(future_exog_list, i)?)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArmaMethod, ArmaOrder, Trend};
    use std::f64::consts::PI;

    fn ar1_data(n: usize, phi: f64, seed: u64) -> Vec<f64> {
        let mut state = seed;
        let mut next = || {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 11) as f64 + 0.5) / (1u64 << 53) as f64
        };
        let mut y = vec![0.0; n];
        for t in 1..n {
            let e = (-2.0 * next().ln()).sqrt() * (2.0 * PI * next()).cos();
            y[t] = phi * y[t - 1] + e;
        }
        y
    }

    fn make_config() -> ArmaConfig {
        ArmaConfig {
            order: ArmaOrder::new(1, 0),
            trend: Trend::None,
            method: ArmaMethod::Mle,
            ..ArmaConfig::default()
        }
    }

    #[test]
    fn test_batch_fit_matches_single() {
        let data = ar1_data(300, 0.6, 1);
        let config = make_config();
        let batch = batch_fit(&[data.clone()], &config, None);
        assert_eq!(batch.len(), 1);
        let batch_result = batch[0].as_ref().unwrap();
        let direct = ArmaModel::new(&data, None).unwrap().fit(&config, None).unwrap();
        assert!((batch_result.loglike - direct.loglike).abs() < 1e-10);
        for (a, b) in batch_result.params.iter().zip(direct.params.iter()) {
            assert!((a - b).abs() < 1e-10, "param mismatch: {} vs {}", a, b);
        }
    }

    #[test]
    fn test_batch_loglike_matches_single() {
        let series = vec![ar1_data(200, 0.5, 2), ar1_data(150, 0.5, 3)];
        let config = make_config();
        let batch = batch_loglike(&series, &config, &[0.5], None);
        assert_eq!(batch.len(), 2);
        for (endog, r) in series.iter().zip(batch.iter()) {
            let direct = ArmaModel::new(endog, None)
                .unwrap()
                .loglike(&config, &[0.5], None)
                .unwrap();
            assert!((r.as_ref().unwrap() - direct).abs() < 1e-12);
        }
    }

    #[test]
    fn test_batch_forecast_uses_own_params() {
        let data = ar1_data(100, 0.5, 4);
        let series = vec![data.clone(), data.clone()];
        let params_list = vec![vec![0.5], vec![0.9]];
        let batch = batch_forecast(&series, &make_config(), &params_list, 3, 0.05, None, None);
        let last = data[99];
        let f0 = batch[0].as_ref().unwrap();
        let f1 = batch[1].as_ref().unwrap();
        assert!((f0.mean[0] - 0.5 * last).abs() < 1e-10);
        assert!((f1.mean[0] - 0.9 * last).abs() < 1e-10);
    }

    #[test]
    fn test_batch_empty() {
        let empty: Vec<Vec<f64>> = vec![];
        assert!(batch_fit(&empty, &make_config(), None).is_empty());
    }

    #[test]
    fn test_batch_error_handling() {
        let series = vec![ar1_data(200, 0.5, 5), vec![]];
        let results = batch_fit(&series, &make_config(), None);
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok(), "good series should succeed");
        assert!(results[1].is_err(), "bad series should fail");

        let missing = batch_forecast(&series, &make_config(), &[vec![0.5]], 2, 0.05, None, None);
        assert!(matches!(missing[1], Err(TsaError::InsufficientData { .. }) | Err(TsaError::DimensionMismatch(_))));
    }
}

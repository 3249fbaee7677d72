//! End-to-end estimation on simulated series.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

use tsa_rs::forecast::critical_value;
use tsa_rs::{
    arma_generate_sample, ArConfig, ArModel, ArmaConfig, ArmaMethod, ArmaModel, ArmaOrder,
    FitMethod, InfoCriterion, Trend,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn simulate(ar: &[f64], ma: &[f64], n: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    arma_generate_sample(ar, ma, n, 1.0, 250, &mut rng).unwrap()
}

fn arma11_config(method: ArmaMethod) -> ArmaConfig {
    ArmaConfig {
        order: ArmaOrder::new(1, 1),
        trend: Trend::None,
        method,
        ..ArmaConfig::default()
    }
}

#[test]
fn arma11_css_and_exact_agree_with_truth() {
    init_tracing();
    let y = simulate(&[0.75], &[-0.25], 1000, 12345);
    let model = ArmaModel::new(&y, None).unwrap();

    let css = model.fit(&arma11_config(ArmaMethod::Css), None).unwrap();
    let mle = model.fit(&arma11_config(ArmaMethod::Mle), None).unwrap();
    let css_mle = model.fit(&arma11_config(ArmaMethod::CssMle), None).unwrap();

    for res in [&css, &mle, &css_mle] {
        assert!((res.arparams()[0] - 0.75).abs() < 0.15, "ar = {:?}", res.arparams());
        assert!((res.maparams()[0] + 0.25).abs() < 0.15, "ma = {:?}", res.maparams());
        assert!((res.sigma2 - 1.0).abs() < 0.15, "sigma2 = {}", res.sigma2);
        assert!(res.is_stationary() && res.is_invertible());
    }

    // both exact fits maximize the same likelihood
    assert!((mle.loglike - css_mle.loglike).abs() < 1e-2);
    // CSS and exact estimates differ by O(1/n)
    assert!((css.arparams()[0] - mle.arparams()[0]).abs() < 0.05);
    assert!((css.maparams()[0] - mle.maparams()[0]).abs() < 0.05);

    let bse = mle.bse().unwrap();
    assert_eq!(bse.len(), 2);
    assert!(bse.iter().all(|s| s.is_finite() && *s > 0.0 && *s < 0.2));
}

#[test]
fn ar_and_arma_exact_likelihoods_coincide() {
    init_tracing();
    let y: Vec<f64> = simulate(&[0.6], &[], 400, 7)
        .into_iter()
        .map(|v| v + 2.0)
        .collect();

    let ar = ArModel::new(&y)
        .unwrap()
        .fit(&ArConfig {
            maxlag: Some(1),
            method: FitMethod::Mle,
            ..ArConfig::default()
        })
        .unwrap();
    let arma = ArmaModel::new(&y, None)
        .unwrap()
        .fit(
            &ArmaConfig {
                order: ArmaOrder::new(1, 0),
                trend: Trend::Constant,
                method: ArmaMethod::Mle,
                ..ArmaConfig::default()
            },
            None,
        )
        .unwrap();

    assert!((ar.loglike - arma.loglike).abs() < 1e-2, "{} vs {}", ar.loglike, arma.loglike);
    assert!((ar.arparams()[0] - arma.arparams()[0]).abs() < 1e-2);
    // AR reports the intercept, ARMA the process mean
    let mean = ar.trendparams()[0] / (1.0 - ar.arparams()[0]);
    assert!((mean - arma.exogparams()[0]).abs() < 5e-2);
}

#[test]
fn bic_picks_the_generating_lag() {
    init_tracing();
    let y = simulate(&[0.5, -0.3], &[], 1000, 99);
    let res = ArModel::new(&y)
        .unwrap()
        .fit(&ArConfig {
            maxlag: Some(8),
            ic: Some(InfoCriterion::Bic),
            ..ArConfig::default()
        })
        .unwrap();

    assert!((2..=4).contains(&res.laglen), "laglen = {}", res.laglen);
    assert!((res.arparams()[0] - 0.5).abs() < 0.1);
    assert!((res.arparams()[1] + 0.3).abs() < 0.1);
    assert_eq!(res.avobs, res.nobs - res.laglen);
}

#[test]
fn ar1_forecast_decays_to_the_mean() {
    init_tracing();
    let y = simulate(&[0.6], &[], 500, 3);
    let res = ArmaModel::new(&y, None)
        .unwrap()
        .fit(
            &ArmaConfig {
                order: ArmaOrder::new(1, 0),
                trend: Trend::None,
                method: ArmaMethod::Mle,
                ..ArmaConfig::default()
            },
            None,
        )
        .unwrap();

    let phi = res.arparams()[0];
    let last = *y.last().unwrap();
    let fc = res.forecast(20, 0.05, None).unwrap();

    assert_eq!(fc.mean.len(), 20);
    assert!((fc.mean[0] - phi * last).abs() < 1e-8);
    assert!((fc.mean[1] - phi * phi * last).abs() < 1e-8);
    assert!((fc.variance[0] - res.sigma2).abs() < 1e-8);
    assert!(fc.variance.windows(2).all(|w| w[1] >= w[0]));

    let long_run = res.sigma2 / (1.0 - phi * phi);
    assert!((fc.variance[19] - long_run).abs() < 1e-3);

    let z = critical_value(0.05).unwrap();
    assert!((z - 1.959964).abs() < 1e-5);
    for h in 0..20 {
        let half = z * fc.variance[h].sqrt();
        assert!((fc.ci_upper[h] - fc.mean[h] - half).abs() < 1e-10);
        assert!((fc.mean[h] - fc.ci_lower[h] - half).abs() < 1e-10);
    }
}

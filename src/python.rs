//! Python bindings (feature `python`).

use numpy::PyReadonlyArray1;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use crate::ar::ArModel;
use crate::arma::ArmaModel;
use crate::batch;
use crate::error::TsaError;
use crate::results::ArmaResults;
use crate::types::{ArConfig, ArmaConfig, ArmaOrder, InfoCriterion};

fn to_py_err(e: TsaError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn to_vec(a: &PyReadonlyArray1<'_, f64>) -> PyResult<Vec<f64>> {
    Ok(a.as_slice()?.to_vec())
}

fn columns(exog: Option<Vec<PyReadonlyArray1<'_, f64>>>) -> PyResult<Option<Vec<Vec<f64>>>> {
    exog.map(|cols| cols.iter().map(to_vec).collect::<PyResult<Vec<_>>>())
        .transpose()
}

fn arma_config(
    order: (i64, i64),
    trend: &str,
    method: &str,
    solver: &str,
    transparams: bool,
    maxiter: u64,
    burn_in: usize,
) -> PyResult<ArmaConfig> {
    Ok(ArmaConfig {
        order: ArmaOrder::try_from(order).map_err(to_py_err)?,
        trend: trend.parse().map_err(to_py_err)?,
        method: method.parse().map_err(to_py_err)?,
        solver: solver.parse().map_err(to_py_err)?,
        transparams,
        maxiter,
        burn_in,
        trace: None,
    })
}

fn results_dict<'py>(py: Python<'py>, res: &ArmaResults) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("params", res.params.clone())?;
    dict.set_item("loglike", res.loglike)?;
    dict.set_item("sigma2", res.sigma2)?;
    dict.set_item("aic", res.aic())?;
    dict.set_item("bic", res.bic())?;
    dict.set_item("hqic", res.hqic())?;
    dict.set_item("n_obs", res.n_obs)?;
    dict.set_item("n_params", res.n_params())?;
    dict.set_item("n_iter", res.n_iter)?;
    dict.set_item("converged", res.converged)?;
    dict.set_item("method", res.method.as_str())?;
    dict.set_item("solver", res.solver.clone())?;
    let roots = |z: Vec<nalgebra::Complex<f64>>| -> Vec<(f64, f64)> {
        z.iter().map(|c| (c.re, c.im)).collect()
    };
    dict.set_item("arroots", roots(res.arroots()))?;
    dict.set_item("maroots", roots(res.maroots()))?;
    match res.bse() {
        Ok(bse) => dict.set_item("bse", bse)?,
        Err(e) => dict.set_item("bse_error", e.to_string())?,
    }
    Ok(dict)
}

/// Version string.
#[pyfunction]
fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Exact ARMA log-likelihood at coefficient-space params
/// `[trend | exog | ar | ma]`. `sigma2=None` concentrates the scale out.
#[pyfunction]
#[pyo3(signature = (y, order, params, trend="c", exog=None, sigma2=None, burn_in=0))]
fn arma_loglike(
    y: PyReadonlyArray1<'_, f64>,
    order: (i64, i64),
    params: PyReadonlyArray1<'_, f64>,
    trend: &str,
    exog: Option<Vec<PyReadonlyArray1<'_, f64>>>,
    sigma2: Option<f64>,
    burn_in: usize,
) -> PyResult<f64> {
    let config = arma_config(order, trend, "mle", "lbfgsb", false, 0, burn_in)?;
    let exog = columns(exog)?;
    let model = ArmaModel::new(y.as_slice()?, exog.as_deref()).map_err(to_py_err)?;
    model
        .loglike(&config, params.as_slice()?, sigma2)
        .map_err(to_py_err)
}

/// Fit an ARMA model with regression errors.
#[pyfunction]
#[pyo3(signature = (y, order, trend="c", method="css-mle", exog=None, start_params=None,
                    transparams=true, solver="lbfgsb", maxiter=500, burn_in=0))]
#[allow(clippy::too_many_arguments)]
fn arma_fit<'py>(
    py: Python<'py>,
    y: PyReadonlyArray1<'py, f64>,
    order: (i64, i64),
    trend: &str,
    method: &str,
    exog: Option<Vec<PyReadonlyArray1<'py, f64>>>,
    start_params: Option<PyReadonlyArray1<'py, f64>>,
    transparams: bool,
    solver: &str,
    maxiter: u64,
    burn_in: usize,
) -> PyResult<Bound<'py, PyDict>> {
    let config = arma_config(order, trend, method, solver, transparams, maxiter, burn_in)?;
    let exog = columns(exog)?;
    let model = ArmaModel::new(y.as_slice()?, exog.as_deref()).map_err(to_py_err)?;
    let sp = start_params.as_ref().map(|a| a.as_slice()).transpose()?;
    let res = model.fit(&config, sp).map_err(to_py_err)?;
    results_dict(py, &res)
}

/// H-step ARMA forecast at coefficient-space params.
#[pyfunction]
#[pyo3(signature = (y, order, params, steps=10, alpha=0.05, trend="c", exog=None,
                    future_exog=None))]
#[allow(clippy::too_many_arguments)]
fn arma_forecast<'py>(
    py: Python<'py>,
    y: PyReadonlyArray1<'py, f64>,
    order: (i64, i64),
    params: PyReadonlyArray1<'py, f64>,
    steps: usize,
    alpha: f64,
    trend: &str,
    exog: Option<Vec<PyReadonlyArray1<'py, f64>>>,
    future_exog: Option<Vec<PyReadonlyArray1<'py, f64>>>,
) -> PyResult<Bound<'py, PyDict>> {
    let config = arma_config(order, trend, "mle", "lbfgsb", false, 0, 0)?;
    let exog = columns(exog)?;
    let future_exog = columns(future_exog)?;
    let model = ArmaModel::new(y.as_slice()?, exog.as_deref()).map_err(to_py_err)?;
    let res = model
        .results_at(&config, params.as_slice()?)
        .map_err(to_py_err)?;
    let fc = res
        .forecast(steps, alpha, future_exog.as_deref())
        .map_err(to_py_err)?;

    let dict = PyDict::new(py);
    dict.set_item("mean", fc.mean)?;
    dict.set_item("variance", fc.variance)?;
    dict.set_item("ci_lower", fc.ci_lower)?;
    dict.set_item("ci_upper", fc.ci_upper)?;
    Ok(dict)
}

/// Fit an AR(p) model.
#[pyfunction]
#[pyo3(signature = (y, maxlag=None, method="cmle", ic=None, trend="c", transparams=true,
                    solver="lbfgsb", maxiter=500))]
#[allow(clippy::too_many_arguments)]
fn ar_fit<'py>(
    py: Python<'py>,
    y: PyReadonlyArray1<'py, f64>,
    maxlag: Option<usize>,
    method: &str,
    ic: Option<&str>,
    trend: &str,
    transparams: bool,
    solver: &str,
    maxiter: u64,
) -> PyResult<Bound<'py, PyDict>> {
    let config = ArConfig {
        maxlag,
        method: method.parse().map_err(to_py_err)?,
        ic: ic
            .map(|s| s.parse::<InfoCriterion>())
            .transpose()
            .map_err(to_py_err)?,
        trend: trend.parse().map_err(to_py_err)?,
        transparams,
        solver: solver.parse().map_err(to_py_err)?,
        maxiter,
    };
    let res = ArModel::new(y.as_slice()?)
        .and_then(|m| m.fit(&config))
        .map_err(to_py_err)?;

    let dict = PyDict::new(py);
    dict.set_item("params", res.params.clone())?;
    dict.set_item("laglen", res.laglen)?;
    dict.set_item("sigma2", res.sigma2)?;
    dict.set_item("loglike", res.loglike)?;
    dict.set_item("aic", res.aic())?;
    dict.set_item("bic", res.bic())?;
    dict.set_item("hqic", res.hqic())?;
    dict.set_item("fpe", res.fpe())?;
    dict.set_item("converged", res.converged)?;
    if let Ok(bse) = res.bse() {
        dict.set_item("bse", bse)?;
    }
    Ok(dict)
}

/// Fit one ARMA model per series in parallel.
#[pyfunction]
#[pyo3(signature = (series_list, order, trend="c", method="css-mle", solver="lbfgsb",
                    maxiter=500))]
fn arma_batch_fit<'py>(
    py: Python<'py>,
    series_list: Vec<PyReadonlyArray1<'py, f64>>,
    order: (i64, i64),
    trend: &str,
    method: &str,
    solver: &str,
    maxiter: u64,
) -> PyResult<Bound<'py, PyList>> {
    let config = arma_config(order, trend, method, solver, true, maxiter, 0)?;
    let series: Vec<Vec<f64>> = series_list.iter().map(to_vec).collect::<PyResult<_>>()?;

    // release the GIL while rayon works
    let results = py.allow_threads(|| batch::batch_fit(&series, &config, None));

    let dicts = results
        .iter()
        .map(|r| match r {
            Ok(res) => results_dict(py, res),
            Err(e) => {
                let dict = PyDict::new(py);
                dict.set_item("error", e.to_string())?;
                dict.set_item("converged", false)?;
                Ok(dict)
            }
        })
        .collect::<PyResult<Vec<_>>>()?;
    PyList::new(py, dicts)
}

#[pymodule]
fn tsa_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(version, m)?)?;
    m.add_function(wrap_pyfunction!(arma_loglike, m)?)?;
    m.add_function(wrap_pyfunction!(arma_fit, m)?)?;
    m.add_function(wrap_pyfunction!(arma_forecast, m)?)?;
    m.add_function(wrap_pyfunction!(ar_fit, m)?)?;
    m.add_function(wrap_pyfunction!(arma_batch_fit, m)?)?;
    Ok(())
}

//! AR and ARMA estimation by exact Gaussian likelihood (Kalman filter),
//! conditional least squares and Yule-Walker.

pub mod error;
pub mod types;
pub mod params;
pub mod polynomial;
pub mod regression;
pub mod state_space;
pub mod initialization;
pub mod kalman;
pub mod likelihood;
pub mod optimizer;
pub mod start_params;
pub mod ar;
pub mod arma;
pub mod results;
pub mod forecast;
pub mod simulate;
pub mod batch;

#[cfg(feature = "python")]
mod python;

pub use ar::{ArModel, ArResults};
pub use arma::ArmaModel;
pub use error::{Result, TsaError};
pub use forecast::ForecastResult;
pub use results::ArmaResults;
pub use simulate::arma_generate_sample;
pub use types::{
    ArConfig, ArmaConfig, ArmaMethod, ArmaOrder, FitMethod, InfoCriterion, Solver, Trace, Trend,
};

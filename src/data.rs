mod config;
mod time_calc;
pub mod send_channels;

pub use config::*;
pub use time_calc::TimeCalc;

pub(crate) const CROSS_MARK: &str = "❌";

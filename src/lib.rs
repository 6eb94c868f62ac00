pub mod host;
pub mod logging;

pub use claudometer_core::{api, config, monitor, notify, usage};

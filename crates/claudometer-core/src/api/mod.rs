//! Public API layer (Facade) for claudometer-core.
//!
//! [`MonitorCore`] encapsulates the poller and the threshold notifier and
//! exposes lifecycle, notification and status methods. Hosts (console,
//! tray) should use this API instead of wiring the services themselves.
//!
//! # Quick Start
//!
//! ```ignore
//! use claudometer_core::api::MonitorCoreBuilder;
//!
//! let core = MonitorCoreBuilder::new(settings).build()?;
//! core.start();
//!
//! let mut rx = core.subscribe();
//! rx.changed().await?;
//! println!("{}", core.tooltip());
//!
//! core.shutdown(Duration::from_secs(2)).await;
//! ```

mod builder;
mod core;

pub use builder::MonitorCoreBuilder;
pub use core::MonitorCore;

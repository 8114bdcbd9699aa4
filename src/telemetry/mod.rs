//! Telemetry: logging setup and decision counters.

mod logging;
mod metrics;

pub use logging::{init_logging, LogConfig};
pub use metrics::{Counter, MetricsRegistry, SwitchStats};

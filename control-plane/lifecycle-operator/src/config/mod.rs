mod live;
mod types;

pub use live::{LiveOptions, LiveSettings, http_endpoint};
pub use types::{OperatorConfig, TelemetryConfig};

pub mod logging;
pub mod otel_exporter;

pub use logging::*;
pub use otel_exporter::*;

pub mod config;
pub mod controller;
pub mod crd;
pub mod events;
pub mod lifecycle;
pub mod runtime;
pub mod store;
pub mod telemetry;

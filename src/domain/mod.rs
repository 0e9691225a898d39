// Domain layer - the per-channel signal pipeline and its data model
pub mod anomaly;
pub mod csv;
pub mod fault;
pub mod filter;
pub mod history;
pub mod reading;
pub mod sensor;
pub mod telemetry;

pub mod configuration;
pub mod payment_client;
pub mod routes;
pub mod startup;
pub mod telemetry;
pub mod utils;

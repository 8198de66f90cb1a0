pub mod client;
pub mod config;
pub mod driver;
pub mod errors;
pub mod logging;
pub mod metrics;
pub mod target;
pub mod utils;
pub mod worker;
pub mod workload;
pub mod yaml_config;

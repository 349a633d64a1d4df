pub mod config;
pub mod domain;
pub mod event_sourcing;
pub mod fulfillment;
pub mod metrics;
pub mod utils;

pub use config::{ConfigError, ServiceConfig};
pub use domain::order::{Order, OrderError, OrderService};

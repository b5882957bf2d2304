//! A Sensu Go event handler that writes the metric points of an event into a
//! ClickHouse table, one row per point, in a single all-or-nothing batch.

pub mod config;
pub mod db;
pub mod error;
pub mod event;
pub mod handler;
pub mod logging;

pub use config::{CliArgs, HandlerConfig, Settings};
pub use error::HandlerError;
pub use event::{Event, MetricPoint};
pub use handler::{handle_event, process_event};

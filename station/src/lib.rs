//! Indoor environment station.
//!
//! Write path: [`sensors`] → [`compensation`] → [`reader`] → [`store`],
//! one cycle per invocation, driven through [`context::StationContext`].
//! Read path: [`store`] → [`transform`], pure functions over a snapshot.
//! [`forecast`] is an independent enrichment source for presentation.

pub mod compensation;
pub mod config;
pub mod context;
pub mod error;
pub mod forecast;
pub mod http;
pub mod hue;
pub mod logging;
pub mod reader;
pub mod record;
pub mod sensors;
pub mod stats;
pub mod store;
pub mod transform;

pub use config::StationConfig;
pub use context::StationContext;
pub use error::{Result, StationError};
pub use record::{Category, Variable, WeatherRecord};

pub mod config;
pub mod duration;
pub mod error;

pub use config::Config;
pub use duration::{format_duration, parse_duration};
pub use error::*;

//! Natural-language time expressions to UTC instants.
//!
//! `TimeResolver` runs an ordered chain of anchored recognizers, falls back to
//! fixed date/time formats, and optionally to a caller-supplied interpreter.

mod clock;
mod error;
mod fixed;
mod resolver;
mod strategy;
mod zone;

pub use error::{ParseFailure, Result};
pub use fixed::parse_fixed_format;
pub use resolver::{FallbackInterpreter, Resolution, ResolutionSource, TimeResolver};
pub use strategy::ParseStrategy;
pub use zone::parse_zone;

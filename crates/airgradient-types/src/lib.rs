//! Platform-agnostic types for AirGradient environmental sensors.
//!
//! This crate provides the data types shared by the bridge service and its
//! tests:
//!
//! - [`Measures`]: the JSON body an AirGradient monitor posts, decoded with
//!   [`decode_measures`]
//! - [`Reading`]: a normalized, timestamped snapshot attributed to an instance
//! - [`parse_instance_id`]: resolution of the instance id from a path token
//!
//! # Example
//!
//! ```
//! use airgradient_types::{Measures, parse_instance_id};
//!
//! let measures: Measures = serde_json::from_str(r#"{"wifi":-73,"pm02":297,"rco2":1009}"#).unwrap();
//! let reading = measures
//!     .substitute_invalid(None)
//!     .into_reading(parse_instance_id("airgradient:a1b2c3"), time::OffsetDateTime::UNIX_EPOCH);
//!
//! assert_eq!(reading.id, "a1b2c3");
//! assert_eq!(reading.co2, 1009);
//! ```

pub mod instance;
pub mod types;

pub use instance::{INSTANCE_ID_DELIMITER, NULL_INSTANCE_ID, parse_instance_id};
pub use types::{Measures, Reading, decode_measures};

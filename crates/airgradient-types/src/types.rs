//! Core types for AirGradient sensor data.

use std::fmt;

use serde::de::{IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

use crate::instance::NULL_INSTANCE_ID;

/// Measurements as posted by an AirGradient monitor.
///
/// The firmware sends a flat JSON object such as
/// `{"wifi":-73,"pm02":297,"rco2":1009,"atmp":26.10,"rhum":51}`.
/// Decoding is lenient so older or partially equipped monitors still decode:
///
/// - unknown keys are ignored and missing keys default to zero
/// - keys match case-insensitively (`"PM02"` sets `pm25`)
/// - a `null` value leaves the field as it was
/// - a repeated key takes its last non-null value
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Measures {
    /// WiFi signal strength in dB.
    pub wifi: i64,
    /// PM2.5 in µg/m³.
    #[serde(rename = "pm02")]
    pub pm25: i64,
    /// CO2 in ppm.
    #[serde(rename = "rco2")]
    pub co2: i64,
    /// Temperature in °C.
    #[serde(rename = "atmp")]
    pub temperature: f64,
    /// Relative humidity in percent.
    #[serde(rename = "rhum")]
    pub humidity: i64,
}

impl<'de> Deserialize<'de> for Measures {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(MeasuresVisitor)
    }
}

struct MeasuresVisitor;

impl MeasuresVisitor {
    fn set<'de, A, T>(map: &mut A, field: &mut T) -> Result<(), A::Error>
    where
        A: MapAccess<'de>,
        T: Deserialize<'de>,
    {
        if let Some(value) = map.next_value::<Option<T>>()? {
            *field = value;
        }
        Ok(())
    }
}

impl<'de> Visitor<'de> for MeasuresVisitor {
    type Value = Measures;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object of AirGradient measures")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Measures, A::Error> {
        let mut measures = Measures::default();
        while let Some(key) = map.next_key::<String>()? {
            match key.to_ascii_lowercase().as_str() {
                "wifi" => Self::set(&mut map, &mut measures.wifi)?,
                "pm02" => Self::set(&mut map, &mut measures.pm25)?,
                "rco2" => Self::set(&mut map, &mut measures.co2)?,
                "atmp" => Self::set(&mut map, &mut measures.temperature)?,
                "rhum" => Self::set(&mut map, &mut measures.humidity)?,
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(measures)
    }
}

/// Decode a posted body into [`Measures`].
///
/// A literal `null` body decodes as all-zero measures.
///
/// # Examples
///
/// ```
/// use airgradient_types::{Measures, decode_measures};
///
/// assert_eq!(decode_measures(b"null").unwrap(), Measures::default());
/// assert_eq!(decode_measures(br#"{"PM02":5}"#).unwrap().pm25, 5);
/// ```
pub fn decode_measures(body: &[u8]) -> Result<Measures, serde_json::Error> {
    Ok(serde_json::from_slice::<Option<Measures>>(body)?.unwrap_or_default())
}

impl Measures {
    /// Replace untrusted PM2.5 and CO2 values with the previous reading's.
    ///
    /// The PMS5003 and SenseAir S8 report zero or a negative value when a
    /// measurement fails. Such values are replaced by the last committed
    /// value for that field, or by zero when there is no previous reading.
    /// Temperature and humidity are passed through unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use airgradient_types::{Measures, Reading};
    ///
    /// let previous = Reading { pm25: 12, co2: 640, ..Reading::default() };
    /// let measures = Measures { pm25: 0, co2: -1, ..Measures::default() };
    ///
    /// let fixed = measures.substitute_invalid(Some(&previous));
    /// assert_eq!((fixed.pm25, fixed.co2), (12, 640));
    ///
    /// let fixed = measures.substitute_invalid(None);
    /// assert_eq!((fixed.pm25, fixed.co2), (0, 0));
    /// ```
    #[must_use]
    pub fn substitute_invalid(mut self, previous: Option<&Reading>) -> Self {
        if self.pm25 <= 0 {
            self.pm25 = previous.map_or(0, |p| p.pm25);
        }
        if self.co2 <= 0 {
            self.co2 = previous.map_or(0, |p| p.co2);
        }
        self
    }

    /// Attribute these measures to an instance and stamp them with the
    /// ingestion time.
    #[must_use]
    pub fn into_reading(self, id: String, received_at: OffsetDateTime) -> Reading {
        Reading {
            id,
            timestamp: received_at.unix_timestamp(),
            wifi: self.wifi,
            pm25: self.pm25,
            co2: self.co2,
            temperature: self.temperature,
            humidity: self.humidity,
        }
    }
}

/// The most recent normalized reading of a sensor instance.
///
/// This is also the on-disk backup format. `ts` is omitted when zero so that
/// backups written before timestamps existed round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Reading {
    /// Instance id resolved from the request path, `"null"` if unknown.
    pub id: String,
    /// Ingestion time as Unix seconds (server clock, not sensor clock).
    #[serde(rename = "ts", skip_serializing_if = "is_zero")]
    pub timestamp: i64,
    /// WiFi signal strength in dB.
    pub wifi: i64,
    /// PM2.5 in µg/m³.
    #[serde(rename = "pm02")]
    pub pm25: i64,
    /// CO2 in ppm.
    #[serde(rename = "rco2")]
    pub co2: i64,
    /// Temperature in °C.
    #[serde(rename = "atmp")]
    pub temperature: f64,
    /// Relative humidity in percent.
    #[serde(rename = "rhum")]
    pub humidity: i64,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl Default for Reading {
    fn default() -> Self {
        Self {
            id: NULL_INSTANCE_ID.to_string(),
            timestamp: 0,
            wifi: 0,
            pm25: 0,
            co2: 0,
            temperature: 0.0,
            humidity: 0,
        }
    }
}

impl Reading {
    /// Seconds elapsed between ingestion and `now`.
    #[must_use]
    pub fn age_secs(&self, now: OffsetDateTime) -> i64 {
        now.unix_timestamp().saturating_sub(self.timestamp)
    }

    /// Whether the reading is strictly younger than `max_age_secs` at `now`.
    ///
    /// Readings without a timestamp are never fresh.
    #[must_use]
    pub fn is_fresh(&self, now: OffsetDateTime, max_age_secs: i64) -> bool {
        self.timestamp != 0 && self.age_secs(now) < max_age_secs
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn previous(pm25: i64, co2: i64) -> Reading {
        Reading {
            pm25,
            co2,
            ..Reading::default()
        }
    }

    proptest! {
        /// Positive values always pass through unchanged.
        #[test]
        fn positive_values_are_kept(pm25 in 1..i64::MAX, co2 in 1..i64::MAX, prev_pm in any::<i64>(), prev_co2 in any::<i64>()) {
            let measures = Measures { pm25, co2, ..Measures::default() };
            let fixed = measures.substitute_invalid(Some(&previous(prev_pm, prev_co2)));
            prop_assert_eq!(fixed.pm25, pm25);
            prop_assert_eq!(fixed.co2, co2);
        }

        /// Non-positive PM2.5 takes the previous value regardless of CO2.
        #[test]
        fn non_positive_pm25_takes_previous(pm25 in i64::MIN..=0, co2 in any::<i64>(), x in 1..i64::MAX) {
            let measures = Measures { pm25, co2, ..Measures::default() };
            let fixed = measures.substitute_invalid(Some(&previous(x, 400)));
            prop_assert_eq!(fixed.pm25, x);
        }

        /// Non-positive CO2 takes the previous value regardless of PM2.5.
        #[test]
        fn non_positive_co2_takes_previous(co2 in i64::MIN..=0, pm25 in any::<i64>(), x in 1..i64::MAX) {
            let measures = Measures { pm25, co2, ..Measures::default() };
            let fixed = measures.substitute_invalid(Some(&previous(3, x)));
            prop_assert_eq!(fixed.co2, x);
        }
    }
}

//! Prometheus text exposition of a reading.
//!
//! The layout is fixed: dashboards and alert rules in existing deployments
//! match on these metric names and this order. The instance id is emitted as a
//! comment line rather than a label.

use std::fmt::{self, Write};

use airgradient_types::Reading;

/// Content type of the exposition body.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Write `reading` into `out` in the exposition format.
///
/// Temperature is printed with six decimal places; every other value is an
/// integer.
pub fn write_exposition<W: Write>(out: &mut W, reading: &Reading) -> fmt::Result {
    write!(
        out,
        "
# HELP instance The ID of the AirGradient sensor.
# instance {id}

# HELP wifi Current WiFi signal strength, in dB
# TYPE wifi gauge
wifi {wifi}

# HELP pm02 Particulate Matter PM2.5 value
# TYPE pm02 gauge
pm02 {pm25}

# HELP rco2 CO2 value, in ppm
# TYPE rco2 gauge
rco2 {co2}

# HELP atmp Temperature, in degrees Celsius
# TYPE atmp gauge
atmp {temperature:.6}

# HELP rhum Relative humidity, in percent
# TYPE rhum gauge
rhum {humidity}
",
        id = reading.id,
        wifi = reading.wifi,
        pm25 = reading.pm25,
        co2 = reading.co2,
        temperature = reading.temperature,
        humidity = reading.humidity,
    )
}

/// Render `reading` into a new string.
pub fn render(reading: &Reading) -> Result<String, fmt::Error> {
    let mut output = String::with_capacity(512);
    write_exposition(&mut output, reading)?;
    Ok(output)
}

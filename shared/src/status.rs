//! Status report format
//!
//! One line per status tick, semicolon-delimited `key=value` pairs:
//!
//! ```text
//! battery=87.5;isConnected=true;areMotorsOn=true;isFlying=true;altitude=12.3
//! ```
//!
//! Floats always carry a fractional digit (`0.0`, not `0`) so consumers that
//! split on the key see the same shape for every value.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Fields published on the status topic
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatusSnapshot {
    pub battery: f32,
    pub is_connected: bool,
    pub are_motors_on: bool,
    pub is_flying: bool,
    pub altitude: f32,
}

#[derive(Debug, Error, PartialEq)]
pub enum StatusParseError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("malformed pair `{0}`")]
    MalformedPair(String),

    #[error("invalid value for `{key}`: {value}")]
    InvalidValue { key: &'static str, value: String },
}

struct Float(f32);

impl fmt::Display for Float {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_finite() && self.0.fract() == 0.0 {
            write!(f, "{:.1}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "battery={};isConnected={};areMotorsOn={};isFlying={};altitude={}",
            Float(self.battery),
            self.is_connected,
            self.are_motors_on,
            self.is_flying,
            Float(self.altitude)
        )
    }
}

impl FromStr for StatusSnapshot {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut battery = None;
        let mut is_connected = None;
        let mut are_motors_on = None;
        let mut is_flying = None;
        let mut altitude = None;

        for pair in s.trim().split(';').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| StatusParseError::MalformedPair(pair.to_string()))?;

            match key {
                "battery" => battery = Some(parse_value("battery", value)?),
                "isConnected" => is_connected = Some(parse_value("isConnected", value)?),
                "areMotorsOn" => are_motors_on = Some(parse_value("areMotorsOn", value)?),
                "isFlying" => is_flying = Some(parse_value("isFlying", value)?),
                "altitude" => altitude = Some(parse_value("altitude", value)?),
                // Unknown keys are skipped so newer bridges stay readable
                _ => {}
            }
        }

        Ok(Self {
            battery: battery.ok_or(StatusParseError::MissingField("battery"))?,
            is_connected: is_connected.ok_or(StatusParseError::MissingField("isConnected"))?,
            are_motors_on: are_motors_on.ok_or(StatusParseError::MissingField("areMotorsOn"))?,
            is_flying: is_flying.ok_or(StatusParseError::MissingField("isFlying"))?,
            altitude: altitude.ok_or(StatusParseError::MissingField("altitude"))?,
        })
    }
}

fn parse_value<T: FromStr>(key: &'static str, value: &str) -> Result<T, StatusParseError> {
    value.parse().map_err(|_| StatusParseError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

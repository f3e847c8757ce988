//! Parsing and plausibility checks for user-entered body measurements.
//!
//! Clients send numbers either as JSON numbers or as locale-formatted strings
//! (`"72,5"`), and heights in either meters or centimeters. Everything that
//! leaves this module is a plain `f64` in canonical units.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A numeric field as it arrives on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberInput {
    Number(f64),
    Text(String),
}

impl From<f64> for NumberInput {
    fn from(v: f64) -> Self {
        NumberInput::Number(v)
    }
}

impl From<&str> for NumberInput {
    fn from(v: &str) -> Self {
        NumberInput::Text(v.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
}

impl Sex {
    pub fn as_str(self) -> &'static str {
        match self {
            Sex::Male => "M",
            Sex::Female => "F",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sex {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "M" | "m" => Ok(Sex::Male),
            "F" | "f" => Ok(Sex::Female),
            other => Err(AppError::InvalidSex(format!(
                "invalid sex '{other}'; use 'M' or 'F'"
            ))),
        }
    }
}

/// Accepts `72.5`, `"72.5"` or `"72,5"`.
pub fn parse_locale_number(raw: &NumberInput) -> Result<f64, AppError> {
    let value = match raw {
        NumberInput::Number(n) => *n,
        NumberInput::Text(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !c.is_whitespace())
                .map(|c| if c == ',' { '.' } else { c })
                .collect();
            cleaned
                .parse::<f64>()
                .map_err(|_| AppError::InvalidNumber(s.clone()))?
        }
    };
    if !value.is_finite() {
        return Err(AppError::InvalidNumber(value.to_string()));
    }
    Ok(value)
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Meters in [0.90, 2.50] are kept, [90, 250] is read as centimeters, and
/// anything else below 400 is treated as mistyped centimeters.
pub fn normalize_height_to_meters(value: f64) -> Result<f64, AppError> {
    if (0.90..=2.50).contains(&value) {
        return Ok(round_to(value, 2));
    }
    if (90.0..=250.0).contains(&value) || (value > 2.50 && value < 400.0) {
        return Ok(round_to(value / 100.0, 2));
    }
    Err(AppError::out_of_range(
        "height",
        format!("{value} is outside the plausible range (0.90 m to 2.50 m)"),
    ))
}

pub fn validate_weight(value: f64) -> Result<f64, AppError> {
    if !(30.0..=400.0).contains(&value) {
        return Err(AppError::out_of_range(
            "weight",
            format!("{value} kg is outside 30-400 kg"),
        ));
    }
    Ok(round_to(value, 2))
}

pub fn validate_age(value: f64) -> Result<i32, AppError> {
    if !(5.0..=120.0).contains(&value) {
        return Err(AppError::out_of_range(
            "age",
            format!("{value} years is outside 5-120 years"),
        ));
    }
    Ok(value.round() as i32)
}

pub fn validate_body_fat(value: f64) -> Result<f64, AppError> {
    if !(0.0..=70.0).contains(&value) {
        return Err(AppError::out_of_range(
            "body_fat_pct",
            format!("{value}% is outside 0-70%"),
        ));
    }
    Ok(round_to(value, 2))
}

/// Snapshot measurements only need to be positive; children and infants are valid subjects.
pub fn positive_measurement(field: &'static str, raw: &NumberInput) -> Result<f64, AppError> {
    let value = parse_locale_number(raw)?;
    if value <= 0.0 {
        return Err(AppError::out_of_range(field, format!("{value} must be positive")));
    }
    Ok(round_to(value, 2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_and_dot_decimals() {
        assert_eq!(parse_locale_number(&"72,5".into()).unwrap(), 72.5);
        assert_eq!(parse_locale_number(&" 72.5 ".into()).unwrap(), 72.5);
        assert_eq!(parse_locale_number(&NumberInput::Number(80.0)).unwrap(), 80.0);
    }

    #[test]
    fn rejects_garbage_numbers() {
        let err = parse_locale_number(&"seventy".into()).unwrap_err();
        assert!(matches!(err, AppError::InvalidNumber(_)));
        assert!(parse_locale_number(&"1,2,3".into()).is_err());
    }

    #[test]
    fn height_accepts_meters_and_centimeters() {
        assert_eq!(normalize_height_to_meters(175.0).unwrap(), 1.75);
        assert_eq!(normalize_height_to_meters(1.75).unwrap(), 1.75);
        assert_eq!(normalize_height_to_meters(300.0).unwrap(), 3.0);
    }

    #[test]
    fn height_outside_every_band_is_rejected() {
        let err = normalize_height_to_meters(0.5).unwrap_err();
        assert!(matches!(err, AppError::OutOfRange { field: "height", .. }));
        assert!(normalize_height_to_meters(450.0).is_err());
    }

    #[test]
    fn plausibility_bounds() {
        assert!(validate_weight(29.9).is_err());
        assert_eq!(validate_weight(72.456).unwrap(), 72.46);
        assert!(validate_age(4.0).is_err());
        assert_eq!(validate_age(30.4).unwrap(), 30);
        assert!(validate_body_fat(70.5).is_err());
        assert_eq!(validate_body_fat(0.0).unwrap(), 0.0);
    }

    #[test]
    fn sex_parsing() {
        assert_eq!("M".parse::<Sex>().unwrap(), Sex::Male);
        assert_eq!(" f".parse::<Sex>().unwrap(), Sex::Female);
        assert!(matches!("X".parse::<Sex>(), Err(AppError::InvalidSex(_))));
    }
}

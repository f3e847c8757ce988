use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::error::AppError;
use crate::units::Sex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    Heavy,
    Athlete,
}

impl ActivityLevel {
    pub fn multiplier(self) -> f64 {
        match self {
            ActivityLevel::Sedentary => 1.2,
            ActivityLevel::Light => 1.375,
            ActivityLevel::Moderate => 1.55,
            ActivityLevel::Heavy => 1.725,
            ActivityLevel::Athlete => 1.9,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityLevel::Sedentary => "SEDENTARY",
            ActivityLevel::Light => "LIGHT",
            ActivityLevel::Moderate => "MODERATE",
            ActivityLevel::Heavy => "HEAVY",
            ActivityLevel::Athlete => "ATHLETE",
        }
    }
}

impl FromStr for ActivityLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SEDENTARY" => Ok(ActivityLevel::Sedentary),
            "LIGHT" => Ok(ActivityLevel::Light),
            "MODERATE" => Ok(ActivityLevel::Moderate),
            "HEAVY" => Ok(ActivityLevel::Heavy),
            "ATHLETE" => Ok(ActivityLevel::Athlete),
            _ => Err(AppError::Validation(format!(
                "invalid activity level '{s}'; use SEDENTARY, LIGHT, MODERATE, HEAVY or ATHLETE"
            ))),
        }
    }
}

/// One immutable entry in a subject's metrics history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsRecord {
    pub id: i64,
    pub user_id: i64,
    pub weight_kg: f64,
    pub height_m: f64,
    pub age_years: i32,
    pub sex: Sex,
    pub activity_level: ActivityLevel,
    pub body_fat_pct: Option<f64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMetrics {
    pub user_id: i64,
    pub weight_kg: f64,
    pub height_m: f64,
    pub age_years: i32,
    pub sex: Sex,
    pub activity_level: ActivityLevel,
    pub body_fat_pct: Option<f64>,
    pub created_at: OffsetDateTime,
}

impl NewMetrics {
    pub fn into_record(self, id: i64) -> MetricsRecord {
        MetricsRecord {
            id,
            user_id: self.user_id,
            weight_kg: self.weight_kg,
            height_m: self.height_m,
            age_years: self.age_years,
            sex: self.sex,
            activity_level: self.activity_level,
            body_fat_pct: self.body_fat_pct,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct MetricsRow {
    pub id: i64,
    pub user_id: i64,
    pub weight_kg: f64,
    pub height_m: f64,
    pub age_years: i32,
    pub sex: String,
    pub activity_level: String,
    pub body_fat_pct: Option<f64>,
    pub created_at: OffsetDateTime,
}

impl TryFrom<MetricsRow> for MetricsRecord {
    type Error = AppError;

    fn try_from(r: MetricsRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            weight_kg: r.weight_kg,
            height_m: r.height_m,
            age_years: r.age_years,
            sex: r.sex.parse()?,
            activity_level: r.activity_level.parse()?,
            body_fat_pct: r.body_fat_pct,
            created_at: r.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_level_parsing_ignores_case() {
        assert_eq!("moderate".parse::<ActivityLevel>().unwrap(), ActivityLevel::Moderate);
        assert_eq!(" ATHLETE ".parse::<ActivityLevel>().unwrap(), ActivityLevel::Athlete);
        assert!(matches!("couch".parse::<ActivityLevel>(), Err(AppError::Validation(_))));
        assert_eq!(ActivityLevel::Heavy.multiplier(), 1.725);
    }
}

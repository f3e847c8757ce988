use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GestationType {
    #[default]
    Single,
    Twin,
    Triplet,
}

impl GestationType {
    pub fn as_str(self) -> &'static str {
        match self {
            GestationType::Single => "SINGLE",
            GestationType::Twin => "TWIN",
            GestationType::Triplet => "TRIPLET",
        }
    }
}

impl FromStr for GestationType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SINGLE" => Ok(GestationType::Single),
            "TWIN" => Ok(GestationType::Twin),
            "TRIPLET" => Ok(GestationType::Triplet),
            _ => Err(AppError::Validation(format!("invalid gestation type '{s}'"))),
        }
    }
}

/// Pre-pregnancy BMI band used for weight-gain goals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BmiClass {
    Under,
    Normal,
    Over,
    Obese,
}

impl BmiClass {
    pub fn as_str(self) -> &'static str {
        match self {
            BmiClass::Under => "UNDER",
            BmiClass::Normal => "NORMAL",
            BmiClass::Over => "OVER",
            BmiClass::Obese => "OBESE",
        }
    }
}

impl FromStr for BmiClass {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNDER" => Ok(BmiClass::Under),
            "NORMAL" => Ok(BmiClass::Normal),
            "OVER" => Ok(BmiClass::Over),
            "OBESE" => Ok(BmiClass::Obese),
            _ => Err(AppError::Validation(format!("invalid BMI class '{s}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GestationTracking {
    pub id: i64,
    pub user_id: i64,
    pub pre_pregnancy_weight_kg: f64,
    pub height_cm: f64,
    #[serde(with = "crate::clock::iso_date")]
    pub last_menstrual_period: Date,
    pub starting_week: Option<i32>,
    pub gestation_type: GestationType,
    pub bmi_pre: f64,
    pub bmi_class: BmiClass,
    pub goal_gain_min_kg: f64,
    pub goal_gain_max_kg: f64,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTracking {
    pub user_id: i64,
    pub pre_pregnancy_weight_kg: f64,
    pub height_cm: f64,
    pub last_menstrual_period: Date,
    pub starting_week: Option<i32>,
    pub gestation_type: GestationType,
    pub bmi_pre: f64,
    pub bmi_class: BmiClass,
    pub goal_gain_min_kg: f64,
    pub goal_gain_max_kg: f64,
    pub created_at: OffsetDateTime,
}

impl NewTracking {
    pub fn into_tracking(self, id: i64) -> GestationTracking {
        GestationTracking {
            id,
            user_id: self.user_id,
            pre_pregnancy_weight_kg: self.pre_pregnancy_weight_kg,
            height_cm: self.height_cm,
            last_menstrual_period: self.last_menstrual_period,
            starting_week: self.starting_week,
            gestation_type: self.gestation_type,
            bmi_pre: self.bmi_pre,
            bmi_class: self.bmi_class,
            goal_gain_min_kg: self.goal_gain_min_kg,
            goal_gain_max_kg: self.goal_gain_max_kg,
            active: true,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct TrackingRow {
    pub id: i64,
    pub user_id: i64,
    pub pre_pregnancy_weight_kg: f64,
    pub height_cm: f64,
    pub last_menstrual_period: Date,
    pub starting_week: Option<i32>,
    pub gestation_type: String,
    pub bmi_pre: f64,
    pub bmi_class: String,
    pub goal_gain_min_kg: f64,
    pub goal_gain_max_kg: f64,
    pub active: bool,
    pub created_at: OffsetDateTime,
}

impl TryFrom<TrackingRow> for GestationTracking {
    type Error = AppError;

    fn try_from(r: TrackingRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            pre_pregnancy_weight_kg: r.pre_pregnancy_weight_kg,
            height_cm: r.height_cm,
            last_menstrual_period: r.last_menstrual_period,
            starting_week: r.starting_week,
            gestation_type: r.gestation_type.parse()?,
            bmi_pre: r.bmi_pre,
            bmi_class: r.bmi_class.parse()?,
            goal_gain_min_kg: r.goal_gain_min_kg,
            goal_gain_max_kg: r.goal_gain_max_kg,
            active: r.active,
            created_at: r.created_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct GestationVisit {
    pub id: i64,
    pub tracking_id: i64,
    #[serde(with = "crate::clock::iso_date")]
    pub visit_date: Date,
    pub weight_kg: f64,
    pub gestational_week: i32,
    pub trimester: i16,
    pub systolic_bp: Option<i32>,
    pub diastolic_bp: Option<i32>,
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewVisit {
    pub tracking_id: i64,
    pub visit_date: Date,
    pub weight_kg: f64,
    pub gestational_week: i32,
    pub trimester: i16,
    pub systolic_bp: Option<i32>,
    pub diastolic_bp: Option<i32>,
    pub notes: Option<String>,
    pub created_at: OffsetDateTime,
}

impl NewVisit {
    pub fn into_visit(self, id: i64) -> GestationVisit {
        GestationVisit {
            id,
            tracking_id: self.tracking_id,
            visit_date: self.visit_date,
            weight_kg: self.weight_kg,
            gestational_week: self.gestational_week,
            trimester: self.trimester,
            systolic_bp: self.systolic_bp,
            diastolic_bp: self.diastolic_bp,
            notes: self.notes,
            created_at: self.created_at,
        }
    }
}

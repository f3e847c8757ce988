use serde::{Deserialize, Serialize};
use time::Date;

use crate::gestation::repo_types::GestationVisit;
use crate::units::NumberInput;

#[derive(Debug, Clone, Deserialize)]
pub struct StartGestationRequest {
    /// Defaults to the requester.
    pub user_id: Option<i64>,
    pub pre_pregnancy_weight: NumberInput,
    /// Centimeters (meters are accepted too).
    pub height: NumberInput,
    #[serde(with = "crate::clock::iso_date")]
    pub last_menstrual_period: Date,
    pub starting_week: Option<i32>,
    pub gestation_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddVisitRequest {
    #[serde(with = "crate::clock::iso_date")]
    pub visit_date: Date,
    pub weight: NumberInput,
    pub gestational_week: Option<i32>,
    pub systolic_bp: Option<i32>,
    pub diastolic_bp: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitView {
    #[serde(flatten)]
    pub visit: GestationVisit,
    /// Since the pre-pregnancy weight.
    pub weight_gain_kg: f64,
}

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::anthropometry::autopick::Redirect;
use crate::anthropometry::repo_types::{AnthropometricResult, Snapshot};
use crate::units::NumberInput;

/// Measurement fields as sent by clients. Every field is optional so the same
/// shape serves creation and partial update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnapshotFields {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub measured_at: Option<OffsetDateTime>,
    pub weight: Option<NumberInput>,
    pub height: Option<NumberInput>,
    pub age: Option<NumberInput>,
    pub sex: Option<String>,

    pub triceps_mm: Option<NumberInput>,
    pub biceps_mm: Option<NumberInput>,
    pub subscapular_mm: Option<NumberInput>,
    pub suprailiac_mm: Option<NumberInput>,
    pub abdominal_mm: Option<NumberInput>,
    pub chest_mm: Option<NumberInput>,
    pub midaxillary_mm: Option<NumberInput>,
    pub thigh_mm: Option<NumberInput>,
    pub medial_calf_mm: Option<NumberInput>,

    pub waist_cm: Option<NumberInput>,
    pub hip_cm: Option<NumberInput>,
    pub neck_cm: Option<NumberInput>,
    pub mid_upper_arm_cm: Option<NumberInput>,
    pub thigh_cm: Option<NumberInput>,
    pub calf_cm: Option<NumberInput>,

    pub extras: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitSnapshotRequest {
    /// Subject of the evaluation; defaults to the requester.
    pub user_id: Option<i64>,
    #[serde(flatten)]
    pub fields: SnapshotFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationView {
    pub snapshot: Snapshot,
    pub results: Vec<AnthropometricResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationPage {
    pub items: Vec<EvaluationView>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ComputeOutcome {
    Computed {
        results: Vec<AnthropometricResult>,
        #[serde(skip_serializing_if = "Option::is_none")]
        slaughter_eligible: Option<bool>,
    },
    Redirect {
        redirect: Redirect,
    },
}

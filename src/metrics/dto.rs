use serde::{Deserialize, Serialize};

use crate::units::NumberInput;

/// Any subset of the metrics fields; omitted ones fall back to the latest record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordMetricsRequest {
    pub weight: Option<NumberInput>,
    pub height: Option<NumberInput>,
    pub age: Option<NumberInput>,
    pub sex: Option<String>,
    pub activity_level: Option<String>,
    pub body_fat_pct: Option<NumberInput>,
}

#[derive(Debug, Serialize)]
pub struct HasMetricsResponse {
    pub has_metrics: bool,
}

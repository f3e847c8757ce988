use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::error::AppError;
use crate::units::Sex;

/// Every body-composition / growth method the calculator knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Method {
    #[serde(rename = "DURNIN_WOMERSLEY")]
    DurninWomersley,
    #[serde(rename = "FAULKNER")]
    Faulkner,
    #[serde(rename = "GUEDES")]
    Guedes,
    #[serde(rename = "JACKSON_POLLOCK_3")]
    JacksonPollock3,
    #[serde(rename = "JACKSON_POLLOCK_7")]
    JacksonPollock7,
    #[serde(rename = "JACKSON_POLLOCK_WARD_3")]
    JacksonPollockWard3,
    #[serde(rename = "JACKSON_POLLOCK_WARD_7")]
    JacksonPollockWard7,
    #[serde(rename = "PETROSKI")]
    Petroski,
    #[serde(rename = "WHO_BAZ")]
    WhoBaz,
    #[serde(rename = "WHO_HAZ")]
    WhoHaz,
    #[serde(rename = "WHO_WHZ")]
    WhoWhz,
    #[serde(rename = "SLAUGHTER")]
    Slaughter,
}

impl Method {
    pub const ALL: [Method; 12] = [
        Method::DurninWomersley,
        Method::Faulkner,
        Method::Guedes,
        Method::JacksonPollock3,
        Method::JacksonPollock7,
        Method::JacksonPollockWard3,
        Method::JacksonPollockWard7,
        Method::Petroski,
        Method::WhoBaz,
        Method::WhoHaz,
        Method::WhoWhz,
        Method::Slaughter,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Method::DurninWomersley => "DURNIN_WOMERSLEY",
            Method::Faulkner => "FAULKNER",
            Method::Guedes => "GUEDES",
            Method::JacksonPollock3 => "JACKSON_POLLOCK_3",
            Method::JacksonPollock7 => "JACKSON_POLLOCK_7",
            Method::JacksonPollockWard3 => "JACKSON_POLLOCK_WARD_3",
            Method::JacksonPollockWard7 => "JACKSON_POLLOCK_WARD_7",
            Method::Petroski => "PETROSKI",
            Method::WhoBaz => "WHO_BAZ",
            Method::WhoHaz => "WHO_HAZ",
            Method::WhoWhz => "WHO_WHZ",
            Method::Slaughter => "SLAUGHTER",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Method::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| AppError::Validation(format!("unknown method '{s}'")))
    }
}

/// Caliper sites, in millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site {
    Triceps,
    Biceps,
    Subscapular,
    Suprailiac,
    Abdominal,
    Chest,
    Midaxillary,
    Thigh,
    MedialCalf,
}

impl Site {
    pub fn name(self) -> &'static str {
        match self {
            Site::Triceps => "triceps",
            Site::Biceps => "biceps",
            Site::Subscapular => "subscapular",
            Site::Suprailiac => "suprailiac",
            Site::Abdominal => "abdominal",
            Site::Chest => "chest",
            Site::Midaxillary => "midaxillary",
            Site::Thigh => "thigh",
            Site::MedialCalf => "medial_calf",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Skinfolds {
    pub triceps_mm: Option<f64>,
    pub biceps_mm: Option<f64>,
    pub subscapular_mm: Option<f64>,
    pub suprailiac_mm: Option<f64>,
    pub abdominal_mm: Option<f64>,
    pub chest_mm: Option<f64>,
    pub midaxillary_mm: Option<f64>,
    pub thigh_mm: Option<f64>,
    pub medial_calf_mm: Option<f64>,
}

impl Skinfolds {
    pub fn get(&self, site: Site) -> Option<f64> {
        match site {
            Site::Triceps => self.triceps_mm,
            Site::Biceps => self.biceps_mm,
            Site::Subscapular => self.subscapular_mm,
            Site::Suprailiac => self.suprailiac_mm,
            Site::Abdominal => self.abdominal_mm,
            Site::Chest => self.chest_mm,
            Site::Midaxillary => self.midaxillary_mm,
            Site::Thigh => self.thigh_mm,
            Site::MedialCalf => self.medial_calf_mm,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Circumferences {
    pub waist_cm: Option<f64>,
    pub hip_cm: Option<f64>,
    pub neck_cm: Option<f64>,
    pub mid_upper_arm_cm: Option<f64>,
    pub thigh_cm: Option<f64>,
    pub calf_cm: Option<f64>,
}

/// One measurement event. Weight, height, age and sex are copies taken at
/// measurement time so later profile edits never rewrite history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub id: i64,
    pub user_id: i64,
    pub assessor_id: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub measured_at: OffsetDateTime,
    pub weight_kg: Option<f64>,
    pub height_m: Option<f64>,
    pub age_years: Option<i32>,
    pub sex: Option<Sex>,
    #[serde(flatten)]
    pub skinfolds: Skinfolds,
    #[serde(flatten)]
    pub circumferences: Circumferences,
    pub extras: Option<serde_json::Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Snapshot {
    /// True when any of `keys` in `extras` is the JSON boolean `true`.
    pub fn flag(&self, keys: &[&str]) -> bool {
        let Some(extras) = self.extras.as_ref() else {
            return false;
        };
        keys.iter()
            .any(|k| extras.get(*k).and_then(serde_json::Value::as_bool) == Some(true))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSnapshot {
    pub user_id: i64,
    pub assessor_id: Option<i64>,
    pub measured_at: OffsetDateTime,
    pub weight_kg: Option<f64>,
    pub height_m: Option<f64>,
    pub age_years: Option<i32>,
    pub sex: Option<Sex>,
    pub skinfolds: Skinfolds,
    pub circumferences: Circumferences,
    pub extras: Option<serde_json::Value>,
    pub created_at: OffsetDateTime,
}

impl NewSnapshot {
    pub fn into_snapshot(self, id: i64) -> Snapshot {
        Snapshot {
            id,
            user_id: self.user_id,
            assessor_id: self.assessor_id,
            measured_at: self.measured_at,
            weight_kg: self.weight_kg,
            height_m: self.height_m,
            age_years: self.age_years,
            sex: self.sex,
            skinfolds: self.skinfolds,
            circumferences: self.circumferences,
            extras: self.extras,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct SnapshotRow {
    pub id: i64,
    pub user_id: i64,
    pub assessor_id: Option<i64>,
    pub measured_at: OffsetDateTime,
    pub weight_kg: Option<f64>,
    pub height_m: Option<f64>,
    pub age_years: Option<i32>,
    pub sex: Option<String>,
    pub triceps_mm: Option<f64>,
    pub biceps_mm: Option<f64>,
    pub subscapular_mm: Option<f64>,
    pub suprailiac_mm: Option<f64>,
    pub abdominal_mm: Option<f64>,
    pub chest_mm: Option<f64>,
    pub midaxillary_mm: Option<f64>,
    pub thigh_mm: Option<f64>,
    pub medial_calf_mm: Option<f64>,
    pub waist_cm: Option<f64>,
    pub hip_cm: Option<f64>,
    pub neck_cm: Option<f64>,
    pub mid_upper_arm_cm: Option<f64>,
    pub thigh_circ_cm: Option<f64>,
    pub calf_circ_cm: Option<f64>,
    pub extras: Option<serde_json::Value>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<SnapshotRow> for Snapshot {
    type Error = AppError;

    fn try_from(r: SnapshotRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            assessor_id: r.assessor_id,
            measured_at: r.measured_at,
            weight_kg: r.weight_kg,
            height_m: r.height_m,
            age_years: r.age_years,
            sex: r.sex.as_deref().map(str::parse::<Sex>).transpose()?,
            skinfolds: Skinfolds {
                triceps_mm: r.triceps_mm,
                biceps_mm: r.biceps_mm,
                subscapular_mm: r.subscapular_mm,
                suprailiac_mm: r.suprailiac_mm,
                abdominal_mm: r.abdominal_mm,
                chest_mm: r.chest_mm,
                midaxillary_mm: r.midaxillary_mm,
                thigh_mm: r.thigh_mm,
                medial_calf_mm: r.medial_calf_mm,
            },
            circumferences: Circumferences {
                waist_cm: r.waist_cm,
                hip_cm: r.hip_cm,
                neck_cm: r.neck_cm,
                mid_upper_arm_cm: r.mid_upper_arm_cm,
                thigh_cm: r.thigh_circ_cm,
                calf_cm: r.calf_circ_cm,
            },
            extras: r.extras,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// What a formula produces before it is tied to a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialResult {
    pub method: Method,
    pub body_density: Option<f64>,
    pub body_fat_pct: Option<f64>,
    pub fat_mass_kg: Option<f64>,
    pub lean_mass_kg: Option<f64>,
    pub z_score: Option<f64>,
    pub percentile: Option<f64>,
    pub classification: Option<String>,
    pub parameters: serde_json::Value,
    pub notes: Option<String>,
}

impl PartialResult {
    pub fn empty(method: Method) -> Self {
        Self {
            method,
            body_density: None,
            body_fat_pct: None,
            fat_mass_kg: None,
            lean_mass_kg: None,
            z_score: None,
            percentile: None,
            classification: None,
            parameters: serde_json::Value::Null,
            notes: None,
        }
    }
}

/// A computed outcome ready to be stored for one (snapshot, method) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct NewResult {
    pub evaluation_id: i64,
    pub sex: Sex,
    pub age_years: i32,
    pub outcome: PartialResult,
    pub version: i16,
    pub computed_at: OffsetDateTime,
}

impl NewResult {
    /// Same numbers, labels and audit trail as an already stored row.
    pub fn same_outcome(&self, existing: &AnthropometricResult) -> bool {
        let o = &self.outcome;
        existing.evaluation_id == self.evaluation_id
            && existing.method == o.method
            && existing.sex == self.sex
            && existing.age_years == self.age_years
            && existing.version == self.version
            && existing.body_density == o.body_density
            && existing.body_fat_pct == o.body_fat_pct
            && existing.fat_mass_kg == o.fat_mass_kg
            && existing.lean_mass_kg == o.lean_mass_kg
            && existing.z_score == o.z_score
            && existing.percentile == o.percentile
            && existing.classification == o.classification
            && existing.parameters == o.parameters
            && existing.notes == o.notes
    }

    pub fn into_result(self, id: i64, created_at: OffsetDateTime) -> AnthropometricResult {
        AnthropometricResult {
            id,
            evaluation_id: self.evaluation_id,
            method: self.outcome.method,
            sex: self.sex,
            age_years: self.age_years,
            body_density: self.outcome.body_density,
            body_fat_pct: self.outcome.body_fat_pct,
            fat_mass_kg: self.outcome.fat_mass_kg,
            lean_mass_kg: self.outcome.lean_mass_kg,
            z_score: self.outcome.z_score,
            percentile: self.outcome.percentile,
            classification: self.outcome.classification,
            parameters: self.outcome.parameters,
            notes: self.outcome.notes,
            version: self.version,
            created_at,
            updated_at: self.computed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnthropometricResult {
    pub id: i64,
    pub evaluation_id: i64,
    pub method: Method,
    pub sex: Sex,
    pub age_years: i32,
    pub body_density: Option<f64>,
    pub body_fat_pct: Option<f64>,
    pub fat_mass_kg: Option<f64>,
    pub lean_mass_kg: Option<f64>,
    pub z_score: Option<f64>,
    pub percentile: Option<f64>,
    pub classification: Option<String>,
    pub parameters: serde_json::Value,
    pub notes: Option<String>,
    pub version: i16,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, FromRow)]
pub struct ResultRow {
    pub id: i64,
    pub evaluation_id: i64,
    pub method: String,
    pub sex: String,
    pub age_years: i32,
    pub body_density: Option<f64>,
    pub body_fat_pct: Option<f64>,
    pub fat_mass_kg: Option<f64>,
    pub lean_mass_kg: Option<f64>,
    pub z_score: Option<f64>,
    pub percentile: Option<f64>,
    pub classification: Option<String>,
    pub parameters: Option<serde_json::Value>,
    pub notes: Option<String>,
    pub version: i16,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<ResultRow> for AnthropometricResult {
    type Error = AppError;

    fn try_from(r: ResultRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            evaluation_id: r.evaluation_id,
            method: r.method.parse()?,
            sex: r.sex.parse()?,
            age_years: r.age_years,
            body_density: r.body_density,
            body_fat_pct: r.body_fat_pct,
            fat_mass_kg: r.fat_mass_kg,
            lean_mass_kg: r.lean_mass_kg,
            z_score: r.z_score,
            percentile: r.percentile,
            classification: r.classification,
            parameters: r.parameters.unwrap_or(serde_json::Value::Null),
            notes: r.notes,
            version: r.version,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

//! Body-composition and growth formulas, dispatched by [`Method`].
//!
//! Each formula checks its own inputs and reports every absent measurement at
//! once before doing any arithmetic. Adding a method means registering another
//! [`Formula`]; the selector never changes.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::anthropometry::growth::{GrowthReference, Indicator};
use crate::anthropometry::repo_types::{Method, PartialResult, Site, Snapshot};
use crate::error::AppError;
use crate::units::{round_to, Sex};

pub mod adult;
pub mod pediatric;

/// A snapshot with sex and age already resolved.
#[derive(Debug, Clone, Copy)]
pub struct Assessment<'a> {
    pub snapshot: &'a Snapshot,
    pub sex: Sex,
    pub age_years: i32,
    pub age_months: i32,
}

pub trait Formula: Send + Sync {
    fn method(&self) -> Method;
    fn compute(&self, input: &Assessment<'_>) -> Result<PartialResult, AppError>;
}

pub struct FormulaRegistry {
    formulas: HashMap<Method, Box<dyn Formula>>,
}

impl FormulaRegistry {
    pub fn new() -> Self {
        Self {
            formulas: HashMap::new(),
        }
    }

    /// Every method the service ships with.
    pub fn standard(growth: Arc<dyn GrowthReference>) -> Self {
        let mut r = Self::new();
        r.register(adult::JacksonPollock3);
        r.register(adult::JacksonPollockWard3);
        r.register(adult::JacksonPollock7 { female_only: false });
        r.register(adult::JacksonPollock7 { female_only: true });
        r.register(adult::DurninWomersley);
        r.register(adult::Guedes);
        r.register(adult::Petroski);
        r.register(adult::Faulkner);
        r.register(pediatric::Slaughter);
        r.register(pediatric::WhoZScore::new(Indicator::BmiForAge, growth.clone()));
        r.register(pediatric::WhoZScore::new(Indicator::HeightForAge, growth.clone()));
        r.register(pediatric::WhoZScore::new(Indicator::WeightForHeight, growth));
        r
    }

    pub fn register(&mut self, formula: impl Formula + 'static) {
        self.formulas.insert(formula.method(), Box::new(formula));
    }

    pub fn compute(&self, method: Method, input: &Assessment<'_>) -> Result<PartialResult, AppError> {
        let formula = self
            .formulas
            .get(&method)
            .ok_or_else(|| AppError::Validation(format!("no formula registered for {method}")))?;
        formula.compute(input)
    }
}

impl Default for FormulaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Collects every missing value before failing.
pub(crate) fn require<const N: usize>(
    method: Method,
    fields: [(&'static str, Option<f64>); N],
) -> Result<[f64; N], AppError> {
    let missing: Vec<&'static str> = fields
        .iter()
        .filter(|(_, v)| v.is_none())
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        return Err(AppError::MissingInput { method, missing });
    }
    Ok(fields.map(|(_, v)| v.unwrap_or_default()))
}

pub(crate) fn skinfolds<const N: usize>(
    method: Method,
    snapshot: &Snapshot,
    sites: [Site; N],
) -> Result<[f64; N], AppError> {
    require(method, sites.map(|s| (s.name(), snapshot.skinfolds.get(s))))
}

pub(crate) fn site_names(sites: &[Site]) -> Vec<&'static str> {
    sites.iter().map(|s| s.name()).collect()
}

pub(crate) fn siri(density: f64) -> f64 {
    495.0 / density - 450.0
}

/// Density-based result: Siri %fat plus fat/lean split when weight is known.
pub(crate) fn from_density(
    method: Method,
    density: f64,
    weight_kg: Option<f64>,
    mut parameters: Value,
) -> Result<PartialResult, AppError> {
    if !density.is_finite() || density <= 0.0 {
        return Err(AppError::out_of_range(
            "body_density",
            format!("{density} is not a valid body density"),
        ));
    }
    if let Value::Object(map) = &mut parameters {
        map.insert("density".into(), json!(round_to(density, 6)));
        map.insert("siri".into(), json!("495/Dc - 450"));
    }
    let mut result = from_fat_pct(method, siri(density), weight_kg, parameters)?;
    result.body_density = Some(round_to(density, 6));
    Ok(result)
}

pub(crate) fn from_fat_pct(
    method: Method,
    fat_pct: f64,
    weight_kg: Option<f64>,
    parameters: Value,
) -> Result<PartialResult, AppError> {
    let pct = round_to(fat_pct, 2);
    if !(0.0..=100.0).contains(&pct) {
        return Err(AppError::out_of_range(
            "body_fat_pct",
            format!("{method} produced {pct}%, outside 0-100%"),
        ));
    }
    let mut result = PartialResult::empty(method);
    result.body_fat_pct = Some(pct);
    if let Some(w) = weight_kg {
        let fat = round_to(w * pct / 100.0, 2);
        result.fat_mass_kg = Some(fat);
        result.lean_mass_kg = Some(round_to(w - fat, 2));
    }
    result.parameters = parameters;
    Ok(result)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use time::macros::datetime;

    use crate::anthropometry::repo_types::{Circumferences, Skinfolds, Snapshot};

    pub fn snapshot(skinfolds: Skinfolds) -> Snapshot {
        Snapshot {
            id: 1,
            user_id: 1,
            assessor_id: None,
            measured_at: datetime!(2025-05-01 09:00 UTC),
            weight_kg: Some(80.0),
            height_m: Some(1.80),
            age_years: Some(30),
            sex: None,
            skinfolds,
            circumferences: Circumferences::default(),
            extras: None,
            created_at: datetime!(2025-05-01 09:00 UTC),
            updated_at: datetime!(2025-05-01 09:00 UTC),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anthropometry::growth::sample_table;
    use crate::anthropometry::repo_types::Skinfolds;

    #[test]
    fn require_reports_all_missing_fields() {
        let err = require(
            Method::Faulkner,
            [("triceps", Some(1.0)), ("biceps", None), ("thigh", None)],
        )
        .unwrap_err();
        match err {
            AppError::MissingInput { method, missing } => {
                assert_eq!(method, Method::Faulkner);
                assert_eq!(missing, vec!["biceps", "thigh"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn density_outside_siri_range_is_rejected() {
        // 495/1.2 - 450 is negative
        let err = from_density(Method::Guedes, 1.2, None, json!({})).unwrap_err();
        assert!(matches!(err, AppError::OutOfRange { field: "body_fat_pct", .. }));
        let err = from_density(Method::Guedes, -1.0, None, json!({})).unwrap_err();
        assert!(matches!(err, AppError::OutOfRange { field: "body_density", .. }));
    }

    #[test]
    fn masses_add_up_to_weight() {
        let r = from_fat_pct(Method::Faulkner, 17.333, Some(73.3), json!({})).unwrap();
        let total = r.fat_mass_kg.unwrap() + r.lean_mass_kg.unwrap();
        assert!((total - 73.3).abs() <= 0.01);
    }

    #[test]
    fn standard_registry_covers_every_method() {
        let registry = FormulaRegistry::standard(Arc::new(sample_table()));
        for m in Method::ALL {
            assert!(registry.formulas.contains_key(&m), "{m} not registered");
        }
    }

    #[test]
    fn unregistered_method_is_a_validation_error() {
        let registry = FormulaRegistry::new();
        let snap = fixtures::snapshot(Skinfolds::default());
        let input = Assessment {
            snapshot: &snap,
            sex: Sex::Male,
            age_years: 30,
            age_months: 360,
        };
        assert!(matches!(
            registry.compute(Method::Faulkner, &input),
            Err(AppError::Validation(_))
        ));
    }
}

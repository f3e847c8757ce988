use std::sync::Arc;

use serde_json::json;

use super::{from_fat_pct, require, site_names, skinfolds, Assessment, Formula};
use crate::anthropometry::growth::{
    classify_baz, classify_haz, classify_whz, percentile, restricted_z_score, z_score,
    GrowthReference, Indicator,
};
use crate::anthropometry::repo_types::{Method, PartialResult, Site};
use crate::error::AppError;
use crate::units::{round_to, Sex};

/// Slaughter et al. (1988), children and adolescents.
pub struct Slaughter;

impl Formula for Slaughter {
    fn method(&self) -> Method {
        Method::Slaughter
    }

    fn compute(&self, input: &Assessment<'_>) -> Result<PartialResult, AppError> {
        const SITES: [Site; 2] = [Site::Triceps, Site::Subscapular];
        let s: f64 = skinfolds(self.method(), input.snapshot, SITES)?.iter().sum();
        let pct = match input.sex {
            Sex::Male => 1.21 * s - 0.008 * s * s - 1.7,
            Sex::Female => 1.33 * s - 0.013 * s * s - 2.5,
        };
        from_fat_pct(
            self.method(),
            pct,
            input.snapshot.weight_kg,
            json!({
                "formula": format!("Slaughter ({})", input.sex),
                "sites": site_names(&SITES),
                "sum_mm": round_to(s, 2),
            }),
        )
    }
}

/// WHO z-score for one growth indicator.
pub struct WhoZScore {
    indicator: Indicator,
    growth: Arc<dyn GrowthReference>,
}

impl WhoZScore {
    pub fn new(indicator: Indicator, growth: Arc<dyn GrowthReference>) -> Self {
        Self { indicator, growth }
    }

    /// (measured value, lookup key, adjusted z?) for the indicator.
    fn measure(&self, input: &Assessment<'_>) -> Result<(f64, f64, bool), AppError> {
        let snap = input.snapshot;
        let months = f64::from(input.age_months);
        match self.indicator {
            Indicator::BmiForAge => {
                let [w, h] = require(
                    self.method(),
                    [("weight", snap.weight_kg), ("height", snap.height_m)],
                )?;
                Ok((w / (h * h), months, true))
            }
            Indicator::HeightForAge => {
                let [h] = require(self.method(), [("height", snap.height_m)])?;
                Ok((h * 100.0, months, false))
            }
            Indicator::WeightForHeight => {
                let [w, h] = require(
                    self.method(),
                    [("weight", snap.weight_kg), ("height", snap.height_m)],
                )?;
                Ok((w, round_to(h * 100.0, 1), true))
            }
        }
    }
}

impl Formula for WhoZScore {
    fn method(&self) -> Method {
        match self.indicator {
            Indicator::BmiForAge => Method::WhoBaz,
            Indicator::HeightForAge => Method::WhoHaz,
            Indicator::WeightForHeight => Method::WhoWhz,
        }
    }

    fn compute(&self, input: &Assessment<'_>) -> Result<PartialResult, AppError> {
        let (value, key, restricted) = self.measure(input)?;
        let lms = self
            .growth
            .lms(input.sex, self.indicator, key)
            .ok_or_else(|| {
                AppError::GrowthReferenceUnavailable(format!(
                    "{} (sex {}, key {key})",
                    self.indicator.label(),
                    input.sex
                ))
            })?;
        let z = if restricted {
            restricted_z_score(value, lms)
        } else {
            z_score(value, lms)
        };
        let z = round_to(z, 3);
        let classification = match self.indicator {
            Indicator::BmiForAge => classify_baz(z),
            Indicator::HeightForAge => classify_haz(z),
            Indicator::WeightForHeight => classify_whz(z),
        };

        let mut result = PartialResult::empty(self.method());
        result.z_score = Some(z);
        result.percentile = Some(percentile(z));
        result.classification = Some(classification.to_string());
        result.parameters = json!({
            "formula": format!("WHO LMS {}", self.indicator.label()),
            "value": round_to(value, 3),
            "key": key,
            "age_months": input.age_months,
            "l": lms.l,
            "m": lms.m,
            "s": lms.s,
            "restricted": restricted,
        });
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anthropometry::formulas::fixtures::snapshot;
    use crate::anthropometry::growth::sample_table;
    use crate::anthropometry::repo_types::{Skinfolds, Snapshot};

    fn assess(snap: &Snapshot, sex: Sex, years: i32, months: i32) -> Assessment<'_> {
        Assessment {
            snapshot: snap,
            sex,
            age_years: years,
            age_months: months,
        }
    }

    #[test]
    fn slaughter_differs_by_sex() {
        let snap = snapshot(Skinfolds {
            triceps_mm: Some(12.0),
            subscapular_mm: Some(8.0),
            ..Default::default()
        });
        let boy = Slaughter.compute(&assess(&snap, Sex::Male, 12, 144)).unwrap();
        let girl = Slaughter.compute(&assess(&snap, Sex::Female, 12, 144)).unwrap();
        assert_eq!(boy.body_fat_pct, Some(19.3));
        assert_eq!(girl.body_fat_pct, Some(18.9));
        assert_ne!(boy.body_fat_pct, girl.body_fat_pct);
    }

    #[test]
    fn height_for_age_at_median_is_zero() {
        let mut snap = snapshot(Skinfolds::default());
        snap.height_m = Some(1.378);
        let haz = WhoZScore::new(Indicator::HeightForAge, Arc::new(sample_table()));
        let r = haz.compute(&assess(&snap, Sex::Male, 10, 120)).unwrap();
        assert_eq!(r.method, Method::WhoHaz);
        assert_eq!(r.z_score, Some(0.0));
        assert_eq!(r.percentile, Some(50.0));
        assert_eq!(r.classification.as_deref(), Some("adequate stature"));
    }

    #[test]
    fn weight_for_height_is_keyed_by_length() {
        let mut snap = snapshot(Skinfolds::default());
        snap.weight_kg = Some(12.25);
        snap.height_m = Some(0.875);
        let whz = WhoZScore::new(Indicator::WeightForHeight, Arc::new(sample_table()));
        let r = whz.compute(&assess(&snap, Sex::Male, 2, 26)).unwrap();
        assert_eq!(r.z_score, Some(0.0));
        assert_eq!(r.classification.as_deref(), Some("normal"));
        assert_eq!(r.parameters["key"], json!(87.5));
    }

    #[test]
    fn uncovered_age_reports_missing_reference() {
        let snap = snapshot(Skinfolds::default());
        let baz = WhoZScore::new(Indicator::BmiForAge, Arc::new(sample_table()));
        let err = baz.compute(&assess(&snap, Sex::Male, 30, 360)).unwrap_err();
        assert!(matches!(err, AppError::GrowthReferenceUnavailable(_)));
    }

    #[test]
    fn bmi_for_age_needs_weight_and_height() {
        let mut snap = snapshot(Skinfolds::default());
        snap.weight_kg = None;
        snap.height_m = None;
        let baz = WhoZScore::new(Indicator::BmiForAge, Arc::new(sample_table()));
        match baz.compute(&assess(&snap, Sex::Female, 10, 120)).unwrap_err() {
            AppError::MissingInput { method, missing } => {
                assert_eq!(method, Method::WhoBaz);
                assert_eq!(missing, vec!["weight", "height"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

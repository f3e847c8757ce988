//! Energy, hydration and body-mass indicators computed from a metrics record.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::metrics::repo_types::{ActivityLevel, MetricsRecord};
use crate::units::{round_to, Sex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DerivedKind {
    Bmi,
    Tdee,
    Tmb,
    Macros,
    Water,
}

/// Whatever is known about the subject; every field may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DerivedInputs {
    pub weight_kg: Option<f64>,
    pub height_m: Option<f64>,
    pub age_years: Option<i32>,
    pub sex: Option<Sex>,
    pub activity_level: Option<ActivityLevel>,
}

impl From<Option<&MetricsRecord>> for DerivedInputs {
    fn from(record: Option<&MetricsRecord>) -> Self {
        match record {
            Some(m) => Self {
                weight_kg: Some(m.weight_kg),
                height_m: Some(m.height_m),
                age_years: Some(m.age_years),
                sex: Some(m.sex),
                activity_level: Some(m.activity_level),
            },
            None => Self::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Macros {
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedMetric {
    pub kind: DerivedKind,
    pub value: f64,
    pub unit: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macros: Option<Macros>,
    pub message: String,
}

fn insufficient(calculation: &'static str, missing: Vec<&'static str>) -> AppError {
    AppError::InsufficientData {
        calculation,
        missing,
    }
}

pub fn validate_bmi(i: &DerivedInputs) -> Result<(f64, f64), AppError> {
    match (i.weight_kg, i.height_m) {
        (Some(w), Some(h)) if h > 0.0 => Ok((w, h)),
        (w, _) => {
            let mut missing = Vec::new();
            if w.is_none() {
                missing.push("weight");
            }
            if !matches!(i.height_m, Some(h) if h > 0.0) {
                missing.push("height");
            }
            Err(insufficient("BMI", missing))
        }
    }
}

pub fn validate_bmr(i: &DerivedInputs) -> Result<(f64, f64, i32, Sex), AppError> {
    match (i.weight_kg, i.height_m, i.age_years, i.sex) {
        (Some(w), Some(h), Some(a), Some(s)) => Ok((w, h, a, s)),
        _ => Err(insufficient("TMB", missing_of(i, false))),
    }
}

pub fn validate_tdee(i: &DerivedInputs) -> Result<(f64, f64, i32, Sex, ActivityLevel), AppError> {
    match (i.weight_kg, i.height_m, i.age_years, i.sex, i.activity_level) {
        (Some(w), Some(h), Some(a), Some(s), Some(l)) => Ok((w, h, a, s, l)),
        _ => Err(insufficient("TDEE", missing_of(i, true))),
    }
}

pub fn validate_water(i: &DerivedInputs) -> Result<f64, AppError> {
    i.weight_kg
        .ok_or_else(|| insufficient("daily water intake", vec!["weight"]))
}

fn missing_of(i: &DerivedInputs, with_activity: bool) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if i.weight_kg.is_none() {
        missing.push("weight");
    }
    if i.height_m.is_none() {
        missing.push("height");
    }
    if i.age_years.is_none() {
        missing.push("age");
    }
    if i.sex.is_none() {
        missing.push("sex");
    }
    if with_activity && i.activity_level.is_none() {
        missing.push("activity_level");
    }
    missing
}

pub fn bmi(weight_kg: f64, height_m: f64) -> f64 {
    weight_kg / (height_m * height_m)
}

pub fn classify_bmi(bmi: f64) -> &'static str {
    if bmi < 18.5 {
        "Underweight"
    } else if bmi < 24.9 {
        "Normal weight"
    } else if bmi < 29.9 {
        "Overweight"
    } else if bmi < 34.9 {
        "Obesity class I"
    } else if bmi < 39.9 {
        "Obesity class II"
    } else {
        "Obesity class III"
    }
}

/// Harris-Benedict basal metabolic rate, kcal/day.
pub fn bmr(weight_kg: f64, height_m: f64, age_years: i32, sex: Sex) -> f64 {
    let height_cm = height_m * 100.0;
    let age = f64::from(age_years);
    match sex {
        Sex::Male => 66.5 + 13.75 * weight_kg + 5.003 * height_cm - 6.75 * age,
        Sex::Female => 655.0 + 9.563 * weight_kg + 1.850 * height_cm - 4.676 * age,
    }
}

pub fn tdee(bmr: f64, level: ActivityLevel) -> f64 {
    bmr * level.multiplier()
}

/// 30% protein, 50% carbohydrate, 20% fat, in grams per day.
pub fn macronutrients(tdee: f64) -> Macros {
    Macros {
        protein_g: tdee * 0.30 / 4.0,
        carbs_g: tdee * 0.50 / 4.0,
        fat_g: tdee * 0.20 / 9.0,
    }
}

pub fn daily_water_ml(weight_kg: f64) -> f64 {
    weight_kg * 45.0
}

pub fn compute(kind: DerivedKind, inputs: &DerivedInputs) -> Result<DerivedMetric, AppError> {
    let metric = match kind {
        DerivedKind::Bmi => {
            let (w, h) = validate_bmi(inputs)?;
            let value = bmi(w, h);
            let label = classify_bmi(value);
            DerivedMetric {
                kind,
                value: round_to(value, 2),
                unit: "kg/m2",
                classification: Some(label),
                macros: None,
                message: format!("Your BMI is {value:.2} ({label})."),
            }
        }
        DerivedKind::Tmb => {
            let (w, h, age, sex) = validate_bmr(inputs)?;
            let value = bmr(w, h, age, sex);
            DerivedMetric {
                kind,
                value: round_to(value, 2),
                unit: "kcal/day",
                classification: None,
                macros: None,
                message: format!(
                    "Your estimated basal metabolic rate is {value:.0} kcal, the minimum energy needed to sustain vital functions at rest."
                ),
            }
        }
        DerivedKind::Tdee => {
            let (w, h, age, sex, level) = validate_tdee(inputs)?;
            let value = tdee(bmr(w, h, age, sex), level);
            DerivedMetric {
                kind,
                value: round_to(value, 2),
                unit: "kcal/day",
                classification: None,
                macros: None,
                message: format!(
                    "Your estimated daily energy expenditure is {value:.0} kcal. Use it as the baseline for your goal."
                ),
            }
        }
        DerivedKind::Macros => {
            let (w, h, age, sex, level) = validate_tdee(inputs)?;
            let total = tdee(bmr(w, h, age, sex), level);
            let m = macronutrients(total);
            DerivedMetric {
                kind,
                value: round_to(total, 2),
                unit: "kcal/day",
                classification: None,
                macros: Some(Macros {
                    protein_g: round_to(m.protein_g, 1),
                    carbs_g: round_to(m.carbs_g, 1),
                    fat_g: round_to(m.fat_g, 1),
                }),
                message: "Suggested split: 30% protein / 50% carbs / 20% fat.".to_string(),
            }
        }
        DerivedKind::Water => {
            let w = validate_water(inputs)?;
            let value = daily_water_ml(w);
            DerivedMetric {
                kind,
                value: round_to(value, 0),
                unit: "ml/day",
                classification: None,
                macros: None,
                message: format!(
                    "Drink about {:.2} litres of water per day based on your body weight.",
                    value / 1000.0
                ),
            }
        }
    };
    Ok(metric)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adult_male() -> DerivedInputs {
        DerivedInputs {
            weight_kg: Some(70.0),
            height_m: Some(1.75),
            age_years: Some(25),
            sex: Some(Sex::Male),
            activity_level: Some(ActivityLevel::Moderate),
        }
    }

    #[test]
    fn bmi_value_and_band() {
        let v = bmi(70.0, 1.75);
        assert!((v - 22.857).abs() < 0.001);
        assert_eq!(classify_bmi(v), "Normal weight");
        assert_eq!(classify_bmi(18.4), "Underweight");
        assert_eq!(classify_bmi(24.9), "Overweight");
        assert_eq!(classify_bmi(40.0), "Obesity class III");
    }

    #[test]
    fn harris_benedict_and_activity() {
        let b = bmr(70.0, 1.75, 25, Sex::Male);
        assert!((b - (66.5 + 962.5 + 875.525 - 168.75)).abs() < 1e-9);
        assert!((tdee(b, ActivityLevel::Moderate) - b * 1.55).abs() < 1e-9);
        let f = bmr(60.0, 1.65, 30, Sex::Female);
        assert!((f - (655.0 + 573.78 + 305.25 - 140.28)).abs() < 1e-9);
    }

    #[test]
    fn macro_split() {
        let m = macronutrients(2000.0);
        assert_eq!(m.protein_g, 150.0);
        assert_eq!(m.carbs_g, 250.0);
        assert!((m.fat_g - 44.444).abs() < 0.001);
    }

    #[test]
    fn compute_reports_missing_fields() {
        let err = compute(DerivedKind::Tdee, &DerivedInputs::default()).unwrap_err();
        match err {
            AppError::InsufficientData { calculation, missing } => {
                assert_eq!(calculation, "TDEE");
                assert_eq!(missing, vec!["weight", "height", "age", "sex", "activity_level"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        let partial = DerivedInputs {
            weight_kg: Some(70.0),
            ..Default::default()
        };
        assert!(compute(DerivedKind::Water, &partial).is_ok());
        assert!(matches!(
            compute(DerivedKind::Bmi, &partial),
            Err(AppError::InsufficientData { .. })
        ));
    }

    #[test]
    fn compute_each_kind() {
        let i = adult_male();
        let bmi = compute(DerivedKind::Bmi, &i).unwrap();
        assert_eq!(bmi.value, 22.86);
        assert_eq!(bmi.classification, Some("Normal weight"));

        let water = compute(DerivedKind::Water, &i).unwrap();
        assert_eq!(water.value, 3150.0);
        assert!(water.message.contains("3.15 litres"));

        let macros = compute(DerivedKind::Macros, &i).unwrap();
        assert!(macros.macros.is_some());
        assert!(macros.message.contains("30% protein"));

        let tmb = compute(DerivedKind::Tmb, &i).unwrap();
        let tdee = compute(DerivedKind::Tdee, &i).unwrap();
        assert!(tdee.value > tmb.value);
    }
}

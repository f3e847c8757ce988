use serde_json::json;

use super::{from_density, from_fat_pct, require, site_names, skinfolds, Assessment, Formula};
use crate::anthropometry::repo_types::{Method, PartialResult, Site};
use crate::error::AppError;
use crate::units::{round_to, Sex};

fn wrong_sex(method: Method, expected: Sex, alternative: Method) -> AppError {
    AppError::InvalidSex(format!(
        "{method} applies to sex '{expected}' only; use {alternative}"
    ))
}

/// Jackson & Pollock (1978), men: chest, abdominal, thigh.
pub struct JacksonPollock3;

impl Formula for JacksonPollock3 {
    fn method(&self) -> Method {
        Method::JacksonPollock3
    }

    fn compute(&self, input: &Assessment<'_>) -> Result<PartialResult, AppError> {
        const SITES: [Site; 3] = [Site::Chest, Site::Abdominal, Site::Thigh];
        if input.sex != Sex::Male {
            return Err(wrong_sex(self.method(), Sex::Male, Method::JacksonPollockWard3));
        }
        let s: f64 = skinfolds(self.method(), input.snapshot, SITES)?.iter().sum();
        let age = f64::from(input.age_years);
        let dc = 1.10938 - 0.0008267 * s + 0.0000016 * s * s - 0.0002574 * age;
        from_density(
            self.method(),
            dc,
            input.snapshot.weight_kg,
            json!({
                "formula": "Jackson-Pollock 3-site (male)",
                "sites": site_names(&SITES),
                "sum_mm": round_to(s, 2),
                "age": input.age_years,
            }),
        )
    }
}

/// Jackson, Pollock & Ward (1980), women: triceps, suprailiac, thigh.
pub struct JacksonPollockWard3;

impl Formula for JacksonPollockWard3 {
    fn method(&self) -> Method {
        Method::JacksonPollockWard3
    }

    fn compute(&self, input: &Assessment<'_>) -> Result<PartialResult, AppError> {
        const SITES: [Site; 3] = [Site::Triceps, Site::Suprailiac, Site::Thigh];
        if input.sex != Sex::Female {
            return Err(wrong_sex(self.method(), Sex::Female, Method::JacksonPollock3));
        }
        let s: f64 = skinfolds(self.method(), input.snapshot, SITES)?.iter().sum();
        let age = f64::from(input.age_years);
        let dc = 1.0994921 - 0.0009929 * s + 0.0000023 * s * s - 0.0001392 * age;
        from_density(
            self.method(),
            dc,
            input.snapshot.weight_kg,
            json!({
                "formula": "Jackson-Pollock-Ward 3-site (female)",
                "sites": site_names(&SITES),
                "sum_mm": round_to(s, 2),
                "age": input.age_years,
            }),
        )
    }
}

/// Seven-site Jackson-Pollock. Registered twice: the plain method for both
/// sexes and the Ward variant, which is the same female equation restricted
/// to women.
pub struct JacksonPollock7 {
    pub female_only: bool,
}

impl Formula for JacksonPollock7 {
    fn method(&self) -> Method {
        if self.female_only {
            Method::JacksonPollockWard7
        } else {
            Method::JacksonPollock7
        }
    }

    fn compute(&self, input: &Assessment<'_>) -> Result<PartialResult, AppError> {
        const SITES: [Site; 7] = [
            Site::Chest,
            Site::Midaxillary,
            Site::Triceps,
            Site::Subscapular,
            Site::Abdominal,
            Site::Suprailiac,
            Site::Thigh,
        ];
        if self.female_only && input.sex != Sex::Female {
            return Err(wrong_sex(self.method(), Sex::Female, Method::JacksonPollock7));
        }
        let s: f64 = skinfolds(self.method(), input.snapshot, SITES)?.iter().sum();
        let age = f64::from(input.age_years);
        let (dc, branch) = match input.sex {
            Sex::Male => (
                1.112 - 0.00043499 * s + 0.00000055 * s * s - 0.00028826 * age,
                "male",
            ),
            Sex::Female => (
                1.097 - 0.00046971 * s + 0.00000056 * s * s - 0.00012828 * age,
                "female",
            ),
        };
        from_density(
            self.method(),
            dc,
            input.snapshot.weight_kg,
            json!({
                "formula": format!("Jackson-Pollock 7-site ({branch})"),
                "sites": site_names(&SITES),
                "sum_mm": round_to(s, 2),
                "age": input.age_years,
            }),
        )
    }
}

/// Durnin & Womersley (1974) coefficients `(a, b)` for `Dc = a - b*log10(S4)`.
fn durnin_coefficients(sex: Sex, age: i32) -> (f64, f64) {
    let band = match age {
        i32::MIN..=16 => 0,
        17..=19 => 1,
        20..=29 => 2,
        30..=39 => 3,
        40..=49 => 4,
        _ => 5,
    };
    const MALE: [(f64, f64); 6] = [
        (1.1533, 0.0643),
        (1.1620, 0.0630),
        (1.1631, 0.0632),
        (1.1422, 0.0544),
        (1.1620, 0.0700),
        (1.1715, 0.0779),
    ];
    const FEMALE: [(f64, f64); 6] = [
        (1.1369, 0.0598),
        (1.1549, 0.0678),
        (1.1599, 0.0717),
        (1.1423, 0.0632),
        (1.1333, 0.0612),
        (1.1339, 0.0645),
    ];
    match sex {
        Sex::Male => MALE[band],
        Sex::Female => FEMALE[band],
    }
}

pub struct DurninWomersley;

impl Formula for DurninWomersley {
    fn method(&self) -> Method {
        Method::DurninWomersley
    }

    fn compute(&self, input: &Assessment<'_>) -> Result<PartialResult, AppError> {
        const SITES: [Site; 4] = [Site::Triceps, Site::Biceps, Site::Subscapular, Site::Suprailiac];
        let s: f64 = skinfolds(self.method(), input.snapshot, SITES)?.iter().sum();
        if s <= 0.0 {
            return Err(AppError::out_of_range("skinfolds", "sum must be positive"));
        }
        let (a, b) = durnin_coefficients(input.sex, input.age_years);
        let log_s = s.log10();
        from_density(
            self.method(),
            a - b * log_s,
            input.snapshot.weight_kg,
            json!({
                "formula": "Durnin-Womersley",
                "sites": site_names(&SITES),
                "sum_mm": round_to(s, 2),
                "log10_sum": round_to(log_s, 6),
                "a": a,
                "b": b,
                "age": input.age_years,
            }),
        )
    }
}

/// Guedes (1985), Brazilian adults.
pub struct Guedes;

impl Formula for Guedes {
    fn method(&self) -> Method {
        Method::Guedes
    }

    fn compute(&self, input: &Assessment<'_>) -> Result<PartialResult, AppError> {
        let (sites, a, b) = match input.sex {
            Sex::Male => ([Site::Abdominal, Site::Chest, Site::Suprailiac], 1.17136, 0.06706),
            Sex::Female => ([Site::Thigh, Site::Suprailiac, Site::Subscapular], 1.16650, 0.07063),
        };
        let s: f64 = skinfolds(self.method(), input.snapshot, sites)?.iter().sum();
        if s <= 0.0 {
            return Err(AppError::out_of_range("skinfolds", "sum must be positive"));
        }
        from_density(
            self.method(),
            a - b * s.log10(),
            input.snapshot.weight_kg,
            json!({
                "formula": format!("Guedes ({})", input.sex),
                "sites": site_names(&sites),
                "sum_mm": round_to(s, 2),
            }),
        )
    }
}

/// Petroski (1995). Women also need weight and height.
pub struct Petroski;

impl Formula for Petroski {
    fn method(&self) -> Method {
        Method::Petroski
    }

    fn compute(&self, input: &Assessment<'_>) -> Result<PartialResult, AppError> {
        let snap = input.snapshot;
        let age = f64::from(input.age_years);
        match input.sex {
            Sex::Male => {
                const SITES: [Site; 4] =
                    [Site::Subscapular, Site::Chest, Site::Suprailiac, Site::MedialCalf];
                let x: f64 = skinfolds(self.method(), snap, SITES)?.iter().sum();
                let dc = 1.10726863 - 0.00081201 * x + 0.00000212 * x * x - 0.00041761 * age;
                from_density(
                    self.method(),
                    dc,
                    snap.weight_kg,
                    json!({
                        "formula": "Petroski (male)",
                        "sites": site_names(&SITES),
                        "sum_mm": round_to(x, 2),
                        "age": input.age_years,
                    }),
                )
            }
            Sex::Female => {
                const SITES: [Site; 4] =
                    [Site::Midaxillary, Site::Suprailiac, Site::Thigh, Site::MedialCalf];
                let [ax, si, th, calf, weight, height_m] = require(
                    self.method(),
                    [
                        ("midaxillary", snap.skinfolds.midaxillary_mm),
                        ("suprailiac", snap.skinfolds.suprailiac_mm),
                        ("thigh", snap.skinfolds.thigh_mm),
                        ("medial_calf", snap.skinfolds.medial_calf_mm),
                        ("weight", snap.weight_kg),
                        ("height", snap.height_m),
                    ],
                )?;
                let y = ax + si + th + calf;
                let height_cm = height_m * 100.0;
                // Petroski E.L. (1995), doctoral thesis, Universidade Federal de Santa
                // Maria: women, midaxillary + suprailiac + thigh + medial calf.
                // Linear in the sum; the squared-sum transcription gives negative densities.
                let dc = 1.03465850 - 0.00063129 * y - 0.000311 * age - 0.00048890 * weight
                    + 0.00051345 * height_cm;
                from_density(
                    self.method(),
                    dc,
                    Some(weight),
                    json!({
                        "formula": "Petroski (female)",
                        "sites": site_names(&SITES),
                        "sum_mm": round_to(y, 2),
                        "age": input.age_years,
                        "weight_kg": weight,
                        "height_cm": round_to(height_cm, 1),
                    }),
                )
            }
        }
    }
}

/// Faulkner (1968): percent fat straight from four sites, no density step.
pub struct Faulkner;

impl Formula for Faulkner {
    fn method(&self) -> Method {
        Method::Faulkner
    }

    fn compute(&self, input: &Assessment<'_>) -> Result<PartialResult, AppError> {
        const SITES: [Site; 4] = [Site::Triceps, Site::Subscapular, Site::Suprailiac, Site::Abdominal];
        let s: f64 = skinfolds(self.method(), input.snapshot, SITES)?.iter().sum();
        from_fat_pct(
            self.method(),
            5.783 + 0.153 * s,
            input.snapshot.weight_kg,
            json!({
                "formula": "Faulkner",
                "sites": site_names(&SITES),
                "sum_mm": round_to(s, 2),
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anthropometry::formulas::fixtures::snapshot;
    use crate::anthropometry::repo_types::Skinfolds;

    fn assess(snap: &crate::anthropometry::repo_types::Snapshot, sex: Sex, age: i32) -> Assessment<'_> {
        Assessment {
            snapshot: snap,
            sex,
            age_years: age,
            age_months: age * 12,
        }
    }

    #[test]
    fn jackson_pollock_3_worked_example() {
        let snap = snapshot(Skinfolds {
            chest_mm: Some(10.0),
            abdominal_mm: Some(15.0),
            thigh_mm: Some(12.0),
            ..Default::default()
        });
        let r = JacksonPollock3.compute(&assess(&snap, Sex::Male, 30)).unwrap();
        let expected_dc = 1.10938 - 0.0008267 * 37.0 + 0.0000016 * 37.0 * 37.0 - 0.0002574 * 30.0;
        assert!((r.body_density.unwrap() - expected_dc).abs() < 1e-6);
        assert_eq!(r.body_fat_pct, Some(11.21));
        let total = r.fat_mass_kg.unwrap() + r.lean_mass_kg.unwrap();
        assert!((total - 80.0).abs() <= 0.01);
        assert_eq!(r.parameters["sum_mm"], json!(37.0));
        assert_eq!(r.parameters["sites"], json!(["chest", "abdominal", "thigh"]));
    }

    #[test]
    fn jackson_pollock_3_rejects_women() {
        let snap = snapshot(Skinfolds::default());
        let err = JacksonPollock3.compute(&assess(&snap, Sex::Female, 30)).unwrap_err();
        assert!(matches!(err, AppError::InvalidSex(_)));
    }

    #[test]
    fn missing_sites_are_named() {
        let snap = snapshot(Skinfolds {
            chest_mm: Some(10.0),
            ..Default::default()
        });
        match JacksonPollock3.compute(&assess(&snap, Sex::Male, 30)).unwrap_err() {
            AppError::MissingInput { method, missing } => {
                assert_eq!(method, Method::JacksonPollock3);
                assert_eq!(missing, vec!["abdominal", "thigh"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn jackson_pollock_ward_3_female() {
        let snap = snapshot(Skinfolds {
            triceps_mm: Some(10.0),
            suprailiac_mm: Some(10.0),
            thigh_mm: Some(10.0),
            ..Default::default()
        });
        let r = JacksonPollockWard3.compute(&assess(&snap, Sex::Female, 30)).unwrap();
        assert_eq!(r.body_fat_pct, Some(13.66));
    }

    fn seven_sites() -> Skinfolds {
        Skinfolds {
            chest_mm: Some(10.0),
            midaxillary_mm: Some(10.0),
            triceps_mm: Some(10.0),
            subscapular_mm: Some(10.0),
            abdominal_mm: Some(10.0),
            suprailiac_mm: Some(10.0),
            thigh_mm: Some(10.0),
            ..Default::default()
        }
    }

    #[test]
    fn jackson_pollock_7_branches_on_sex() {
        let snap = snapshot(seven_sites());
        let jp7 = JacksonPollock7 { female_only: false };
        let m = jp7.compute(&assess(&snap, Sex::Male, 30)).unwrap();
        let f = jp7.compute(&assess(&snap, Sex::Female, 30)).unwrap();
        assert_eq!(m.body_fat_pct, Some(10.21));
        assert_eq!(f.body_fat_pct, Some(15.66));
    }

    #[test]
    fn ward_7_is_female_branch_and_refuses_men() {
        let snap = snapshot(seven_sites());
        let ward = JacksonPollock7 { female_only: true };
        let r = ward.compute(&assess(&snap, Sex::Female, 30)).unwrap();
        assert_eq!(r.method, Method::JacksonPollockWard7);
        assert_eq!(r.body_fat_pct, Some(15.66));
        assert!(matches!(
            ward.compute(&assess(&snap, Sex::Male, 30)),
            Err(AppError::InvalidSex(_))
        ));
    }

    #[test]
    fn durnin_womersley_uses_age_band() {
        let snap = snapshot(Skinfolds {
            triceps_mm: Some(10.0),
            biceps_mm: Some(10.0),
            subscapular_mm: Some(10.0),
            suprailiac_mm: Some(10.0),
            ..Default::default()
        });
        let young = DurninWomersley.compute(&assess(&snap, Sex::Male, 25)).unwrap();
        assert_eq!(young.body_fat_pct, Some(16.17));
        let older = DurninWomersley.compute(&assess(&snap, Sex::Female, 60)).unwrap();
        assert_eq!(older.body_fat_pct, Some(30.32));
        assert_eq!(durnin_coefficients(Sex::Male, 16), (1.1533, 0.0643));
        assert_eq!(durnin_coefficients(Sex::Female, 50), (1.1339, 0.0645));
    }

    #[test]
    fn guedes_picks_sites_by_sex() {
        let snap = snapshot(Skinfolds {
            abdominal_mm: Some(15.0),
            chest_mm: Some(15.0),
            suprailiac_mm: Some(15.0),
            ..Default::default()
        });
        let r = Guedes.compute(&assess(&snap, Sex::Male, 30)).unwrap();
        assert_eq!(r.body_fat_pct, Some(16.76));
        match Guedes.compute(&assess(&snap, Sex::Female, 30)).unwrap_err() {
            AppError::MissingInput { missing, .. } => assert_eq!(missing, vec!["thigh", "subscapular"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn petroski_both_sexes() {
        let mut snap = snapshot(Skinfolds {
            subscapular_mm: Some(15.0),
            chest_mm: Some(15.0),
            suprailiac_mm: Some(15.0),
            medial_calf_mm: Some(15.0),
            midaxillary_mm: Some(15.0),
            thigh_mm: Some(15.0),
            ..Default::default()
        });
        let m = Petroski.compute(&assess(&snap, Sex::Male, 30)).unwrap();
        assert_eq!(m.body_fat_pct, Some(19.79));

        snap.weight_kg = Some(60.0);
        snap.height_m = Some(1.65);
        let f = Petroski.compute(&assess(&snap, Sex::Female, 30)).unwrap();
        assert_eq!(f.body_fat_pct, Some(24.67));

        snap.height_m = None;
        match Petroski.compute(&assess(&snap, Sex::Female, 30)).unwrap_err() {
            AppError::MissingInput { missing, .. } => assert_eq!(missing, vec!["height"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn faulkner_direct_percent() {
        let snap = snapshot(Skinfolds {
            triceps_mm: Some(10.0),
            subscapular_mm: Some(12.0),
            suprailiac_mm: Some(14.0),
            abdominal_mm: Some(16.0),
            ..Default::default()
        });
        let r = Faulkner.compute(&assess(&snap, Sex::Female, 40)).unwrap();
        assert_eq!(r.body_fat_pct, Some(13.74));
        assert_eq!(r.body_density, None);
    }
}

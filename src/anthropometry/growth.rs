//! WHO growth-reference lookups and LMS z-scores.
//!
//! The LMS rows themselves are data, loaded from a JSON file at startup. A row
//! is keyed by sex, indicator and either age in months (BAZ, HAZ) or height in
//! centimeters (WHZ).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::units::{round_to, Sex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Indicator {
    BmiForAge,
    HeightForAge,
    WeightForHeight,
}

impl Indicator {
    pub fn label(self) -> &'static str {
        match self {
            Indicator::BmiForAge => "BMI-for-age",
            Indicator::HeightForAge => "height-for-age",
            Indicator::WeightForHeight => "weight-for-height",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lms {
    pub l: f64,
    pub m: f64,
    pub s: f64,
}

pub trait GrowthReference: Send + Sync {
    /// LMS parameters at `key`, or `None` when the table does not cover it.
    fn lms(&self, sex: Sex, indicator: Indicator, key: f64) -> Option<Lms>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct LmsRow {
    pub sex: Sex,
    pub indicator: Indicator,
    pub key: f64,
    pub l: f64,
    pub m: f64,
    pub s: f64,
}

/// Sorted LMS rows per (sex, indicator), interpolated linearly between keys.
#[derive(Debug, Default, Clone)]
pub struct LmsTable {
    rows: HashMap<(Sex, Indicator), Vec<(f64, Lms)>>,
}

impl LmsTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: impl IntoIterator<Item = LmsRow>) -> Self {
        let mut table: HashMap<(Sex, Indicator), Vec<(f64, Lms)>> = HashMap::new();
        for r in rows {
            table.entry((r.sex, r.indicator)).or_default().push((
                r.key,
                Lms {
                    l: r.l,
                    m: r.m,
                    s: r.s,
                },
            ));
        }
        for series in table.values_mut() {
            series.sort_by(|a, b| a.0.total_cmp(&b.0));
        }
        Self { rows: table }
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let rows: Vec<LmsRow> = serde_json::from_str(&raw)?;
        Ok(Self::from_rows(rows))
    }

    pub fn len(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }
}

impl GrowthReference for LmsTable {
    fn lms(&self, sex: Sex, indicator: Indicator, key: f64) -> Option<Lms> {
        let series = self.rows.get(&(sex, indicator))?;
        let first = series.first()?;
        let last = series.last()?;
        if key < first.0 || key > last.0 {
            return None;
        }
        let upper = series.partition_point(|(k, _)| *k < key);
        let (k1, hi) = series[upper];
        if k1 == key || upper == 0 {
            return Some(hi);
        }
        let (k0, lo) = series[upper - 1];
        let t = (key - k0) / (k1 - k0);
        let lerp = |a: f64, b: f64| a + (b - a) * t;
        Some(Lms {
            l: lerp(lo.l, hi.l),
            m: lerp(lo.m, hi.m),
            s: lerp(lo.s, hi.s),
        })
    }
}

fn raw_z(x: f64, p: Lms) -> f64 {
    if p.l.abs() < 1e-12 {
        (x / p.m).ln() / p.s
    } else {
        ((x / p.m).powf(p.l) - 1.0) / (p.l * p.s)
    }
}

/// Measurement value sitting at z standard deviations.
fn sd_value(z: f64, p: Lms) -> f64 {
    if p.l.abs() < 1e-12 {
        p.m * (p.s * z).exp()
    } else {
        p.m * (1.0 + p.l * p.s * z).powf(1.0 / p.l)
    }
}

pub fn z_score(x: f64, p: Lms) -> f64 {
    raw_z(x, p)
}

/// WHO restricted application of the LMS method for weight-based indicators:
/// beyond +/-3 SD the distance is measured in units of the 2-3 SD interval.
pub fn restricted_z_score(x: f64, p: Lms) -> f64 {
    let z = raw_z(x, p);
    if z > 3.0 {
        let sd3 = sd_value(3.0, p);
        let sd23 = sd3 - sd_value(2.0, p);
        3.0 + (x - sd3) / sd23
    } else if z < -3.0 {
        let sd3 = sd_value(-3.0, p);
        let sd23 = sd_value(-2.0, p) - sd3;
        -3.0 + (x - sd3) / sd23
    } else {
        z
    }
}

/// Abramowitz & Stegun 7.1.26, accurate to about 1.5e-7.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    sign * (1.0 - poly * (-x * x).exp())
}

/// Percentile (0-100, 2dp) of a standard normal z-score.
pub fn percentile(z: f64) -> f64 {
    let cdf = 0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2));
    round_to(cdf * 100.0, 2)
}

pub fn classify_baz(z: f64) -> &'static str {
    if z <= -3.0 {
        "severe thinness"
    } else if z < -2.0 {
        "thinness"
    } else if z <= 1.0 {
        "normal"
    } else if z <= 2.0 {
        "overweight"
    } else if z <= 3.0 {
        "obesity"
    } else {
        "severe obesity"
    }
}

pub fn classify_haz(z: f64) -> &'static str {
    if z < -3.0 {
        "very short stature"
    } else if z < -2.0 {
        "short stature"
    } else {
        "adequate stature"
    }
}

pub fn classify_whz(z: f64) -> &'static str {
    if z < -3.0 {
        "severe wasting"
    } else if z < -2.0 {
        "wasting"
    } else if z <= 1.0 {
        "normal"
    } else if z <= 2.0 {
        "possible risk of overweight"
    } else if z <= 3.0 {
        "overweight"
    } else {
        "obesity"
    }
}

/// A handful of WHO rows, enough to exercise every indicator in tests.
#[cfg(test)]
pub fn sample_table() -> LmsTable {
    let row = |sex, indicator, key, l, m, s| LmsRow {
        sex,
        indicator,
        key,
        l,
        m,
        s,
    };
    LmsTable::from_rows([
        // BMI-for-age, 5-19 years (months)
        row(Sex::Male, Indicator::BmiForAge, 120.0, -1.4983, 16.4433, 0.12732),
        row(Sex::Male, Indicator::BmiForAge, 132.0, -1.4210, 16.9188, 0.13415),
        row(Sex::Female, Indicator::BmiForAge, 120.0, -1.0344, 16.6133, 0.14151),
        row(Sex::Female, Indicator::BmiForAge, 228.0, -0.5926, 21.2166, 0.14551),
        // Height-for-age
        row(Sex::Male, Indicator::HeightForAge, 24.0, 1.0, 87.1161, 0.03507),
        row(Sex::Male, Indicator::HeightForAge, 120.0, 1.0, 137.8, 0.0441),
        row(Sex::Male, Indicator::HeightForAge, 132.0, 1.0, 143.1, 0.0450),
        row(Sex::Female, Indicator::HeightForAge, 24.0, 1.0, 85.7153, 0.03764),
        row(Sex::Female, Indicator::HeightForAge, 120.0, 1.0, 138.6, 0.0469),
        row(Sex::Female, Indicator::HeightForAge, 228.0, 1.0, 163.1, 0.0416),
        // Weight-for-height (cm)
        row(Sex::Male, Indicator::WeightForHeight, 85.0, -0.3521, 11.7, 0.08047),
        row(Sex::Male, Indicator::WeightForHeight, 90.0, -0.3521, 12.8, 0.08020),
        row(Sex::Female, Indicator::WeightForHeight, 85.0, -0.3833, 11.4, 0.08420),
        row(Sex::Female, Indicator::WeightForHeight, 90.0, -0.3833, 12.5, 0.08410),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_measurement_scores_zero() {
        let p = Lms {
            l: -1.4983,
            m: 16.4433,
            s: 0.12732,
        };
        assert!(z_score(16.4433, p).abs() < 1e-9);
        assert_eq!(percentile(0.0), 50.0);
    }

    #[test]
    fn zero_box_cox_power_uses_log_form() {
        let p = Lms {
            l: 0.0,
            m: 10.0,
            s: 0.1,
        };
        let z = z_score(10.0 * (0.1f64).exp(), p);
        assert!((z - 1.0).abs() < 1e-9);
    }

    #[test]
    fn percentile_matches_normal_cdf() {
        assert_eq!(percentile(1.0), 84.13);
        assert_eq!(percentile(-1.0), 15.87);
    }

    #[test]
    fn restricted_z_is_linear_beyond_three_sd() {
        let p = Lms {
            l: -1.0,
            m: 16.0,
            s: 0.13,
        };
        let sd3 = sd_value(3.0, p);
        let sd23 = sd3 - sd_value(2.0, p);
        let x = sd3 + sd23;
        assert!((restricted_z_score(x, p) - 4.0).abs() < 1e-9);
        // inside the band nothing changes
        assert_eq!(restricted_z_score(16.0, p), z_score(16.0, p));
    }

    #[test]
    fn table_interpolates_between_rows() {
        let t = sample_table();
        let mid = t.lms(Sex::Male, Indicator::WeightForHeight, 87.5).unwrap();
        assert!((mid.m - 12.25).abs() < 1e-9);
        assert!(t.lms(Sex::Male, Indicator::WeightForHeight, 120.0).is_none());
        let exact = t.lms(Sex::Female, Indicator::HeightForAge, 24.0).unwrap();
        assert_eq!(exact.m, 85.7153);
    }

    #[test]
    fn classification_bands() {
        assert_eq!(classify_baz(-3.0), "severe thinness");
        assert_eq!(classify_baz(1.0), "normal");
        assert_eq!(classify_baz(3.5), "severe obesity");
        assert_eq!(classify_haz(-2.5), "short stature");
        assert_eq!(classify_whz(1.5), "possible risk of overweight");
    }
}

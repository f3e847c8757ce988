//! Method selection for an evaluation.
//!
//! Precedence: pregnancy/obesity redirect, then under-five growth curves by
//! months, then school-age curves by years, then the adult skinfold method.

use serde::Serialize;

use crate::anthropometry::repo_types::{Method, Snapshot};
use crate::units::Sex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Redirect {
    Pregnancy,
    SevereObesity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Redirect(Redirect),
    Pediatric {
        methods: [Method; 2],
        slaughter_eligible: bool,
    },
    Adult(Method),
    Unresolved,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgeContext {
    pub years: Option<i32>,
    /// Completed months, only known when a birth date is available.
    pub months: Option<i32>,
}

// Portuguese keys are still sent by older clients.
const PREGNANT: &[&str] = &["pregnant", "gestante"];
const SEVERELY_OBESE: &[&str] = &["severely_obese", "severelyObese", "obesidade_grave"];
const ATHLETE: &[&str] = &["athlete", "atleta"];

pub fn select(snapshot: &Snapshot, age: AgeContext) -> Selection {
    if snapshot.flag(PREGNANT) {
        return Selection::Redirect(Redirect::Pregnancy);
    }
    if snapshot.flag(SEVERELY_OBESE) {
        return Selection::Redirect(Redirect::SevereObesity);
    }

    let years = age.years.or(age.months.map(|m| m / 12));
    let slaughter_eligible = matches!(years, Some(8..=18))
        && snapshot.skinfolds.triceps_mm.is_some()
        && snapshot.skinfolds.subscapular_mm.is_some();

    if let Some(0..=59) = age.months {
        return Selection::Pediatric {
            methods: [Method::WhoWhz, Method::WhoHaz],
            slaughter_eligible,
        };
    }

    let Some(years) = years else {
        return Selection::Unresolved;
    };
    if (5..=19).contains(&years) {
        return Selection::Pediatric {
            methods: [Method::WhoBaz, Method::WhoHaz],
            slaughter_eligible,
        };
    }
    if years < 18 {
        return Selection::Unresolved;
    }

    match snapshot.sex {
        None => Selection::Unresolved,
        Some(_) if snapshot.flag(ATHLETE) => Selection::Adult(Method::JacksonPollock7),
        Some(Sex::Male) if years >= 60 => Selection::Adult(Method::DurninWomersley),
        Some(Sex::Male) => Selection::Adult(Method::JacksonPollock3),
        Some(Sex::Female) if years > 55 => Selection::Adult(Method::DurninWomersley),
        Some(Sex::Female) => Selection::Adult(Method::JacksonPollockWard3),
    }
}

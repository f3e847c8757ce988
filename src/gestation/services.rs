use time::Date;
use tracing::{info, instrument, warn};

use crate::auth::Requester;
use crate::error::AppError;
use crate::gestation::dto::{AddVisitRequest, StartGestationRequest, VisitView};
use crate::gestation::repo_types::{
    BmiClass, GestationTracking, GestationType, GestationVisit, NewTracking, NewVisit,
};
use crate::state::AppState;
use crate::units::{normalize_height_to_meters, parse_locale_number, round_to, validate_weight};

const MAX_GESTATIONAL_WEEK: i32 = 45;

pub fn classify_pre_pregnancy_bmi(bmi: f64) -> BmiClass {
    if bmi < 18.5 {
        BmiClass::Under
    } else if bmi < 25.0 {
        BmiClass::Normal
    } else if bmi < 30.0 {
        BmiClass::Over
    } else {
        BmiClass::Obese
    }
}

/// IOM total weight-gain range in kg. Multiple pregnancies share one wide range.
pub fn weight_gain_goal(class: BmiClass, kind: GestationType) -> (f64, f64) {
    if kind != GestationType::Single {
        return (15.0, 24.0);
    }
    match class {
        BmiClass::Under => (12.5, 18.0),
        BmiClass::Normal => (11.5, 16.0),
        BmiClass::Over => (6.8, 11.3),
        BmiClass::Obese => (5.0, 9.0),
    }
}

/// Completed weeks since the last menstrual period, never negative.
pub fn gestational_week(last_menstrual_period: Date, on: Date) -> i32 {
    let days = (on - last_menstrual_period).whole_days().max(0);
    (days / 7) as i32
}

pub fn trimester(week: i32) -> i16 {
    match week {
        i32::MIN..=13 => 1,
        14..=27 => 2,
        _ => 3,
    }
}

fn check_week(field: &'static str, week: i32) -> Result<i32, AppError> {
    if !(0..=MAX_GESTATIONAL_WEEK).contains(&week) {
        return Err(AppError::out_of_range(
            field,
            format!("{week} is outside 0-{MAX_GESTATIONAL_WEEK} weeks"),
        ));
    }
    Ok(week)
}

fn check_pressure(field: &'static str, value: Option<i32>) -> Result<Option<i32>, AppError> {
    match value {
        Some(v) if !(30..=300).contains(&v) => Err(AppError::out_of_range(
            field,
            format!("{v} mmHg is outside 30-300 mmHg"),
        )),
        other => Ok(other),
    }
}

async fn load(
    state: &AppState,
    requester: &Requester,
    tracking_id: i64,
) -> Result<GestationTracking, AppError> {
    let tracking = state
        .gestation
        .find_tracking(tracking_id)
        .await?
        .ok_or(AppError::NotFound("gestation tracking"))?;
    requester.authorize(tracking.user_id)?;
    Ok(tracking)
}

#[instrument(skip(state, input))]
pub async fn start(
    state: &AppState,
    requester: &Requester,
    input: StartGestationRequest,
) -> Result<GestationTracking, AppError> {
    let user_id = input.user_id.unwrap_or(requester.id);
    requester.authorize(user_id)?;

    let weight = validate_weight(parse_locale_number(&input.pre_pregnancy_weight)?)?;
    let height_m = normalize_height_to_meters(parse_locale_number(&input.height)?)?;
    let starting_week = input
        .starting_week
        .map(|w| check_week("starting_week", w))
        .transpose()?;
    let gestation_type = input
        .gestation_type
        .as_deref()
        .map(str::parse::<GestationType>)
        .transpose()?
        .unwrap_or_default();
    let now = state.clock.now();
    if input.last_menstrual_period > now.date() {
        return Err(AppError::Validation(
            "last_menstrual_period cannot be in the future".into(),
        ));
    }

    if state.users.find(user_id).await?.is_none() {
        return Err(AppError::NotFound("user"));
    }
    if state.gestation.active_for_user(user_id).await?.is_some() {
        warn!(user_id, "gestation tracking already active");
        return Err(AppError::Duplicate(
            "an active gestation tracking already exists".into(),
        ));
    }

    let bmi_pre = round_to(weight / (height_m * height_m), 1);
    let bmi_class = classify_pre_pregnancy_bmi(bmi_pre);
    let (goal_gain_min_kg, goal_gain_max_kg) = weight_gain_goal(bmi_class, gestation_type);

    let tracking = state
        .gestation
        .insert_tracking(NewTracking {
            user_id,
            pre_pregnancy_weight_kg: weight,
            height_cm: round_to(height_m * 100.0, 1),
            last_menstrual_period: input.last_menstrual_period,
            starting_week,
            gestation_type,
            bmi_pre,
            bmi_class,
            goal_gain_min_kg,
            goal_gain_max_kg,
            created_at: now,
        })
        .await?;
    info!(tracking_id = tracking.id, user_id, "gestation tracking started");
    Ok(tracking)
}

pub async fn current(
    state: &AppState,
    requester: &Requester,
    user_id: i64,
) -> Result<Option<GestationTracking>, AppError> {
    requester.authorize(user_id)?;
    Ok(state.gestation.active_for_user(user_id).await?)
}

fn view(tracking: &GestationTracking, visit: GestationVisit) -> VisitView {
    let weight_gain_kg = round_to(visit.weight_kg - tracking.pre_pregnancy_weight_kg, 2);
    VisitView {
        visit,
        weight_gain_kg,
    }
}

#[instrument(skip(state, payload))]
pub async fn add_visit(
    state: &AppState,
    requester: &Requester,
    tracking_id: i64,
    payload: AddVisitRequest,
) -> Result<VisitView, AppError> {
    let tracking = load(state, requester, tracking_id).await?;

    let weight_kg = validate_weight(parse_locale_number(&payload.weight)?)?;
    let week = match payload.gestational_week {
        Some(w) => check_week("gestational_week", w)?,
        None => gestational_week(tracking.last_menstrual_period, payload.visit_date),
    };
    let systolic_bp = check_pressure("systolic_bp", payload.systolic_bp)?;
    let diastolic_bp = check_pressure("diastolic_bp", payload.diastolic_bp)?;

    let visit = state
        .gestation
        .insert_visit(NewVisit {
            tracking_id,
            visit_date: payload.visit_date,
            weight_kg,
            gestational_week: week,
            trimester: trimester(week),
            systolic_bp,
            diastolic_bp,
            notes: payload.notes.filter(|n| !n.trim().is_empty()),
            created_at: state.clock.now(),
        })
        .await?;
    info!(tracking_id, visit_id = visit.id, week, "gestation visit recorded");
    Ok(view(&tracking, visit))
}

pub async fn list_visits(
    state: &AppState,
    requester: &Requester,
    tracking_id: i64,
) -> Result<Vec<VisitView>, AppError> {
    let tracking = load(state, requester, tracking_id).await?;
    let visits = state.gestation.list_visits(tracking_id).await?;
    Ok(visits.into_iter().map(|v| view(&tracking, v)).collect())
}

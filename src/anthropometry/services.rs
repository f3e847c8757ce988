//! Evaluation lifecycle: submit, merge, compute, persist, sync.

use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use crate::anthropometry::autopick::{self, AgeContext, Selection};
use crate::anthropometry::dto::{ComputeOutcome, EvaluationPage, EvaluationView, ListQuery, SnapshotFields};
use crate::anthropometry::formulas::Assessment;
use crate::anthropometry::repo::EvaluationQuery;
use crate::anthropometry::repo_types::{
    AnthropometricResult, Circumferences, Method, NewResult, NewSnapshot, PartialResult, Skinfolds,
    Snapshot,
};
use crate::auth::Requester;
use crate::clock::{age_months_at, age_years_at};
use crate::error::{AppError, RepoError};
use crate::metrics::services::{self as metrics, MetricsPatch};
use crate::state::AppState;
use crate::units::{parse_locale_number, positive_measurement, round_to, validate_body_fat, NumberInput, Sex};

/// Bumped whenever a coefficient or equation changes.
pub const FORMULA_VERSION: i16 = 1;

const DEFAULT_PER_PAGE: i64 = 10;
const MAX_PER_PAGE: i64 = 100;

/// Validated values for the fields a caller supplied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotPatch {
    pub measured_at: Option<OffsetDateTime>,
    pub weight_kg: Option<f64>,
    pub height_m: Option<f64>,
    pub age_years: Option<i32>,
    pub sex: Option<Sex>,
    pub skinfolds: Skinfolds,
    pub circumferences: Circumferences,
    pub extras: Option<serde_json::Value>,
}

fn measurement(field: &'static str, raw: Option<&NumberInput>) -> Result<Option<f64>, AppError> {
    raw.map(|v| positive_measurement(field, v)).transpose()
}

fn snapshot_height(raw: &NumberInput) -> Result<f64, AppError> {
    let value = positive_measurement("height", raw)?;
    // infants are well below the adult meter band, so only large values are read as cm
    Ok(if value > 2.50 { round_to(value / 100.0, 2) } else { value })
}

fn snapshot_age(raw: &NumberInput) -> Result<i32, AppError> {
    let value = parse_locale_number(raw)?;
    if !(0.0..=120.0).contains(&value) {
        return Err(AppError::out_of_range("age", format!("{value} years is outside 0-120 years")));
    }
    Ok(value.floor() as i32)
}

impl SnapshotPatch {
    pub fn parse(f: &SnapshotFields) -> Result<Self, AppError> {
        Ok(Self {
            measured_at: f.measured_at,
            weight_kg: measurement("weight", f.weight.as_ref())?,
            height_m: f.height.as_ref().map(snapshot_height).transpose()?,
            age_years: f.age.as_ref().map(snapshot_age).transpose()?,
            sex: f.sex.as_deref().map(str::parse::<Sex>).transpose()?,
            skinfolds: Skinfolds {
                triceps_mm: measurement("triceps_mm", f.triceps_mm.as_ref())?,
                biceps_mm: measurement("biceps_mm", f.biceps_mm.as_ref())?,
                subscapular_mm: measurement("subscapular_mm", f.subscapular_mm.as_ref())?,
                suprailiac_mm: measurement("suprailiac_mm", f.suprailiac_mm.as_ref())?,
                abdominal_mm: measurement("abdominal_mm", f.abdominal_mm.as_ref())?,
                chest_mm: measurement("chest_mm", f.chest_mm.as_ref())?,
                midaxillary_mm: measurement("midaxillary_mm", f.midaxillary_mm.as_ref())?,
                thigh_mm: measurement("thigh_mm", f.thigh_mm.as_ref())?,
                medial_calf_mm: measurement("medial_calf_mm", f.medial_calf_mm.as_ref())?,
            },
            circumferences: Circumferences {
                waist_cm: measurement("waist_cm", f.waist_cm.as_ref())?,
                hip_cm: measurement("hip_cm", f.hip_cm.as_ref())?,
                neck_cm: measurement("neck_cm", f.neck_cm.as_ref())?,
                mid_upper_arm_cm: measurement("mid_upper_arm_cm", f.mid_upper_arm_cm.as_ref())?,
                thigh_cm: measurement("thigh_cm", f.thigh_cm.as_ref())?,
                calf_cm: measurement("calf_cm", f.calf_cm.as_ref())?,
            },
            extras: f.extras.clone(),
        })
    }

    /// Overwrites only the fields present in the patch.
    pub fn apply(self, s: &mut Snapshot) {
        fn set<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }
        if let Some(at) = self.measured_at {
            s.measured_at = at;
        }
        set(&mut s.weight_kg, self.weight_kg);
        set(&mut s.height_m, self.height_m);
        set(&mut s.age_years, self.age_years);
        set(&mut s.sex, self.sex);
        set(&mut s.extras, self.extras);

        let (k, p) = (&mut s.skinfolds, self.skinfolds);
        set(&mut k.triceps_mm, p.triceps_mm);
        set(&mut k.biceps_mm, p.biceps_mm);
        set(&mut k.subscapular_mm, p.subscapular_mm);
        set(&mut k.suprailiac_mm, p.suprailiac_mm);
        set(&mut k.abdominal_mm, p.abdominal_mm);
        set(&mut k.chest_mm, p.chest_mm);
        set(&mut k.midaxillary_mm, p.midaxillary_mm);
        set(&mut k.thigh_mm, p.thigh_mm);
        set(&mut k.medial_calf_mm, p.medial_calf_mm);

        let (c, p) = (&mut s.circumferences, self.circumferences);
        set(&mut c.waist_cm, p.waist_cm);
        set(&mut c.hip_cm, p.hip_cm);
        set(&mut c.neck_cm, p.neck_cm);
        set(&mut c.mid_upper_arm_cm, p.mid_upper_arm_cm);
        set(&mut c.thigh_cm, p.thigh_cm);
        set(&mut c.calf_cm, p.calf_cm);
    }
}

async fn load(state: &AppState, id: i64, requester: &Requester) -> Result<Snapshot, AppError> {
    let snapshot = state
        .evaluations
        .find(id)
        .await?
        .ok_or(AppError::NotFound("evaluation"))?;
    requester.authorize(snapshot.user_id)?;
    Ok(snapshot)
}

#[instrument(skip(state, fields))]
pub async fn submit_snapshot(
    state: &AppState,
    requester: &Requester,
    subject_id: i64,
    fields: &SnapshotFields,
) -> Result<Snapshot, AppError> {
    requester.authorize(subject_id)?;
    let patch = SnapshotPatch::parse(fields)?;
    if state.users.find(subject_id).await?.is_none() {
        return Err(AppError::NotFound("user"));
    }

    let now = state.clock.now();
    let snapshot = state
        .evaluations
        .create(NewSnapshot {
            user_id: subject_id,
            assessor_id: (requester.id != subject_id).then_some(requester.id),
            measured_at: patch.measured_at.unwrap_or(now),
            weight_kg: patch.weight_kg,
            height_m: patch.height_m,
            age_years: patch.age_years,
            sex: patch.sex,
            skinfolds: patch.skinfolds,
            circumferences: patch.circumferences,
            extras: patch.extras,
            created_at: now,
        })
        .await?;
    info!(evaluation_id = snapshot.id, user_id = subject_id, "evaluation submitted");
    Ok(snapshot)
}

/// Merges the provided fields and recomputes every method already stored on
/// the snapshot, dropping results that no longer compute.
#[instrument(skip(state, fields))]
pub async fn update_snapshot(
    state: &AppState,
    requester: &Requester,
    id: i64,
    fields: &SnapshotFields,
) -> Result<Snapshot, AppError> {
    let mut snapshot = load(state, id, requester).await?;
    let patch = SnapshotPatch::parse(fields)?;
    patch.apply(&mut snapshot);
    snapshot.updated_at = state.clock.now();
    let snapshot = state.evaluations.update(&snapshot).await?;

    let previous = state.results.for_evaluation(id).await?;
    if previous.is_empty() {
        return Ok(snapshot);
    }

    // only input problems make a stored result stale; infrastructure errors abort
    let resolved = match resolve(state, &snapshot).await {
        Err(e) if !e.is_input_error() => return Err(e),
        other => other,
    };
    let mut written = Vec::new();
    for old in previous {
        let (sex, age) = match &resolved {
            Ok(ctx) => *ctx,
            Err(e) => {
                drop_stale(state, id, old.method, e).await?;
                continue;
            }
        };
        match compute_one(state, &snapshot, sex, age, old.method) {
            Ok(outcome) => {
                let (result, changed) = persist(state, &snapshot, sex, age, outcome).await?;
                if changed {
                    written.push(result);
                }
            }
            Err(e) if e.is_input_error() => drop_stale(state, id, old.method, &e).await?,
            Err(e) => return Err(e),
        }
    }
    sync_body_fat(state, snapshot.user_id, &written).await;
    Ok(snapshot)
}

async fn drop_stale(
    state: &AppState,
    evaluation_id: i64,
    method: Method,
    reason: &AppError,
) -> Result<(), AppError> {
    warn!(evaluation_id, %method, %reason, "stale result removed");
    state.results.delete(evaluation_id, method).await?;
    Ok(())
}

/// Sex and age at measurement time. Months are only known from a birth date.
async fn resolve(state: &AppState, snapshot: &Snapshot) -> Result<(Sex, AgeContext), AppError> {
    let sex = snapshot.sex.ok_or(AppError::MissingSex)?;
    let birth_date = state
        .users
        .find(snapshot.user_id)
        .await?
        .and_then(|u| u.birth_date);
    let measured_on = snapshot.measured_at.date();
    let years = snapshot
        .age_years
        .or(birth_date.map(|b| age_years_at(b, measured_on)));
    if years.is_none() {
        return Err(AppError::MissingRequiredField(vec!["age"]));
    }
    let months = birth_date.map(|b| age_months_at(b, measured_on));
    Ok((sex, AgeContext { years, months }))
}

fn compute_one(
    state: &AppState,
    snapshot: &Snapshot,
    sex: Sex,
    age: AgeContext,
    method: Method,
) -> Result<PartialResult, AppError> {
    let age_years = age.years.ok_or(AppError::MissingRequiredField(vec!["age"]))?;
    let input = Assessment {
        snapshot,
        sex,
        age_years,
        age_months: age.months.unwrap_or(age_years * 12),
    };
    state.formulas.compute(method, &input)
}

/// Upserts by (evaluation, method). Returns the stored row and whether
/// anything was written.
async fn persist(
    state: &AppState,
    snapshot: &Snapshot,
    sex: Sex,
    age: AgeContext,
    outcome: PartialResult,
) -> Result<(AnthropometricResult, bool), AppError> {
    let method = outcome.method;
    let new = NewResult {
        evaluation_id: snapshot.id,
        sex,
        age_years: age.years.unwrap_or_default(),
        outcome,
        version: FORMULA_VERSION,
        computed_at: state.clock.now(),
    };

    if let Some(existing) = state.results.find(snapshot.id, method).await? {
        if new.same_outcome(&existing) {
            debug!(evaluation_id = snapshot.id, %method, "result unchanged");
            return Ok((existing, false));
        }
        let replaced = state.results.replace(existing.id, new).await?;
        return Ok((replaced, true));
    }

    match state.results.insert(new.clone()).await {
        Ok(inserted) => Ok((inserted, true)),
        Err(RepoError::Duplicate(constraint)) => {
            // another request stored this pair between our read and write
            match state.results.find(snapshot.id, method).await? {
                Some(existing) if new.same_outcome(&existing) => Ok((existing, false)),
                _ => Err(AppError::Duplicate(format!(
                    "{method} result for evaluation {} was written concurrently ({constraint})",
                    snapshot.id
                ))),
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Carries new body-fat values into the metrics history. Never fails the caller.
async fn sync_body_fat(state: &AppState, user_id: i64, results: &[AnthropometricResult]) {
    for r in results {
        let Some(pct) = r.body_fat_pct else { continue };
        let synced = async {
            let patch = MetricsPatch {
                body_fat_pct: Some(validate_body_fat(pct)?),
                ..Default::default()
            };
            metrics::append(state, user_id, patch).await
        }
        .await;
        match synced {
            Ok(record) => debug!(user_id, metrics_id = record.id, method = %r.method, "body fat synced"),
            Err(e) => warn!(user_id, method = %r.method, error = %e, "body fat sync failed"),
        }
    }
}

async fn compute_and_store(
    state: &AppState,
    snapshot: &Snapshot,
    sex: Sex,
    age: AgeContext,
    methods: &[Method],
) -> Result<Vec<AnthropometricResult>, AppError> {
    // every formula must succeed before anything is written
    let outcomes = methods
        .iter()
        .map(|m| compute_one(state, snapshot, sex, age, *m))
        .collect::<Result<Vec<_>, _>>()?;

    let mut stored = Vec::with_capacity(outcomes.len());
    let mut written = Vec::new();
    for outcome in outcomes {
        let (result, changed) = persist(state, snapshot, sex, age, outcome).await?;
        if changed {
            written.push(result.clone());
        }
        stored.push(result);
    }
    info!(evaluation_id = snapshot.id, count = stored.len(), "results stored");
    sync_body_fat(state, snapshot.user_id, &written).await;
    Ok(stored)
}

#[instrument(skip(state))]
pub async fn compute_autopick(
    state: &AppState,
    requester: &Requester,
    id: i64,
) -> Result<ComputeOutcome, AppError> {
    let snapshot = load(state, id, requester).await?;
    let (sex, age) = resolve(state, &snapshot).await?;
    let selection = autopick::select(&snapshot, age);
    debug!(evaluation_id = id, ?selection, "method selected");

    let (methods, slaughter_eligible) = match selection {
        Selection::Redirect(redirect) => {
            info!(evaluation_id = id, ?redirect, "evaluation redirected");
            return Ok(ComputeOutcome::Redirect { redirect });
        }
        Selection::Unresolved => return Err(AppError::UnresolvedMethod),
        Selection::Adult(method) => (vec![method], None),
        Selection::Pediatric {
            methods,
            slaughter_eligible,
        } => {
            let mut all = methods.to_vec();
            if slaughter_eligible {
                all.push(Method::Slaughter);
            }
            (all, Some(slaughter_eligible))
        }
    };

    let results = compute_and_store(state, &snapshot, sex, age, &methods).await?;
    Ok(ComputeOutcome::Computed {
        results,
        slaughter_eligible,
    })
}

#[instrument(skip(state))]
pub async fn compute_method(
    state: &AppState,
    requester: &Requester,
    id: i64,
    method: Method,
) -> Result<Vec<AnthropometricResult>, AppError> {
    let snapshot = load(state, id, requester).await?;
    let (sex, age) = resolve(state, &snapshot).await?;
    compute_and_store(state, &snapshot, sex, age, &[method]).await
}

pub async fn get_evaluation(
    state: &AppState,
    requester: &Requester,
    id: i64,
) -> Result<EvaluationView, AppError> {
    let snapshot = load(state, id, requester).await?;
    let results = state.results.for_evaluation(id).await?;
    Ok(EvaluationView { snapshot, results })
}

fn parse_bound(name: &str, raw: Option<&str>) -> Result<Option<OffsetDateTime>, AppError> {
    raw.filter(|s| !s.trim().is_empty())
        .map(|s| {
            OffsetDateTime::parse(s.trim(), &time::format_description::well_known::Rfc3339)
                .map_err(|_| AppError::Validation(format!("'{name}' must be an RFC 3339 timestamp")))
        })
        .transpose()
}

pub async fn list_by_subject(
    state: &AppState,
    requester: &Requester,
    subject_id: i64,
    query: &ListQuery,
) -> Result<EvaluationPage, AppError> {
    requester.authorize(subject_id)?;
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
    let window = EvaluationQuery {
        from: parse_bound("from", query.from.as_deref())?,
        to: parse_bound("to", query.to.as_deref())?,
        limit: per_page,
        offset: (page - 1) * per_page,
    };

    let (snapshots, total) = state.evaluations.list_for_user(subject_id, window).await?;
    let mut items = Vec::with_capacity(snapshots.len());
    for snapshot in snapshots {
        let results = state.results.for_evaluation(snapshot.id).await?;
        items.push(EvaluationView { snapshot, results });
    }
    Ok(EvaluationPage {
        items,
        total,
        page,
        per_page,
    })
}

pub async fn latest_by_subject(
    state: &AppState,
    requester: &Requester,
    subject_id: i64,
) -> Result<Option<EvaluationView>, AppError> {
    requester.authorize(subject_id)?;
    let Some(snapshot) = state.evaluations.latest_for_user(subject_id).await? else {
        return Ok(None);
    };
    let results = state.results.for_evaluation(snapshot.id).await?;
    Ok(Some(EvaluationView { snapshot, results }))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use time::macros::{date, datetime};

    use super::*;
    use crate::anthropometry::autopick::Redirect;
    use crate::anthropometry::formulas::FormulaRegistry;
    use crate::anthropometry::growth::LmsTable;
    use crate::anthropometry::repo::ResultRepository;
    use crate::auth::repo::UserRepository;
    use crate::auth::repo_types::{NewUser, User};
    use crate::auth::Role;
    use crate::state::test_support::{seed_user, seed_user_born};

    fn me(id: i64) -> Requester {
        Requester { id, role: Role::User }
    }

    fn jp3_fields() -> SnapshotFields {
        SnapshotFields {
            weight: Some(80.0.into()),
            height: Some("180".into()),
            age: Some(30.0.into()),
            sex: Some("M".into()),
            chest_mm: Some(10.0.into()),
            abdominal_mm: Some("15".into()),
            thigh_mm: Some("12,0".into()),
            ..Default::default()
        }
    }

    async fn seeded_metrics(state: &AppState, user: i64) {
        let patch = MetricsPatch {
            weight_kg: Some(80.0),
            height_m: Some(1.80),
            age_years: Some(30),
            sex: Some(Sex::Male),
            activity_level: Some(crate::metrics::repo_types::ActivityLevel::Moderate),
            body_fat_pct: None,
        };
        metrics::append(state, user, patch).await.unwrap();
    }

    #[tokio::test]
    async fn submit_normalizes_numbers() {
        let state = AppState::fake();
        let user = seed_user(&state, "a@example.com").await;
        let snap = submit_snapshot(&state, &me(user), user, &jp3_fields()).await.unwrap();
        assert_eq!(snap.height_m, Some(1.8));
        assert_eq!(snap.skinfolds.thigh_mm, Some(12.0));
        assert_eq!(snap.assessor_id, None);
        assert_eq!(snap.measured_at, datetime!(2025-06-01 12:00 UTC));
    }

    #[tokio::test]
    async fn submit_rejects_bad_numbers_without_writing() {
        let state = AppState::fake();
        let user = seed_user(&state, "a@example.com").await;
        let mut fields = jp3_fields();
        fields.triceps_mm = Some("-3".into());
        let err = submit_snapshot(&state, &me(user), user, &fields).await.unwrap_err();
        assert!(matches!(err, AppError::OutOfRange { field: "triceps_mm", .. }));
        assert!(state.evaluations.latest_for_user(user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn only_subject_or_admin_may_act() {
        let state = AppState::fake();
        let owner = seed_user(&state, "a@example.com").await;
        let other = seed_user(&state, "b@example.com").await;
        let err = submit_snapshot(&state, &me(other), owner, &jp3_fields()).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden));

        let admin = Requester { id: other, role: Role::Admin };
        let snap = submit_snapshot(&state, &admin, owner, &jp3_fields()).await.unwrap();
        assert_eq!(snap.assessor_id, Some(other));
        assert!(matches!(
            get_evaluation(&state, &me(other), snap.id).await,
            Err(AppError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn autopick_computes_and_syncs_body_fat() {
        let state = AppState::fake();
        let user = seed_user(&state, "a@example.com").await;
        seeded_metrics(&state, user).await;
        let snap = submit_snapshot(&state, &me(user), user, &jp3_fields()).await.unwrap();

        let outcome = compute_autopick(&state, &me(user), snap.id).await.unwrap();
        let ComputeOutcome::Computed { results, slaughter_eligible } = outcome else {
            panic!("expected results");
        };
        assert_eq!(slaughter_eligible, None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].method, Method::JacksonPollock3);
        assert_eq!(results[0].body_fat_pct, Some(11.21));
        assert_eq!(results[0].version, FORMULA_VERSION);

        let latest = metrics::latest(&state, user).await.unwrap().unwrap();
        assert_eq!(latest.body_fat_pct, Some(11.21));
        assert_eq!(latest.weight_kg, 80.0);
    }

    #[tokio::test]
    async fn sync_failure_does_not_fail_compute() {
        let state = AppState::fake();
        let user = seed_user(&state, "a@example.com").await;
        // no metrics history: the sync append is rejected
        let snap = submit_snapshot(&state, &me(user), user, &jp3_fields()).await.unwrap();
        let results = compute_method(&state, &me(user), snap.id, Method::JacksonPollock3)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(metrics::history(&state, user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recompute_is_idempotent() {
        let state = AppState::fake();
        let user = seed_user(&state, "a@example.com").await;
        seeded_metrics(&state, user).await;
        let snap = submit_snapshot(&state, &me(user), user, &jp3_fields()).await.unwrap();

        let first = compute_method(&state, &me(user), snap.id, Method::Faulkner).await;
        assert!(matches!(first, Err(AppError::MissingInput { .. })));

        let a = compute_method(&state, &me(user), snap.id, Method::JacksonPollock3).await.unwrap();
        let b = compute_method(&state, &me(user), snap.id, Method::JacksonPollock3).await.unwrap();
        assert_eq!(a[0].id, b[0].id);
        assert_eq!(state.results.for_evaluation(snap.id).await.unwrap().len(), 1);
        // only the first compute wrote, so only one body-fat row was appended
        assert_eq!(metrics::history(&state, user).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_sex_and_age_are_reported() {
        let state = AppState::fake();
        let user = seed_user(&state, "a@example.com").await;
        let mut fields = jp3_fields();
        fields.sex = None;
        let snap = submit_snapshot(&state, &me(user), user, &fields).await.unwrap();
        assert!(matches!(
            compute_autopick(&state, &me(user), snap.id).await,
            Err(AppError::MissingSex)
        ));

        let mut fields = jp3_fields();
        fields.age = None;
        let snap = submit_snapshot(&state, &me(user), user, &fields).await.unwrap();
        assert!(matches!(
            compute_autopick(&state, &me(user), snap.id).await,
            Err(AppError::MissingRequiredField(f)) if f == vec!["age"]
        ));
    }

    #[tokio::test]
    async fn age_falls_back_to_birth_date() {
        let state = AppState::fake();
        // two years old on the fixed clock date
        let user = seed_user_born(&state, "k@example.com", date!(2023 - 06 - 01)).await;
        let fields = SnapshotFields {
            weight: Some(12.25.into()),
            height: Some("87.5".into()),
            sex: Some("M".into()),
            ..Default::default()
        };
        let snap = submit_snapshot(&state, &me(user), user, &fields).await.unwrap();
        assert_eq!(snap.height_m, Some(0.88));
        assert_eq!(snap.age_years, None);

        let outcome = compute_autopick(&state, &me(user), snap.id).await.unwrap();
        let ComputeOutcome::Computed { results, slaughter_eligible } = outcome else {
            panic!("expected results");
        };
        assert_eq!(slaughter_eligible, Some(false));
        let methods: Vec<Method> = results.iter().map(|r| r.method).collect();
        assert_eq!(methods, vec![Method::WhoWhz, Method::WhoHaz]);
        assert!(results.iter().all(|r| r.z_score.is_some() && r.age_years == 2));
    }

    #[tokio::test]
    async fn uncovered_growth_reference_writes_nothing() {
        let state = AppState::fake();
        // 16 months: height-for-age rows start at 24 months in the test table
        let user = seed_user_born(&state, "j@example.com", date!(2024 - 01 - 15)).await;
        let fields = SnapshotFields {
            weight: Some(11.0.into()),
            height: Some("86".into()),
            sex: Some("M".into()),
            ..Default::default()
        };
        let snap = submit_snapshot(&state, &me(user), user, &fields).await.unwrap();
        assert!(matches!(
            compute_autopick(&state, &me(user), snap.id).await,
            Err(AppError::GrowthReferenceUnavailable(_))
        ));
        assert!(state.results.for_evaluation(snap.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pregnancy_redirects_without_results() {
        let state = AppState::fake();
        let user = seed_user(&state, "a@example.com").await;
        let mut fields = jp3_fields();
        fields.sex = Some("F".into());
        fields.extras = Some(json!({ "pregnant": true }));
        let snap = submit_snapshot(&state, &me(user), user, &fields).await.unwrap();
        let outcome = compute_autopick(&state, &me(user), snap.id).await.unwrap();
        assert_eq!(outcome, ComputeOutcome::Redirect { redirect: Redirect::Pregnancy });
        assert!(state.results.for_evaluation(snap.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_recomputes_and_drops_stale_results() {
        let state = AppState::fake();
        let user = seed_user(&state, "a@example.com").await;
        let snap = submit_snapshot(&state, &me(user), user, &jp3_fields()).await.unwrap();
        compute_method(&state, &me(user), snap.id, Method::JacksonPollock3).await.unwrap();
        // guedes needs the suprailiac site, so nothing is stored for it
        assert!(compute_method(&state, &me(user), snap.id, Method::Guedes).await.is_err());

        let bump = SnapshotFields {
            chest_mm: Some(20.0.into()),
            ..Default::default()
        };
        let updated = update_snapshot(&state, &me(user), snap.id, &bump).await.unwrap();
        assert_eq!(updated.skinfolds.chest_mm, Some(20.0));
        assert_eq!(updated.skinfolds.abdominal_mm, Some(15.0));
        let results = state.results.for_evaluation(snap.id).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].body_fat_pct > Some(11.21));

        // switching sex makes the male-only equation invalid
        let flip = SnapshotFields {
            sex: Some("F".into()),
            ..Default::default()
        };
        update_snapshot(&state, &me(user), snap.id, &flip).await.unwrap();
        assert!(state.results.for_evaluation(snap.id).await.unwrap().is_empty());
    }

    /// Users repository whose lookups fail, as during a database outage.
    struct UnreachableUsers;

    #[async_trait]
    impl UserRepository for UnreachableUsers {
        async fn find(&self, _id: i64) -> Result<Option<User>, RepoError> {
            Err(RepoError::Unavailable("connection refused".into()))
        }
        async fn find_by_email(&self, _email: &str) -> Result<Option<User>, RepoError> {
            Err(RepoError::Unavailable("connection refused".into()))
        }
        async fn create(&self, _user: NewUser) -> Result<User, RepoError> {
            Err(RepoError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn update_keeps_results_when_storage_fails() {
        let mut state = AppState::fake();
        let user = seed_user(&state, "a@example.com").await;
        let snap = submit_snapshot(&state, &me(user), user, &jp3_fields()).await.unwrap();
        compute_method(&state, &me(user), snap.id, Method::JacksonPollock3).await.unwrap();

        state.users = Arc::new(UnreachableUsers);
        let bump = SnapshotFields {
            chest_mm: Some(20.0.into()),
            ..Default::default()
        };
        let err = update_snapshot(&state, &me(user), snap.id, &bump).await.unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
        assert_eq!(state.results.for_evaluation(snap.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_keeps_results_when_growth_tables_are_missing() {
        let mut state = AppState::fake();
        let user = seed_user_born(&state, "k@example.com", date!(2023 - 06 - 01)).await;
        let fields = SnapshotFields {
            weight: Some(12.25.into()),
            height: Some("87.5".into()),
            sex: Some("M".into()),
            ..Default::default()
        };
        let snap = submit_snapshot(&state, &me(user), user, &fields).await.unwrap();
        compute_autopick(&state, &me(user), snap.id).await.unwrap();

        state.formulas = Arc::new(FormulaRegistry::standard(Arc::new(LmsTable::empty())));
        let bump = SnapshotFields {
            weight: Some(12.5.into()),
            ..Default::default()
        };
        let err = update_snapshot(&state, &me(user), snap.id, &bump).await.unwrap_err();
        assert!(matches!(err, AppError::GrowthReferenceUnavailable(_)));
        assert_eq!(state.results.for_evaluation(snap.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn explicit_young_age_without_birth_date_is_unresolved() {
        let state = AppState::fake();
        let user = seed_user(&state, "t@example.com").await;
        let fields = SnapshotFields {
            weight: Some(14.0.into()),
            height: Some("95".into()),
            age: Some(3.0.into()),
            sex: Some("F".into()),
            ..Default::default()
        };
        let snap = submit_snapshot(&state, &me(user), user, &fields).await.unwrap();
        assert!(matches!(
            compute_autopick(&state, &me(user), snap.id).await,
            Err(AppError::UnresolvedMethod)
        ));
        assert!(state.results.for_evaluation(snap.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn listing_pages_newest_first() {
        let state = AppState::fake();
        let user = seed_user(&state, "a@example.com").await;
        for day in 1..=3 {
            let mut fields = jp3_fields();
            fields.measured_at = Some(datetime!(2025-05-01 08:00 UTC) + time::Duration::days(day));
            submit_snapshot(&state, &me(user), user, &fields).await.unwrap();
        }
        let page = list_by_subject(
            &state,
            &me(user),
            user,
            &ListQuery {
                page: Some(1),
                per_page: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert!(page.items[0].snapshot.measured_at > page.items[1].snapshot.measured_at);

        let bounded = list_by_subject(
            &state,
            &me(user),
            user,
            &ListQuery {
                from: Some("2025-05-03T00:00:00Z".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(bounded.total, 2);
        assert_eq!(bounded.per_page, 10);

        let latest = latest_by_subject(&state, &me(user), user).await.unwrap().unwrap();
        assert_eq!(latest.snapshot.measured_at, datetime!(2025-05-04 08:00 UTC));

        let bad = ListQuery {
            to: Some("yesterday".into()),
            ..Default::default()
        };
        assert!(matches!(
            list_by_subject(&state, &me(user), user, &bad).await,
            Err(AppError::Validation(_))
        ));
    }

    /// Hides the existing row from the first lookup, as if another request
    /// inserted it between our read and our write.
    struct RacingResults {
        inner: Arc<dyn ResultRepository>,
        hide_once: AtomicBool,
    }

    #[async_trait]
    impl ResultRepository for RacingResults {
        async fn for_evaluation(&self, id: i64) -> Result<Vec<AnthropometricResult>, RepoError> {
            self.inner.for_evaluation(id).await
        }
        async fn find(&self, id: i64, m: Method) -> Result<Option<AnthropometricResult>, RepoError> {
            if self.hide_once.swap(false, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.find(id, m).await
        }
        async fn insert(&self, r: NewResult) -> Result<AnthropometricResult, RepoError> {
            self.inner.insert(r).await
        }
        async fn replace(&self, id: i64, r: NewResult) -> Result<AnthropometricResult, RepoError> {
            self.inner.replace(id, r).await
        }
        async fn delete(&self, id: i64, m: Method) -> Result<(), RepoError> {
            self.inner.delete(id, m).await
        }
    }

    #[tokio::test]
    async fn concurrent_identical_write_is_a_no_op() {
        let mut state = AppState::fake();
        let user = seed_user(&state, "a@example.com").await;
        let snap = submit_snapshot(&state, &me(user), user, &jp3_fields()).await.unwrap();
        let first = compute_method(&state, &me(user), snap.id, Method::JacksonPollock3)
            .await
            .unwrap();

        state.results = Arc::new(RacingResults {
            inner: state.results.clone(),
            hide_once: AtomicBool::new(true),
        });
        let again = compute_method(&state, &me(user), snap.id, Method::JacksonPollock3)
            .await
            .unwrap();
        assert_eq!(again[0].id, first[0].id);
    }

    #[tokio::test]
    async fn concurrent_different_write_is_a_conflict() {
        let mut state = AppState::fake();
        let user = seed_user(&state, "a@example.com").await;
        let snap = submit_snapshot(&state, &me(user), user, &jp3_fields()).await.unwrap();
        compute_method(&state, &me(user), snap.id, Method::JacksonPollock3)
            .await
            .unwrap();

        let mut changed = snap.clone();
        changed.skinfolds.chest_mm = Some(30.0);
        state.evaluations.update(&changed).await.unwrap();

        state.results = Arc::new(RacingResults {
            inner: state.results.clone(),
            hide_once: AtomicBool::new(true),
        });
        let err = compute_method(&state, &me(user), snap.id, Method::JacksonPollock3)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Duplicate(_)));
    }
}

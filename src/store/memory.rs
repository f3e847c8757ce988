//! Process-local store implementing every repository trait.
//!
//! Used when `STORE=memory` and by the test suite. It keeps the same
//! uniqueness rules and orderings as the Postgres schema.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::anthropometry::repo::{EvaluationQuery, EvaluationRepository, ResultRepository};
use crate::anthropometry::repo_types::{
    AnthropometricResult, Method, NewResult, NewSnapshot, Snapshot,
};
use crate::auth::repo::UserRepository;
use crate::auth::repo_types::{NewUser, User};
use crate::clock::Clock;
use crate::error::RepoError;
use crate::gestation::repo::GestationRepository;
use crate::gestation::repo_types::{GestationTracking, GestationVisit, NewTracking, NewVisit};
use crate::metrics::repo::MetricsRepository;
use crate::metrics::repo_types::{MetricsRecord, NewMetrics};

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: Vec<User>,
    evaluations: Vec<Snapshot>,
    results: Vec<AnthropometricResult>,
    metrics: Vec<MetricsRecord>,
    trackings: Vec<GestationTracking>,
    visits: Vec<GestationVisit>,
}

impl Tables {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            clock,
        }
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find(&self, id: i64) -> Result<Option<User>, RepoError> {
        let t = self.tables.read().await;
        Ok(t.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        let t = self.tables.read().await;
        Ok(t.users.iter().find(|u| u.email == email).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User, RepoError> {
        let mut t = self.tables.write().await;
        if t.users.iter().any(|u| u.email == user.email) {
            return Err(RepoError::Duplicate("users_email_key".into()));
        }
        let id = t.id();
        let user = User {
            id,
            email: user.email,
            name: user.name,
            password_hash: user.password_hash,
            role: user.role,
            birth_date: user.birth_date,
            created_at: self.clock.now(),
        };
        t.users.push(user.clone());
        Ok(user)
    }
}

fn newest_first(a: &Snapshot, b: &Snapshot) -> std::cmp::Ordering {
    b.measured_at.cmp(&a.measured_at).then(b.id.cmp(&a.id))
}

#[async_trait]
impl EvaluationRepository for MemoryStore {
    async fn find(&self, id: i64) -> Result<Option<Snapshot>, RepoError> {
        let t = self.tables.read().await;
        Ok(t.evaluations.iter().find(|s| s.id == id).cloned())
    }

    async fn create(&self, snapshot: NewSnapshot) -> Result<Snapshot, RepoError> {
        let mut t = self.tables.write().await;
        let id = t.id();
        let snapshot = snapshot.into_snapshot(id);
        t.evaluations.push(snapshot.clone());
        Ok(snapshot)
    }

    async fn update(&self, snapshot: &Snapshot) -> Result<Snapshot, RepoError> {
        let mut t = self.tables.write().await;
        let slot = t
            .evaluations
            .iter_mut()
            .find(|s| s.id == snapshot.id)
            .ok_or(RepoError::NotFound)?;
        // user_id and created_at are immutable columns
        *slot = Snapshot {
            user_id: slot.user_id,
            created_at: slot.created_at,
            ..snapshot.clone()
        };
        Ok(slot.clone())
    }

    async fn latest_for_user(&self, user_id: i64) -> Result<Option<Snapshot>, RepoError> {
        let t = self.tables.read().await;
        Ok(t
            .evaluations
            .iter()
            .filter(|s| s.user_id == user_id)
            .min_by(|a, b| newest_first(a, b))
            .cloned())
    }

    async fn list_for_user(
        &self,
        user_id: i64,
        q: EvaluationQuery,
    ) -> Result<(Vec<Snapshot>, i64), RepoError> {
        let t = self.tables.read().await;
        let mut matching: Vec<&Snapshot> = t
            .evaluations
            .iter()
            .filter(|s| s.user_id == user_id)
            .filter(|s| q.from.map_or(true, |from| s.measured_at >= from))
            .filter(|s| q.to.map_or(true, |to| s.measured_at <= to))
            .collect();
        matching.sort_by(|a, b| newest_first(a, b));
        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(q.offset.max(0) as usize)
            .take(q.limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }
}

#[async_trait]
impl ResultRepository for MemoryStore {
    async fn for_evaluation(&self, evaluation_id: i64) -> Result<Vec<AnthropometricResult>, RepoError> {
        let t = self.tables.read().await;
        let mut rows: Vec<_> = t
            .results
            .iter()
            .filter(|r| r.evaluation_id == evaluation_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }

    async fn find(
        &self,
        evaluation_id: i64,
        method: Method,
    ) -> Result<Option<AnthropometricResult>, RepoError> {
        let t = self.tables.read().await;
        Ok(t
            .results
            .iter()
            .find(|r| r.evaluation_id == evaluation_id && r.method == method)
            .cloned())
    }

    async fn insert(&self, result: NewResult) -> Result<AnthropometricResult, RepoError> {
        let mut t = self.tables.write().await;
        let taken = t
            .results
            .iter()
            .any(|r| r.evaluation_id == result.evaluation_id && r.method == result.outcome.method);
        if taken {
            return Err(RepoError::Duplicate(
                "anthropometry_result_evaluation_id_method_key".into(),
            ));
        }
        let id = t.id();
        let created_at = result.computed_at;
        let row = result.into_result(id, created_at);
        t.results.push(row.clone());
        Ok(row)
    }

    async fn replace(&self, id: i64, result: NewResult) -> Result<AnthropometricResult, RepoError> {
        let mut t = self.tables.write().await;
        let slot = t
            .results
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(RepoError::NotFound)?;
        *slot = result.into_result(id, slot.created_at);
        Ok(slot.clone())
    }

    async fn delete(&self, evaluation_id: i64, method: Method) -> Result<(), RepoError> {
        let mut t = self.tables.write().await;
        t.results
            .retain(|r| !(r.evaluation_id == evaluation_id && r.method == method));
        Ok(())
    }
}

#[async_trait]
impl MetricsRepository for MemoryStore {
    async fn latest(&self, user_id: i64) -> Result<Option<MetricsRecord>, RepoError> {
        Ok(self.history(user_id).await?.into_iter().next())
    }

    async fn history(&self, user_id: i64) -> Result<Vec<MetricsRecord>, RepoError> {
        let t = self.tables.read().await;
        let mut rows: Vec<_> = t
            .metrics
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn append(&self, record: NewMetrics) -> Result<MetricsRecord, RepoError> {
        let mut t = self.tables.write().await;
        let id = t.id();
        let record = record.into_record(id);
        t.metrics.push(record.clone());
        Ok(record)
    }
}

#[async_trait]
impl GestationRepository for MemoryStore {
    async fn active_for_user(&self, user_id: i64) -> Result<Option<GestationTracking>, RepoError> {
        let t = self.tables.read().await;
        Ok(t
            .trackings
            .iter()
            .find(|g| g.user_id == user_id && g.active)
            .cloned())
    }

    async fn find_tracking(&self, id: i64) -> Result<Option<GestationTracking>, RepoError> {
        let t = self.tables.read().await;
        Ok(t.trackings.iter().find(|g| g.id == id).cloned())
    }

    async fn insert_tracking(&self, tracking: NewTracking) -> Result<GestationTracking, RepoError> {
        let mut t = self.tables.write().await;
        if t
            .trackings
            .iter()
            .any(|g| g.user_id == tracking.user_id && g.active)
        {
            return Err(RepoError::Duplicate("gestation_tracking_one_active".into()));
        }
        let id = t.id();
        let tracking = tracking.into_tracking(id);
        t.trackings.push(tracking.clone());
        Ok(tracking)
    }

    async fn insert_visit(&self, visit: NewVisit) -> Result<GestationVisit, RepoError> {
        let mut t = self.tables.write().await;
        if !t.trackings.iter().any(|g| g.id == visit.tracking_id) {
            return Err(RepoError::NotFound);
        }
        let id = t.id();
        let visit = visit.into_visit(id);
        t.visits.push(visit.clone());
        Ok(visit)
    }

    async fn list_visits(&self, tracking_id: i64) -> Result<Vec<GestationVisit>, RepoError> {
        let t = self.tables.read().await;
        let mut rows: Vec<_> = t
            .visits
            .iter()
            .filter(|v| v.tracking_id == tracking_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.visit_date.cmp(&b.visit_date).then(a.id.cmp(&b.id)));
        Ok(rows)
    }
}

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "admin" {
            Role::Admin
        } else {
            Role::User
        }
    }
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub role: Role,
    #[serde(default, with = "crate::clock::iso_date::option")]
    pub birth_date: Option<Date>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: Option<String>,
    pub password_hash: String,
    pub role: Role,
    pub birth_date: Option<Date>,
}

#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub password_hash: String,
    pub role: String,
    pub birth_date: Option<Date>,
    pub created_at: OffsetDateTime,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            email: r.email,
            name: r.name,
            password_hash: r.password_hash,
            role: Role::parse(&r.role),
            birth_date: r.birth_date,
            created_at: r.created_at,
        }
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub id: i64,
    pub role: Role,
}

impl Requester {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins act on any subject; everyone else only on themselves.
    pub fn authorize(&self, subject_id: i64) -> Result<(), AppError> {
        if self.is_admin() || self.id == subject_id {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_may_act_on_anyone_user_only_on_self() {
        let admin = Requester { id: 1, role: Role::Admin };
        let user = Requester { id: 2, role: Role::User };
        assert!(admin.authorize(99).is_ok());
        assert!(user.authorize(2).is_ok());
        assert!(matches!(user.authorize(3), Err(AppError::Forbidden)));
    }
}

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use rand::{distr::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendeeStatus {
    Registered,
    CheckedIn,
    Cancelled,
}

impl AttendeeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendeeStatus::Registered => "registered",
            AttendeeStatus::CheckedIn => "checked_in",
            AttendeeStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "registered" => Some(AttendeeStatus::Registered),
            "checked_in" => Some(AttendeeStatus::CheckedIn),
            "cancelled" => Some(AttendeeStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Attendee {
    pub id: Uuid,
    pub event_id: Uuid,
    pub ticket_type_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub status: String,
    pub verification_code: Option<String>,
    pub check_in_time: Option<DateTime<Utc>>,
    pub checked_in_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterAttendeeRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub ticket_type_id: Option<Uuid>,
}

impl Attendee {
    pub fn state(&self) -> Result<AttendeeStatus> {
        AttendeeStatus::parse(&self.status)
            .ok_or_else(|| Error::Internal(format!("unknown attendee status '{}'", self.status)))
    }

    fn generate_verification_code() -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(char::from)
            .collect::<String>()
            .to_uppercase()
    }

    pub async fn create(
        pool: &PgPool,
        event_id: Uuid,
        req: RegisterAttendeeRequest,
    ) -> Result<Self> {
        if req.name.trim().is_empty() {
            return Err(Error::Validation("attendee name is required".to_string()));
        }
        if !req.email.contains('@') {
            return Err(Error::Validation("a valid email address is required".to_string()));
        }

        let now = Utc::now();
        let attendee = sqlx::query_as::<_, Attendee>(
            r#"
            INSERT INTO attendees (
                id, event_id, ticket_type_id, name, email, phone,
                status, verification_code, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'registered', $7, $8, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event_id)
        .bind(req.ticket_type_id)
        .bind(req.name.trim())
        .bind(req.email.trim())
        .bind(req.phone)
        .bind(Self::generate_verification_code())
        .bind(now)
        .fetch_one(pool)
        .await?;

        Ok(attendee)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>> {
        let attendee = sqlx::query_as::<_, Attendee>("SELECT * FROM attendees WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(attendee)
    }

    pub async fn find_by_event(pool: &PgPool, event_id: Uuid) -> Result<Vec<Self>> {
        let attendees = sqlx::query_as::<_, Attendee>(
            "SELECT * FROM attendees WHERE event_id = $1 ORDER BY created_at",
        )
        .bind(event_id)
        .fetch_all(pool)
        .await?;

        Ok(attendees)
    }

    /// Conditional check-in transition. Returns `None` when no row in
    /// `registered` state matched, which the caller folds into either a
    /// duplicate-scan success or a cancelled-attendee rejection after
    /// re-reading the row. `check_in_time` is written exactly once.
    pub async fn try_check_in(pool: &PgPool, id: Uuid, actor: &str) -> Result<Option<Self>> {
        let now = Utc::now();
        let updated = sqlx::query_as::<_, Attendee>(
            r#"
            UPDATE attendees
            SET status = 'checked_in', check_in_time = $2, checked_in_by = $3, updated_at = $2
            WHERE id = $1 AND status = 'registered'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(actor)
        .fetch_optional(pool)
        .await?;

        Ok(updated)
    }

    pub async fn cancel(pool: &PgPool, id: Uuid) -> Result<Self> {
        let updated = sqlx::query_as::<_, Attendee>(
            r#"
            UPDATE attendees
            SET status = 'cancelled', updated_at = $2
            WHERE id = $1 AND status = 'registered'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await?;

        match updated {
            Some(attendee) => Ok(attendee),
            None => {
                let current = Self::find_by_id(pool, id)
                    .await?
                    .ok_or_else(|| Error::not_found("attendee"))?;
                Err(Error::InvalidState(format!(
                    "cannot cancel an attendee in status '{}'",
                    current.status
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            AttendeeStatus::Registered,
            AttendeeStatus::CheckedIn,
            AttendeeStatus::Cancelled,
        ] {
            assert_eq!(AttendeeStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AttendeeStatus::parse("waitlisted"), None);
    }

    #[test]
    fn verification_codes_are_six_uppercase_characters() {
        let code = Attendee::generate_verification_code();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}

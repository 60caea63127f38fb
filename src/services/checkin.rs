use crate::error::{Error, Result};
use crate::models::{Attendee, AttendeeStatus, Event};
use crate::services::email::EmailService;
use crate::services::qr_token::{self, DecodedToken, QrPayload};
use log::{error, info};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

pub struct CheckInService {
    pool: PgPool,
    email: Arc<EmailService>,
}

#[derive(Debug)]
pub struct CheckInResult {
    pub attendee: Attendee,
    pub is_duplicate: bool,
}

impl CheckInService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            email: EmailService::global(),
        }
    }

    pub fn with_email(pool: PgPool, email: Arc<EmailService>) -> Self {
        Self { pool, email }
    }

    /// Check an attendee in. Checked-in is terminal and idempotent: a second
    /// call succeeds with `is_duplicate = true` and the original
    /// `check_in_time` untouched. Cancelled attendees are always rejected.
    pub async fn check_in(&self, attendee_id: Uuid, actor: &str) -> Result<CheckInResult> {
        let attendee = Attendee::find_by_id(&self.pool, attendee_id)
            .await?
            .ok_or_else(|| Error::not_found("attendee"))?;

        match attendee.state()? {
            AttendeeStatus::CheckedIn => {
                info!("Duplicate check-in for attendee {} ignored", attendee_id);
                return Ok(CheckInResult {
                    attendee,
                    is_duplicate: true,
                });
            }
            AttendeeStatus::Cancelled => {
                return Err(Error::InvalidState(
                    "cancelled attendees cannot be checked in".to_string(),
                ));
            }
            AttendeeStatus::Registered => {}
        }

        match Attendee::try_check_in(&self.pool, attendee_id, actor).await? {
            Some(updated) => {
                info!("Attendee {} checked in by {}", attendee_id, actor);
                self.notify_check_in(&updated);
                Ok(CheckInResult {
                    attendee: updated,
                    is_duplicate: false,
                })
            }
            None => {
                // lost a race with a concurrent scan; fold into the same
                // outcomes a fresh read would produce
                let current = Attendee::find_by_id(&self.pool, attendee_id)
                    .await?
                    .ok_or_else(|| Error::not_found("attendee"))?;

                match current.state()? {
                    AttendeeStatus::CheckedIn => Ok(CheckInResult {
                        attendee: current,
                        is_duplicate: true,
                    }),
                    AttendeeStatus::Cancelled => Err(Error::InvalidState(
                        "cancelled attendees cannot be checked in".to_string(),
                    )),
                    AttendeeStatus::Registered => Err(Error::Internal(
                        "check-in transition did not apply".to_string(),
                    )),
                }
            }
        }
    }

    /// QR-scan path: the token must decode and be fresh before any attendee
    /// state is read or written.
    pub async fn check_in_from_token(
        &self,
        raw_token: &str,
        actor: &str,
    ) -> Result<(CheckInResult, QrPayload)> {
        let payload = match qr_token::decode(raw_token) {
            DecodedToken::Valid(payload) => payload,
            DecodedToken::Expired { .. } => return Err(Error::ExpiredToken),
            DecodedToken::Invalid { reason } => return Err(Error::InvalidToken(reason)),
        };

        let attendee = Attendee::find_by_id(&self.pool, payload.attendee_id)
            .await?
            .ok_or_else(|| Error::not_found("attendee"))?;

        if attendee.event_id != payload.event_id {
            return Err(Error::InvalidToken(
                "token does not match the attendee's event".to_string(),
            ));
        }

        if let (Some(code), Some(expected)) = (&payload.code, &attendee.verification_code) {
            if code != expected {
                return Err(Error::InvalidToken(
                    "token verification code does not match".to_string(),
                ));
            }
        }

        let result = self.check_in(attendee.id, actor).await?;
        Ok((result, payload))
    }

    /// Best-effort confirmation email. Failure is logged and never affects
    /// the check-in outcome.
    fn notify_check_in(&self, attendee: &Attendee) {
        let pool = self.pool.clone();
        let email = self.email.clone();
        let attendee = attendee.clone();

        tokio::spawn(async move {
            let event_title = match Event::find_by_id(&pool, attendee.event_id).await {
                Ok(Some(event)) => event.title,
                Ok(None) => "your event".to_string(),
                Err(e) => {
                    error!(
                        "Failed to load event {} for check-in notification: {}",
                        attendee.event_id, e
                    );
                    return;
                }
            };

            if let Err(e) = email
                .send_check_in_confirmation(&attendee.email, &attendee.name, &event_title)
                .await
            {
                error!(
                    "Failed to send check-in confirmation to attendee {}: {}",
                    attendee.id, e
                );
            }
        });
    }
}

use crate::error::Result;
use base64::engine::general_purpose;
use base64::Engine;
use chrono::{DateTime, Utc};
use qrcode::render::svg;
use qrcode::QrCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tokens older than this are rejected regardless of content validity.
pub const FRESHNESS_WINDOW_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Ticket,
    Checkin,
}

/// The ephemeral payload carried inside a QR code. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrPayload {
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub attendee_id: Uuid,
    pub event_id: Uuid,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Decode result. Expected-bad input is data, not an error: callers decide
/// whether "expired" and "malformed" map to different failures.
#[derive(Debug)]
pub enum DecodedToken {
    Valid(QrPayload),
    Expired { payload: QrPayload, age_secs: i64 },
    Invalid { reason: String },
}

#[derive(Debug, Serialize)]
pub struct EncodedTicket {
    pub token: String,
    pub payload: QrPayload,
    /// Base64-encoded SVG, ready for an `<img>` data URI.
    pub image_svg: String,
}

pub fn encode(
    attendee_id: Uuid,
    event_id: Uuid,
    verification_code: Option<String>,
) -> Result<EncodedTicket> {
    let payload = QrPayload {
        kind: TokenKind::Ticket,
        attendee_id,
        event_id,
        timestamp: Utc::now().timestamp(),
        code: verification_code,
    };

    let json = serde_json::to_string(&payload)
        .map_err(|e| crate::Error::Internal(format!("failed to serialize QR payload: {}", e)))?;
    let token = general_purpose::STANDARD.encode(&json);
    let image_svg = render_svg(&token)?;

    Ok(EncodedTicket {
        token,
        payload,
        image_svg,
    })
}

pub fn decode(raw: &str) -> DecodedToken {
    decode_at(raw, Utc::now())
}

/// Decode against an explicit clock. Field presence is enforced by the
/// payload shape; age is checked against the freshness window.
pub fn decode_at(raw: &str, now: DateTime<Utc>) -> DecodedToken {
    let bytes = match general_purpose::STANDARD.decode(raw.trim()) {
        Ok(bytes) => bytes,
        Err(_) => {
            return DecodedToken::Invalid {
                reason: "token is not valid base64".to_string(),
            }
        }
    };

    let payload: QrPayload = match serde_json::from_slice(&bytes) {
        Ok(payload) => payload,
        Err(e) => {
            return DecodedToken::Invalid {
                reason: format!("token payload is malformed: {}", e),
            }
        }
    };

    if payload.timestamp <= 0 {
        return DecodedToken::Invalid {
            reason: "token timestamp is invalid".to_string(),
        };
    }

    let age_secs = now.timestamp() - payload.timestamp;
    if age_secs > FRESHNESS_WINDOW_SECS {
        return DecodedToken::Expired { payload, age_secs };
    }

    DecodedToken::Valid(payload)
}

/// Render arbitrary data as a base64-encoded SVG QR image.
pub fn render_svg(data: &str) -> Result<String> {
    let code = QrCode::new(data.as_bytes())
        .map_err(|e| crate::Error::Internal(format!("failed to build QR code: {}", e)))?;

    let svg_string = code
        .render()
        .min_dimensions(200, 200)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build();

    Ok(general_purpose::STANDARD.encode(svg_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn encode_then_decode_round_trips() {
        let attendee_id = Uuid::new_v4();
        let event_id = Uuid::new_v4();
        let ticket = encode(attendee_id, event_id, Some("A1B2C3".to_string())).unwrap();

        match decode(&ticket.token) {
            DecodedToken::Valid(payload) => {
                assert_eq!(payload.kind, TokenKind::Ticket);
                assert_eq!(payload.attendee_id, attendee_id);
                assert_eq!(payload.event_id, event_id);
                assert_eq!(payload.code.as_deref(), Some("A1B2C3"));
            }
            other => panic!("expected valid token, got {:?}", other),
        }
    }

    #[test]
    fn tokens_inside_the_freshness_window_are_valid() {
        let payload = QrPayload {
            kind: TokenKind::Ticket,
            attendee_id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            timestamp: Utc::now().timestamp(),
            code: None,
        };
        let token = general_purpose::STANDARD.encode(serde_json::to_string(&payload).unwrap());

        let now = Utc::now() + Duration::hours(23);
        assert!(matches!(decode_at(&token, now), DecodedToken::Valid(_)));
    }

    #[test]
    fn tokens_older_than_twenty_four_hours_expire() {
        let payload = QrPayload {
            kind: TokenKind::Ticket,
            attendee_id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            timestamp: Utc::now().timestamp(),
            code: None,
        };
        let token = general_purpose::STANDARD.encode(serde_json::to_string(&payload).unwrap());

        let now = Utc::now() + Duration::hours(25);
        match decode_at(&token, now) {
            DecodedToken::Expired { age_secs, .. } => {
                assert!(age_secs > FRESHNESS_WINDOW_SECS);
            }
            other => panic!("expected expired token, got {:?}", other),
        }
    }

    #[test]
    fn garbage_input_is_invalid_not_a_panic() {
        assert!(matches!(
            decode("not base64 at all!!"),
            DecodedToken::Invalid { .. }
        ));

        let not_json = general_purpose::STANDARD.encode("plain text");
        assert!(matches!(decode(&not_json), DecodedToken::Invalid { .. }));
    }

    #[test]
    fn missing_required_fields_are_invalid() {
        // no attendee_id
        let partial = serde_json::json!({
            "type": "ticket",
            "event_id": Uuid::new_v4(),
            "timestamp": Utc::now().timestamp(),
        });
        let token = general_purpose::STANDARD.encode(partial.to_string());
        assert!(matches!(decode(&token), DecodedToken::Invalid { .. }));

        // no timestamp
        let partial = serde_json::json!({
            "type": "checkin",
            "attendee_id": Uuid::new_v4(),
            "event_id": Uuid::new_v4(),
        });
        let token = general_purpose::STANDARD.encode(partial.to_string());
        assert!(matches!(decode(&token), DecodedToken::Invalid { .. }));
    }

    #[test]
    fn unknown_token_kind_is_invalid() {
        let payload = serde_json::json!({
            "type": "backstage-pass",
            "attendee_id": Uuid::new_v4(),
            "event_id": Uuid::new_v4(),
            "timestamp": Utc::now().timestamp(),
        });
        let token = general_purpose::STANDARD.encode(payload.to_string());
        assert!(matches!(decode(&token), DecodedToken::Invalid { .. }));
    }

    #[test]
    fn rendered_image_is_base64_svg() {
        let image = render_svg("gatepass-test").unwrap();
        let decoded = general_purpose::STANDARD.decode(image).unwrap();
        let svg = String::from_utf8(decoded).unwrap();
        assert!(svg.contains("<svg"));
    }
}

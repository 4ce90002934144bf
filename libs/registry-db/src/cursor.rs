//! Keyset pagination cursor.
//!
//! A cursor is the base64url-encoded JSON of the last row's ordering tuple:
//! `created_at` plus one string key per registered tie-breaker field. Field
//! names are validated against a hard whitelist on decode so a tampered token
//! can never steer the generated SQL.

use std::collections::BTreeMap;

use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::DbError;

/// Sort columns a cursor may reference. Anything else is rejected on decode.
pub const CURSOR_FIELDS: &[&str] = &["created_at", "id", "external_id", "region", "system_id"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageCursor {
    /// `created_at` of the last row on the previous page.
    pub created_at: DateTime<Utc>,
    /// Tie-breaker values of the last row, keyed by field name.
    pub keys: BTreeMap<String, String>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct Wire {
    v: u8,
    ts: String,
    k: BTreeMap<String, String>,
}

impl PageCursor {
    /// Encode to a base64url token (no padding).
    pub fn encode(&self) -> String {
        let wire = Wire {
            v: 1,
            ts: self.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
            k: self.keys.clone(),
        };
        // BTreeMap of strings cannot fail to serialize
        let json = serde_json::to_vec(&wire).unwrap_or_default();
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode and validate a token.
    ///
    /// # Errors
    /// Returns the matching `DbError::Cursor*` kind for bad base64, malformed
    /// JSON, an unsupported version, or a field outside [`CURSOR_FIELDS`].
    pub fn decode(token: &str) -> Result<Self, DbError> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| DbError::CursorInvalidBase64)?;
        let wire: Wire =
            serde_json::from_slice(&bytes).map_err(|_| DbError::CursorInvalidJson)?;
        if wire.v != 1 {
            return Err(DbError::CursorInvalidVersion);
        }
        let created_at = DateTime::parse_from_rfc3339(&wire.ts)
            .map_err(|_| DbError::CursorInvalidJson)?
            .with_timezone(&Utc);
        for field in wire.k.keys() {
            if !CURSOR_FIELDS.contains(&field.as_str()) {
                return Err(DbError::CursorFieldNotAllowed(field.clone()));
            }
        }
        Ok(Self {
            created_at,
            keys: wire.k,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> PageCursor {
        PageCursor {
            created_at: Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap(),
            keys: BTreeMap::from([
                ("id".to_owned(), "tenant-42".to_owned()),
                ("region".to_owned(), "eu-1".to_owned()),
            ]),
        }
    }

    #[test]
    fn round_trip_preserves_tuple() {
        let cursor = sample();
        let decoded = PageCursor::decode(&cursor.encode()).unwrap();
        assert_eq!(decoded, cursor);
    }

    #[test]
    fn rejects_bad_base64() {
        assert!(matches!(
            PageCursor::decode("not//valid=="),
            Err(DbError::CursorInvalidBase64)
        ));
    }

    #[test]
    fn rejects_malformed_json() {
        let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"{nope");
        assert!(matches!(
            PageCursor::decode(&token),
            Err(DbError::CursorInvalidJson)
        ));
    }

    #[test]
    fn rejects_unsupported_version() {
        let token = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(br#"{"v":2,"ts":"2026-03-14T09:26:53Z","k":{}}"#);
        assert!(matches!(
            PageCursor::decode(&token),
            Err(DbError::CursorInvalidVersion)
        ));
    }

    #[test]
    fn rejects_field_outside_whitelist() {
        let token = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(br#"{"v":1,"ts":"2026-03-14T09:26:53Z","k":{"password":"x"}}"#);
        assert!(matches!(
            PageCursor::decode(&token),
            Err(DbError::CursorFieldNotAllowed(f)) if f == "password"
        ));
    }

    #[test]
    fn tampered_token_fails() {
        let mut token = sample().encode();
        token.insert(4, '!');
        assert!(PageCursor::decode(&token).is_err());
    }
}

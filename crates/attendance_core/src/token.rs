//! crates/attendance_core/src/token.rs
//!
//! The scannable token is the session id as an opaque string. Expiry is never
//! read from the token; it is always checked against the stored session.

use uuid::Uuid;

use crate::error::{AttendanceError, AttendanceResult};

pub fn encode(session_id: Uuid) -> String {
    session_id.hyphenated().to_string()
}

pub fn decode(token: &str) -> AttendanceResult<Uuid> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return Err(AttendanceError::MalformedToken("empty token".to_string()));
    }
    Uuid::parse_str(trimmed).map_err(|e| AttendanceError::MalformedToken(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_what_it_encodes_and_tolerates_scanner_whitespace() {
        let id = Uuid::new_v4();
        assert_eq!(decode(&format!(" {}\n", encode(id))).unwrap(), id);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(decode(""), Err(AttendanceError::MalformedToken(_))));
        assert!(matches!(
            decode("https://example.com/qr"),
            Err(AttendanceError::MalformedToken(_))
        ));
    }
}

//! Trainee identification from bearer tokens.
//!
//! Token signatures are verified at the gateway before requests reach this
//! service, so only the payload claims are read here; nothing is validated
//! cryptographically.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

use crate::error::{ActionsError, Result};

/// The token claim carrying the trainee's ID.
const TRAINEE_ID_CLAIM: &str = "custom:tisId";

/// Extract the trainee ID from an Authorization header value.
pub fn trainee_id_from_token(header_value: &str) -> Result<String> {
    let token = header_value
        .strip_prefix("Bearer ")
        .unwrap_or(header_value)
        .trim();

    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| ActionsError::InvalidToken("token has no payload segment".into()))?;

    let decoded = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| ActionsError::InvalidToken(format!("payload is not base64: {e}")))?;

    let claims: serde_json::Value = serde_json::from_slice(&decoded)
        .map_err(|e| ActionsError::InvalidToken(format!("payload is not JSON: {e}")))?;

    claims
        .get(TRAINEE_ID_CLAIM)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| ActionsError::InvalidToken("token has no trainee id claim".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with_payload(payload: &serde_json::Value) -> String {
        let encoded = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("header.{encoded}.signature")
    }

    #[test]
    fn extracts_trainee_id_from_claim() {
        let token = token_with_payload(&serde_json::json!({"custom:tisId": "t-123"}));
        assert_eq!(trainee_id_from_token(&token).unwrap(), "t-123");
    }

    #[test]
    fn accepts_bearer_prefix() {
        let token = token_with_payload(&serde_json::json!({"custom:tisId": "t-123"}));
        let header = format!("Bearer {token}");
        assert_eq!(trainee_id_from_token(&header).unwrap(), "t-123");
    }

    #[test]
    fn rejects_token_without_claim() {
        let token = token_with_payload(&serde_json::json!({"sub": "someone"}));
        assert!(trainee_id_from_token(&token).is_err());
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert!(trainee_id_from_token("not-a-token").is_err());
        assert!(trainee_id_from_token("a.!!!not-base64!!!.c").is_err());
        assert!(trainee_id_from_token("").is_err());
    }
}

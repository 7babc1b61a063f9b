//! HMAC-SHA256 tokens for channel subscription authorization.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::apps::App;

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `data` under `secret`.
pub fn sign(secret: &str, data: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(data.as_bytes());
    hex_digest(&mac.finalize().into_bytes())
}

/// The auth token a client must present to subscribe: `"{key}:{signature}"`.
pub fn socket_auth_token(app: &App, canonical: &str) -> String {
    format!("{}:{}", app.key, sign(&app.secret, canonical))
}

/// Canonical string signed for a private or encrypted-private subscription.
pub fn private_canonical(socket_id: &str, channel: &str) -> String {
    format!("{socket_id}:{channel}")
}

/// Canonical string signed for a presence subscription. `channel_data` must be
/// the raw JSON string as received; re-serializing it is not byte-stable and
/// would break verification.
pub fn presence_canonical(socket_id: &str, channel: &str, channel_data: &str) -> String {
    format!("{socket_id}:{channel}:{channel_data}")
}

/// Verify a client-supplied token against the expected one for `canonical`.
/// A failure is an authorization refusal, never an error.
pub fn verify(app: &App, canonical: &str, candidate: &str) -> bool {
    socket_auth_token(app, canonical) == candidate
}

pub fn hex_digest(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_app() -> App {
        serde_json::from_str(r#"{ "id": "a1", "key": "k1", "secret": "s3cr3t" }"#).unwrap()
    }

    #[test]
    fn sign_is_deterministic_hex() {
        let a = sign("secret", "123.456:private-room");
        let b = sign("secret", "123.456:private-room");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn token_round_trips() {
        let app = test_app();
        let canonical = private_canonical("11.22", "private-room");
        let token = socket_auth_token(&app, &canonical);
        assert!(verify(&app, &canonical, &token));
    }

    #[test]
    fn any_canonical_mutation_fails_verification() {
        let app = test_app();
        let canonical = presence_canonical("11.22", "presence-room", r#"{"user_id":1}"#);
        let token = socket_auth_token(&app, &canonical);

        assert!(!verify(
            &app,
            &presence_canonical("11.23", "presence-room", r#"{"user_id":1}"#),
            &token
        ));
        assert!(!verify(
            &app,
            &presence_canonical("11.22", "presence-other", r#"{"user_id":1}"#),
            &token
        ));
        assert!(!verify(
            &app,
            &presence_canonical("11.22", "presence-room", r#"{"user_id":2}"#),
            &token
        ));
    }

    #[test]
    fn reserialized_channel_data_does_not_verify() {
        let app = test_app();
        // Same JSON value, different byte layout.
        let sent = r#"{"user_id": 1, "user_data": {}}"#;
        let reserialized = r#"{"user_id":1,"user_data":{}}"#;

        let token = socket_auth_token(&app, &presence_canonical("1.2", "presence-x", sent));
        assert!(!verify(
            &app,
            &presence_canonical("1.2", "presence-x", reserialized),
            &token
        ));
    }

    #[test]
    fn token_carries_the_app_key_prefix() {
        let app = test_app();
        let token = socket_auth_token(&app, "1.2:private-room");
        assert!(token.starts_with("k1:"));
    }
}

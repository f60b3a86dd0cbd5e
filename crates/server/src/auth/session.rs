use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub ttl_seconds: i64,
}

/// Signs a session token binding `username` to an expiry: `username.expiry.hmac_hex`.
/// A minimal analogue of the reference system's Django session cookie, sized
/// for this surface rather than a general web-auth framework (§6 "Auth scope").
pub fn sign_session(config: &SessionConfig, username: &str) -> String {
    let expiry = Utc::now().timestamp() + config.ttl_seconds;
    let payload = format!("{username}.{expiry}");
    let tag = hex::encode(mac_for(config, &payload));
    format!("{payload}.{tag}")
}

/// Validates a session token's signature and expiry, returning the username if valid.
pub fn verify_session(config: &SessionConfig, token: &str) -> Option<String> {
    let mut parts = token.rsplitn(2, '.');
    let tag_hex = parts.next()?;
    let payload = parts.next()?;

    let expected = hex::encode(mac_for(config, payload));
    if expected != tag_hex {
        return None;
    }

    let (username, expiry) = payload.rsplit_once('.')?;
    let expiry: i64 = expiry.parse().ok()?;
    if expiry < Utc::now().timestamp() {
        return None;
    }

    Some(username.to_owned())
}

fn mac_for(config: &SessionConfig, payload: &str) -> Vec<u8> {
    let mut mac =
        HmacSha256::new_from_slice(config.secret.as_bytes()).expect("HMAC accepts a key of any length");
    mac.update(payload.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SessionConfig {
        SessionConfig {
            secret: "test-secret".into(),
            ttl_seconds: 3600,
        }
    }

    #[test]
    fn round_trips_a_valid_session() {
        let token = sign_session(&config(), "alice");
        assert_eq!(verify_session(&config(), &token).as_deref(), Some("alice"));
    }

    #[test]
    fn rejects_tampered_payload() {
        let mut token = sign_session(&config(), "alice");
        token = token.replacen("alice", "mallory", 1);
        assert!(verify_session(&config(), &token).is_none());
    }

    #[test]
    fn rejects_expired_session() {
        let expired = SessionConfig {
            secret: "test-secret".into(),
            ttl_seconds: -1,
        };
        let token = sign_session(&expired, "alice");
        assert!(verify_session(&expired, &token).is_none());
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = sign_session(&config(), "alice");
        let other = SessionConfig {
            secret: "other-secret".into(),
            ttl_seconds: 3600,
        };
        assert!(verify_session(&other, &token).is_none());
    }
}

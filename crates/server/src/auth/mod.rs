pub mod middleware;
mod session;

pub use middleware::{require_session, AuthenticatedUser, SESSION_COOKIE};
pub use session::{sign_session, verify_session, SessionConfig};

use argon2::password_hash::PasswordHash;
use argon2::{Argon2, PasswordVerifier};

/// Verifies `candidate` against a stored argon2 hash string.
///
/// Grounded on the teacher's `auth/password.rs` — same crate, same
/// `PasswordHash::new` + `Argon2::default().verify_password` shape.
pub fn verify_password(hash: &str, candidate: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default().verify_password(candidate.as_bytes(), &parsed).is_ok()
}

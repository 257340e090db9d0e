use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{self, DbPool};
use crate::error::AppError;
use crate::AppState;

pub const SESSION_COOKIE: &str = "session";

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b"$");
    hasher.update(password.as_bytes());
    to_hex(&hasher.finalize())
}

/// `salt$digest`, both hex.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = to_hex(&salt);
    let hash = digest(&salt, password);
    format!("{}${}", salt, hash)
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, hash)) => digest(salt, password) == hash,
        None => false,
    }
}

/// In-memory session table: token → username. Sessions end with the process.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, String>>,
}

impl SessionStore {
    pub fn create(&self, username: &str) -> String {
        let token = Uuid::new_v4().to_string();
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.clone(), username.to_string());
        token
    }

    pub fn lookup(&self, token: &str) -> Option<String> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .cloned()
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token)
            .is_some()
    }
}

/// Session token from the `session` cookie or an `Authorization: Bearer` header.
pub fn session_token(req: &HttpRequest) -> Option<String> {
    if let Some(cookie) = req.cookie(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }
    let header = req.headers().get("Authorization")?.to_str().ok()?;
    header
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Handler argument that rejects requests without a live session.
/// When authentication is disabled every request passes as `anonymous`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub username: String,
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let Some(state) = req.app_data::<web::Data<AppState>>() else {
            return ready(Err(AppError::Unauthorized));
        };
        if !state.auth_enabled {
            return ready(Ok(AuthUser {
                username: "anonymous".to_string(),
            }));
        }
        let user = session_token(req)
            .and_then(|token| state.sessions.lookup(&token))
            .map(|username| AuthUser { username });
        ready(user.ok_or(AppError::Unauthorized))
    }
}

/// Creates the configured admin account when the users table is empty.
pub fn seed_admin(pool: &DbPool, username: &str, password: Option<&str>) -> Result<(), AppError> {
    let conn = &mut pool.get()?;
    if db::count_users(conn)? > 0 {
        return Ok(());
    }
    match password.filter(|p| !p.is_empty()) {
        Some(password) => {
            db::create_user(
                conn,
                &db::NewUser {
                    username: username.to_string(),
                    password_hash: hash_password(password),
                },
            )?;
            info!(%username, "created initial admin account");
        }
        None => warn!("no users exist and auth.admin_password is unset; nobody can log in"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_verifies_and_is_salted() {
        let a = hash_password("hunter2");
        let b = hash_password("hunter2");
        assert_ne!(a, b);
        assert!(verify_password("hunter2", &a));
        assert!(verify_password("hunter2", &b));
        assert!(!verify_password("hunter3", &a));
        assert!(!verify_password("hunter2", "no-separator"));
    }

    #[test]
    fn sessions_can_be_revoked() {
        let store = SessionStore::default();
        let token = store.create("clerk");
        assert_eq!(store.lookup(&token).as_deref(), Some("clerk"));
        assert!(store.revoke(&token));
        assert!(store.lookup(&token).is_none());
        assert!(!store.revoke(&token));
    }
}

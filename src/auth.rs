//! Password hashing, signed session cookies and the login guard.
//!
//! The session cookie carries a random token signed with a key derived from
//! the configured secret. The token maps to a row in `sessions`, so logging
//! out invalidates it server-side.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use cookie::{Cookie, CookieJar, Key, SameSite};
use rand::RngCore;
use sha2::{Digest, Sha512};

use crate::error::AppError;
use crate::models::User;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "session";

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("failed to hash password: {e}"))
}

/// A stored hash that does not parse is treated as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "stored password hash is malformed");
            false
        }
    }
}

pub fn signing_key(secret: &str) -> Key {
    let digest = Sha512::digest(secret.as_bytes());
    Key::from(digest.as_slice())
}

pub fn new_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn session_cookie(key: &Key, token: &str) -> Cookie<'static> {
    let mut jar = CookieJar::new();
    jar.signed_mut(key).add(
        Cookie::build((SESSION_COOKIE, token.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax),
    );

    jar.get(SESSION_COOKIE)
        .cloned()
        .unwrap_or_else(|| Cookie::new(SESSION_COOKIE, ""))
}

pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, "");
    cookie.set_path("/");
    cookie.make_removal();
    cookie
}

/// Returns the verified session token from the request's cookies, if any.
pub fn session_token(headers: &HeaderMap, key: &Key) -> Option<String> {
    let mut jar = CookieJar::new();
    for value in headers.get_all(COOKIE) {
        let Ok(value) = value.to_str() else {
            continue;
        };
        for cookie in Cookie::split_parse(value).flatten() {
            jar.add_original(cookie.into_owned());
        }
    }

    jar.signed(key)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

pub fn set_cookie(mut response: Response, cookie: &Cookie<'_>) -> Result<Response, AppError> {
    let value = HeaderValue::from_str(&cookie.to_string()).map_err(anyhow::Error::from)?;
    response.headers_mut().append(SET_COOKIE, value);
    Ok(response)
}

/// Who is making the current request. Resolved once per request by
/// [`resolve_session`] and read by handlers as an extension.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub user: Option<User>,
    pub token: Option<String>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// The logged-in user on routes behind [`require_login`].
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

pub async fn resolve_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let mut session = Session::default();

    if let Some(token) = session_token(request.headers(), &state.key) {
        match state.db.find_session_user(&token).await? {
            Some(user) => {
                session.user = Some(user);
                session.token = Some(token);
            }
            None => tracing::debug!("session cookie refers to no session"),
        }
    }

    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

pub async fn require_login(mut request: Request, next: Next) -> Result<Response, AppError> {
    let user = request
        .extensions()
        .get::<Session>()
        .and_then(|session| session.user.clone())
        .ok_or(AppError::Unauthenticated)?;

    request.extensions_mut().insert(AuthUser(user));
    Ok(next.run(request).await)
}

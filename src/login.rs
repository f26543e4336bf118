use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::{AppError, AppJson, AppResult, ErrorResponse};
use crate::mailer::{generate_reset_code, password_reset_email};

const ADMIN_FILE: &str = "admin.json";
const SESSION_COOKIE: &str = "session";
const RESET_CODE_TTL: Duration = Duration::from_secs(3600);
const MIN_PASSWORD_LEN: usize = 8;

/// The single administrator account
///
/// Persisted to `<data_dir>/admin.json`; only the Argon2 hash of the password
/// is stored.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AdminAccount {
    /// Login name
    pub username: String,

    /// Address password reset codes are sent to
    #[serde(default)]
    pub email: Option<String>,

    /// Argon2 hash of the password
    pub password_hash: String,

    /// Password reset code (if a reset has been requested)
    #[serde(default)]
    pub reset_code: Option<String>,

    /// Expiration time for the reset code
    #[serde(default)]
    pub reset_code_expires: Option<SystemTime>,
}

/// Credentials posted to the login route
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetConfirm {
    pub email: String,
    #[serde(alias = "reset_code")]
    pub reset_code: String,
    #[serde(alias = "new_password")]
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChangeRequest {
    #[serde(alias = "old_password")]
    pub old_password: String,
    #[serde(alias = "new_password")]
    pub new_password: String,
    #[serde(alias = "confirm_password")]
    pub confirm_password: String,
}

/// An authenticated admin session
#[derive(Debug, Clone)]
pub struct Session {
    /// Username of the authenticated admin
    pub user_id: String,

    /// Time when the session expires
    pub expires_at: SystemTime,
}

/// Authenticated admin username, inserted into request extensions
#[derive(Debug, Clone)]
pub struct AdminUser(pub String);

/// Admin account and session bookkeeping
pub struct AuthService {
    path: PathBuf,
    account: RwLock<Option<AdminAccount>>,
    sessions: RwLock<HashMap<String, Session>>,
    session_ttl: Duration,
}

impl AuthService {
    /// Load the admin account, creating it from the bootstrap credentials
    /// when none has been stored yet.
    pub fn init(
        data_dir: &Path,
        username: &str,
        bootstrap_password: Option<&str>,
        email: Option<&str>,
        session_ttl: Duration,
    ) -> AppResult<Self> {
        let path = data_dir.join(ADMIN_FILE);

        let account = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let mut account: AdminAccount = serde_json::from_str(&contents)?;
            if account.email.is_none() {
                account.email = email.map(str::to_string);
            }
            Some(account)
        } else if let Some(password) = bootstrap_password {
            let account = AdminAccount {
                username: username.to_string(),
                email: email.map(str::to_string),
                password_hash: hash_password(password)?,
                reset_code: None,
                reset_code_expires: None,
            };
            save_account(&path, &account)?;
            info!("Created admin account '{}'", username);
            Some(account)
        } else {
            warn!("No admin account and ADMIN_PASSWORD unset, admin routes are disabled");
            None
        };

        Ok(Self {
            path,
            account: RwLock::new(account),
            sessions: RwLock::new(HashMap::new()),
            session_ttl,
        })
    }

    pub fn has_account(&self) -> bool {
        self.read_account().is_some()
    }

    /// Verify credentials and open a session
    pub fn login(&self, username: &str, password: &str) -> AppResult<LoginResponse> {
        let account = self
            .read_account()
            .ok_or_else(|| AppError::Unauthorized("Admin account is not configured".into()))?;

        if account.username != username || !verify_password(password, &account.password_hash)? {
            return Err(AppError::Unauthorized("Invalid username or password".into()));
        }

        let (token, expires_at) = self.create_session(username);
        Ok(LoginResponse {
            token,
            username: username.to_string(),
            expires_at: DateTime::<Utc>::from(expires_at),
        })
    }

    fn create_session(&self, username: &str) -> (String, SystemTime) {
        let session_id = Uuid::new_v4().to_string();
        let expires_at = SystemTime::now() + self.session_ttl;

        let session = Session {
            user_id: username.to_string(),
            expires_at,
        };

        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let now = SystemTime::now();
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(session_id.clone(), session);

        (session_id, expires_at)
    }

    /// Username for the session if valid, None otherwise
    pub fn validate_session(&self, session_id: &str) -> Option<String> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());

        if let Some(session) = sessions.get(session_id) {
            if session.expires_at > SystemTime::now() {
                return Some(session.user_id.clone());
            }
        }

        None
    }

    pub fn logout(&self, session_id: &str) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session_id)
            .is_some()
    }

    pub fn active_sessions(&self) -> usize {
        let now = SystemTime::now();
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|s| s.expires_at > now)
            .count()
    }

    pub fn change_password(
        &self,
        username: &str,
        old_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> AppResult<()> {
        if new_password != confirm_password {
            return Err(AppError::BadRequest("New passwords don't match".into()));
        }
        check_password_strength(new_password)?;

        let mut guard = self.account.write().unwrap_or_else(|e| e.into_inner());
        let account = guard
            .as_mut()
            .filter(|a| a.username == username)
            .ok_or_else(|| AppError::not_found("User"))?;

        if !verify_password(old_password, &account.password_hash)? {
            return Err(AppError::BadRequest("Invalid old password".into()));
        }

        let mut updated = account.clone();
        updated.password_hash = hash_password(new_password)?;
        save_account(&self.path, &updated)?;
        *account = updated;
        Ok(())
    }

    /// Issue a reset code when `email` belongs to the admin.
    ///
    /// Returns the code so the caller can deliver it; `None` when the address
    /// does not match.
    pub fn request_reset(&self, email: &str) -> AppResult<Option<String>> {
        let mut guard = self.account.write().unwrap_or_else(|e| e.into_inner());
        let Some(account) = guard
            .as_mut()
            .filter(|a| a.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(email)))
        else {
            return Ok(None);
        };

        let reset_code = generate_reset_code();
        let mut updated = account.clone();
        updated.reset_code = Some(reset_code.clone());
        updated.reset_code_expires = Some(SystemTime::now() + RESET_CODE_TTL);
        save_account(&self.path, &updated)?;
        *account = updated;

        Ok(Some(reset_code))
    }

    /// Set a new password using an emailed reset code; ends every session
    pub fn reset_password(&self, email: &str, code: &str, new_password: &str) -> AppResult<()> {
        check_password_strength(new_password)?;

        let mut guard = self.account.write().unwrap_or_else(|e| e.into_inner());
        let account = guard
            .as_mut()
            .filter(|a| a.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(email)))
            .ok_or_else(|| AppError::BadRequest("Invalid reset code".into()))?;

        match (&account.reset_code, account.reset_code_expires) {
            (Some(_), Some(expires)) if SystemTime::now() > expires => {
                return Err(AppError::BadRequest("Reset code expired".into()));
            }
            (Some(stored), Some(_)) if stored == code => {}
            (Some(_), Some(_)) => return Err(AppError::BadRequest("Invalid reset code".into())),
            _ => return Err(AppError::BadRequest("No reset code found".into())),
        }

        let mut updated = account.clone();
        updated.password_hash = hash_password(new_password)?;
        updated.reset_code = None;
        updated.reset_code_expires = None;
        save_account(&self.path, &updated)?;
        *account = updated;
        drop(guard);

        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        Ok(())
    }

    fn read_account(&self) -> Option<AdminAccount> {
        self.account
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

fn save_account(path: &Path, account: &AdminAccount) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(account)?;
    fs::write(path, json)?;
    Ok(())
}

fn check_password_strength(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id with a random salt
fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    match argon2.hash_password(password.as_bytes(), &salt) {
        Ok(hash) => Ok(hash.to_string()),
        Err(_) => Err(AppError::Internal("Password hashing failed".into())),
    }
}

/// Check a plaintext password against a stored Argon2 hash
fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(hash) => hash,
        Err(_) => return Err(AppError::Internal("Invalid password hash format".into())),
    };

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false), // Password didn't match
    }
}

/// Token from `Authorization: Bearer <token>`, a bare `Authorization`
/// header, or the session cookie
fn request_token(request: &Request, jar: &CookieJar) -> Option<String> {
    let header_token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(|h| h.strip_prefix("Bearer ").unwrap_or(h).trim().to_string())
        .filter(|t| !t.is_empty());

    header_token.or_else(|| jar.get(SESSION_COOKIE).map(|c| c.value().to_string()))
}

// Web handler functions below

/// Authentication middleware for admin routes
pub async fn require_admin(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = request_token(&request, &jar) {
        if let Some(username) = state.auth.validate_session(&token) {
            request.extensions_mut().insert(AdminUser(username));
            return next.run(request).await;
        }
    }

    (
        axum::http::StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::unauthorized()),
    )
        .into_response()
}

/// Log in and receive a bearer token; the token is also set as a cookie
pub async fn handle_login(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(credentials): AppJson<LoginRequest>,
) -> AppResult<(CookieJar, Json<LoginResponse>)> {
    let response = state
        .auth
        .login(credentials.username.trim(), &credentials.password)
        .inspect_err(|_| warn!("Failed admin login for '{}'", credentials.username))?;
    info!("Admin '{}' logged in", response.username);

    let cookie = Cookie::build((SESSION_COOKIE, response.token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    Ok((jar.add(cookie), Json(response)))
}

pub async fn handle_logout(
    State(state): State<AppState>,
    jar: CookieJar,
    request: Request,
) -> (CookieJar, Json<serde_json::Value>) {
    if let Some(token) = request_token(&request, &jar) {
        state.auth.logout(&token);
    }

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/").build());
    (jar, Json(serde_json::json!({ "success": true })))
}

/// Confirms the token is valid; reached only through `require_admin`
pub async fn handle_verify(
    axum::Extension(AdminUser(username)): axum::Extension<AdminUser>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "valid": true, "username": username }))
}

pub async fn handle_change_password(
    State(state): State<AppState>,
    axum::Extension(AdminUser(username)): axum::Extension<AdminUser>,
    AppJson(change_req): AppJson<PasswordChangeRequest>,
) -> AppResult<Json<serde_json::Value>> {
    state.auth.change_password(
        &username,
        &change_req.old_password,
        &change_req.new_password,
        &change_req.confirm_password,
    )?;
    info!("Admin '{}' changed password", username);
    Ok(Json(serde_json::json!({ "success": true, "message": "Password changed successfully" })))
}

/// Email a reset code; the response never reveals whether the address matched
pub async fn handle_forgot_password(
    State(state): State<AppState>,
    AppJson(reset_req): AppJson<PasswordResetRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let email = reset_req.email.trim();
    if let Some(code) = state.auth.request_reset(email)? {
        if let Err(e) = state
            .notifications
            .notifier()
            .send(password_reset_email(email, &code))
            .await
        {
            error!("Failed to send password reset email: {}", e);
        }
    } else {
        warn!("Password reset requested for unknown address");
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "If the address matches the admin account, a reset code has been sent"
    })))
}

pub async fn handle_reset_password(
    State(state): State<AppState>,
    AppJson(reset_confirm): AppJson<PasswordResetConfirm>,
) -> AppResult<Json<serde_json::Value>> {
    state.auth.reset_password(
        reset_confirm.email.trim(),
        reset_confirm.reset_code.trim(),
        &reset_confirm.new_password,
    )?;
    info!("Admin password reset via email code");
    Ok(Json(serde_json::json!({ "success": true, "message": "Password reset successful" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> AuthService {
        AuthService::init(
            dir.path(),
            "admin",
            Some("correct horse"),
            Some("owner@example.com"),
            Duration::from_secs(3600),
        )
        .unwrap()
    }

    #[test]
    fn test_login_and_sessions() {
        let dir = TempDir::new().unwrap();
        let auth = service(&dir);

        assert!(matches!(
            auth.login("admin", "wrong"),
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            auth.login("root", "correct horse"),
            Err(AppError::Unauthorized(_))
        ));

        let session = auth.login("admin", "correct horse").unwrap();
        assert_eq!(auth.validate_session(&session.token).as_deref(), Some("admin"));
        assert_eq!(auth.active_sessions(), 1);

        assert!(auth.logout(&session.token));
        assert!(auth.validate_session(&session.token).is_none());
    }

    #[test]
    fn test_account_persists_without_bootstrap() {
        let dir = TempDir::new().unwrap();
        drop(service(&dir));

        let stored = fs::read_to_string(dir.path().join(ADMIN_FILE)).unwrap();
        assert!(!stored.contains("correct horse"));

        let reloaded =
            AuthService::init(dir.path(), "admin", None, None, Duration::from_secs(60)).unwrap();
        assert!(reloaded.login("admin", "correct horse").is_ok());
    }

    #[test]
    fn test_no_account() {
        let dir = TempDir::new().unwrap();
        let auth =
            AuthService::init(dir.path(), "admin", None, None, Duration::from_secs(60)).unwrap();
        assert!(!auth.has_account());
        assert!(auth.login("admin", "anything").is_err());
    }

    #[test]
    fn test_expired_session_rejected() {
        let dir = TempDir::new().unwrap();
        let auth = AuthService::init(
            dir.path(),
            "admin",
            Some("correct horse"),
            None,
            Duration::ZERO,
        )
        .unwrap();
        let session = auth.login("admin", "correct horse").unwrap();
        assert!(auth.validate_session(&session.token).is_none());
    }

    #[test]
    fn test_change_password() {
        let dir = TempDir::new().unwrap();
        let auth = service(&dir);

        assert!(auth
            .change_password("admin", "correct horse", "battery staple", "different")
            .is_err());
        assert!(auth.change_password("admin", "correct horse", "short", "short").is_err());
        assert!(auth
            .change_password("admin", "wrong", "battery staple", "battery staple")
            .is_err());

        auth.change_password("admin", "correct horse", "battery staple", "battery staple")
            .unwrap();
        assert!(auth.login("admin", "battery staple").is_ok());
        assert!(auth.login("admin", "correct horse").is_err());
    }

    #[test]
    fn test_reset_flow() {
        let dir = TempDir::new().unwrap();
        let auth = service(&dir);
        let session = auth.login("admin", "correct horse").unwrap();

        assert!(auth.request_reset("someone@else.com").unwrap().is_none());
        assert!(matches!(
            auth.reset_password("owner@example.com", "ABCDEFGH", "new password"),
            Err(AppError::BadRequest(_))
        ));

        let code = auth.request_reset("Owner@Example.com").unwrap().unwrap();
        assert!(auth
            .reset_password("owner@example.com", "WRONG123", "new password")
            .is_err());
        auth.reset_password("owner@example.com", &code, "new password")
            .unwrap();

        // Sessions are revoked and the code is single use
        assert!(auth.validate_session(&session.token).is_none());
        assert!(auth.login("admin", "new password").is_ok());
        assert!(auth
            .reset_password("owner@example.com", &code, "another password")
            .is_err());
    }
}

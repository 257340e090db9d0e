use actix_web::cookie::{Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use tracing::{info, warn};

use crate::auth::{hash_password, session_token, verify_password, AuthUser, SESSION_COOKIE};
use crate::db::{self, NewUser};
use crate::error::AppError;
use crate::models::Credentials;
use crate::AppState;

pub async fn login_status(req: HttpRequest, data: web::Data<AppState>) -> HttpResponse {
    let username = session_token(&req).and_then(|token| data.sessions.lookup(&token));
    HttpResponse::Ok().json(json!({
        "authenticated": !data.auth_enabled || username.is_some(),
        "username": username,
    }))
}

pub async fn login(
    data: web::Data<AppState>,
    req: web::Json<Credentials>,
) -> Result<HttpResponse, AppError> {
    let conn = &mut data.pool.get()?;
    let user = db::find_user_by_username(conn, req.username.trim())?
        .filter(|user| verify_password(&req.password, &user.password_hash));
    let Some(user) = user else {
        warn!(username = %req.username, "failed login");
        return Err(AppError::Unauthorized);
    };

    let token = data.sessions.create(&user.username);
    let cookie = Cookie::build(SESSION_COOKIE, token.clone())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish();
    info!(username = %user.username, "logged in");
    Ok(HttpResponse::Ok()
        .cookie(cookie)
        .json(json!({ "success": true, "token": token, "username": user.username })))
}

pub async fn logout(req: HttpRequest, data: web::Data<AppState>) -> HttpResponse {
    if let Some(token) = session_token(&req) {
        data.sessions.revoke(&token);
    }
    let mut cookie = Cookie::build(SESSION_COOKIE, "").path("/").finish();
    cookie.make_removal();
    HttpResponse::Ok().cookie(cookie).json(json!({ "success": true }))
}

pub async fn register(
    user: AuthUser,
    data: web::Data<AppState>,
    req: web::Json<Credentials>,
) -> Result<HttpResponse, AppError> {
    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(AppError::Validation("Username and password are required".to_string()));
    }
    let conn = &mut data.pool.get()?;
    if db::find_user_by_username(conn, username)?.is_some() {
        return Err(AppError::Validation("Username already exists".to_string()));
    }
    db::create_user(
        conn,
        &NewUser {
            username: username.to_string(),
            password_hash: hash_password(&req.password),
        },
    )?;
    info!(%username, created_by = %user.username, "user registered");
    Ok(HttpResponse::Created().json(json!({ "success": true, "username": username })))
}

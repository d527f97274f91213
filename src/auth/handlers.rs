use axum::{
    extract::{FromRef, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use lazy_static::lazy_static;
use regex::Regex;
use time::Duration as TimeDuration;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, PublicUser, SigninRequest, SignupRequest},
        jwt::{CurrentUser, JwtKeys},
        password::{hash_password, verify_password},
        repo::User,
    },
    error::AppError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/signin", post(signin))
        .route("/auth/signout", post(signout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(me))
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Signup input rules, separated from the handler so they stay testable
/// without a database.
fn validate_signup(req: &SignupRequest) -> Result<(), AppError> {
    if req.email.trim().is_empty()
        || req.first_name.trim().is_empty()
        || req.last_name.trim().is_empty()
        || req.password.is_empty()
        || req.confirm_password.is_empty()
    {
        return Err(AppError::validation("all fields are required"));
    }
    if req.password != req.confirm_password {
        return Err(AppError::validation("passwords do not match"));
    }
    if req.password.len() < 6 {
        return Err(AppError::validation(
            "password must be at least 6 characters",
        ));
    }
    if !is_valid_email(req.email.trim()) {
        return Err(AppError::validation("invalid email address"));
    }
    Ok(())
}

/// The session cookie mirrors the token: http-only, same-site, Secure in
/// production, max-age equal to the token validity window.
fn session_cookie(token: &str, max_age: TimeDuration, secure: bool) -> Cookie<'static> {
    Cookie::build(("token", token.to_owned()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .build()
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(mut payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    payload.email = payload.email.trim().to_lowercase();
    validate_signup(&payload)?;

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "signup with taken email");
        return Err(AppError::conflict("email already registered"));
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create(
        &state.db,
        &payload.email,
        payload.first_name.trim(),
        payload.last_name.trim(),
        &hash,
    )
    .await?;

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id, &user.email, user.role())?;

    info!(user_id = %user.id, email = %user.email, "user signed up");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: PublicUser::from(user),
            token,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn signin(
    State(state): State<AppState>,
    Json(mut payload): Json<SigninRequest>,
) -> Result<(HeaderMap, Json<AuthResponse>), AppError> {
    payload.email = payload.email.trim().to_lowercase();

    let user = User::find_active_by_email(&state.db, &payload.email)
        .await?
        .ok_or_else(|| {
            warn!(email = %payload.email, "signin for unknown or inactive user");
            AppError::not_found("user not found")
        })?;

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "signin with invalid password");
        return Err(AppError::Unauthenticated("invalid credentials".into()));
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id, &user.email, user.role())?;

    let max_age = TimeDuration::seconds(keys.ttl.as_secs() as i64);
    let cookie = session_cookie(&token, max_age, state.config.is_production());
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie.to_string())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("cookie header: {e}")))?,
    );

    info!(user_id = %user.id, email = %user.email, "user signed in");
    Ok((
        headers,
        Json(AuthResponse {
            user: PublicUser::from(user),
            token,
        }),
    ))
}

#[instrument]
pub async fn signout() -> Result<(HeaderMap, Json<serde_json::Value>), AppError> {
    let cookie = Cookie::build(("token", ""))
        .http_only(true)
        .path("/")
        .max_age(TimeDuration::ZERO)
        .build();
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie.to_string())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("cookie header: {e}")))?,
    );
    Ok((
        headers,
        Json(serde_json::json!({ "success": true, "message": "signed out" })),
    ))
}

#[instrument(skip(state, claims))]
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> Result<Json<PublicUser>, AppError> {
    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;
    Ok(Json(PublicUser::from(user)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(email: &str, password: &str, confirm: &str) -> SignupRequest {
        SignupRequest {
            email: email.into(),
            first_name: "Asha".into(),
            last_name: "Rao".into(),
            password: password.into(),
            confirm_password: confirm.into(),
        }
    }

    #[test]
    fn rejects_missing_fields() {
        let mut r = req("a@b.cd", "secret1", "secret1");
        r.first_name = "  ".into();
        assert!(matches!(
            validate_signup(&r),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn rejects_password_mismatch() {
        let err = validate_signup(&req("a@b.cd", "secret1", "secret2")).unwrap_err();
        assert_eq!(err.to_string(), "passwords do not match");
    }

    #[test]
    fn rejects_five_char_password() {
        let err = validate_signup(&req("a@b.cd", "abc12", "abc12")).unwrap_err();
        assert!(err.to_string().contains("at least 6"));
    }

    #[test]
    fn accepts_six_char_password() {
        assert!(validate_signup(&req("a@b.cd", "abc123", "abc123")).is_ok());
    }

    #[test]
    fn rejects_malformed_email() {
        for bad in ["plainaddress", "no@tld", "white space@x.io", "@missing.local"] {
            assert!(validate_signup(&req(bad, "secret1", "secret1")).is_err(), "{bad}");
        }
        assert!(validate_signup(&req("ok@example.co.uk", "secret1", "secret1")).is_ok());
    }

    #[test]
    fn session_cookie_is_http_only_and_scoped() {
        let cookie = session_cookie("tok123", TimeDuration::days(7), true);
        assert_eq!(cookie.name(), "token");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(TimeDuration::days(7)));
    }

    #[test]
    fn dev_cookie_is_not_secure() {
        let cookie = session_cookie("tok123", TimeDuration::days(7), false);
        assert_eq!(cookie.secure(), Some(false));
    }
}

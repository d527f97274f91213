use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::claims::{Claims, UserRole};
use crate::config::JwtConfig;
use crate::error::AppError;
use crate::state::AppState;

/// Signing and verification keys plus the fixed validity window.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl JwtKeys {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            ttl: Duration::from_secs((config.ttl_days.max(0) as u64) * 24 * 60 * 60),
        }
    }

    /// Issue a session token bound to the user's identity claim.
    pub fn sign(&self, user_id: Uuid, email: &str, role: UserRole) -> Result<String, AppError> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            role,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("jwt encode: {e}")))?;
        debug!(user_id = %user_id, "session token signed");
        Ok(token)
    }

    /// Decode and check signature, issuer, audience and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AppError::TokenExpired,
                _ => AppError::TokenInvalid,
            }
        })?;
        debug!(user_id = %data.claims.sub, "session token verified");
        Ok(data.claims)
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::new(&state.config.jwt)
    }
}

/// Resolves the current user from an `Authorization: Bearer <token>` header.
/// Missing or malformed headers fail before any decode is attempted.
pub struct CurrentUser(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthenticated("missing Authorization header".into()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthenticated("invalid auth scheme".into()))?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token).map_err(|e| {
            warn!("token rejected");
            e
        })?;

        Ok(CurrentUser(claims))
    }
}

/// Like [`CurrentUser`], but the claim must carry a staff or admin role.
pub struct Staff(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for Staff
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(claims) = CurrentUser::from_request_parts(parts, state).await?;
        if !claims.role.is_staff() {
            return Err(AppError::Forbidden("staff access required".into()));
        }
        Ok(Staff(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys(secret: &str, ttl_days: i64) -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: secret.into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_days,
        })
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let keys = make_keys("dev-secret", 7);
        let user_id = Uuid::new_v4();
        let token = keys
            .sign(user_id, "staff@example.com", UserRole::Staff)
            .expect("sign");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "staff@example.com");
        assert_eq!(claims.role, UserRole::Staff);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
    }

    #[test]
    fn validity_window_is_seven_days() {
        let keys = make_keys("dev-secret", 7);
        let token = keys
            .sign(Uuid::new_v4(), "a@b.cd", UserRole::User)
            .expect("sign");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);
    }

    #[test]
    fn token_past_its_window_fails_as_expired() {
        // A token issued 8 days ago with a 7-day window: encode the stale
        // claim directly, then run it through the normal verify path.
        let keys = make_keys("dev-secret", 7);
        let issued = OffsetDateTime::now_utc() - TimeDuration::days(8);
        let claims = Claims {
            sub: Uuid::new_v4(),
            email: "a@b.cd".into(),
            role: UserRole::User,
            iat: issued.unix_timestamp() as usize,
            exp: (issued + TimeDuration::days(7)).unix_timestamp() as usize,
            iss: keys.issuer.clone(),
            aud: keys.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &keys.encoding).expect("encode");
        let err = keys.verify(&token).unwrap_err();
        assert!(matches!(err, AppError::TokenExpired));
    }

    #[test]
    fn token_one_day_in_still_verifies() {
        // Issued yesterday, 7-day window: still inside the validity window.
        let keys = make_keys("dev-secret", 7);
        let issued = OffsetDateTime::now_utc() - TimeDuration::days(1);
        let claims = Claims {
            sub: Uuid::new_v4(),
            email: "a@b.cd".into(),
            role: UserRole::User,
            iat: issued.unix_timestamp() as usize,
            exp: (issued + TimeDuration::days(7)).unix_timestamp() as usize,
            iss: keys.issuer.clone(),
            aud: keys.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &keys.encoding).expect("encode");
        assert!(keys.verify(&token).is_ok());
    }

    #[test]
    fn tampered_token_is_invalid_not_expired() {
        let keys = make_keys("dev-secret", 7);
        let other = make_keys("other-secret", 7);
        let token = keys
            .sign(Uuid::new_v4(), "a@b.cd", UserRole::User)
            .expect("sign");
        let err = other.verify(&token).unwrap_err();
        assert!(matches!(err, AppError::TokenInvalid));
    }

    #[test]
    fn wrong_audience_is_rejected() {
        let keys = make_keys("same-secret", 7);
        let mut strange = make_keys("same-secret", 7);
        strange.audience = "another-app".into();
        let token = keys
            .sign(Uuid::new_v4(), "a@b.cd", UserRole::User)
            .expect("sign");
        assert!(strange.verify(&token).is_err());
    }
}

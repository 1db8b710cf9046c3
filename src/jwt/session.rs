//! Session token validation.
//!
//! Sessions are issued by the managed auth backend (magic link and password
//! reset flows live there) as HS256 JWTs signed with a shared secret. The
//! subject is the backend's user id.

use std::collections::HashSet;

use jwt_simple::prelude::*;

use crate::error::{AppError, Result};

/// Custom claims carried by a session token alongside `sub`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// The authenticated caller, as established by a verified session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
}

pub struct SessionVerifier {
    /// None when no secret is configured: every token is rejected
    key: Option<HS256Key>,
    audience: Option<String>,
}

impl SessionVerifier {
    pub fn new(secret: &str, audience: Option<String>) -> Self {
        let key = (!secret.is_empty()).then(|| HS256Key::from_bytes(secret.as_bytes()));
        Self { key, audience }
    }

    pub fn verify(&self, token: &str) -> Result<Identity> {
        let key = self.key.as_ref().ok_or(AppError::Unauthorized)?;

        let mut options = VerificationOptions::default();
        if let Some(aud) = &self.audience {
            let mut allowed = HashSet::new();
            allowed.insert(aud.clone());
            options.allowed_audiences = Some(allowed);
        }

        let claims = key
            .verify_token::<SessionClaims>(token, Some(options))
            .map_err(|e| {
                tracing::debug!("Session token rejected: {}", e);
                AppError::Unauthorized
            })?;

        let user_id = claims
            .subject
            .filter(|s| !s.is_empty())
            .ok_or(AppError::Unauthorized)?;

        Ok(Identity {
            user_id,
            email: claims.custom.email,
        })
    }

    /// Issue a token the verifier accepts. Used by dev seeding and tests; in
    /// production the auth backend issues sessions.
    pub fn issue(&self, user_id: &str, email: Option<&str>, ttl_secs: u64) -> Result<String> {
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| AppError::Internal("Session secret not configured".into()))?;

        let custom = SessionClaims {
            email: email.map(String::from),
        };
        let mut claims = Claims::with_custom_claims(custom, Duration::from_secs(ttl_secs))
            .with_subject(user_id);
        if let Some(aud) = &self.audience {
            claims = claims.with_audience(aud);
        }

        key.authenticate(claims)
            .map_err(|e| AppError::Internal(format!("Failed to sign session token: {}", e)))
    }
}

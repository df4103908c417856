//! Identity - Verifica dei token e identità dell'utente corrente
//!
//! L'autenticazione vera e propria (login, registrazione) è esterna: qui si verifica soltanto
//! il token firmato e se ne estrae `{user_id, society_id, is_admin}`, che viene considerato
//! attendibile così com'è.

use crate::core::{AppError, AppState};
use axum::extract::State;
use axum::{body::Body, extract::Request, http, http::Response, middleware::Next};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

// struct che codifica il contenuto del token jwt
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub exp: usize, // Expiry time of the token
    pub iat: usize, // Issued at time of the token
    pub sub: String,
    pub society_id: String,
    pub name: String,
    #[serde(default)]
    pub is_admin: bool,
}

/// Identità dell'utente autenticato, inserita come Extension nelle richieste HTTP
/// e memorizzata nella sessione WebSocket dopo l'evento `identify`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub user_id: String,
    pub society_id: String,
    pub display_name: String,
    pub is_admin: bool,
}

impl From<Claims> for CurrentUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            society_id: claims.society_id,
            display_name: claims.name,
            is_admin: claims.is_admin,
        }
    }
}

impl CurrentUser {
    /// Amministratore della society indicata
    pub fn administers(&self, society_id: &str) -> bool {
        self.is_admin && self.society_id == society_id
    }
}

#[instrument(skip(user, secret), fields(user_id = %user.user_id))]
pub fn encode_jwt(user: &CurrentUser, secret: &str) -> Result<String, AppError> {
    debug!("Encoding JWT token for user");
    let now = Utc::now();
    let expire: chrono::TimeDelta = Duration::hours(24);
    let claims = Claims {
        exp: (now + expire).timestamp() as usize,
        iat: now.timestamp() as usize,
        sub: user.user_id.clone(),
        society_id: user.society_id.clone(),
        name: user.display_name.clone(),
        is_admin: user.is_admin,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        error!("Failed to encode JWT token: {:?}", e);
        AppError::internal_server_error("Error in encoding jwt token")
    })
}

#[instrument(skip(jwt_token, secret))]
pub fn decode_jwt(jwt_token: &str, secret: &str) -> Result<TokenData<Claims>, AppError> {
    debug!("Decoding JWT token");
    decode(
        jwt_token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        warn!("Failed to decode JWT token: {:?}", e);
        AppError::unauthorized("Unable to decode token")
    })
}

/// Risolve un token nell'identità dell'utente
pub fn authenticate(jwt_token: &str, secret: &str) -> Result<CurrentUser, AppError> {
    let data = decode_jwt(jwt_token, secret)?;
    if data.claims.sub.is_empty() || data.claims.society_id.is_empty() {
        return Err(AppError::unauthorized("Token without user or society"));
    }
    Ok(CurrentUser::from(data.claims))
}

#[instrument(skip(state, req, next))]
pub async fn authentication_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response<Body>, AppError> {
    debug!("Running authentication middleware");
    let auth_header = match req.headers().get(http::header::AUTHORIZATION) {
        Some(header) => header.to_str().map_err(|_| {
            warn!("Invalid authorization header format");
            AppError::forbidden("Empty header is not allowed")
        })?,
        None => {
            warn!("Missing authorization header");
            return Err(AppError::forbidden("Please add the JWT token to the header"));
        }
    };

    let token = auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            warn!("Authorization header is not a bearer token");
            AppError::unauthorized("Expected a bearer token")
        })?;

    let current_user = authenticate(token, &state.jwt_secret)?;
    info!(user_id = %current_user.user_id, "User authenticated");

    req.extensions_mut().insert(current_user);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> CurrentUser {
        CurrentUser {
            user_id: "alice".into(),
            society_id: "maple-court".into(),
            display_name: "Alice".into(),
            is_admin: false,
        }
    }

    #[test]
    fn token_round_trips_identity() {
        let token = encode_jwt(&alice(), "secret").unwrap();
        let user = authenticate(&token, "secret").unwrap();
        assert_eq!(user, alice());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = encode_jwt(&alice(), "secret").unwrap();
        let err = authenticate(&token, "another").unwrap_err();
        assert_eq!(err.kind(), crate::core::error::ErrorKind::Unauthenticated);
    }

    #[test]
    fn admin_only_of_own_society() {
        let mut admin = alice();
        admin.is_admin = true;
        assert!(admin.administers("maple-court"));
        assert!(!admin.administers("oak-park"));
        assert!(!alice().administers("maple-court"));
    }
}

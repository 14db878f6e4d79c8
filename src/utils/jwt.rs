// src/utils/jwt.rs

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{error::AppError, models::user::Role};

/// JWT Claims structure.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - Stores the User ID (as string).
    pub sub: String,
    /// User's role ('admin', 'instructor' or 'student').
    pub role: String,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, AppError> {
        self.sub
            .parse::<i64>()
            .map_err(|_| AppError::AuthError("Invalid token subject".to_string()))
    }

    pub fn role(&self) -> Result<Role, AppError> {
        self.role
            .parse::<Role>()
            .map_err(|_| AppError::AuthError("Invalid token role".to_string()))
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role(), Ok(Role::Admin))
    }
}

/// Signing material built once at startup.
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiration_seconds: u64,
}

impl JwtKeys {
    pub fn new(secret: &str, expiration_seconds: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expiration_seconds,
        }
    }

    pub fn expiration_seconds(&self) -> u64 {
        self.expiration_seconds
    }

    /// Signs a new JWT for the user.
    pub fn sign(&self, id: i64, role: Role) -> Result<String, AppError> {
        // Calculate expiration: current time + expiration_seconds
        let expiration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| AppError::InternalServerError(e.to_string()))?
            .as_secs()
            + self.expiration_seconds;

        let claims = Claims {
            sub: id.to_string(),
            role: role.as_str().to_owned(),
            exp: expiration as usize,
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::InternalServerError(e.to_string()))
    }

    /// Verifies and decodes a JWT string.
    ///
    /// Returns the `Claims` if valid, otherwise returns an `AppError`.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let token_data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

        Ok(token_data.claims)
    }
}

/// Axum Middleware: Authentication.
///
/// Intercepts requests, validates the 'Authorization: Bearer <token>' header.
/// If valid, injects `Claims` into the request extensions for handlers to use.
/// If invalid, returns 401 Unauthorized.
pub async fn auth_middleware(
    State(keys): State<Arc<JwtKeys>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::AuthError("Missing bearer token".to_string()))?;

    let claims = keys.verify(token)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Axum Middleware: Admin Authorization.
///
/// Must be used AFTER `auth_middleware`. Checks if the injected `Claims` has 'admin' role.
/// If not, returns 403 Forbidden.
pub async fn admin_middleware(req: Request<Body>, next: Next) -> Result<Response, AppError> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .ok_or_else(|| AppError::AuthError("Missing credentials".to_string()))?;

    if !claims.is_admin() {
        return Err(AppError::Forbidden("Admin role required".to_string()));
    }

    Ok(next.run(req).await)
}

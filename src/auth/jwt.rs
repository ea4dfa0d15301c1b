//! Identity-provider bearer token verification. The core never issues these
//! tokens; it only verifies a signature the identity provider already
//! applied and trusts the `sub` claim as the stable user id.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityClaims {
    pub sub: Uuid,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, rename = "displayName")]
    pub display_name: Option<String>,
    #[serde(default, rename = "avatarUrl")]
    pub avatar_url: Option<String>,
    #[serde(default, rename = "isGuest")]
    pub is_guest: bool,
    pub exp: i64,
}

pub fn verify_identity_token(secret: &str, token: &str) -> Result<IdentityClaims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<IdentityClaims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)?;
    Ok(data.claims)
}

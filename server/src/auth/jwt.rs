//! JWT Token Issuance and Verification
//!
//! HS256 tokens keyed by a shared secret. Issuer and audience are both the
//! service identity. Tokens carry the caller's role names and the OR of the
//! masks of every site role held, so verification needs no storage access.
//!
//! There is no server-side session: a token stays valid until it expires
//! (24 hours), even if the user's roles change in the meantime.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::error::{AuthError, AuthResult};
use crate::db::UserId;
use crate::permissions::{Caller, SiteFlags};

/// Token lifetime.
pub const TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer (service identity).
    pub iss: String,
    /// Audience (service identity).
    pub aud: String,
    /// Subject (user ID as string).
    pub sub: String,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Role names held by the user.
    pub roles: Vec<String>,
    /// OR of the permission masks of every site role held.
    pub site_permission_flags: u64,
}

impl Claims {
    #[must_use]
    pub const fn site_flags(&self) -> SiteFlags {
        SiteFlags::from_bits_retain(self.site_permission_flags)
    }

    /// Subject as a user id.
    pub fn user_id(&self) -> AuthResult<UserId> {
        self.sub
            .parse()
            .map_err(|_| AuthError::MalformedToken(format!("subject {:?} is not a user id", self.sub)))
    }
}

/// Signs and verifies tokens for one service identity.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    identity: String,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    #[must_use]
    pub fn new(secret: &str, identity: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            identity: identity.to_string(),
        }
    }

    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Issue a token valid for [`TOKEN_TTL_SECONDS`] from now.
    pub fn issue(&self, user_id: UserId, roles: &[String], site_flags: SiteFlags) -> AuthResult<String> {
        self.issue_at(user_id, roles, site_flags, Utc::now())
    }

    /// Issue a token as if the current time were `now`.
    pub fn issue_at(
        &self,
        user_id: UserId,
        roles: &[String],
        site_flags: SiteFlags,
        now: DateTime<Utc>,
    ) -> AuthResult<String> {
        let claims = Claims {
            iss: self.identity.clone(),
            aud: self.identity.clone(),
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(TOKEN_TTL_SECONDS)).timestamp(),
            roles: roles.to_vec(),
            site_permission_flags: site_flags.bits(),
        };

        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    /// Check signature, issuer, audience and expiry.
    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_issuer(&[&self.identity]);
        validation.set_audience(&[&self.identity]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(map_decode_error)
    }

    /// Extract claims without checking signature or expiry.
    ///
    /// Only for introspection; never authorize from the result.
    pub fn claims(&self, token: &str) -> AuthResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::Json(_) => AuthError::MalformedToken(e.to_string()),
                _ => AuthError::InvalidToken,
            })
    }

    /// Verify a token and resolve the caller it describes.
    pub fn authenticate(&self, token: &str) -> AuthResult<Caller> {
        let claims = self.verify(token)?;
        Caller::from_claims(&claims)
    }
}

fn map_decode_error(e: jsonwebtoken::errors::Error) -> AuthError {
    match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::Json(_) | ErrorKind::MissingRequiredClaim(_) => {
            AuthError::MalformedToken(e.to_string())
        }
        _ => AuthError::InvalidToken,
    }
}

use anyhow::anyhow;
use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::{SaltString, rand_core::OsRng},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;

use tracker_types::api::Claims;
use tracker_types::models::Role;

/// Fixed lifetime of an issued token, in seconds.
pub const TOKEN_LIFETIME_SECS: i64 = 24 * 60 * 60;

/// Argon2id work factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordCost {
    pub memory_kib: u32,
    pub iterations: u32,
}

impl Default for PasswordCost {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: 3,
        }
    }
}

/// Token validation failure. Expired, tampered and malformed tokens all
/// map to the same variant.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid token")]
    InvalidToken,
}

/// Password hashing plus signing and checking of bearer tokens with one
/// process-wide HMAC secret.
pub struct Credentials {
    params: Params,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl Credentials {
    pub fn new(secret: &str, cost: PasswordCost) -> anyhow::Result<Self> {
        let params = Params::new(cost.memory_kib, cost.iterations, Params::DEFAULT_P_COST, None)
            .map_err(|e| anyhow!("invalid password cost: {}", e))?;

        let mut validation = Validation::default();
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat"]);

        Ok(Self {
            params,
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    fn hasher(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Salted one-way hash in PHC string form. CPU-heavy, call off the runtime.
    pub fn hash(&self, password: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .hasher()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("password hashing failed: {}", e))?
            .to_string();
        Ok(hash)
    }

    /// Any mismatch, including a malformed stored hash, is `false`.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        self.hasher()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    pub fn issue(&self, user_id: i64, role: Role) -> anyhow::Result<String> {
        let now = chrono::Utc::now();
        let claims = Claims {
            user_id,
            role,
            iat: now.timestamp() as usize,
            exp: (now + chrono::Duration::seconds(TOKEN_LIFETIME_SECS)).timestamp() as usize,
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> anyhow::Result<String> {
        Ok(encode(&Header::default(), claims, &self.encoding)?)
    }

    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken)
    }
}

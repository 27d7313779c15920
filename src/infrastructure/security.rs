// Credential hashing and identity tokens

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::config::SecurityConfig;
use crate::error::{AppError, AppResult};
use crate::models::{Role, UserId};

const INVALID_TOKEN: &str = "Invalid or expired token";

/// JWT claims carried by every identity token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: UserId,
    pub role: Role,
    pub iat: u64,
    pub exp: u64,
}

pub struct SecurityService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl_secs: u64,
    hash_params: Params,
    /// Verified against when the account is unknown, so both login
    /// failures cost one Argon2 pass.
    decoy_hash: String,
    password_checks: AtomicU64,
}

impl SecurityService {
    pub fn new(config: &SecurityConfig) -> AppResult<Self> {
        let hash_params = Params::new(
            config.argon2_memory_kib,
            config.argon2_iterations,
            1,
            None,
        )
        .map_err(|e| AppError::ConfigurationError(format!("Invalid argon2 parameters: {}", e)))?;

        let mut service = Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            token_ttl_secs: config.token_ttl_secs,
            hash_params,
            decoy_hash: String::new(),
            password_checks: AtomicU64::new(0),
        };
        service.decoy_hash = service.hash_password("decoy-password-never-matches")?;
        Ok(service)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            self.hash_params.clone(),
        )
    }

    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;

        Ok(password_hash.to_string())
    }

    /// A stored hash that cannot be parsed never verifies.
    pub fn verify_password(&self, password: &str, hash: &str) -> bool {
        self.password_checks.fetch_add(1, Ordering::Relaxed);
        match PasswordHash::new(hash) {
            Ok(parsed) => self
                .argon2()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                debug!("Unparsable password hash: {}", e);
                false
            }
        }
    }

    /// Login check that does the same work whether or not the account exists.
    pub fn verify_login(&self, password: &str, stored_hash: Option<&str>) -> bool {
        match stored_hash {
            Some(hash) => self.verify_password(password, hash),
            None => {
                self.verify_password(password, &self.decoy_hash);
                false
            }
        }
    }

    /// Number of Argon2 verifications performed so far.
    pub fn password_checks(&self) -> u64 {
        self.password_checks.load(Ordering::Relaxed)
    }

    pub fn issue_token(&self, user_id: UserId, role: Role) -> AppResult<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| AppError::Internal(format!("System clock before epoch: {}", e)))?
            .as_secs();

        let claims = Claims {
            user_id,
            role,
            iat: now,
            exp: now + self.token_ttl_secs,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Every failure (malformed, expired, bad signature) maps to the same error.
    pub fn validate_token(&self, token: &str) -> AppResult<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Token rejected: {}", e);
                AppError::Unauthorized(INVALID_TOKEN.to_string())
            })
    }
}

// Account registration, login and profile lookup

use std::sync::Arc;
use tracing::{info, instrument};

use crate::config::AdminBootstrap;
use crate::error::{AppError, AppResult};
use crate::infrastructure::{CatalogStore, SecurityService};
use crate::models::{
    AuthResponse, LoginRequest, NewUser, RegisterRequest, Role, User, UserId, UserProfile,
};
use crate::services::validation;

const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[derive(Clone)]
pub struct AuthService {
    catalog: Arc<dyn CatalogStore>,
    security: Arc<SecurityService>,
}

impl AuthService {
    pub fn new(catalog: Arc<dyn CatalogStore>, security: Arc<SecurityService>) -> Self {
        Self { catalog, security }
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: RegisterRequest) -> AppResult<AuthResponse> {
        let email = validation::email(&request.email)?;
        validation::new_password(&request.password)?;
        let name = validation::display_name(&request.name)?;

        if self.catalog.find_user_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("User already exists".to_string()));
        }

        let user = self
            .create_account(email, name, request.password, Role::User)
            .await?;
        info!(user_id = user.id, "Registered new user");
        self.respond(&user)
    }

    /// Unknown email and wrong password are indistinguishable.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn login(&self, request: LoginRequest) -> AppResult<AuthResponse> {
        let email = validation::email(&request.email)?;
        if request.password.is_empty() {
            return Err(AppError::Validation("Password is required".to_string()));
        }

        let user = self.catalog.find_user_by_email(&email).await?;

        let security = self.security.clone();
        let hash = user.as_ref().map(|u| u.password_hash.clone());
        let verified = tokio::task::spawn_blocking(move || {
            security.verify_login(&request.password, hash.as_deref())
        })
        .await
        .map_err(|e| AppError::Internal(format!("Password check aborted: {}", e)))?;

        match user {
            Some(user) if verified => self.respond(&user),
            _ => Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string())),
        }
    }

    /// Current stored profile, so role changes apply without a new token.
    pub async fn me(&self, user_id: UserId) -> AppResult<UserProfile> {
        self.catalog
            .find_user(user_id)
            .await?
            .map(|user| UserProfile::from(&user))
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// Creates the configured admin account unless the email is taken.
    pub async fn bootstrap_admin(&self, admin: &AdminBootstrap) -> AppResult<()> {
        let email = validation::email(&admin.email)?;
        if self.catalog.find_user_by_email(&email).await?.is_some() {
            info!(email = %email, "Admin account already present");
            return Ok(());
        }

        let name = validation::display_name(&admin.name)?;
        let user = self
            .create_account(email, name, admin.password.clone(), Role::Admin)
            .await?;
        info!(user_id = user.id, "Bootstrapped admin account");
        Ok(())
    }

    async fn create_account(
        &self,
        email: String,
        name: String,
        password: String,
        role: Role,
    ) -> AppResult<User> {
        let security = self.security.clone();
        let password_hash = tokio::task::spawn_blocking(move || security.hash_password(&password))
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing aborted: {}", e)))??;

        self.catalog
            .create_user(NewUser {
                email,
                name,
                role,
                password_hash,
            })
            .await
    }

    fn respond(&self, user: &User) -> AppResult<AuthResponse> {
        Ok(AuthResponse {
            token: self.security.issue_token(user.id, user.role)?,
            user: UserProfile::from(user),
        })
    }
}

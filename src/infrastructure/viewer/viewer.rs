use crate::models::{Role, UserId};

/// Verified caller identity decoded from a bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Request-scoped view of who is calling.
#[derive(Debug, Clone)]
pub struct ViewerContext {
    pub request_id: String,
    pub identity: Option<Identity>,
}

impl ViewerContext {
    pub fn anonymous(request_id: String) -> Self {
        Self {
            request_id,
            identity: None,
        }
    }

    pub fn authenticated(request_id: String, user_id: UserId, role: Role) -> Self {
        Self {
            request_id,
            identity: Some(Identity { user_id, role }),
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.identity.map(|identity| identity.user_id)
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

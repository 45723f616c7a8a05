use crate::{
    errors::AppError,
    models::{Claims, Role, SessionUser},
    state::{AppState, SessionKeys},
};
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use jsonwebtoken::{Header, Validation, decode, encode};
use uuid::Uuid;

/// Authenticated session context.
/// Add `auth: AuthUser` as a parameter in any handler that requires authentication;
/// ledger services receive it explicitly instead of reading ambient state.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    pub branch_id: Option<Uuid>,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let headers: &HeaderMap = &parts.headers;

        let auth_header = headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("Invalid Authorization format".to_string()))?;

        let token_data = decode::<Claims>(token, &state.keys.decoding, &Validation::default())
            .map_err(|_| AppError::InvalidToken)?;

        let user_id = Uuid::parse_str(&token_data.claims.sub).map_err(|_| AppError::InvalidToken)?;

        Ok(AuthUser {
            id: user_id,
            name: token_data.claims.name,
            role: token_data.claims.role,
            branch_id: token_data.claims.branch_id,
        })
    }
}

impl AuthUser {
    /// Reject the request unless the session holds one of `allowed`.
    pub fn require_any(&self, allowed: &[Role]) -> Result<(), AppError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Role '{}' may not perform this action",
                self.role.as_str()
            )))
        }
    }

    /// Branch every query is pinned to, if the role is branch-scoped.
    pub fn scoped_branch(&self) -> Option<Uuid> {
        match self.role {
            Role::Manager | Role::Accountant | Role::Viewer => self.branch_id,
            Role::Admin | Role::Staff => None,
        }
    }

    /// Manager every query is pinned to, if the role only sees its own orders.
    pub fn scoped_manager(&self) -> Option<Uuid> {
        match self.role {
            Role::Staff => Some(self.id),
            _ => None,
        }
    }

    /// Whether an order owned by `branch_id`/`manager_id` is visible to this session.
    pub fn can_access(&self, branch_id: Option<Uuid>, manager_id: Option<Uuid>) -> bool {
        if let Some(scope) = self.scoped_branch() {
            if branch_id != Some(scope) {
                return false;
            }
        }
        if let Some(me) = self.scoped_manager() {
            return manager_id == Some(me);
        }
        true
    }

    pub fn ensure_access(
        &self,
        branch_id: Option<Uuid>,
        manager_id: Option<Uuid>,
    ) -> Result<(), AppError> {
        if self.can_access(branch_id, manager_id) {
            Ok(())
        } else {
            Err(AppError::Forbidden("Order access denied".to_string()))
        }
    }

    pub fn session_user(&self) -> SessionUser {
        SessionUser {
            id: self.id,
            full_name: self.name.clone(),
            role: self.role,
            branch_id: self.branch_id,
        }
    }
}

pub fn generate_token(user: &SessionUser, keys: &SessionKeys) -> Result<String, AppError> {
    use chrono::Utc;

    let now = Utc::now();
    let claims = Claims {
        sub: user.id.to_string(),
        name: user.full_name.clone(),
        role: user.role,
        branch_id: user.branch_id,
        exp: (now + chrono::Duration::hours(keys.expiry_hours)).timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(&Header::default(), &claims, &keys.encoding)
        .map_err(|e| AppError::Internal(e.to_string()))
}

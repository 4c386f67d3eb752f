// Authorization: signed bearer tokens and role-gated principals
//
// A token is `<user_id>.<hex HMAC-SHA256(secret, user_id)>`. The role is never
// carried in the token; it is re-read from the User table on every request.

use crate::entities::user::{self, Role};
use crate::error::{AppError, AppResult};
use hmac::{Hmac, Mac};
use rusqlite::Connection;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Issues and checks bearer tokens with one server secret
#[derive(Clone)]
pub struct TokenSigner {
    key: Vec<u8>,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        TokenSigner {
            key: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self, user_id: i64) -> AppResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| AppError::Internal(format!("token key rejected: {}", e)))?;
        mac.update(user_id.to_string().as_bytes());
        Ok(mac)
    }

    pub fn issue(&self, user_id: i64) -> AppResult<String> {
        let signature = self.mac(user_id)?.finalize().into_bytes();
        Ok(format!("{}.{}", user_id, hex::encode(signature)))
    }

    /// User id carried by a token whose signature checks out
    pub fn verify(&self, token: &str) -> AppResult<i64> {
        let invalid = || AppError::unauthenticated("Invalid token");

        let (id_part, sig_part) = token.trim().split_once('.').ok_or_else(invalid)?;
        let user_id: i64 = id_part.parse().map_err(|_| invalid())?;
        let signature = hex::decode(sig_part).map_err(|_| invalid())?;

        self.mac(user_id)?
            .verify_slice(&signature)
            .map_err(|_| invalid())?;

        Ok(user_id)
    }
}

/// Authenticated caller, with the role read from the database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub role: Role,
}

impl Principal {
    /// Look up `user_id` and check it holds at least `required`
    pub fn resolve(conn: &Connection, user_id: i64, required: Role) -> AppResult<Principal> {
        let role = user::get_role(conn, user_id)?
            .ok_or_else(|| AppError::unauthenticated("Invalid token"))?;

        if !role.satisfies(required) {
            return Err(AppError::forbidden(match required {
                Role::Admin => "Admin access required",
                _ => "Staff access required",
            }));
        }

        Ok(Principal { user_id, role })
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: Option<&str>) -> AppResult<&str> {
    let value = header.ok_or_else(|| AppError::unauthenticated("Authentication required"))?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::unauthenticated("Invalid token"))
}

#[cfg(feature = "server")]
pub use extract::{AdminAuth, AdminOnly, AnyRole, Authorized, CustomerAuth, Gate, StaffAuth, StaffOnly};

#[cfg(feature = "server")]
mod extract {
    use super::{bearer_token, Principal};
    use crate::api::AppState;
    use crate::entities::user::Role;
    use crate::error::AppError;
    use axum::extract::FromRequestParts;
    use axum::http::header::AUTHORIZATION;
    use axum::http::request::Parts;
    use std::marker::PhantomData;

    /// Minimum role an endpoint accepts
    pub trait Gate: Send + Sync + 'static {
        const REQUIRED: Role;
    }

    pub struct AnyRole;
    pub struct StaffOnly;
    pub struct AdminOnly;

    impl Gate for AnyRole {
        const REQUIRED: Role = Role::Customer;
    }
    impl Gate for StaffOnly {
        const REQUIRED: Role = Role::Staff;
    }
    impl Gate for AdminOnly {
        const REQUIRED: Role = Role::Admin;
    }

    /// Extractor yielding the caller's principal once its role passes `G`
    pub struct Authorized<G: Gate> {
        pub principal: Principal,
        _gate: PhantomData<G>,
    }

    impl<G: Gate> Authorized<G> {
        pub fn user_id(&self) -> i64 {
            self.principal.user_id
        }
    }

    pub type CustomerAuth = Authorized<AnyRole>;
    pub type StaffAuth = Authorized<StaffOnly>;
    pub type AdminAuth = Authorized<AdminOnly>;

    #[axum::async_trait]
    impl<G: Gate> FromRequestParts<AppState> for Authorized<G> {
        type Rejection = AppError;

        async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
            let header = parts
                .headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok());
            let token = bearer_token(header)?;
            let user_id = state.tokens.verify(token)?;

            let principal = state
                .db
                .read(|conn| Principal::resolve(conn, user_id, G::REQUIRED))?;

            Ok(Authorized {
                principal,
                _gate: PhantomData,
            })
        }
    }
}

use axum::{
    extract::{FromRef, FromRequestParts},
    headers::Cookie,
    http::{header::SET_COOKIE, request::Parts, HeaderName},
    RequestPartsExt, TypedHeader,
};
use tap::TapFallible;

use crate::{
    config::AppConfig,
    error::{Error, UnauthorizedType},
    store::UserCollection,
};

use super::{
    token::TokenService,
    user::{Role, UserModel},
};

pub const PATIENT_COOKIE: &str = "patientToken";
pub const ADMIN_COOKIE: &str = "adminToken";

/// A `Set-Cookie` response part.
pub type SessionCookie = [(HeaderName, String); 1];

#[derive(Clone, Debug)]
pub struct CookieSettings {
    pub max_age: time::Duration,
    pub secure: bool,
}

impl CookieSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_age: config.cookie_expires,
            secure: config.cookie_secure,
        }
    }

    fn attributes(&self) -> &'static str {
        // Browsers drop SameSite=None cookies that are not Secure.
        if self.secure {
            "Path=/; HttpOnly; Secure; SameSite=None"
        } else {
            "Path=/; HttpOnly; SameSite=Lax"
        }
    }

    pub fn set(&self, name: &str, token: &str) -> SessionCookie {
        [(
            SET_COOKIE,
            format!(
                "{}={}; Max-Age={}; {}",
                name,
                token,
                self.max_age.whole_seconds(),
                self.attributes()
            ),
        )]
    }

    /// Expires the cookie. Does not revoke the token it held.
    pub fn clear(&self, name: &str) -> SessionCookie {
        [(
            SET_COOKIE,
            format!("{}=; Max-Age=0; {}", name, self.attributes()),
        )]
    }
}

async fn resolve_session<S>(parts: &mut Parts, state: &S, role: Role) -> Result<UserModel, Error>
where
    TokenService: FromRef<S>,
    UserCollection: FromRef<S>,
    S: Send + Sync,
{
    let missing = || Error::Unauthorized(UnauthorizedType::MissingSession);
    let cookie_name = role.session_cookie().ok_or_else(missing)?;

    let TypedHeader(cookies) = parts
        .extract::<TypedHeader<Cookie>>()
        .await
        .map_err(|_| missing())
        .tap_err(|_| tracing::debug!("no cookies on {} request", role.as_str()))?;

    let token = cookies
        .get(cookie_name)
        .filter(|it| !it.is_empty())
        .ok_or_else(missing)
        .tap_err(|_| tracing::debug!("{} cookie not found", cookie_name))?;

    let id = TokenService::from_ref(state).verify(token, role)?;

    UserCollection::from_ref(state)
        .find_by_id(id)
        .await?
        .filter(|it| it.role == role)
        .ok_or(Error::Unauthorized(UnauthorizedType::UnknownUser))
        .tap_err(|_| tracing::debug!("session user {} is gone", id))
}

/// Guard for patient routes: the `patientToken` cookie must carry a valid
/// patient token for an existing patient.
#[derive(Debug, Clone)]
pub struct RequirePatient(pub UserModel);

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequirePatient
where
    TokenService: FromRef<S>,
    UserCollection: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        resolve_session(parts, state, Role::Patient).await.map(Self)
    }
}

/// Guard for dashboard routes. Independent of [`RequirePatient`]: a patient
/// cookie never satisfies it.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub UserModel);

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequireAdmin
where
    TokenService: FromRef<S>,
    UserCollection: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        resolve_session(parts, state, Role::Admin).await.map(Self)
    }
}

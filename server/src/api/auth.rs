use argon2::Argon2;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, UnauthorizedType},
    store::UserCollection,
    util::{verify_password, verify_unknown_account, JsonBody},
};

use super::{
    session::{
        CookieSettings, RequireAdmin, RequirePatient, SessionCookie, ADMIN_COOKIE, PATIENT_COOKIE,
    },
    token::TokenService,
    user::{create_user, normalize_email, NewUser, Role, UserModel, UserRequest, UserResponse},
    MessageResponse,
};

#[derive(Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub success: bool,
    pub message: String,
    pub user: UserResponse,
    pub token: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UserEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub user: UserResponse,
}

impl UserEnvelope {
    pub fn new(user: UserModel, message: Option<String>) -> Self {
        Self {
            success: true,
            message,
            user: user.into(),
        }
    }
}

/// Issues a token for `user` and sets it in the cookie of the user's role.
fn start_session(
    tokens: &TokenService,
    cookies: &CookieSettings,
    user: UserModel,
    message: &str,
) -> Result<(SessionCookie, Json<SessionResponse>), Error> {
    let cookie_name = user.role.session_cookie().ok_or_else(|| {
        Error::InvalidInput(format!("{} accounts cannot sign in", user.role.as_str()))
    })?;
    let token = tokens.issue(user.id, user.role)?;

    Ok((
        cookies.set(cookie_name, &token),
        Json(SessionResponse {
            success: true,
            message: message.to_string(),
            user: user.into(),
            token,
        }),
    ))
}

#[tracing::instrument(skip_all, fields(email = %request.email))]
pub async fn register(
    State(users): State<UserCollection>,
    State(argon): State<Argon2<'static>>,
    State(tokens): State<TokenService>,
    State(cookies): State<CookieSettings>,
    JsonBody(request): JsonBody<UserRequest>,
) -> Result<(SessionCookie, Json<SessionResponse>), Error> {
    let user = create_user(&users, &argon, NewUser::new(request, Role::Patient)).await?;

    start_session(&tokens, &cookies, user, "User registered")
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub confirm_password: Option<String>,
    pub role: Role,
}

#[tracing::instrument(skip_all, fields(email = %request.email, role = request.role.as_str()))]
pub async fn login(
    State(users): State<UserCollection>,
    State(argon): State<Argon2<'static>>,
    State(tokens): State<TokenService>,
    State(cookies): State<CookieSettings>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Result<(SessionCookie, Json<SessionResponse>), Error> {
    if matches!(&request.confirm_password, Some(confirm) if confirm != &request.password) {
        return Err(Error::InvalidInput(
            "Password and confirm password do not match".to_string(),
        ));
    }

    if request.role.session_cookie().is_none() {
        return Err(Error::InvalidInput(format!(
            "{} accounts cannot sign in",
            request.role.as_str()
        )));
    }

    let wrong_credentials = || Error::Unauthorized(UnauthorizedType::WrongCredentials);

    let user = match users.find_by_email(&normalize_email(&request.email)).await? {
        Some(user) => user,
        None => {
            tracing::debug!("no user with this email");
            verify_unknown_account(&argon, &request.password).await?;
            return Err(wrong_credentials());
        }
    };

    if !verify_password(&argon, &request.password, &user.password).await? {
        tracing::debug!("password mismatch");
        return Err(wrong_credentials());
    }

    if user.role != request.role {
        tracing::debug!("user is {}", user.role.as_str());
        return Err(wrong_credentials());
    }

    start_session(&tokens, &cookies, user, "Login successful")
}

pub async fn patient_logout(
    State(cookies): State<CookieSettings>,
    session: Option<RequirePatient>,
) -> (SessionCookie, Json<MessageResponse>) {
    if let Some(RequirePatient(user)) = session {
        tracing::debug!("patient {} logged out", user.id);
    }

    (
        cookies.clear(PATIENT_COOKIE),
        Json(MessageResponse::new("Patient logged out")),
    )
}

pub async fn admin_logout(
    State(cookies): State<CookieSettings>,
    session: Option<RequireAdmin>,
) -> (SessionCookie, Json<MessageResponse>) {
    if let Some(RequireAdmin(user)) = session {
        tracing::debug!("admin {} logged out", user.id);
    }

    (
        cookies.clear(ADMIN_COOKIE),
        Json(MessageResponse::new("Admin logged out")),
    )
}

pub async fn patient_me(RequirePatient(user): RequirePatient) -> Json<UserEnvelope> {
    Json(UserEnvelope::new(user, None))
}

pub async fn admin_me(RequireAdmin(user): RequireAdmin) -> Json<UserEnvelope> {
    Json(UserEnvelope::new(user, None))
}

#[tracing::instrument(skip_all, fields(admin = %admin.id, email = %request.email))]
pub async fn add_admin(
    State(users): State<UserCollection>,
    State(argon): State<Argon2<'static>>,
    RequireAdmin(admin): RequireAdmin,
    JsonBody(request): JsonBody<UserRequest>,
) -> Result<Json<UserEnvelope>, Error> {
    let user = create_user(&users, &argon, NewUser::new(request, Role::Admin)).await?;

    Ok(Json(UserEnvelope::new(
        user,
        Some("New admin registered".to_string()),
    )))
}

use argon2::Argon2;
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    error::Error,
    image::ImageRef,
    store::UserCollection,
    util::{hash_password, now, validate_date, validate_phone, FormattedDateTime, ObjectIdString},
};

use super::session::{ADMIN_COOKIE, PATIENT_COOKIE};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Patient,
    Doctor,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Patient => "Patient",
            Role::Doctor => "Doctor",
            Role::Admin => "Admin",
        }
    }

    /// Cookie holding this role's session. Doctors have no session scope.
    pub fn session_cookie(self) -> Option<&'static str> {
        match self {
            Role::Patient => Some(PATIENT_COOKIE),
            Role::Admin => Some(ADMIN_COOKIE),
            Role::Doctor => None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub dob: String,
    pub gender: Gender,
    pub password: String,
    pub role: Role,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor_department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_avatar: Option<ImageRef>,

    pub created_at: bson::DateTime,
}

/// Public view of a user. Never carries the password hash.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: ObjectIdString,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub dob: String,
    pub gender: Gender,
    pub role: Role,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub doctor_department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_avatar: Option<ImageRef>,

    pub created_at: FormattedDateTime,
}

impl From<UserModel> for UserResponse {
    fn from(value: UserModel) -> Self {
        Self {
            id: value.id.into(),
            first_name: value.first_name,
            last_name: value.last_name,
            email: value.email,
            phone: value.phone,
            dob: value.dob,
            gender: value.gender,
            role: value.role,
            doctor_department: value.doctor_department,
            doc_avatar: value.doc_avatar,
            created_at: value.created_at.into(),
        }
    }
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    #[validate(length(min = 3, max = 64))]
    pub first_name: String,

    #[validate(length(min = 3, max = 64))]
    pub last_name: String,

    #[validate(email)]
    pub email: String,

    #[validate(custom = "validate_phone")]
    pub phone: String,

    #[validate(custom = "validate_date")]
    pub dob: String,

    pub gender: Gender,

    #[validate(length(min = 8, max = 64))]
    pub password: String,
}

pub struct NewUser {
    pub request: UserRequest,
    pub role: Role,
    pub doctor_department: Option<String>,
    pub doc_avatar: Option<ImageRef>,
}

impl NewUser {
    pub fn new(request: UserRequest, role: Role) -> Self {
        Self {
            request,
            role,
            doctor_department: None,
            doc_avatar: None,
        }
    }
}

/// Emails are stored and looked up in this form, so uniqueness ignores case.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub async fn ensure_email_available(users: &UserCollection, email: &str) -> Result<(), Error> {
    let email = normalize_email(email);
    if users.email_exists(&email).await? {
        tracing::debug!("tried registering taken email {}", email);
        return Err(Error::Conflict("Email is already registered".to_string()));
    }

    Ok(())
}

pub async fn create_user(
    users: &UserCollection,
    argon: &Argon2<'static>,
    new_user: NewUser,
) -> Result<UserModel, Error> {
    let NewUser {
        mut request,
        role,
        doctor_department,
        doc_avatar,
    } = new_user;

    request.email = normalize_email(&request.email);
    request.validate()?;
    ensure_email_available(users, &request.email).await?;

    let model = UserModel {
        id: ObjectId::new(),
        first_name: request.first_name,
        last_name: request.last_name,
        email: request.email,
        phone: request.phone,
        dob: request.dob,
        gender: request.gender,
        password: hash_password(argon, &request.password).await?,
        role,
        doctor_department,
        doc_avatar,
        created_at: now(),
    };
    users.insert(&model).await?;

    tracing::debug!("created {} {}", model.role.as_str(), model.id);

    Ok(model)
}

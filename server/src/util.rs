use std::{str::FromStr, sync::OnceLock};

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::{
    extract::{FromRequest, FromRequestParts, Path},
    http::{request::Parts, Request},
    Json,
};
use bson::oid::ObjectId;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use time::OffsetDateTime;
use validator::ValidationError;

use crate::error::Error;

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct ObjectIdString(#[serde(with = "object_id_string")] pub ObjectId);

impl From<ObjectId> for ObjectIdString {
    fn from(value: ObjectId) -> Self {
        Self(value)
    }
}

impl std::ops::Deref for ObjectIdString {
    type Target = ObjectId;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::cmp::PartialEq for ObjectIdString {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl std::cmp::Eq for ObjectIdString {}

impl std::cmp::PartialEq<ObjectId> for ObjectIdString {
    fn eq(&self, other: &ObjectId) -> bool {
        self.0 == *other
    }
}

mod object_id_string {
    use bson::oid::ObjectId;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(id: &ObjectId, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&id.to_hex())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<ObjectId, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FormattedDateTime(#[serde(with = "time::serde::rfc3339")] pub OffsetDateTime);

impl From<bson::DateTime> for FormattedDateTime {
    fn from(value: bson::DateTime) -> Self {
        Self(value.into())
    }
}

impl From<OffsetDateTime> for FormattedDateTime {
    fn from(value: OffsetDateTime) -> Self {
        Self(value)
    }
}

pub fn now() -> bson::DateTime {
    OffsetDateTime::now_utc().into()
}

/// Argon2 verification on the blocking pool. Malformed hashes never verify.
pub async fn verify_password(
    argon: &Argon2<'static>,
    password: &str,
    hashed: &str,
) -> Result<bool, Error> {
    let argon = argon.clone();
    let password = password.to_owned();
    let hashed = hashed.to_owned();

    tokio::task::spawn_blocking(move || {
        let hashed = match PasswordHash::new(&hashed) {
            Ok(hashed) => hashed,
            Err(_) => return false,
        };

        argon.verify_password(password.as_bytes(), &hashed).is_ok()
    })
    .await
    .map_err(Into::into)
}

pub async fn hash_password(argon: &Argon2<'static>, password: &str) -> Result<String, Error> {
    let argon = argon.clone();
    let password = password.to_owned();

    tokio::task::spawn_blocking(move || {
        let salt = password_hash::SaltString::generate(&mut password_hash::rand_core::OsRng);

        argon
            .hash_password(password.as_bytes(), &salt)
            .map(|it| it.to_string())
    })
    .await?
    .map_err(Into::into)
}

/// Hash checked against when a login names no known account.
static UNKNOWN_ACCOUNT_HASH: OnceLock<String> = OnceLock::new();

/// Spends one Argon2 verification on a throwaway hash, so a login for an
/// unknown email takes as long as one with a wrong password.
pub async fn verify_unknown_account(argon: &Argon2<'static>, password: &str) -> Result<(), Error> {
    let argon = argon.clone();
    let password = password.to_owned();

    tokio::task::spawn_blocking(move || {
        let hashed = match UNKNOWN_ACCOUNT_HASH.get() {
            Some(hashed) => hashed,
            None => {
                let salt = password_hash::SaltString::generate(&mut password_hash::rand_core::OsRng);
                let hashed = argon
                    .hash_password(b"unknown-account", &salt)?
                    .to_string();
                UNKNOWN_ACCOUNT_HASH.get_or_init(|| hashed)
            }
        };

        let hashed = PasswordHash::new(hashed)?;
        // The outcome is ignored, only the work matters.
        let _ = argon.verify_password(password.as_bytes(), &hashed);

        Ok::<_, password_hash::Error>(())
    })
    .await?
    .map_err(Into::into)
}

/// `Json` whose rejection is rendered through [`Error`].
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<T, S, B> FromRequest<S, B> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
    B: axum::body::HttpBody + Send + 'static,
    B::Data: Send,
    B::Error: Into<axum::BoxError>,
{
    type Rejection = Error;

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;

        Ok(Self(value))
    }
}

pub struct PathObjectId(pub ObjectId);

#[axum::async_trait]
impl<S> FromRequestParts<S> for PathObjectId
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<String>::from_request_parts(parts, state).await?;

        ObjectId::from_str(&id)
            .map(Self)
            .map_err(|_| Error::NotFound("resource"))
    }
}

pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let digits = phone.chars().filter(|c| !matches!(c, ' ' | '-' | '+')).count();

    if !(10..=15).contains(&digits)
        || !phone.chars().all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '+'))
    {
        return Err(ValidationError::new("phone"));
    }

    Ok(())
}

pub fn validate_date(date: &str) -> Result<(), ValidationError> {
    time::Date::parse(date, time::macros::format_description!("[year]-[month]-[day]"))
        .map(|_| ())
        .map_err(|_| ValidationError::new("date"))
}

#[cfg(test)]
mod tests {
    use argon2::Argon2;

    use super::*;

    #[tokio::test]
    async fn test_password_hashing() {
        let argon = Argon2::default();

        let hashed = hash_password(&argon, "password").await.unwrap();
        assert_ne!(hashed, "password");
        assert!(verify_password(&argon, "password", &hashed).await.unwrap());
        assert!(!verify_password(&argon, "wrongpassword", &hashed).await.unwrap());
        assert!(!verify_password(&argon, "password", "not-a-hash").await.unwrap());

        let again = hash_password(&argon, "password").await.unwrap();
        assert_ne!(hashed, again);
    }

    #[tokio::test]
    async fn test_unknown_account_verification() {
        let argon = Argon2::default();

        verify_unknown_account(&argon, "password").await.unwrap();
        let first = UNKNOWN_ACCOUNT_HASH.get().cloned().unwrap();
        assert!(PasswordHash::new(&first).is_ok());

        // The throwaway hash is computed once and reused.
        verify_unknown_account(&argon, "another").await.unwrap();
        assert_eq!(UNKNOWN_ACCOUNT_HASH.get(), Some(&first));
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("08123456789").is_ok());
        assert!(validate_phone("+62 812-3456-789").is_ok());
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("0812345678a").is_err());
    }

    #[test]
    fn test_validate_date() {
        assert!(validate_date("1990-02-28").is_ok());
        assert!(validate_date("1990-02-30").is_err());
        assert!(validate_date("28/02/1990").is_err());
    }

    #[test]
    fn test_object_id_string_serializes_as_hex() {
        let id = ObjectId::new();
        let json = serde_json::to_value(ObjectIdString(id)).unwrap();
        assert_eq!(json, serde_json::Value::String(id.to_hex()));
    }
}

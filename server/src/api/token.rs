use bson::oid::ObjectId;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::{
    config::AppConfig,
    error::{Error, UnauthorizedType},
    util::ObjectIdString,
};

use super::user::Role;

#[derive(Clone)]
struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Issues and verifies stateless session tokens. Every session role signs
/// with its own secret, so a token minted for one role never verifies for
/// another.
#[derive(Clone)]
pub struct TokenService {
    header: Header,
    validation: Validation,

    patient: SigningKeys,
    admin: SigningKeys,

    ttl: Duration,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionClaims {
    pub sub: ObjectIdString,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

impl TokenService {
    pub fn new(patient_secret: &[u8], admin_secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            header: Header::new(Algorithm::HS256),
            validation,

            patient: SigningKeys::from_secret(patient_secret),
            admin: SigningKeys::from_secret(admin_secret),

            ttl,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.patient_jwt_secret.as_bytes(),
            config.admin_jwt_secret.as_bytes(),
            config.jwt_expires,
        )
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn keys(&self, role: Role) -> Option<&SigningKeys> {
        match role {
            Role::Patient => Some(&self.patient),
            Role::Admin => Some(&self.admin),
            Role::Doctor => None,
        }
    }

    pub fn issue(&self, id: ObjectId, role: Role) -> Result<String, Error> {
        self.issue_with_ttl(id, role, self.ttl)
    }

    pub fn issue_with_ttl(&self, id: ObjectId, role: Role, ttl: Duration) -> Result<String, Error> {
        let keys = self.keys(role).ok_or_else(|| {
            Error::InvalidInput(format!("{} accounts have no session", role.as_str()))
        })?;

        let issued_at = OffsetDateTime::now_utc();
        let claims = SessionClaims {
            sub: id.into(),
            role,
            iat: issued_at.unix_timestamp(),
            exp: (issued_at + ttl).unix_timestamp(),
        };

        jsonwebtoken::encode(&self.header, &claims, &keys.encoding).map_err(Into::into)
    }

    /// Signature, expiry and role are all checked; any failure is the same
    /// [`UnauthorizedType::InvalidToken`].
    pub fn verify(&self, token: &str, expected: Role) -> Result<ObjectId, Error> {
        let invalid = || Error::Unauthorized(UnauthorizedType::InvalidToken);

        let keys = self.keys(expected).ok_or_else(invalid)?;

        let claims = jsonwebtoken::decode::<SessionClaims>(token, &keys.decoding, &self.validation)
            .map_err(|err| {
                tracing::debug!("rejected {} token: {}", expected.as_str(), err);
                invalid()
            })?
            .claims;

        if claims.role != expected {
            tracing::debug!(
                "token role {} does not match {}",
                claims.role.as_str(),
                expected.as_str()
            );
            return Err(invalid());
        }

        Ok(claims.sub.0)
    }
}

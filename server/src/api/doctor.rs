use argon2::Argon2;
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tap::TapFallible;
use validator::Validate;

use crate::{
    error::Error,
    image::{ImageStore, ImageUpload},
    store::UserCollection,
};

use super::{
    auth::UserEnvelope,
    session::RequireAdmin,
    user::{create_user, ensure_email_available, NewUser, Role, UserModel, UserRequest, UserResponse},
};

const AVATAR_FIELD: &str = "docAvatar";

#[derive(Serialize, Deserialize, Debug)]
pub struct DoctorList {
    pub success: bool,
    pub doctors: Vec<UserResponse>,
}

pub async fn list_doctors(State(users): State<UserCollection>) -> Result<Json<DoctorList>, Error> {
    let doctors = users.find_by_role(Role::Doctor).await?;

    Ok(Json(DoctorList {
        success: true,
        doctors: doctors.into_iter().map(Into::into).collect(),
    }))
}

/// Text fields of the doctor form.
#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DoctorFields {
    #[validate]
    #[serde(flatten)]
    pub user: UserRequest,

    #[validate(length(min = 1, max = 64))]
    pub doctor_department: String,
}

#[derive(Debug, Clone)]
pub struct DoctorForm {
    pub fields: DoctorFields,
    pub avatar: Option<ImageUpload>,
}

impl DoctorForm {
    /// Collects text parts by name; the `docAvatar` part is the image.
    pub async fn from_multipart(multipart: &mut Multipart) -> Result<Self, Error> {
        let mut text = serde_json::Map::new();
        let mut avatar = None;

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };

            if name == AVATAR_FIELD {
                let content_type = field.content_type().unwrap_or_default().to_owned();
                let file_name = field.file_name().map(str::to_owned);
                let bytes = field.bytes().await?;

                if !bytes.is_empty() {
                    avatar = Some(ImageUpload {
                        bytes,
                        content_type,
                        file_name,
                    });
                }
            } else {
                text.insert(name, serde_json::Value::String(field.text().await?));
            }
        }

        let fields = serde_json::from_value(serde_json::Value::Object(text))
            .map_err(|err| Error::InvalidInput(err.to_string()))?;

        Ok(Self { fields, avatar })
    }
}

pub async fn create_doctor(
    users: &UserCollection,
    argon: &Argon2<'static>,
    images: &ImageStore,
    form: DoctorForm,
) -> Result<UserModel, Error> {
    let DoctorForm { fields, avatar } = form;

    fields.validate()?;
    if let Some(avatar) = &avatar {
        avatar.extension()?;
    }
    ensure_email_available(users, &fields.user.email).await?;

    let doc_avatar = match avatar {
        Some(avatar) => Some(
            images
                .upload(avatar)
                .await
                .tap_err(|err| tracing::debug!("avatar upload failed: {}", err))?,
        ),
        None => None,
    };

    let mut new_user = NewUser::new(fields.user, Role::Doctor);
    new_user.doctor_department = Some(fields.doctor_department);
    new_user.doc_avatar = doc_avatar.clone();

    let result = create_user(users, argon, new_user).await;

    // The user was never stored, so nothing refers to the avatar.
    if let (Err(_), Some(avatar)) = (&result, &doc_avatar) {
        if let Err(err) = images.remove(avatar).await {
            tracing::warn!("could not remove orphaned avatar {}: {}", avatar.url, err);
        }
    }

    result
}

#[tracing::instrument(skip_all, fields(admin = %admin.id))]
pub async fn add_doctor(
    State(users): State<UserCollection>,
    State(argon): State<Argon2<'static>>,
    State(images): State<ImageStore>,
    RequireAdmin(admin): RequireAdmin,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UserEnvelope>, Error> {
    let form = DoctorForm::from_multipart(&mut multipart?).await?;
    let doctor = create_doctor(&users, &argon, &images, form).await?;

    Ok(Json(UserEnvelope::new(
        doctor,
        Some("New doctor registered".to_string()),
    )))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::body::Bytes;
    use bson::oid::ObjectId;

    use crate::{
        api::tests::{bootstrap, user_request},
        image::{ImageHost, ImageRef},
        store::UserStore,
    };

    use super::*;

    struct FailingHost;

    #[axum::async_trait]
    impl ImageHost for FailingHost {
        async fn upload(&self, _upload: ImageUpload) -> Result<ImageRef, Error> {
            Err(Error::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                "image host unavailable",
            )))
        }

        async fn remove(&self, _image: &ImageRef) -> Result<(), Error> {
            Err(Error::NotFound("image"))
        }
    }

    /// Reports every email as free, so the duplicate only surfaces on insert.
    struct RacingUsers(UserCollection);

    #[axum::async_trait]
    impl UserStore for RacingUsers {
        async fn insert(&self, user: &UserModel) -> Result<(), Error> {
            self.0.insert(user).await
        }

        async fn find_by_id(&self, id: ObjectId) -> Result<Option<UserModel>, Error> {
            self.0.find_by_id(id).await
        }

        async fn find_by_email(&self, email: &str) -> Result<Option<UserModel>, Error> {
            self.0.find_by_email(email).await
        }

        async fn email_exists(&self, _email: &str) -> Result<bool, Error> {
            Ok(false)
        }

        async fn find_by_role(&self, role: Role) -> Result<Vec<UserModel>, Error> {
            self.0.find_by_role(role).await
        }

        async fn find_doctors_by_name(
            &self,
            first_name: &str,
            last_name: &str,
            department: &str,
        ) -> Result<Vec<UserModel>, Error> {
            self.0
                .find_doctors_by_name(first_name, last_name, department)
                .await
        }
    }

    fn form(email: &str, content_type: Option<&str>) -> DoctorForm {
        DoctorForm {
            fields: DoctorFields {
                user: user_request(email),
                doctor_department: "Neurology".to_string(),
            },
            avatar: content_type.map(|content_type| ImageUpload {
                bytes: Bytes::from_static(b"\x89PNG\r\n"),
                content_type: content_type.to_string(),
                file_name: Some("avatar.png".to_string()),
            }),
        }
    }

    fn stored_files(bootstrap: &crate::api::tests::Bootstrap) -> usize {
        std::fs::read_dir(bootstrap.uploads.path())
            .map(|it| it.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_create_doctor_with_avatar() {
        let bootstrap = bootstrap().await;
        let state = &bootstrap.app_state;

        let doctor = create_doctor(
            &state.users,
            &state.argon,
            &state.images,
            form("strange@example.com", Some("image/png")),
        )
        .await
        .unwrap();

        assert_eq!(doctor.role, Role::Doctor);
        assert_eq!(doctor.doctor_department.as_deref(), Some("Neurology"));
        let avatar = doctor.doc_avatar.unwrap();
        assert_eq!(avatar.url, format!("/uploads/{}.png", avatar.public_id));
        assert_eq!(stored_files(&bootstrap), 1);
    }

    #[tokio::test]
    async fn test_create_doctor_without_avatar() {
        let bootstrap = bootstrap().await;
        let state = &bootstrap.app_state;

        let doctor = create_doctor(
            &state.users,
            &state.argon,
            &state.images,
            form("strange@example.com", None),
        )
        .await
        .unwrap();
        assert!(doctor.doc_avatar.is_none());

        let Json(list) = list_doctors(bootstrap.users()).await.unwrap();
        assert_eq!(list.doctors.len(), 2);
        assert!(list.doctors.iter().all(|it| it.role == Role::Doctor));
    }

    #[tokio::test]
    async fn test_rejects_before_upload() {
        let bootstrap = bootstrap().await;
        let state = &bootstrap.app_state;

        let err = create_doctor(
            &state.users,
            &state.argon,
            &state.images,
            form("strange@example.com", Some("image/gif")),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::InvalidInput(_));

        // Taken email: the avatar is never stored.
        let err = create_doctor(
            &state.users,
            &state.argon,
            &state.images,
            form(&bootstrap.patient.email, Some("image/png")),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::Conflict(_));

        let mut invalid = form("strange@example.com", Some("image/png"));
        invalid.fields.doctor_department = String::new();
        let err = create_doctor(&state.users, &state.argon, &state.images, invalid)
            .await
            .unwrap_err();
        assert_matches!(err, Error::ValidationError(_));

        assert_eq!(stored_files(&bootstrap), 0);
        assert!(!state.users.email_exists("strange@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_upload_leaves_no_record() {
        let bootstrap = bootstrap().await;
        let state = &bootstrap.app_state;

        let err = create_doctor(
            &state.users,
            &state.argon,
            &ImageStore::new(FailingHost),
            form("strange@example.com", Some("image/jpeg")),
        )
        .await
        .unwrap_err();

        assert_matches!(err, Error::IoError(_));
        assert!(!state.users.email_exists("strange@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_insert_removes_avatar() {
        let bootstrap = bootstrap().await;
        let state = &bootstrap.app_state;
        let users = UserCollection::new(RacingUsers(state.users.clone()));

        let err = create_doctor(
            &users,
            &state.argon,
            &state.images,
            form(&bootstrap.patient.email, Some("image/png")),
        )
        .await
        .unwrap_err();

        assert_matches!(err, Error::Conflict(_));
        assert_eq!(stored_files(&bootstrap), 0);
    }
}

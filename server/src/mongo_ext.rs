use std::ops::Deref;

use bson::{doc, oid::ObjectId, Document};
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument},
};
use serde::de::DeserializeOwned;

use crate::{
    api::{
        appointment::{AppointmentModel, AppointmentStatus},
        message::MessageModel,
        user::{Role, UserModel},
    },
    error::Error,
    store::{AppointmentStore, MessageStore, UserStore},
};

const DUPLICATE_KEY: i32 = 11000;

pub struct Collection<T>(pub mongodb::Collection<T>);

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Collection<T> {
    type Target = mongodb::Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> From<mongodb::Collection<T>> for Collection<T> {
    fn from(value: mongodb::Collection<T>) -> Self {
        Self(value)
    }
}

impl<T> Collection<T>
where
    T: DeserializeOwned + Send + Sync + Unpin,
{
    pub async fn find_one_by_id(&self, id: ObjectId) -> Result<Option<T>, Error> {
        self.find_one(doc! { "_id": id }, None)
            .await
            .map_err(Into::into)
    }

    pub async fn find_all(
        &self,
        filter: impl Into<Option<Document>>,
        sort: Option<Document>,
    ) -> Result<Vec<T>, Error> {
        let mut options = FindOptions::default();
        options.sort = sort;

        let mut cursor = self.find(filter, options).await?;

        let mut docs = vec![];
        while cursor.advance().await? {
            docs.push(cursor.deserialize_current()?);
        }

        Ok(docs)
    }

    pub async fn delete_one_by_id(&self, id: ObjectId) -> Result<bool, Error> {
        self.delete_one(doc! { "_id": id }, None)
            .await
            .map(|it| it.deleted_count > 0)
            .map_err(Into::into)
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(it)) if it.code == DUPLICATE_KEY
    )
}

#[axum::async_trait]
impl UserStore for Collection<UserModel> {
    async fn insert(&self, user: &UserModel) -> Result<(), Error> {
        match self.insert_one(user, None).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => {
                Err(Error::Conflict("Email is already registered".to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<UserModel>, Error> {
        self.find_one_by_id(id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserModel>, Error> {
        self.find_one(doc! { "email": email }, None)
            .await
            .map_err(Into::into)
    }

    async fn email_exists(&self, email: &str) -> Result<bool, Error> {
        self.count_documents(doc! { "email": email }, None)
            .await
            .map(|count| count > 0)
            .map_err(Into::into)
    }

    async fn find_by_role(&self, role: Role) -> Result<Vec<UserModel>, Error> {
        self.find_all(doc! { "role": role.as_str() }, None).await
    }

    async fn find_doctors_by_name(
        &self,
        first_name: &str,
        last_name: &str,
        department: &str,
    ) -> Result<Vec<UserModel>, Error> {
        self.find_all(
            doc! {
                "role": Role::Doctor.as_str(),
                "first_name": first_name,
                "last_name": last_name,
                "doctor_department": department,
            },
            None,
        )
        .await
    }
}

#[axum::async_trait]
impl AppointmentStore for Collection<AppointmentModel> {
    async fn insert(&self, appointment: &AppointmentModel) -> Result<(), Error> {
        self.insert_one(appointment, None)
            .await
            .map(|_| ())
            .map_err(Into::into)
    }

    async fn find_all(&self) -> Result<Vec<AppointmentModel>, Error> {
        Collection::find_all(self, None, Some(doc! { "created_at": -1 })).await
    }

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<AppointmentModel>, Error> {
        self.find_one_by_id(id).await
    }

    async fn update_status(
        &self,
        id: ObjectId,
        status: AppointmentStatus,
    ) -> Result<Option<AppointmentModel>, Error> {
        self.find_one_and_update(
            doc! { "_id": id },
            doc! { "$set": { "status": status.as_str() } },
            FindOneAndUpdateOptions::builder()
                .return_document(ReturnDocument::After)
                .build(),
        )
        .await
        .map_err(Into::into)
    }

    async fn delete(&self, id: ObjectId) -> Result<bool, Error> {
        self.delete_one_by_id(id).await
    }
}

#[axum::async_trait]
impl MessageStore for Collection<MessageModel> {
    async fn insert(&self, message: &MessageModel) -> Result<(), Error> {
        self.insert_one(message, None)
            .await
            .map(|_| ())
            .map_err(Into::into)
    }

    async fn find_all(&self) -> Result<Vec<MessageModel>, Error> {
        Collection::find_all(self, None, Some(doc! { "created_at": -1 })).await
    }
}

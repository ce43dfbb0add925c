//! Persistence seams. Each collection is a trait so handlers run unchanged
//! against MongoDB ([`crate::mongo_ext::Collection`]) or the in-memory
//! backend in [`memory`].

use std::sync::Arc;

use bson::oid::ObjectId;

use crate::{
    api::{
        appointment::{AppointmentModel, AppointmentStatus},
        message::MessageModel,
        user::{Role, UserModel},
    },
    error::Error,
};

pub mod memory;

#[axum::async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with [`Error::Conflict`] when the email is already registered.
    async fn insert(&self, user: &UserModel) -> Result<(), Error>;

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<UserModel>, Error>;

    /// Emails are unique across roles, so this yields at most one user.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserModel>, Error>;

    async fn email_exists(&self, email: &str) -> Result<bool, Error>;

    async fn find_by_role(&self, role: Role) -> Result<Vec<UserModel>, Error>;

    async fn find_doctors_by_name(
        &self,
        first_name: &str,
        last_name: &str,
        department: &str,
    ) -> Result<Vec<UserModel>, Error>;
}

#[axum::async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn insert(&self, appointment: &AppointmentModel) -> Result<(), Error>;

    /// Newest first.
    async fn find_all(&self) -> Result<Vec<AppointmentModel>, Error>;

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<AppointmentModel>, Error>;

    /// Returns the updated record, or `None` if no appointment has this id.
    async fn update_status(
        &self,
        id: ObjectId,
        status: AppointmentStatus,
    ) -> Result<Option<AppointmentModel>, Error>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: ObjectId) -> Result<bool, Error>;
}

#[axum::async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, message: &MessageModel) -> Result<(), Error>;

    /// Newest first.
    async fn find_all(&self) -> Result<Vec<MessageModel>, Error>;
}

macro_rules! store_handle {
    ($name:ident, $store:ident) => {
        #[derive(Clone)]
        pub struct $name(pub Arc<dyn $store>);

        impl $name {
            pub fn new(store: impl $store + 'static) -> Self {
                Self(Arc::new(store))
            }
        }

        impl std::ops::Deref for $name {
            type Target = dyn $store;

            fn deref(&self) -> &Self::Target {
                self.0.as_ref()
            }
        }
    };
}

store_handle!(UserCollection, UserStore);
store_handle!(AppointmentCollection, AppointmentStore);
store_handle!(MessageCollection, MessageStore);

use std::sync::Arc;

use bson::oid::ObjectId;
use tokio::sync::RwLock;

use crate::{
    api::{
        appointment::{AppointmentModel, AppointmentStatus},
        message::MessageModel,
        user::{Role, UserModel},
    },
    error::Error,
};

use super::{AppointmentStore, MessageStore, UserStore};

/// Process-local collection, used when no `MONGO_URI` is configured.
pub struct MemoryCollection<T> {
    docs: Arc<RwLock<Vec<T>>>,
}

impl<T> Default for MemoryCollection<T> {
    fn default() -> Self {
        Self {
            docs: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl<T> Clone for MemoryCollection<T> {
    fn clone(&self) -> Self {
        Self {
            docs: self.docs.clone(),
        }
    }
}

impl<T: Clone> MemoryCollection<T> {
    async fn filtered(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        self.docs
            .read()
            .await
            .iter()
            .filter(|it| predicate(it))
            .cloned()
            .collect()
    }

    async fn newest_first(&self, created_at: impl Fn(&T) -> bson::DateTime) -> Vec<T> {
        let mut docs: Vec<T> = self.docs.read().await.iter().rev().cloned().collect();
        docs.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
        docs
    }
}

#[axum::async_trait]
impl UserStore for MemoryCollection<UserModel> {
    async fn insert(&self, user: &UserModel) -> Result<(), Error> {
        let mut docs = self.docs.write().await;

        if docs.iter().any(|it| it.email == user.email) {
            return Err(Error::Conflict("Email is already registered".to_string()));
        }

        docs.push(user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<UserModel>, Error> {
        Ok(self.filtered(|it| it.id == id).await.into_iter().next())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserModel>, Error> {
        Ok(self.filtered(|it| it.email == email).await.into_iter().next())
    }

    async fn email_exists(&self, email: &str) -> Result<bool, Error> {
        Ok(self.docs.read().await.iter().any(|it| it.email == email))
    }

    async fn find_by_role(&self, role: Role) -> Result<Vec<UserModel>, Error> {
        Ok(self.filtered(|it| it.role == role).await)
    }

    async fn find_doctors_by_name(
        &self,
        first_name: &str,
        last_name: &str,
        department: &str,
    ) -> Result<Vec<UserModel>, Error> {
        Ok(self
            .filtered(|it| {
                it.role == Role::Doctor
                    && it.first_name == first_name
                    && it.last_name == last_name
                    && it.doctor_department.as_deref() == Some(department)
            })
            .await)
    }
}

#[axum::async_trait]
impl AppointmentStore for MemoryCollection<AppointmentModel> {
    async fn insert(&self, appointment: &AppointmentModel) -> Result<(), Error> {
        self.docs.write().await.push(appointment.clone());
        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<AppointmentModel>, Error> {
        Ok(self.newest_first(|it| it.created_at).await)
    }

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<AppointmentModel>, Error> {
        Ok(self.filtered(|it| it.id == id).await.into_iter().next())
    }

    async fn update_status(
        &self,
        id: ObjectId,
        status: AppointmentStatus,
    ) -> Result<Option<AppointmentModel>, Error> {
        let mut docs = self.docs.write().await;

        Ok(docs.iter_mut().find(|it| it.id == id).map(|it| {
            it.status = status;
            it.clone()
        }))
    }

    async fn delete(&self, id: ObjectId) -> Result<bool, Error> {
        let mut docs = self.docs.write().await;
        let before = docs.len();
        docs.retain(|it| it.id != id);

        Ok(docs.len() != before)
    }
}

#[axum::async_trait]
impl MessageStore for MemoryCollection<MessageModel> {
    async fn insert(&self, message: &MessageModel) -> Result<(), Error> {
        self.docs.write().await.push(message.clone());
        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<MessageModel>, Error> {
        Ok(self.newest_first(|it| it.created_at).await)
    }
}

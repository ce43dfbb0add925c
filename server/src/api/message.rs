use axum::{extract::State, Json};
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    error::Error,
    store::MessageCollection,
    util::{now, validate_phone, FormattedDateTime, JsonBody, ObjectIdString},
};

use super::{session::RequireAdmin, MessageResponse};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MessageModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub message: String,

    pub created_at: bson::DateTime,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: ObjectIdString,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub message: String,
    pub created_at: FormattedDateTime,
}

impl From<MessageModel> for Message {
    fn from(value: MessageModel) -> Self {
        Self {
            id: value.id.into(),
            first_name: value.first_name,
            last_name: value.last_name,
            email: value.email,
            phone: value.phone,
            message: value.message,
            created_at: value.created_at.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MessageList {
    pub success: bool,
    pub messages: Vec<Message>,
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[validate(length(min = 3, max = 64))]
    pub first_name: String,

    #[validate(length(min = 3, max = 64))]
    pub last_name: String,

    #[validate(email)]
    pub email: String,

    #[validate(custom = "validate_phone")]
    pub phone: String,

    #[validate(length(min = 10, max = 2000))]
    pub message: String,
}

#[tracing::instrument(skip_all, fields(email = %request.email))]
pub async fn send_message(
    State(messages): State<MessageCollection>,
    JsonBody(request): JsonBody<SendMessageRequest>,
) -> Result<Json<MessageResponse>, Error> {
    request.validate()?;

    let model = MessageModel {
        id: ObjectId::new(),
        first_name: request.first_name,
        last_name: request.last_name,
        email: request.email,
        phone: request.phone,
        message: request.message,
        created_at: now(),
    };
    messages.insert(&model).await?;

    tracing::debug!("stored message {}", model.id);

    Ok(Json(MessageResponse::new("Message sent")))
}

pub async fn list_messages(
    State(messages): State<MessageCollection>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<MessageList>, Error> {
    let messages = messages.find_all().await?;

    Ok(Json(MessageList {
        success: true,
        messages: messages.into_iter().map(Into::into).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use crate::api::tests::bootstrap;

    use super::*;

    fn request(message: &str) -> SendMessageRequest {
        SendMessageRequest {
            first_name: "Alice".to_string(),
            last_name: "Liddell".to_string(),
            email: "alice@example.com".to_string(),
            phone: "08123456789".to_string(),
            message: message.to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_and_list() {
        let bootstrap = bootstrap().await;

        send_message(bootstrap.messages(), JsonBody(request("First question here")))
            .await
            .unwrap();
        send_message(bootstrap.messages(), JsonBody(request("Second question here")))
            .await
            .unwrap();

        let Json(list) = list_messages(bootstrap.messages(), RequireAdmin(bootstrap.admin.clone()))
            .await
            .unwrap();

        let texts: Vec<_> = list.messages.iter().map(|it| it.message.as_str()).collect();
        assert_eq!(texts, vec!["Second question here", "First question here"]);
    }

    #[tokio::test]
    async fn test_send_validation() {
        let bootstrap = bootstrap().await;

        let err = send_message(bootstrap.messages(), JsonBody(request("too short")))
            .await
            .unwrap_err();
        assert_matches!(err, Error::ValidationError(_));

        let mut bad_email = request("A long enough message");
        bad_email.email = "alice".to_string();
        let err = send_message(bootstrap.messages(), JsonBody(bad_email))
            .await
            .unwrap_err();
        assert_matches!(err, Error::ValidationError(_));

        assert!(bootstrap.app_state.messages.find_all().await.unwrap().is_empty());
    }
}

use serde::{Deserialize, Serialize};

pub mod appointment;
pub mod auth;
pub mod doctor;
pub mod message;
pub mod session;
pub mod token;
pub mod user;

/// Body of endpoints that only acknowledge.
#[derive(Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

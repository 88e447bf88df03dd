use serde::{Deserialize, Serialize};

/// Request body for `POST /api/1.0/users`.
///
/// Missing and `null` fields both deserialize to `None`. Any other key, such as
/// a client-supplied `inactive`, is ignored.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RegistrationRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Registration values after trimming and lower-casing username and email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

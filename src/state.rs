use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub type Tx = broadcast::Sender<ChatMessage>;

/* ------------ sender roles ------------ */
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    Admin,
    #[default]
    Alumno,
    Coach,
}

/* ------------ chat payloads ----------- */
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Attachment {
    pub id:   String,
    pub name: String,
    pub mime: String,
    pub size: u64,      // declared bytes, counted toward the per-message ceiling
    pub data: String,   // base64 body
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id:        String,
    pub room:      String,
    pub sender:    SenderRole,
    pub text:      String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

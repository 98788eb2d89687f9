use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default)]
pub struct Attachment {
    pub filename: Option<String>,
    pub mime_type: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct InboundMessage {
    pub from: Option<String>,
    pub body: String,
    pub attachment: Option<Attachment>,
}

impl InboundMessage {
    pub fn text(body: &str) -> Self {
        Self {
            body: body.to_string(),
            ..Default::default()
        }
    }

    pub fn sender(&self) -> &str {
        self.from.as_deref().unwrap_or("unknown")
    }
}

#[derive(Deserialize)]
pub struct WebhookMessage {
    #[serde(default)]
    pub from: Option<String>,
    pub body: String,
    #[serde(default)]
    pub attachment: Option<WebhookAttachment>,
}

#[derive(Deserialize)]
pub struct WebhookAttachment {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    pub data: String,
}

impl TryFrom<WebhookMessage> for InboundMessage {
    type Error = base64::DecodeError;

    fn try_from(message: WebhookMessage) -> Result<Self, Self::Error> {
        let attachment = match message.attachment {
            Some(a) => Some(Attachment {
                filename: a.filename,
                mime_type: a.mime_type,
                data: STANDARD.decode(a.data.trim())?,
            }),
            None => None,
        };
        Ok(InboundMessage {
            from: message.from,
            body: message.body,
            attachment,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookReply {
    pub replies: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_base64_attachment() {
        let message: WebhookMessage = serde_json::from_str(
            r#"{"from":"+100","body":"UPLOAD a.txt to /Reports","attachment":{"filename":"a.txt","data":"aGVsbG8="}}"#,
        )
        .unwrap();
        let inbound = InboundMessage::try_from(message).unwrap();
        let attachment = inbound.attachment.unwrap();
        assert_eq!(attachment.data, b"hello");
        assert_eq!(attachment.filename.as_deref(), Some("a.txt"));
        assert_eq!(inbound.from.as_deref(), Some("+100"));
    }

    #[test]
    fn test_rejects_invalid_base64() {
        let message: WebhookMessage =
            serde_json::from_str(r#"{"body":"UPLOAD a to /","attachment":{"data":"***"}}"#).unwrap();
        assert!(InboundMessage::try_from(message).is_err());
    }
}

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::TryStreamExt;
use log::error;
use serde_json::json;

use crate::assistant::{Assistant, GENERIC_FAILURE};
use crate::payload::{Attachment, InboundMessage, WebhookMessage, WebhookReply};

pub async fn webhook_router(
    data: web::Data<Assistant>,
    payload: web::Either<web::Json<WebhookMessage>, Multipart>,
) -> Result<HttpResponse, actix_web::Error> {
    let message = match payload {
        web::Either::Left(json) => InboundMessage::try_from(json.into_inner())
            .map_err(actix_web::error::ErrorBadRequest)?,
        web::Either::Right(multipart) => read_multipart(multipart).await?,
    };

    let replies = match data.handle_message(message).await {
        Ok(replies) => replies,
        Err(e) => {
            error!("Error handling message: {:#}", e);
            vec![GENERIC_FAILURE.to_string()]
        }
    };

    Ok(HttpResponse::Ok().json(WebhookReply { replies }))
}

pub async fn health(data: web::Data<Assistant>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "storage": data.storage_name(),
    }))
}

async fn read_multipart(mut payload: Multipart) -> Result<InboundMessage, actix_web::Error> {
    let mut message = InboundMessage::default();
    let mut attachment: Option<Attachment> = None;

    // Process multipart form fields
    while let Some(mut field) = payload.try_next().await? {
        let content_disposition = field.content_disposition().clone();

        match content_disposition.get_name() {
            Some("body") => message.body = read_text(&mut field).await?,
            Some("from") => message.from = Some(read_text(&mut field).await?),
            Some("file") => {
                // Parts without a Content-Type come through as octet-stream
                let mime_type = Some(field.content_type().essence_str().to_string())
                    .filter(|m| m != "application/octet-stream");
                let mut data = Vec::new();
                while let Some(chunk) = field.try_next().await? {
                    data.extend_from_slice(&chunk);
                }
                attachment = Some(Attachment {
                    filename: content_disposition.get_filename().map(str::to_string),
                    mime_type,
                    data,
                });
            }
            _ => continue,
        }
    }

    if message.body.is_empty() {
        return Err(actix_web::error::ErrorBadRequest("Missing message body"));
    }
    message.attachment = attachment.filter(|a| !a.data.is_empty());
    Ok(message)
}

async fn read_text(field: &mut actix_multipart::Field) -> Result<String, actix_web::Error> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.try_next().await? {
        bytes.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::{AssistantAppConfig, AssistantAppExt};
    use crate::assistant::MISSING_ATTACHMENT;
    use crate::storages::memory::{Call, MemoryDrive, ROOT};
    use crate::summary::tests::ScriptedSummarizer;
    use actix_web::http::{header, StatusCode};
    use actix_web::{test, App};
    use std::sync::Arc;

    const BOUNDARY: &str = "chat-bridge-boundary";

    fn drive() -> Arc<MemoryDrive> {
        let drive = MemoryDrive::new();
        drive
            .add_folder("F1", "Reports", ROOT)
            .add_file("X1", "a.txt", "F1", "text/plain");
        Arc::new(drive)
    }

    fn app_config() -> AssistantAppConfig {
        app_config_with(drive())
    }

    fn app_config_with(drive: Arc<MemoryDrive>) -> AssistantAppConfig {
        let assistant = Assistant::new(
            Some(drive),
            Arc::new(ScriptedSummarizer::default()),
            500,
            std::env::temp_dir(),
        );
        AssistantAppConfig::new(Arc::new(assistant))
    }

    #[actix_web::test]
    async fn test_webhook_json() {
        let app = test::init_service(App::new().configure_assistant(app_config())).await;

        let req = test::TestRequest::post()
            .uri("/webhook")
            .set_json(json!({ "from": "+15550100", "body": "LIST /Reports" }))
            .to_request();
        let reply: WebhookReply = test::call_and_read_body_json(&app, req).await;
        assert_eq!(reply.replies.len(), 1);
        assert!(reply.replies[0].contains("1. a.txt"));

        let req = test::TestRequest::post()
            .uri("/webhook")
            .set_json(json!({ "body": "thanks!" }))
            .to_request();
        let reply: WebhookReply = test::call_and_read_body_json(&app, req).await;
        assert!(reply.replies.is_empty());
    }

    // (name, filename, content type, data)
    fn multipart_body(parts: &[(&str, Option<&str>, Option<&str>, &str)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, content_type, data) in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            let disposition = match filename {
                Some(f) => format!("form-data; name=\"{}\"; filename=\"{}\"", name, f),
                None => format!("form-data; name=\"{}\"", name),
            };
            body.extend_from_slice(format!("Content-Disposition: {}\r\n", disposition).as_bytes());
            if let Some(ct) = content_type {
                body.extend_from_slice(format!("Content-Type: {}\r\n", ct).as_bytes());
            }
            body.extend_from_slice(b"\r\n");
            body.extend_from_slice(data.as_bytes());
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn multipart_request(body: Vec<u8>) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/webhook")
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            ))
            .set_payload(body)
    }

    #[actix_web::test]
    async fn test_webhook_multipart_upload() {
        let drive = drive();
        let app =
            test::init_service(App::new().configure_assistant(app_config_with(drive.clone()))).await;

        let body = multipart_body(&[
            ("from", None, None, "+15550100"),
            ("body", None, None, "UPLOAD r.pdf to /Reports"),
            ("file", Some("r.pdf"), None, "%PDF-1"),
        ]);
        let req = multipart_request(body).to_request();
        let reply: WebhookReply = test::call_and_read_body_json(&app, req).await;
        assert_eq!(reply.replies.len(), 1);
        assert!(reply.replies[0].starts_with("✅ Successfully uploaded \"r.pdf\" to \"/Reports\"."));
        assert!(drive.calls().contains(&Call::CreateFile {
            name: "r.pdf".to_string(),
            parent_id: "F1".to_string(),
            mime_type: "application/pdf".to_string(),
            size: 6,
        }));
    }

    #[actix_web::test]
    async fn test_webhook_multipart_declared_type() {
        let drive = drive();
        let app =
            test::init_service(App::new().configure_assistant(app_config_with(drive.clone()))).await;

        let body = multipart_body(&[
            ("body", None, None, "UPLOAD notes to /Reports"),
            ("file", Some("notes"), Some("text/markdown"), "# Notes"),
        ]);
        let resp = test::call_service(&app, multipart_request(body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(drive.calls().contains(&Call::CreateFile {
            name: "notes".to_string(),
            parent_id: "F1".to_string(),
            mime_type: "text/markdown".to_string(),
            size: 7,
        }));
    }

    #[actix_web::test]
    async fn test_webhook_multipart_empty_file_is_no_attachment() {
        let drive = drive();
        let app =
            test::init_service(App::new().configure_assistant(app_config_with(drive.clone()))).await;

        let body = multipart_body(&[
            ("body", None, None, "UPLOAD r.pdf to /Reports"),
            ("file", Some("r.pdf"), Some("application/pdf"), ""),
        ]);
        let req = multipart_request(body).to_request();
        let reply: WebhookReply = test::call_and_read_body_json(&app, req).await;
        assert_eq!(reply.replies, vec![MISSING_ATTACHMENT.to_string()]);
        assert!(!drive
            .calls()
            .iter()
            .any(|c| matches!(c, Call::CreateFile { .. })));
    }

    #[actix_web::test]
    async fn test_webhook_multipart_requires_body() {
        let app = test::init_service(App::new().configure_assistant(app_config())).await;

        let body = multipart_body(&[
            ("from", None, None, "+15550100"),
            ("file", Some("r.pdf"), None, "%PDF-1"),
        ]);
        let resp = test::call_service(&app, multipart_request(body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_webhook_rejects_bad_attachment() {
        let app = test::init_service(App::new().configure_assistant(app_config())).await;

        let req = test::TestRequest::post()
            .uri("/webhook")
            .set_json(json!({
                "body": "UPLOAD a.txt to /Reports",
                "attachment": { "data": "not base64!" }
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_health_reports_backend() {
        let app = test::init_service(
            App::new().configure_assistant(app_config().with_webhook_path("/hooks/chat")),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["storage"], "memory");

        let req = test::TestRequest::post()
            .uri("/hooks/chat")
            .set_json(json!({ "body": "help" }))
            .to_request();
        let reply: WebhookReply = test::call_and_read_body_json(&app, req).await;
        assert_eq!(reply.replies.len(), 1);
    }
}

//! Webhook-backed impersonation endpoint.
//!
//! Sends go through serenity's `execute`; edits are a direct `PATCH` on the
//! webhook's message endpoint so the custom identity and the existing
//! attachments of the copy stay as they are.

use std::sync::Arc;

use {
    async_trait::async_trait,
    mirror_channels::{AllowedMentions, ImpersonationEndpoint, OutboundPayload, Persona},
    mirror_common::{MessageId, MessageRef},
    serde_json::{Value, json},
    serenity::all::{
        self as discord, CreateAllowedMentions, CreateWebhook, ExecuteWebhook, Http, Webhook,
    },
    tracing::{debug, info},
};

use crate::{
    Error, Result,
    channel::download_files,
    convert::{create_embed, message_ref},
};

pub struct DiscordWebhook {
    http: Arc<Http>,
    client: reqwest::Client,
    webhook: Webhook,
    /// Execution URL, token included.
    url: String,
    /// Set when the destination is a thread of the webhook's channel.
    thread_id: Option<discord::ChannelId>,
}

impl DiscordWebhook {
    /// Reuse the webhook named `name` on `channel`, or create it.
    ///
    /// Webhooks without a token (created by another application) cannot be
    /// executed and are skipped.
    pub async fn acquire(
        http: Arc<Http>,
        client: reqwest::Client,
        channel: discord::ChannelId,
        thread_id: Option<discord::ChannelId>,
        name: &str,
    ) -> Result<Self> {
        let existing = channel
            .webhooks(&http)
            .await?
            .into_iter()
            .find(|w| w.name.as_deref() == Some(name) && w.token.is_some());

        let webhook = match existing {
            Some(webhook) => {
                debug!(channel = %channel, webhook = %webhook.id, "reusing webhook");
                webhook
            },
            None => {
                info!(channel = %channel, name, "creating webhook");
                channel
                    .create_webhook(&http, CreateWebhook::new(name))
                    .await?
            },
        };
        let url = webhook.url()?;

        Ok(Self {
            http,
            client,
            webhook,
            url,
            thread_id,
        })
    }

    async fn execute(&self, payload: &OutboundPayload, persona: &Persona) -> Result<MessageRef> {
        let mut builder = ExecuteWebhook::new()
            .username(&persona.username)
            .embeds(payload.embeds.iter().map(create_embed).collect())
            .add_files(download_files(&self.http, &payload.files).await?);
        if !payload.content.is_empty() {
            builder = builder.content(&payload.content);
        }
        if let Some(avatar) = &persona.avatar_url {
            builder = builder.avatar_url(avatar);
        }
        if let Some(thread) = self.thread_id {
            builder = builder.in_thread(thread);
        }
        if payload.allowed_mentions == AllowedMentions::None {
            builder = builder.allowed_mentions(CreateAllowedMentions::new());
        }

        let sent = self
            .webhook
            .execute(&self.http, true, builder)
            .await?
            .ok_or_else(|| Error::message("webhook execution returned no message"))?;
        Ok(message_ref(&sent))
    }
}

#[async_trait]
impl ImpersonationEndpoint for DiscordWebhook {
    async fn send(
        &self,
        payload: &OutboundPayload,
        persona: &Persona,
    ) -> mirror_channels::Result<MessageRef> {
        Ok(self.execute(payload, persona).await?)
    }

    async fn edit(
        &self,
        target: &MessageRef,
        payload: &OutboundPayload,
    ) -> mirror_channels::Result<()> {
        patch_message(
            &self.client,
            &self.url,
            self.thread_id.map(|t| t.get()),
            target.id,
            payload,
        )
        .await?;
        Ok(())
    }
}

/// JSON body of a webhook message edit.
#[must_use]
pub fn edit_body(payload: &OutboundPayload) -> Value {
    let mut body = json!({
        "content": payload.content,
        "embeds": payload.embeds,
    });
    if payload.allowed_mentions == AllowedMentions::None {
        body["allowed_mentions"] = json!({ "parse": [] });
    }
    body
}

/// `PATCH {webhook_url}/messages/{id}`. Any non-2xx status is an error.
pub async fn patch_message(
    client: &reqwest::Client,
    webhook_url: &str,
    thread_id: Option<u64>,
    message_id: MessageId,
    payload: &OutboundPayload,
) -> Result<()> {
    let mut url = format!(
        "{}/messages/{message_id}",
        webhook_url.trim_end_matches('/')
    );
    if let Some(thread) = thread_id {
        url.push_str(&format!("?thread_id={thread}"));
    }

    let response = client.patch(url).json(&edit_body(payload)).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Api {
            status: status.as_u16(),
            body,
        });
    }
    debug!(message_id = %message_id, "webhook message edited");
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use {
        axum::{Json, Router, extract::State, http::StatusCode, http::Uri, routing::patch},
        mirror_common::Embed,
        tokio::sync::oneshot,
    };

    use super::*;

    #[derive(Debug, Clone)]
    struct CapturedEdit {
        path: String,
        query: Option<String>,
        body: Value,
    }

    #[derive(Clone)]
    struct MockWebhookApi {
        requests: Arc<Mutex<Vec<CapturedEdit>>>,
        status: StatusCode,
    }

    async fn edit_handler(
        State(state): State<MockWebhookApi>,
        uri: Uri,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        state.requests.lock().expect("lock requests").push(CapturedEdit {
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            body,
        });
        (state.status, Json(json!({ "id": "1" })))
    }

    async fn start_mock(status: StatusCode) -> (String, MockWebhookApi, oneshot::Sender<()>) {
        let mock = MockWebhookApi {
            requests: Arc::new(Mutex::new(Vec::new())),
            status,
        };
        let app = Router::new()
            .route("/{*path}", patch(edit_handler))
            .with_state(mock.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock webhook api");
        let addr = listener.local_addr().expect("mock api addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("serve mock webhook api");
        });

        (
            format!("http://{addr}/api/webhooks/10/secret-token"),
            mock,
            shutdown_tx,
        )
    }

    fn payload() -> OutboundPayload {
        OutboundPayload {
            content: "edited text".into(),
            embeds: vec![Embed {
                title: Some("Forwarded message:".into()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn edit_patches_webhook_message() {
        let (url, mock, shutdown) = start_mock(StatusCode::OK).await;

        patch_message(&reqwest::Client::new(), &url, None, MessageId(55), &payload())
            .await
            .expect("edit succeeds");

        let requests = mock.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/api/webhooks/10/secret-token/messages/55");
        assert_eq!(requests[0].query, None);
        assert_eq!(
            requests[0].body,
            json!({
                "content": "edited text",
                "embeds": [{ "title": "Forwarded message:" }],
                "allowed_mentions": { "parse": [] },
            })
        );
        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn edit_in_thread_passes_thread_id() {
        let (url, mock, shutdown) = start_mock(StatusCode::OK).await;

        patch_message(&reqwest::Client::new(), &url, Some(77), MessageId(55), &payload())
            .await
            .expect("edit succeeds");

        let requests = mock.requests.lock().unwrap().clone();
        assert_eq!(requests[0].query.as_deref(), Some("thread_id=77"));
        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let (url, _mock, shutdown) = start_mock(StatusCode::NOT_FOUND).await;

        let err = patch_message(&reqwest::Client::new(), &url, None, MessageId(55), &payload())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api { status: 404, .. }));
        let _ = shutdown.send(());
    }

    #[test]
    fn mentions_left_to_platform_omit_allowed_mentions() {
        let body = edit_body(&OutboundPayload {
            content: "@here".into(),
            allowed_mentions: AllowedMentions::PlatformDefault,
            ..Default::default()
        });
        assert!(body.get("allowed_mentions").is_none());
        assert_eq!(body["content"], "@here");
    }
}

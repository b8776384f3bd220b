//! Send or edit a formatted message in one destination.
//!
//! Webhook delivery is tried first when the route asks for it. A failed
//! webhook attempt is retried after a back-off; a send that still fails falls
//! back to the bot account, an edit that still fails is given up.

use std::{sync::Arc, time::Duration};

#[cfg(feature = "metrics")]
use mirror_metrics::{counter, histogram, labels, relay as relay_metrics};
use {
    mirror_channels::{ImpersonationEndpoint, RelayChannel},
    mirror_common::{MessageRef, SourceMessage},
    mirror_config::{RelayConfig, RouteOptions},
    tracing::{debug, error, warn},
};

use crate::{
    Error, Result,
    format::{format, persona},
};

/// Webhook retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure.
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 1,
            backoff: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            retries: config.webhook_retries,
            backoff: Duration::from_secs(config.webhook_retry_backoff_secs),
        }
    }
}

/// Outcome of a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    /// The message now carrying the forwarded content.
    pub sent: MessageRef,
    /// Options actually used. They differ from the route's when delivery fell
    /// back to the bot account, and later edits must follow the same path.
    pub options: RouteOptions,
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Send,
    Edit(MessageRef),
}

impl Mode {
    fn operation(self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Edit(_) => "edit",
        }
    }
}

pub struct DeliveryEngine {
    retry: RetryPolicy,
}

impl Default for DeliveryEngine {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl DeliveryEngine {
    #[must_use]
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Deliver `message` to `destination`, or edit `edit` there when given.
    pub async fn deliver(
        &self,
        destination: &dyn RelayChannel,
        message: &SourceMessage,
        options: &RouteOptions,
        edit: Option<&MessageRef>,
    ) -> Result<Delivered> {
        let mode = edit.map_or(Mode::Send, |target| Mode::Edit(*target));

        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();

        let result = self.deliver_inner(destination, message, options, mode).await;

        #[cfg(feature = "metrics")]
        {
            histogram!(relay_metrics::DELIVERY_DURATION_SECONDS)
                .record(started.elapsed().as_secs_f64());
            if result.is_err() {
                counter!(
                    relay_metrics::RELAY_FAILURES_TOTAL,
                    labels::OPERATION => mode.operation()
                )
                .increment(1);
            }
        }

        result
    }

    async fn deliver_inner(
        &self,
        destination: &dyn RelayChannel,
        message: &SourceMessage,
        options: &RouteOptions,
        mode: Mode,
    ) -> Result<Delivered> {
        if !options.webhook {
            return as_bot(destination, message, options, mode).await;
        }

        match destination.impersonation().await {
            Ok(Some(endpoint)) => {
                match self
                    .via_webhook(&endpoint, destination, message, options, mode)
                    .await
                {
                    Ok(sent) => {
                        return Ok(Delivered {
                            sent,
                            options: options.clone(),
                        });
                    },
                    Err(e) => {
                        if let Mode::Edit(target) = mode {
                            error!(
                                destination = %destination.id(),
                                message_id = %target.id,
                                error = %e,
                                "failed to edit webhook message, skipping this edit"
                            );
                            return Err(Error::delivery(destination.id(), "edit", e));
                        }
                        warn!(
                            destination = %destination.id(),
                            error = %e,
                            "webhook send failed again, sending as the bot"
                        );
                    },
                }
            },
            Ok(None) => warn!(
                destination = %destination.id(),
                "channel has no webhook support, sending as the bot"
            ),
            Err(e) => warn!(
                destination = %destination.id(),
                error = %e,
                "could not obtain a webhook, sending as the bot"
            ),
        }

        #[cfg(feature = "metrics")]
        counter!(relay_metrics::WEBHOOK_FALLBACKS_TOTAL).increment(1);

        let fallback = bot_fallback_options(options);
        as_bot(destination, message, &fallback, mode).await
    }

    async fn via_webhook(
        &self,
        endpoint: &Arc<dyn ImpersonationEndpoint>,
        destination: &dyn RelayChannel,
        message: &SourceMessage,
        options: &RouteOptions,
        mode: Mode,
    ) -> mirror_channels::Result<MessageRef> {
        let payload = format(message, options);
        let persona = persona(message, options);

        let mut attempt = 0;
        loop {
            let result = match mode {
                Mode::Send => endpoint.send(&payload, &persona).await,
                Mode::Edit(target) => endpoint.edit(&target, &payload).await.map(|()| target),
            };

            match result {
                Ok(sent) => {
                    debug!(
                        destination = %destination.id(),
                        message_id = %sent.id,
                        operation = mode.operation(),
                        "delivered via webhook"
                    );
                    #[cfg(feature = "metrics")]
                    if matches!(mode, Mode::Send) {
                        counter!(relay_metrics::MESSAGES_RELAYED_TOTAL, labels::MODE => "webhook")
                            .increment(1);
                    }
                    return Ok(sent);
                },
                Err(e) if attempt < self.retry.retries => {
                    attempt += 1;
                    warn!(
                        destination = %destination.id(),
                        operation = mode.operation(),
                        attempt,
                        backoff_secs = self.retry.backoff.as_secs_f64(),
                        error = %e,
                        "webhook delivery failed, retrying"
                    );
                    tokio::time::sleep(self.retry.backoff).await;
                },
                Err(e) => return Err(e),
            }
        }
    }
}

/// Route options for delivering as the bot after the webhook path failed.
///
/// Authorship would otherwise be lost, so the author embed is switched on,
/// unless the route already names the author in the text or only ever showed
/// the author through a custom webhook name.
#[must_use]
pub fn bot_fallback_options(options: &RouteOptions) -> RouteOptions {
    let include_author_as_embed = !(options.include_author || options.include_author_tag)
        && (options.include_author_as_embed || options.webhook_username.is_none());
    RouteOptions {
        webhook: false,
        include_author_as_embed,
        ..options.clone()
    }
}

async fn as_bot(
    destination: &dyn RelayChannel,
    message: &SourceMessage,
    options: &RouteOptions,
    mode: Mode,
) -> Result<Delivered> {
    let payload = format(message, options);
    let sent = match mode {
        Mode::Send => destination.send(&payload).await,
        Mode::Edit(target) => destination.edit(&target, &payload).await.map(|()| target),
    }
    .map_err(|e| Error::delivery(destination.id(), mode.operation(), e))?;

    debug!(
        destination = %destination.id(),
        message_id = %sent.id,
        operation = mode.operation(),
        "delivered as bot"
    );
    #[cfg(feature = "metrics")]
    if matches!(mode, Mode::Send) {
        counter!(relay_metrics::MESSAGES_RELAYED_TOTAL, labels::MODE => "bot").increment(1);
    }

    Ok(Delivered {
        sent,
        options: options.clone(),
    })
}

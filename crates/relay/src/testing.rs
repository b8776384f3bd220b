//! In-memory channel fakes recording every call, with scripted failures.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

use {
    async_trait::async_trait,
    chrono::{TimeZone, Utc},
    mirror_channels::{
        ChannelResolver, Error, ImpersonationEndpoint, OutboundPayload, Persona, RelayChannel,
        Result,
    },
    mirror_common::{Author, ChannelId, MessageId, MessageKind, MessageRef, SourceMessage, UserId},
};

static NEXT_ID: AtomicU64 = AtomicU64::new(10_000);

fn next_id() -> MessageId {
    MessageId(NEXT_ID.fetch_add(1, Ordering::SeqCst))
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

pub fn author(id: u64, bot: bool) -> Author {
    Author {
        id: UserId(id),
        name: "alice".into(),
        discriminator: Some("0420".into()),
        avatar_url: "https://cdn.example/avatars/alice.png".into(),
        bot,
    }
}

pub fn message(channel: u64, id: u64, content: &str) -> SourceMessage {
    SourceMessage {
        id: MessageId(id),
        channel_id: ChannelId(channel),
        channel_name: "general".into(),
        guild_name: Some("Guild".into()),
        author: author(7, false),
        content: content.into(),
        embeds: Vec::new(),
        attachments: Vec::new(),
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        url: format!("https://chat.example/channels/1/{channel}/{id}"),
        kind: MessageKind::Default,
    }
}

/// Scripted impersonation endpoint.
#[derive(Default)]
pub struct FakeEndpoint {
    pub sent: Mutex<Vec<(OutboundPayload, Persona)>>,
    pub edited: Mutex<Vec<(MessageRef, OutboundPayload)>>,
    /// Number of upcoming calls that fail.
    pub failures: AtomicUsize,
    pub attempts: AtomicUsize,
    channel: Mutex<Option<ChannelId>>,
}

impl FakeEndpoint {
    pub fn failing(times: usize) -> Self {
        Self {
            failures: AtomicUsize::new(times),
            ..Default::default()
        }
    }

    fn attempt(&self) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::unavailable("webhook rejected the request"));
        }
        Ok(())
    }

    pub fn sent(&self) -> Vec<(OutboundPayload, Persona)> {
        lock(&self.sent).clone()
    }

    pub fn edited(&self) -> Vec<(MessageRef, OutboundPayload)> {
        lock(&self.edited).clone()
    }
}

#[async_trait]
impl ImpersonationEndpoint for FakeEndpoint {
    async fn send(&self, payload: &OutboundPayload, persona: &Persona) -> Result<MessageRef> {
        self.attempt()?;
        lock(&self.sent).push((payload.clone(), persona.clone()));
        let channel = lock(&self.channel).unwrap_or(ChannelId(0));
        Ok(MessageRef::new(channel, next_id()))
    }

    async fn edit(&self, target: &MessageRef, payload: &OutboundPayload) -> Result<()> {
        self.attempt()?;
        lock(&self.edited).push((*target, payload.clone()));
        Ok(())
    }
}

/// What [`FakeChannel::impersonation`] hands out.
pub enum Impersonation {
    Unsupported,
    Broken,
    Endpoint(Arc<FakeEndpoint>),
}

/// Recording text channel.
pub struct FakeChannel {
    pub id: ChannelId,
    pub pushes_edits: bool,
    pub sent: Mutex<Vec<OutboundPayload>>,
    pub edited: Mutex<Vec<(MessageRef, OutboundPayload)>>,
    pub deleted: Mutex<Vec<MessageRef>>,
    pub fail_sends: AtomicUsize,
    pub fail_deletes: AtomicUsize,
    pub undeletable: Mutex<HashSet<MessageRef>>,
    /// Newest first.
    pub history: Mutex<Vec<SourceMessage>>,
    pub fetches: AtomicUsize,
    impersonation: Mutex<Impersonation>,
}

impl FakeChannel {
    pub fn new(id: u64) -> Self {
        Self {
            id: ChannelId(id),
            pushes_edits: true,
            sent: Mutex::default(),
            edited: Mutex::default(),
            deleted: Mutex::default(),
            fail_sends: AtomicUsize::new(0),
            fail_deletes: AtomicUsize::new(0),
            undeletable: Mutex::default(),
            history: Mutex::default(),
            fetches: AtomicUsize::new(0),
            impersonation: Mutex::new(Impersonation::Unsupported),
        }
    }

    /// A channel without edit notifications, polled for changes.
    pub fn polled(id: u64) -> Self {
        Self {
            pushes_edits: false,
            ..Self::new(id)
        }
    }

    pub fn with_endpoint(self, endpoint: Arc<FakeEndpoint>) -> Self {
        *lock(&endpoint.channel) = Some(self.id);
        *lock(&self.impersonation) = Impersonation::Endpoint(endpoint);
        self
    }

    pub fn with_broken_endpoint(self) -> Self {
        *lock(&self.impersonation) = Impersonation::Broken;
        self
    }

    pub fn set_history(&self, messages: Vec<SourceMessage>) {
        *lock(&self.history) = messages;
    }

    pub fn sent(&self) -> Vec<OutboundPayload> {
        lock(&self.sent).clone()
    }

    pub fn edited(&self) -> Vec<(MessageRef, OutboundPayload)> {
        lock(&self.edited).clone()
    }

    pub fn deleted(&self) -> Vec<MessageRef> {
        lock(&self.deleted).clone()
    }
}

#[async_trait]
impl RelayChannel for FakeChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn name(&self) -> &str {
        "mirror"
    }

    fn guild_name(&self) -> Option<&str> {
        Some("Guild")
    }

    fn pushes_edits(&self) -> bool {
        self.pushes_edits
    }

    async fn send(&self, payload: &OutboundPayload) -> Result<MessageRef> {
        let remaining = self.fail_sends.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_sends.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::unavailable("missing permissions"));
        }
        lock(&self.sent).push(payload.clone());
        Ok(MessageRef::new(self.id, next_id()))
    }

    async fn edit(&self, target: &MessageRef, payload: &OutboundPayload) -> Result<()> {
        lock(&self.edited).push((*target, payload.clone()));
        Ok(())
    }

    async fn delete(&self, target: &MessageRef) -> Result<()> {
        let remaining = self.fail_deletes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_deletes.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::unavailable("unknown message"));
        }
        lock(&self.deleted).push(*target);
        Ok(())
    }

    async fn is_deletable(&self, target: &MessageRef) -> bool {
        !lock(&self.undeletable).contains(target)
    }

    async fn fetch_recent(
        &self,
        before: Option<MessageId>,
        limit: usize,
    ) -> Result<Vec<SourceMessage>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let history = lock(&self.history);
        let start = match before {
            Some(id) => history
                .iter()
                .position(|m| m.id == id)
                .map_or(history.len(), |i| i + 1),
            None => 0,
        };
        Ok(history.iter().skip(start).take(limit).cloned().collect())
    }

    async fn impersonation(&self) -> Result<Option<Arc<dyn ImpersonationEndpoint>>> {
        match &*lock(&self.impersonation) {
            Impersonation::Unsupported => Ok(None),
            Impersonation::Broken => Err(Error::unavailable("missing manage webhooks permission")),
            Impersonation::Endpoint(endpoint) => {
                Ok(Some(Arc::clone(endpoint) as Arc<dyn ImpersonationEndpoint>))
            },
        }
    }
}

/// Resolver over a fixed set of fakes. Unknown ids are not text channels.
#[derive(Default)]
pub struct FakeResolver {
    channels: HashMap<ChannelId, Arc<FakeChannel>>,
    /// Remaining `Unavailable` answers per id before it resolves.
    outages: Mutex<HashMap<ChannelId, usize>>,
}

impl FakeResolver {
    pub fn with(mut self, channel: Arc<FakeChannel>) -> Self {
        self.channels.insert(channel.id, channel);
        self
    }

    pub fn unavailable_for(self, id: u64, attempts: usize) -> Self {
        lock(&self.outages).insert(ChannelId(id), attempts);
        self
    }
}

#[async_trait]
impl ChannelResolver for FakeResolver {
    async fn resolve(&self, id: ChannelId) -> Result<Arc<dyn RelayChannel>> {
        if let Some(remaining) = lock(&self.outages).get_mut(&id)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(Error::unavailable("gateway timeout"));
        }
        self.channels
            .get(&id)
            .map(|c| Arc::clone(c) as Arc<dyn RelayChannel>)
            .ok_or_else(|| Error::not_text_channel(id))
    }
}

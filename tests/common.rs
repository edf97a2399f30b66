#![allow(clippy::unwrap_used, clippy::panic, dead_code, unreachable_pub)]

use async_trait::async_trait;
use courier_server::adapters::memory::{InMemoryChannelRepository, InMemoryMessageRepository, InMemoryTemplateRepository};
use courier_server::channel_types::{ChannelTypeDefinition, ChannelTypeRegistry, ConfigSchema};
use courier_server::config::DispatchConfig;
use courier_server::domain::{
    Channel, ChannelConfig, ChannelId, CommonSettings, Message, MessageId, Recipient, RecipientType, RenderedContent,
    Template, TemplateId, Variables,
};
use courier_server::services::DispatchService;
use courier_server::storage::{self, ChannelRepository, MessageRepository, StorageError, TemplateRepository};
use courier_server::transport::{ConfigError, SendContext, Transport, TransportError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("courier_server=debug".parse().unwrap())
            .add_directive("sqlx=warn".parse().unwrap())
            .add_directive("tower=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().init();
    });
}

/// What a stub transport does on each `send`.
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    Fail(TransportError),
    /// Fails with a transient error for the first `n` attempts.
    TransientThenSucceed(u32),
    Panic,
    /// Never answers; only a deadline or cancellation ends the attempt.
    Hang,
    /// Soft-deletes the channel in the given repository, then succeeds.
    DeleteWhileSending(Arc<InMemoryChannelRepository>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub channel_id: ChannelId,
    pub recipients: Vec<String>,
    pub content: RenderedContent,
}

#[derive(Debug, Default)]
pub struct SendLog {
    deliveries: Mutex<Vec<Delivery>>,
    attempts: AtomicU32,
}

impl SendLog {
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct StubChannelType {
    name: &'static str,
    behavior: Behavior,
    log: Arc<SendLog>,
}

impl StubChannelType {
    pub fn new(name: &'static str, behavior: Behavior) -> (Arc<Self>, Arc<SendLog>) {
        let log = Arc::new(SendLog::default());
        (Arc::new(Self { name, behavior, log: Arc::clone(&log) }), log)
    }
}

impl ChannelTypeDefinition for StubChannelType {
    fn name(&self) -> &str {
        self.name
    }

    fn display_name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "test double"
    }

    fn validate_config(&self, config: &ChannelConfig) -> Result<(), ConfigError> {
        if config.get("broken").is_some() {
            return Err(ConfigError::new("broken", "rejected by stub"));
        }
        Ok(())
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::default()
    }

    fn create_transport(&self, _timeout: Duration) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(StubTransport { name: self.name, behavior: self.behavior.clone(), log: Arc::clone(&self.log) }))
    }
}

#[derive(Debug)]
struct StubTransport {
    name: &'static str,
    behavior: Behavior,
    log: Arc<SendLog>,
}

impl StubTransport {
    fn record(&self, channel: &Channel, content: &RenderedContent) {
        self.log.deliveries.lock().unwrap().push(Delivery {
            channel_id: channel.id.clone(),
            recipients: channel.recipients.iter().map(|r| r.target.clone()).collect(),
            content: content.clone(),
        });
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&self, ctx: &SendContext, channel: &Channel, content: &RenderedContent) -> Result<(), TransportError> {
        let attempt = self.log.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        match &self.behavior {
            Behavior::Succeed => {
                self.record(channel, content);
                Ok(())
            }
            Behavior::Fail(e) => Err(e.clone()),
            Behavior::TransientThenSucceed(n) if attempt <= *n => {
                Err(TransportError::transient("http_503", "upstream unavailable"))
            }
            Behavior::TransientThenSucceed(_) => {
                self.record(channel, content);
                Ok(())
            }
            Behavior::Panic => panic!("transport exploded"),
            Behavior::Hang => {
                ctx.cancelled().await;
                Err(TransportError::cancelled())
            }
            Behavior::DeleteWhileSending(channels) => {
                let mut stored = channels.get_raw(&channel.id).unwrap();
                stored.soft_delete(1_500);
                channels.update(&stored).await.unwrap();
                self.record(channel, content);
                Ok(())
            }
        }
    }

    fn validate_config(&self, _config: &ChannelConfig) -> Result<(), ConfigError> {
        Ok(())
    }

    fn type_name(&self) -> &str {
        self.name
    }
}

/// Dispatch engine over in-memory repositories and stub channel types.
#[derive(Debug)]
pub struct Harness {
    pub service: DispatchService,
    pub registry: Arc<ChannelTypeRegistry>,
    pub channels: Arc<InMemoryChannelRepository>,
    pub templates: Arc<InMemoryTemplateRepository>,
    pub messages: Arc<InMemoryMessageRepository>,
}

impl Harness {
    pub fn new(types: Vec<Arc<dyn ChannelTypeDefinition>>) -> Self {
        Self::with_channels(types, Arc::new(InMemoryChannelRepository::new()))
    }

    pub fn with_channels(types: Vec<Arc<dyn ChannelTypeDefinition>>, channels: Arc<InMemoryChannelRepository>) -> Self {
        setup_tracing();
        let registry = registry(types);
        let templates = Arc::new(InMemoryTemplateRepository::new());
        let messages = Arc::new(InMemoryMessageRepository::new());
        let service = DispatchService::new(
            Arc::clone(&registry),
            Arc::clone(&channels) as Arc<dyn ChannelRepository>,
            Arc::clone(&templates) as Arc<dyn TemplateRepository>,
            Arc::clone(&messages) as Arc<dyn MessageRepository>,
            dispatch_config(),
        );
        Self { service, registry, channels, templates, messages }
    }

    pub async fn add_channel(&self, channel: Channel) {
        self.channels.create(&channel).await.unwrap();
    }

    pub async fn add_template(&self, template: Template) {
        self.templates.create(&template).await.unwrap();
    }

    pub async fn send(&self, ids: &[&str], variables: Variables) -> Message {
        self.service
            .send_message(&SendContext::default(), ids.iter().map(|id| ChannelId::from(*id)).collect(), variables, Default::default())
            .await
            .unwrap()
    }
}

pub fn registry(types: Vec<Arc<dyn ChannelTypeDefinition>>) -> Arc<ChannelTypeRegistry> {
    let registry = ChannelTypeRegistry::new();
    for t in types {
        registry.register(t).unwrap();
    }
    Arc::new(registry)
}

pub fn dispatch_config() -> DispatchConfig {
    DispatchConfig::default()
}

pub const fn quick_settings() -> CommonSettings {
    CommonSettings { timeout_ms: 5_000, retry_attempts: 0, retry_delay_ms: 0 }
}

pub fn channel(id: &str, channel_type: &str, target: &str) -> Channel {
    Channel::new(ChannelId::from(id), id, channel_type, vec![Recipient::new("u", RecipientType::To, target)], 1_000)
        .with_settings(quick_settings())
}

pub fn template(id: &str, channel_type: &str, subject: &str, body: &str) -> Template {
    Template::new(TemplateId::from(id), id, channel_type, Some(subject.to_string()), body, 1_000)
}

pub fn vars(pairs: &[(&str, &str)]) -> Variables {
    pairs.iter().map(|(k, v)| ((*k).to_string(), serde_json::Value::String((*v).to_string()))).collect()
}

/// Message repository whose writes can be made to fail.
#[derive(Debug, Default)]
pub struct FlakyMessageRepository {
    pub inner: InMemoryMessageRepository,
    pub fail_save: bool,
    pub fail_update: bool,
}

#[async_trait]
impl MessageRepository for FlakyMessageRepository {
    async fn save(&self, message: &Message) -> storage::Result<()> {
        if self.fail_save {
            return Err(StorageError::Conflict("save rejected".into()));
        }
        self.inner.save(message).await
    }

    async fn update(&self, message: &Message) -> storage::Result<()> {
        if self.fail_update {
            return Err(StorageError::Conflict("update rejected".into()));
        }
        self.inner.update(message).await
    }

    async fn find_by_id(&self, id: &MessageId) -> storage::Result<Message> {
        self.inner.find_by_id(id).await
    }
}

/// Channel repository that serves reads but rejects every update.
#[derive(Debug, Default)]
pub struct ReadOnlyChannelRepository {
    pub inner: InMemoryChannelRepository,
}

#[async_trait]
impl ChannelRepository for ReadOnlyChannelRepository {
    async fn find_by_id(&self, id: &ChannelId) -> storage::Result<Channel> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_name(&self, name: &str) -> storage::Result<Channel> {
        self.inner.find_by_name(name).await
    }

    async fn exists_by_name(&self, name: &str) -> storage::Result<bool> {
        self.inner.exists_by_name(name).await
    }

    async fn create(&self, channel: &Channel) -> storage::Result<()> {
        self.inner.create(channel).await
    }

    async fn update(&self, _channel: &Channel) -> storage::Result<()> {
        Err(StorageError::Conflict("channels are read-only".into()))
    }

    async fn mark_as_used(&self, _id: &ChannelId, _now: i64) -> storage::Result<()> {
        Err(StorageError::Conflict("channels are read-only".into()))
    }
}

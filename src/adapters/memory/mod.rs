//! Process-local repositories backed by `DashMap`.
//!
//! Used when no database URL is configured and by the integration tests.

pub mod channel_repo;
pub mod message_repo;
pub mod template_repo;

pub use channel_repo::InMemoryChannelRepository;
pub use message_repo::InMemoryMessageRepository;
pub use template_repo::InMemoryTemplateRepository;

pub mod channel_types;
pub mod messages;

pub mod channel;
pub mod message;
pub mod template;

pub use channel::ChannelRecord;
pub use message::{MessageRecord, MessageResultRecord};
pub use template::TemplateRecord;

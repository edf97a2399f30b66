pub mod channel_validator;
pub mod dispatch;

pub use channel_validator::{ChannelValidator, ValidationError};
pub use dispatch::{DispatchError, DispatchService};

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Opaque identifier of a delivery channel.
    ChannelId
);

string_id!(
    /// Opaque identifier of a template.
    TemplateId
);

string_id!(
    /// Identifier of a dispatched message.
    ///
    /// Generated ids are UUIDv7 strings, so they embed their creation time and
    /// sort by it.
    MessageId
);

impl ChannelId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl TemplateId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl MessageId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Returns the creation timestamp embedded in a generated id, in
    /// milliseconds since the epoch. Ids that are not UUIDv7 yield `None`.
    #[must_use]
    pub fn timestamp_ms(&self) -> Option<i64> {
        let uuid = Uuid::parse_str(&self.0).ok()?;
        let (secs, nanos) = uuid.get_timestamp()?.to_unix();
        let millis = secs.checked_mul(1000)?.checked_add(u64::from(nanos / 1_000_000))?;
        i64::try_from(millis).ok()
    }
}

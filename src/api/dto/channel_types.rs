use crate::channel_types::{ChannelTypeDefinition, ConfigSchema};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelTypeDto {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub config_schema: ConfigSchema,
}

impl From<&dyn ChannelTypeDefinition> for ChannelTypeDto {
    fn from(d: &dyn ChannelTypeDefinition) -> Self {
        Self {
            name: d.name().to_string(),
            display_name: d.display_name().to_string(),
            description: d.description().to_string(),
            config_schema: d.config_schema(),
        }
    }
}

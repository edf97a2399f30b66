use crate::api::AppState;
use crate::api::dto::channel_types::ChannelTypeDto;
use axum::{Json, extract::State, response::IntoResponse};

/// Lists registered channel types with their config schemas, sorted by name.
pub async fn list_channel_types(State(state): State<AppState>) -> impl IntoResponse {
    let types: Vec<ChannelTypeDto> =
        state.dispatch.registry().definitions().iter().map(|d| ChannelTypeDto::from(d.as_ref())).collect();
    Json(types)
}

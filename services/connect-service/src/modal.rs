use axum::{Json, extract::State};
use ck_api_types::{ModalCloseRequest, ModalConfig, ModalSelectRequest, SessionResponse};
use std::sync::Arc;
use tracing::debug;

use crate::{ApiResult, AppState, connect_error, conflict};

pub(crate) async fn session(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    Json(state.shell.describe().await)
}

pub(crate) async fn modal_open(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    state.shell.open().await;
    Json(state.shell.describe().await)
}

/// Runs the full close sequence, including the close delay.
pub(crate) async fn modal_close(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ModalCloseRequest>,
) -> Json<SessionResponse> {
    state.shell.close(request.reset).await;
    Json(state.shell.describe().await)
}

pub(crate) async fn modal_config(State(state): State<Arc<AppState>>) -> Json<ModalConfig> {
    Json(state.shell.modal_config().await)
}

pub(crate) async fn set_modal_config(
    State(state): State<Arc<AppState>>,
    Json(config): Json<ModalConfig>,
) -> Json<ModalConfig> {
    debug!("modal config updated: {:?}", config);
    state.shell.set_modal_config(config).await;
    Json(state.shell.modal_config().await)
}

pub(crate) async fn modal_select(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ModalSelectRequest>,
) -> ApiResult<SessionResponse> {
    state
        .shell
        .select_wallet(&request.wallet_id)
        .await
        .map_err(connect_error)?;
    Ok(Json(state.shell.describe().await))
}

pub(crate) async fn modal_back(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    state.shell.go_back().await;
    Json(state.shell.describe().await)
}

pub(crate) async fn modal_get_started(
    State(state): State<Arc<AppState>>,
) -> ApiResult<SessionResponse> {
    if !state.shell.show_get_started().await {
        return Err(conflict("get started is only reachable from the wallet list"));
    }
    Ok(Json(state.shell.describe().await))
}

use axum::{Json, extract::State};
use ck_api_types::{
    ChainId, ConnectRequest, ConnectResponse, FinalizeRequest, LoginResponse,
    PersonalConnectRequest, SelectionData, SessionResponse, SwitchChainRequest,
};
use ck_connect::{ConnectError, ShellOutcome};
use ck_wallet_core::ConnectOptions;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

use crate::{ApiResult, AppState, auth_error, bad_request, connect_error, internal_error, not_found};

fn connect_options(chain_id: Option<ChainId>, selection: SelectionData) -> ConnectOptions {
    ConnectOptions {
        chain_id,
        selection,
    }
}

/// Connect attempts run on their own task so a dropped request cannot leave
/// the session stuck in `connecting`; only closing the modal cancels them.
async fn run_detached<F>(attempt: F) -> ApiResult<ConnectResponse>
where
    F: Future<Output = Result<ShellOutcome, ConnectError>> + Send + 'static,
{
    let outcome = tokio::spawn(attempt)
        .await
        .map_err(internal_error)?
        .map_err(connect_error)?;

    Ok(Json(ConnectResponse {
        outcome: outcome.name().to_owned(),
        wallet: outcome.wallet().map(|active| active.info()),
    }))
}

pub(crate) async fn connect(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ConnectRequest>,
) -> ApiResult<ConnectResponse> {
    let shell = state.shell.clone();
    let options = connect_options(request.chain_id, request.selection);
    run_detached(async move { shell.connect(&request.wallet_id, options).await }).await
}

pub(crate) async fn connect_personal(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PersonalConnectRequest>,
) -> ApiResult<ConnectResponse> {
    let shell = state.shell.clone();
    let options = connect_options(request.chain_id, request.selection);
    run_detached(async move {
        shell
            .connect_personal(&request.wrapper_id, &request.personal_wallet_id, options)
            .await
    })
    .await
}

pub(crate) async fn connect_finalize(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FinalizeRequest>,
) -> ApiResult<ConnectResponse> {
    let shell = state.shell.clone();
    let options = connect_options(request.chain_id, request.selection);
    run_detached(async move { shell.finalize_wrapper(&request.wrapper_id, options).await }).await
}

pub(crate) async fn disconnect(State(state): State<Arc<AppState>>) -> ApiResult<SessionResponse> {
    if let (Some(auth), Some(active)) = (&state.auth, state.shell.session().active_wallet().await) {
        auth.logout(&active.address).await;
    }
    state.shell.disconnect().await.map_err(connect_error)?;
    Ok(Json(state.shell.describe().await))
}

pub(crate) async fn switch_chain(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SwitchChainRequest>,
) -> ApiResult<SessionResponse> {
    state
        .shell
        .session()
        .switch_chain(request.chain_id)
        .await
        .map_err(connect_error)?;
    Ok(Json(state.shell.describe().await))
}

pub(crate) async fn auth_login(State(state): State<Arc<AppState>>) -> ApiResult<LoginResponse> {
    let auth = state
        .auth
        .as_ref()
        .ok_or_else(|| not_found("wallet login is not configured"))?;
    let active = state
        .shell
        .session()
        .active_wallet()
        .await
        .ok_or_else(|| bad_request("wallet is not connected"))?;

    let token = auth.login(active.wallet.clone()).await.map_err(auth_error)?;
    info!("wallet {} signed in", token.address);
    Ok(Json(LoginResponse {
        address: token.address,
        token: token.token,
        expires_at_epoch_ms: token.expires_at_epoch_ms,
    }))
}

mod config;
mod connect;
mod modal;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use ck_api_types::{ErrorResponse, WalletListEntry};
use ck_auth_adapter::{AuthError, AuthTokenCache, HttpTokenIssuer};
use ck_chain_client::ChainRegistry;
use ck_connect::{ConnectError, ConnectShell, ConnectionSession};
use ck_storage::{InMemoryStorage, RocksDbStorage, WalletStorage};
use ck_wallet_core::{WalletConfig, WalletRegistry};
use ck_wallets::{
    HttpAccountFactory, HttpEmbeddedAuth, HttpSafeService, embedded_wallet_config,
    local_wallet_config, safe_wallet_config, smart_wallet_config,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::ServiceConfig;

const EMBEDDED_CLIENT_ID: &str = "connect-service";
const LOGIN_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Serialize)]
struct HealthResponse {
    service: &'static str,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    service: &'static str,
    version: &'static str,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);
pub(crate) type ApiResult<T> = Result<Json<T>, ApiError>;

pub(crate) struct AppState {
    pub(crate) shell: Arc<ConnectShell>,
    pub(crate) auth: Option<Arc<AuthTokenCache>>,
}

impl AppState {
    fn from_config(config: &ServiceConfig) -> anyhow::Result<Self> {
        let storage: Arc<dyn WalletStorage> = match &config.storage_path {
            Some(path) => Arc::new(RocksDbStorage::open_default(path)?),
            None => Arc::new(InMemoryStorage::new()),
        };

        let mut chains = ChainRegistry::with_defaults();
        if !chains.set_default(config.default_chain_id) {
            anyhow::bail!(
                "CONNECT_DEFAULT_CHAIN_ID {} is not a supported chain",
                config.default_chain_id
            );
        }

        let registry = WalletRegistry::new(wallet_configs(config)?)?;
        info!("registered wallets: {:?}", registry.ids());

        let session = Arc::new(ConnectionSession::new(storage, Arc::new(chains)));
        let shell =
            ConnectShell::modal(Arc::new(registry), session).with_close_delay(config.close_delay);

        let auth = config.auth_url.as_deref().map(|url| {
            Arc::new(AuthTokenCache::new(
                config.login_domain.clone(),
                LOGIN_TOKEN_TTL,
                Arc::new(HttpTokenIssuer::new(url)),
            ))
        });

        Ok(Self {
            shell: Arc::new(shell),
            auth,
        })
    }
}

fn wallet_configs(config: &ServiceConfig) -> anyhow::Result<Vec<WalletConfig>> {
    let mut personal = Vec::new();
    if let Some(secret) = &config.device_secret {
        personal.push(local_wallet_config(secret.clone()));
    }
    if let Some(url) = &config.embedded_auth_url {
        personal.push(embedded_wallet_config(
            EMBEDDED_CLIENT_ID,
            config.login_methods.clone(),
            Arc::new(HttpEmbeddedAuth::new(url)),
        )?);
    }
    if personal.is_empty() {
        anyhow::bail!(
            "no wallets configured; set CONNECT_DEVICE_SECRET or CONNECT_EMBEDDED_AUTH_URL"
        );
    }

    let mut wallets = personal.clone();
    if let Some(url) = &config.account_factory_url {
        let factory =
            HttpAccountFactory::new(Some(url.clone()), config.account_factory_address.clone());
        wallets.push(smart_wallet_config(personal.clone(), Arc::new(factory), true));
    }
    if let Some(url) = &config.safe_service_url {
        wallets.push(safe_wallet_config(personal, Arc::new(HttpSafeService::new(url))));
    }
    Ok(wallets)
}

pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/wallets", get(wallets))
        .route("/session", get(modal::session))
        .route("/modal/open", post(modal::modal_open))
        .route("/modal/close", post(modal::modal_close))
        .route("/modal/config", get(modal::modal_config).put(modal::set_modal_config))
        .route("/modal/select", post(modal::modal_select))
        .route("/modal/back", post(modal::modal_back))
        .route("/modal/get-started", post(modal::modal_get_started))
        .route("/connect", post(connect::connect))
        .route("/connect/personal", post(connect::connect_personal))
        .route("/connect/finalize", post(connect::connect_finalize))
        .route("/disconnect", post(connect::disconnect))
        .route("/chain/switch", post(connect::switch_chain))
        .route("/auth/login", post(connect::auth_login))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServiceConfig::from_env()?;
    let state = Arc::new(AppState::from_config(&config)?);

    match state.shell.auto_connect().await {
        Ok(Some(active)) => info!("restored {} as {}", active.wallet_id(), active.address),
        Ok(None) => {}
        Err(err) => warn!("auto-connect failed: {}", err),
    }
    let _watcher = state.shell.spawn_watcher();

    let app = router(state).layer(CorsLayer::permissive());
    info!("connect-service listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("bind {}", config.bind_addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        service: "connect-service",
        status: "ok",
    })
}

async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        service: "connect-service",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn wallets(State(state): State<Arc<AppState>>) -> Json<Vec<WalletListEntry>> {
    let entries = state
        .shell
        .registry()
        .list()
        .iter()
        .map(|config| WalletListEntry {
            id: config.id.clone(),
            metadata: config.metadata.clone(),
            installed: config.is_installed(),
            wrapper: config.is_wrapper(),
            personal_wallets: config
                .personal_wallets()
                .iter()
                .map(|personal| personal.id.clone())
                .collect(),
        })
        .collect();
    Json(entries)
}

fn error_response(status: StatusCode, message: String, phase: Option<String>) -> ApiError {
    (status, Json(ErrorResponse { error: message, phase }))
}

pub(crate) fn bad_request(message: &str) -> ApiError {
    error_response(StatusCode::BAD_REQUEST, message.to_owned(), None)
}

pub(crate) fn conflict(message: &str) -> ApiError {
    error_response(StatusCode::CONFLICT, message.to_owned(), None)
}

pub(crate) fn not_found(message: &str) -> ApiError {
    error_response(StatusCode::NOT_FOUND, message.to_owned(), None)
}

pub(crate) fn internal_error(err: impl std::fmt::Display) -> ApiError {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string(), None)
}

/// Wallet failures are reported as 502 with their message untouched.
pub(crate) fn connect_error(err: ConnectError) -> ApiError {
    let status = match &err {
        ConnectError::UnknownWallet(_) => StatusCode::NOT_FOUND,
        ConnectError::InProgress | ConnectError::Cancelled | ConnectError::WrapperActive(_) => {
            StatusCode::CONFLICT
        }
        ConnectError::NotConnected
        | ConnectError::UnsupportedChain(_)
        | ConnectError::NotWrapper(_)
        | ConnectError::PersonalWalletRequired(_) => StatusCode::BAD_REQUEST,
        ConnectError::Wallet(_)
        | ConnectError::PersonalWallet(_)
        | ConnectError::WrapperFinalize(_) => StatusCode::BAD_GATEWAY,
        ConnectError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let phase = err.phase().map(|phase| phase.as_str().to_owned());
    error_response(status, err.to_string(), phase)
}

pub(crate) fn auth_error(err: AuthError) -> ApiError {
    match err {
        AuthError::NotConnected => bad_request("wallet is not connected"),
        AuthError::Signing(message) | AuthError::Issuer(message) => {
            error_response(StatusCode::BAD_GATEWAY, message, None)
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use ck_storage::InMemoryStorage;
    use ck_wallet_core::WrapperFlavor;
    use ck_wallet_core::mock::MockFactory;
    use serde_json::Value;
    use tower::ServiceExt;

    pub(crate) struct TestApp {
        pub(crate) router: Router,
        pub(crate) state: Arc<AppState>,
        pub(crate) wallet_a: MockFactory,
    }

    /// Wallets: `wallet-a` (0xABC), `wallet-b` (rejects), `smart` wrapping `wallet-a` (0x123).
    pub(crate) fn test_app(auth: Option<Arc<AuthTokenCache>>) -> anyhow::Result<TestApp> {
        let wallet_a = MockFactory::resolving("wallet-a", "0xABC");
        let wallet_b = MockFactory::rejecting("wallet-b", "User rejected");
        let smart = MockFactory::wrapper("smart", "0x123");
        let registry = WalletRegistry::new(vec![
            wallet_a.config(),
            wallet_b.config(),
            smart.wrapper_config(WrapperFlavor::SmartAccount, vec![wallet_a.config()]),
        ])?;

        let session = Arc::new(ConnectionSession::new(
            Arc::new(InMemoryStorage::new()),
            Arc::new(ChainRegistry::with_defaults()),
        ));
        let shell =
            ConnectShell::modal(Arc::new(registry), session).with_close_delay(Duration::ZERO);
        let state = Arc::new(AppState {
            shell: Arc::new(shell),
            auth,
        });
        Ok(TestApp {
            router: router(state.clone()),
            state,
            wallet_a,
        })
    }

    pub(crate) async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> anyhow::Result<(StatusCode, Value)> {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let response = app.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, value))
    }
}

#![forbid(unsafe_code)]

//! Local HTTP server for the transcript viewer.
//!
//! Serves the library root as static files and exposes a tiny JSON API for
//! per-video flags and deletion. Nothing here is meant for more than one
//! local user.

use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    path::{Component, Path, PathBuf},
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Path as AxumPath, Request, State},
    http::{HeaderMap, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, patch},
};
use clap::Parser;
use log::Level;
use mime_guess::MimeGuess;
use serde_json::{Value, json};
use tokio::{fs::File, net::TcpStream, signal};
use tokio_util::io::ReaderStream;
use tower_http::cors::{Any, CorsLayer};
use transcript_viewer::{
    config::{RuntimeOverrides, resolve_runtime_config},
    library::{DeleteError, Library, is_valid_video_id},
    state::{StateMap, StateStore, StateUpdate},
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Parser)]
#[command(name = "serve", about = "Transcript viewer server with state and delete APIs")]
struct ServeArgs {
    /// Exit 0 if the server is running, 1 otherwise.
    #[arg(long)]
    check: bool,
    /// Library root holding summaries/, metadata/, transcripts/ and audio/.
    #[arg(long)]
    root: Option<PathBuf>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    host: Option<String>,
    /// Dotenv file consulted for TRANSCRIPTS_* settings.
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
struct ServeConfig {
    root: PathBuf,
    addr: SocketAddr,
}

impl ServeArgs {
    fn resolve(self) -> Result<(bool, ServeConfig)> {
        let runtime = resolve_runtime_config(RuntimeOverrides {
            root: self.root,
            port: self.port,
            host: self.host,
            env_path: self.env_file,
        })?;
        let host = parse_host_arg(&runtime.host)?;
        Ok((
            self.check,
            ServeConfig {
                root: runtime.root,
                addr: SocketAddr::new(host, runtime.port),
            },
        ))
    }
}

fn parse_host_arg(value: &str) -> Result<IpAddr> {
    value
        .trim()
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/TRANSCRIPTS_HOST")
}

/// Shared handler state. The store is the single owner of `state.json`.
#[derive(Clone)]
struct AppState {
    library: Arc<Library>,
    store: Arc<StateStore>,
}

impl AppState {
    fn new(root: PathBuf) -> Self {
        let library = Library::new(root);
        let store = StateStore::open(library.state_path());
        Self {
            library: Arc::new(library),
            store: Arc::new(store),
        }
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

impl From<DeleteError> for ApiError {
    fn from(err: DeleteError) -> Self {
        match err {
            DeleteError::State(_) => Self::internal(err.to_string()),
            DeleteError::NotFound(_) | DeleteError::Remove { .. } => {
                Self::not_found(err.to_string())
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (check, config) = ServeArgs::parse().resolve()?;
    let running = is_server_running(config.addr).await;

    if check {
        return Ok(if running {
            println!("Server is running on port {}", config.addr.port());
            ExitCode::SUCCESS
        } else {
            println!("Server is not running on port {}", config.addr.port());
            ExitCode::FAILURE
        });
    }

    if running {
        println!("Server already running on port {}", config.addr.port());
        println!("Visit: http://{}", config.addr);
        return Ok(ExitCode::SUCCESS);
    }

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("binding to {}", config.addr))?;
    println!("Transcript viewer listening on http://{}", config.addr);
    println!("Serving from: {}", config.root.display());

    axum::serve(listener, router(AppState::new(config.root)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running transcript server")?;

    println!("Server stopped.");
    Ok(ExitCode::SUCCESS)
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    // A known path with the wrong method is reported like an unknown route.
    Router::new()
        .route("/api/state", get(get_state).fallback(route_not_found))
        .route("/api/state/{id}", patch(patch_state).fallback(route_not_found))
        .route("/api/state/", patch(missing_video_id).fallback(route_not_found))
        .route("/api/delete/{id}", delete(delete_video).fallback(route_not_found))
        .route("/api/delete/", delete(missing_video_id).fallback(route_not_found))
        .fallback(static_fallback)
        .layer(middleware::from_fn(log_request))
        .layer(cors)
        .with_state(state)
}

async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let response = next.run(req).await;
    let status = response.status();

    if let Some(level) = should_log(&method, status) {
        log::log!(level, "{} {} -> [{}]", method, uri, status);
    }
    response
}

/// Successful reads are silent; mutations and failures are worth a line.
fn should_log(method: &Method, status: StatusCode) -> Option<Level> {
    if status == StatusCode::NOT_FOUND || status.is_server_error() {
        Some(Level::Warn)
    } else if *method == Method::PATCH || *method == Method::DELETE {
        Some(Level::Info)
    } else {
        None
    }
}

/// Connects to loopback when bound to the unspecified address.
async fn is_server_running(addr: SocketAddr) -> bool {
    let target = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port())
        }
        _ => addr,
    };
    matches!(
        tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(target)).await,
        Ok(Ok(_))
    )
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        eprintln!("Failed to install Ctrl+C handler: {}", err);
    }
}

async fn get_state(State(state): State<AppState>) -> Json<StateMap> {
    Json(state.store.load())
}

async fn patch_state(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    ensure_video_id(&id)?;
    let update = StateUpdate::from_body(&body).map_err(|_| ApiError::bad_request("Invalid JSON"))?;
    let record = state
        .store
        .update(&id, &update)
        .map_err(|err| ApiError::internal(format!("{err:#}")))?;
    Ok(Json(json!({ "success": true, "state": record })))
}

/// Deletion rebuilds the viewer inline, so it runs on the blocking pool and
/// the response waits for it.
async fn delete_video(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<Value>> {
    ensure_video_id(&id)?;
    let AppState { library, store } = state;
    let removed = tokio::task::spawn_blocking(move || library.delete_video(&store, &id))
        .await
        .map_err(|err| ApiError::internal(err.to_string()))??;
    Ok(Json(json!({
        "success": true,
        "message": format!("Deleted {} files", removed.len()),
    })))
}

async fn missing_video_id() -> ApiError {
    ApiError::bad_request("Invalid video ID")
}

fn ensure_video_id(id: &str) -> ApiResult<()> {
    if is_valid_video_id(id) {
        Ok(())
    } else {
        Err(ApiError::bad_request("Invalid video ID"))
    }
}

async fn route_not_found() -> ApiError {
    ApiError::not_found("Not found")
}

async fn static_fallback(State(state): State<AppState>, req: Request) -> Response {
    let path = req.uri().path();
    if !matches!(*req.method(), Method::GET | Method::HEAD)
        || path == "/api"
        || path.starts_with("/api/")
    {
        return route_not_found().await.into_response();
    }

    match serve_root_path(state.library.root(), path).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn serve_root_path(root: &Path, request_path: &str) -> ApiResult<Response> {
    let target = resolve_root_path(root, request_path)?;
    match tokio::fs::metadata(&target).await {
        Ok(meta) if meta.is_dir() => stream_file(target.join("index.html")).await,
        Ok(_) => stream_file(target).await,
        Err(_) => Err(ApiError::not_found("file not found")),
    }
}

/// Maps a URL path onto the root, refusing anything that could escape it.
fn resolve_root_path(root: &Path, request_path: &str) -> ApiResult<PathBuf> {
    let decoded =
        urlencoding::decode(request_path).map_err(|_| ApiError::not_found("file not found"))?;
    let trimmed = decoded.trim_start_matches('/');
    if trimmed.is_empty() {
        return Ok(root.to_path_buf());
    }
    let candidate = Path::new(trimmed);
    if candidate
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return Err(ApiError::not_found("file not found"));
    }
    Ok(root.join(candidate))
}

async fn stream_file(path: PathBuf) -> ApiResult<Response> {
    let file = File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("file not found"))?;
    let size = file
        .metadata()
        .await
        .map_err(|_| ApiError::not_found("file not found"))?
        .len();

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_LENGTH, size.into());
    if let Some(mime) = MimeGuess::from_path(&path).first()
        && let Ok(value) = mime.to_string().parse()
    {
        headers.insert(header::CONTENT_TYPE, value);
    }

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((headers, body).into_response())
}

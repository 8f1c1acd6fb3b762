//! cxxbox server - HTTP front for the sandboxed compile-and-run pipeline.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use clap::Parser;
use cxxbox::response::CompileResponse;
use cxxbox::sandbox::{DockerSubstrate, ExecutionRequest};
use cxxbox::{Config, Error, Orchestrator};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};

// ---- CLI ----

#[derive(Parser)]
#[command(name = "cxxbox-server", about = "cxxbox compile-and-run API server")]
struct Args {
    /// Bind address
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Port
    #[arg(long, short, env = "PORT", default_value = "3000")]
    port: u16,
}

// ---- App State ----

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
    code_size_limit: usize,
}

// ---- Error Handling ----

struct AppError(Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = if self.0.is_client_error() {
            (StatusCode::BAD_REQUEST, self.0.to_string())
        } else {
            match self.0 {
                Error::CompileTimeout => {
                    (StatusCode::GATEWAY_TIMEOUT, "Compilation timed out".to_string())
                }
                Error::RunTimeout => {
                    (StatusCode::GATEWAY_TIMEOUT, "Execution timed out".to_string())
                }
                err => {
                    // opaque to the caller, detail stays in the log
                    error!(error = %err, "Request failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error".to_string(),
                    )
                }
            }
        };
        let body = Json(serde_json::json!({ "error": message }));
        (status, body).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError(err)
    }
}

// ---- Handlers ----

async fn compile(
    State(state): State<AppState>,
    Json(request): Json<ExecutionRequest>,
) -> Result<Json<CompileResponse>, AppError> {
    if request.code.is_empty() {
        return Err(AppError(Error::InvalidInput("code must not be empty".to_string())));
    }
    if request.code.len() > state.code_size_limit {
        return Err(AppError(Error::InvalidInput(format!(
            "Code size {} exceeds limit of {} bytes",
            request.code.len(),
            state.code_size_limit
        ))));
    }

    let outcome = state.orchestrator.execute(&request).await?;
    Ok(Json(CompileResponse::from_outcome(&outcome)))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Not found" })),
    )
}

// ---- Router ----

fn build_router(state: AppState) -> Router {
    let body_limit = state.code_size_limit + 1024;

    Router::new()
        .route("/api/compile.json", post(compile))
        .fallback(not_found)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(body_limit))
}

// ---- Main ----

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bollard=warn".into()),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;

    let substrate = DockerSubstrate::connect().await?;
    let orchestrator = Arc::new(Orchestrator::new(Arc::new(substrate), config.clone()));

    let state = AppState {
        orchestrator,
        code_size_limit: config.code_size_limit_bytes,
    };
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!("cxxbox listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

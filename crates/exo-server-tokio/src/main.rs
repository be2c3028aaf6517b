use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use exo_core::{AttributeWeights, Config, PredictError, RawFeatures, TabularPredictor};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(about = "HTTP front for the tabular exoplanet predictor")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Overrides EXO_MODEL_DIR.
    #[arg(long)]
    model_dir: Option<PathBuf>,
}

#[derive(Clone)]
struct AppState {
    predictor: Arc<TabularPredictor>,
    prom: PrometheusHandle,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictResponse {
    trace_id: Uuid,
    predicted_value: f64,
    confidence: f64,
    attribute_weights: AttributeWeights,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    model_loaded: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let prom = PrometheusBuilder::new().install_recorder()?;

    let mut cfg = Config::from_env();
    if let Some(dir) = args.model_dir {
        cfg.model_dir = dir;
    }
    let eager = cfg.eager_load;
    let predictor = Arc::new(TabularPredictor::new(cfg));

    if eager {
        let p = predictor.clone();
        match tokio::task::spawn_blocking(move || p.ensure_loaded()).await? {
            Ok(()) => tracing::info!("models loaded at startup"),
            // keep serving: requests answer 503 until the artifact shows up
            Err(e) => tracing::warn!(kind = e.kind(), err = %e, "startup load failed; serving degraded"),
        }
    }

    let app = app(AppState { predictor, prom });

    tracing::info!("exo-server-tokio listening on http://{}", args.addr);
    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/predict/tabular", post(predict))
        .route("/api/v1/health", get(health))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn status_for(e: &PredictError) -> StatusCode {
    match e {
        PredictError::MissingArtifact { .. } | PredictError::LoadFailure { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn predict(
    State(st): State<AppState>,
    Json(raw): Json<RawFeatures>,
) -> Result<Json<PredictResponse>, (StatusCode, String)> {
    let trace_id = Uuid::new_v4();
    let predictor = st.predictor.clone();

    let res = tokio::task::spawn_blocking(move || predictor.predict(&raw))
        .await
        .map_err(|e| {
            tracing::error!(%trace_id, err = %e, "predict task aborted");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("predict task aborted: {e}"))
        })?;

    match res {
        Ok(p) => Ok(Json(PredictResponse {
            trace_id,
            predicted_value: p.probability,
            confidence: p.confidence,
            attribute_weights: p.weights,
        })),
        Err(e) => {
            tracing::warn!(%trace_id, kind = e.kind(), err = %e, "predict failed");
            Err((status_for(&e), e.to_string()))
        }
    }
}

async fn health(State(st): State<AppState>) -> Json<HealthResponse> {
    let model_loaded = st.predictor.is_loaded();
    Json(HealthResponse {
        status: if model_loaded { "ok" } else { "degraded" },
        model_loaded,
    })
}

async fn metrics(State(st): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, st.prom.render())
}

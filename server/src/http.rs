use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use inference::supervisor::ModelServer;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use types::config::ServeConfig;
use types::error::PredictError;

use crate::pipeline::PredictionPipeline;
use crate::store::StoreProvider;

#[derive(Debug, Deserialize)]
pub struct PredictParams {
    model: Option<String>,
    input: Option<String>,
    output: Option<String>,
}

pub fn router<P: StoreProvider, M: ModelServer>(pipeline: PredictionPipeline<P, M>) -> Router {
    Router::new()
        .route("/", get(load_and_predict::<P, M>))
        .with_state(Arc::new(pipeline))
}

async fn load_and_predict<P: StoreProvider, M: ModelServer>(
    State(pipeline): State<Arc<PredictionPipeline<P, M>>>,
    Query(params): Query<PredictParams>,
) -> (StatusCode, String) {
    let (model, input, output) = match required_params(params) {
        Ok(values) => values,
        Err(response) => return response,
    };

    match pipeline.run(&model, &input, &output).await {
        Ok(()) => (StatusCode::OK, "predictions completed\n".to_string()),
        Err(e @ PredictError::Validation(_)) => {
            warn!("rejected prediction request: {e}");
            (StatusCode::BAD_REQUEST, format!("{e}\n"))
        }
        Err(e) => {
            error!("prediction request failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{e}\n"))
        }
    }
}

fn required_params(
    params: PredictParams,
) -> Result<(String, String, String), (StatusCode, String)> {
    fn missing(name: &str) -> (StatusCode, String) {
        (StatusCode::BAD_REQUEST, format!("Query Param '{name}' is missing\n"))
    }
    Ok((
        params.model.ok_or_else(|| missing("model"))?,
        params.input.ok_or_else(|| missing("input"))?,
        params.output.ok_or_else(|| missing("output"))?,
    ))
}

/// Bind the service port and serve prediction requests until shutdown.
pub async fn serve<P: StoreProvider, M: ModelServer>(
    config: &ServeConfig,
    pipeline: PredictionPipeline<P, M>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind((config.host_ip.as_str(), config.port)).await?;
    info!("predict server listening on {}", listener.local_addr()?);
    axum::serve(listener, router(pipeline)).await
}

use clap::Parser;
use inference::supervisor::TensorflowServer;
use server::http;
use server::pipeline::PredictionPipeline;
use server::store::GcsProvider;
use types::config::ServeConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = ServeConfig::parse();
    let predict = config.predict_config();
    let pipeline =
        PredictionPipeline::new(predict.clone(), GcsProvider, TensorflowServer::new(predict));

    http::serve(&config, pipeline).await?;
    Ok(())
}

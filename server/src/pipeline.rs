//! The batch-prediction orchestrator: stages the model, brings the model
//! server up, pushes every input file through it, and mirrors the results
//! back out.

use inference::client::{HttpPredictClient, PredictClient};
use inference::supervisor::{ModelServer, ServerHandle};
use inference::transcode::{decode_response, encode_request};
use sync::{TreeSync, list_local_tree};
use tokio::fs;
use tracing::info;
use types::config::PredictConfig;
use types::error::{PredictResult, SyncError};
use types::location::RemoteLocation;

use crate::store::StoreProvider;

/// One-request-at-a-time prediction pipeline.
///
/// The staging directories, the loopback port, and the model server process
/// are singleton resources per instance; nothing here guards against two
/// overlapping requests, the deployment does.
pub struct PredictionPipeline<P: StoreProvider, M: ModelServer> {
    config: PredictConfig,
    provider: P,
    server: M,
}

impl<P: StoreProvider, M: ModelServer> PredictionPipeline<P, M> {
    pub fn new(config: PredictConfig, provider: P, server: M) -> Self {
        Self { config, provider, server }
    }

    pub fn config(&self) -> &PredictConfig {
        &self.config
    }

    /// Run one batch prediction request end to end.
    ///
    /// The first failing step aborts the rest; output already uploaded by
    /// earlier requests is left as it is. The model server is torn down on
    /// every exit path without replacing the run's own error.
    pub async fn run(&self, model: &str, input: &str, output: &str) -> PredictResult<()> {
        let prefix = &self.config.store_prefix;
        // The model path must be the directory the weights are stored under.
        let model_loc = RemoteLocation::parse(model, prefix)?.into_dir();
        let input_loc = RemoteLocation::parse(input, prefix)?;
        let output_loc = RemoteLocation::parse(output, prefix)?.into_dir();
        info!("request parameters parsed, starting run");

        self.reset_staging().await?;

        let model_sync = TreeSync::new(self.provider.store(model_loc.bucket())?);
        let model_dest = self.config.versioned_model_dir();
        model_sync.download_tree(model_loc.path(), &model_dest).await?;
        info!(dir = %model_dest.display(), "model staged");

        let mut handle = self.server.start(&self.config.model_dir).await?;
        let outcome = self.predict_and_upload(&handle, &input_loc, &output_loc).await;
        handle.stop().await;
        outcome
    }

    async fn predict_and_upload(
        &self,
        handle: &ServerHandle,
        input_loc: &RemoteLocation,
        output_loc: &RemoteLocation,
    ) -> PredictResult<()> {
        let input_sync = TreeSync::new(self.provider.store(input_loc.bucket())?);
        if input_loc.is_dir() {
            input_sync.download_tree(input_loc.path(), &self.config.input_dir).await?;
        } else {
            let dest = self.config.input_dir.join(input_loc.leaf_name());
            input_sync.download_file(input_loc.path(), &dest).await?;
        }
        info!("input staged");

        let client = HttpPredictClient::new(handle.endpoint().clone())?;
        self.predict_files(&client).await?;
        info!("predictions done");

        let output_sync = TreeSync::new(self.provider.store(output_loc.bucket())?);
        output_sync.upload_tree(&self.config.output_dir, output_loc.path()).await?;
        info!("output uploaded");
        Ok(())
    }

    /// Encode, submit, decode, and stage the result for every staged input
    /// file, in discovery order, mirroring the input hierarchy. Output leaf
    /// names carry the configured prefix.
    async fn predict_files(&self, client: &impl PredictClient) -> PredictResult<()> {
        for entry in list_local_tree(&self.config.input_dir).await? {
            let raw = fs::read(self.config.input_dir.join(entry.relative()))
                .await
                .map_err(SyncError::from)?;
            let request = encode_request(&raw)?;
            let body = client.predict(request).await?;
            let lines = decode_response(&body, self.config.escape_backslashes)?;

            let out_dir = self.config.output_dir.join(&entry.rel_path);
            fs::create_dir_all(&out_dir).await.map_err(SyncError::from)?;
            let out_name = format!("{}{}", self.config.output_prefix, entry.name);
            fs::write(out_dir.join(out_name), lines).await.map_err(SyncError::from)?;
            info!(file = %entry.relative(), "predicted");
        }
        Ok(())
    }

    /// Clear the previous run's staging areas.
    async fn reset_staging(&self) -> PredictResult<()> {
        for dir in [&self.config.model_dir, &self.config.input_dir, &self.config.output_dir] {
            match fs::remove_dir_all(dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(SyncError::from(e).into()),
            }
            fs::create_dir_all(dir).await.map_err(SyncError::from)?;
        }
        Ok(())
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use inference::supervisor::{ModelServer, ServerHandle};
use object_store::ObjectStore;
use object_store::memory::InMemory;
use object_store::path::Path;
use server::pipeline::PredictionPipeline;
use server::store::StoreProvider;
use types::config::PredictConfig;
use types::error::{InferenceError, InferenceResult, PredictError, PredictResult};
use url::Url;
use wiremock::matchers::{body_json_string, method, path as request_path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct MemoryProvider {
    buckets: HashMap<String, Arc<InMemory>>,
}

impl MemoryProvider {
    fn new(names: &[&str]) -> Self {
        let buckets =
            names.iter().map(|n| (n.to_string(), Arc::new(InMemory::new()))).collect();
        Self { buckets }
    }

    fn bucket(&self, name: &str) -> Arc<InMemory> {
        self.buckets[name].clone()
    }
}

impl StoreProvider for MemoryProvider {
    fn store(&self, bucket: &str) -> PredictResult<Arc<dyn ObjectStore>> {
        match self.buckets.get(bucket) {
            Some(store) => Ok(store.clone() as Arc<dyn ObjectStore>),
            None => Err(PredictError::Validation(format!("unknown bucket '{bucket}'"))),
        }
    }
}

struct MockModelServer {
    endpoint: Url,
}

#[async_trait]
impl ModelServer for MockModelServer {
    async fn start(&self, _model_base_path: &std::path::Path) -> InferenceResult<ServerHandle> {
        Ok(ServerHandle::detached(self.endpoint.clone()))
    }
}

fn test_config(root: &std::path::Path) -> PredictConfig {
    PredictConfig {
        model_dir: root.join("model"),
        input_dir: root.join("input"),
        output_dir: root.join("output"),
        ..PredictConfig::default()
    }
}

async fn put(store: &InMemory, key: &str, body: &[u8]) {
    store.put(&Path::from(key), body.to_vec().into()).await.unwrap();
}

async fn get(store: &InMemory, key: &str) -> Vec<u8> {
    store.get(&Path::from(key)).await.unwrap().bytes().await.unwrap().to_vec()
}

fn pipeline_for(
    endpoint: &MockServer,
    provider: MemoryProvider,
    config: PredictConfig,
) -> PredictionPipeline<MemoryProvider, MockModelServer> {
    let server = MockModelServer {
        endpoint: Url::parse(&format!("{}/v1/models/mymodel:predict", endpoint.uri())).unwrap(),
    };
    PredictionPipeline::new(config, provider, server)
}

#[tokio::test]
async fn echo_scenario_mirrors_hierarchy_and_order() {
    let staging = tempfile::tempdir().unwrap();
    let provider = MemoryProvider::new(&["mdl", "in", "out"]);
    let model_bucket = provider.bucket("mdl");
    let output_bucket = provider.bucket("out");
    put(&model_bucket, "export/saved_model.pb", b"weights").await;
    put(&provider.bucket("in"), "batches/a/1.jsonl", b"{\"x\":1}\n{\"x\":2}\n").await;

    let endpoint = MockServer::start().await;
    Mock::given(method("POST"))
        .and(request_path("/v1/models/mymodel:predict"))
        .and(body_json_string(r#"{"instances":[{"x":1},{"x":2}]}"#))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(br#"{"predictions":[{"y":1},{"y":2}]}"#.to_vec()),
        )
        .mount(&endpoint)
        .await;

    let config = test_config(staging.path());
    let pipeline = pipeline_for(&endpoint, provider, config.clone());
    // Model address without the trailing separator is normalized to one.
    pipeline
        .run("gs://mdl/export", "gs://in/batches/", "gs://out/results")
        .await
        .unwrap();

    assert_eq!(
        get(&output_bucket, "results/a/prediction_1.jsonl").await,
        b"{\"y\":1}\n{\"y\":2}\n"
    );
    // The model was staged under the dummy version segment.
    assert_eq!(
        std::fs::read(config.versioned_model_dir().join("saved_model.pb")).unwrap(),
        b"weights"
    );
}

#[tokio::test]
async fn multiple_files_each_get_their_own_prediction_file() {
    let staging = tempfile::tempdir().unwrap();
    let provider = MemoryProvider::new(&["mdl", "in", "out"]);
    let output_bucket = provider.bucket("out");
    put(&provider.bucket("mdl"), "export/saved_model.pb", b"weights").await;
    put(&provider.bucket("in"), "batches/1.jsonl", b"{\"x\":1}\n").await;
    put(&provider.bucket("in"), "batches/b/2.jsonl", b"{\"x\":2}\n").await;

    let endpoint = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_json_string(r#"{"instances":[{"x":1}]}"#))
        .respond_with(
            ResponseTemplate::new(200).set_body_bytes(br#"{"predictions":[{"y":1}]}"#.to_vec()),
        )
        .mount(&endpoint)
        .await;
    Mock::given(method("POST"))
        .and(body_json_string(r#"{"instances":[{"x":2}]}"#))
        .respond_with(
            ResponseTemplate::new(200).set_body_bytes(br#"{"predictions":[{"y":2}]}"#.to_vec()),
        )
        .mount(&endpoint)
        .await;

    let pipeline = pipeline_for(&endpoint, provider, test_config(staging.path()));
    pipeline
        .run("gs://mdl/export/", "gs://in/batches/", "gs://out/results/")
        .await
        .unwrap();

    assert_eq!(get(&output_bucket, "results/prediction_1.jsonl").await, b"{\"y\":1}\n");
    assert_eq!(get(&output_bucket, "results/b/prediction_2.jsonl").await, b"{\"y\":2}\n");
}

#[tokio::test]
async fn single_file_input_is_staged_under_its_leaf_name() {
    let staging = tempfile::tempdir().unwrap();
    let provider = MemoryProvider::new(&["mdl", "in", "out"]);
    let output_bucket = provider.bucket("out");
    put(&provider.bucket("mdl"), "export/saved_model.pb", b"weights").await;
    put(&provider.bucket("in"), "batches/solo.jsonl", b"{\"x\":1}\n").await;

    let endpoint = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_bytes(br#"{"predictions":[{"y":1}]}"#.to_vec()),
        )
        .mount(&endpoint)
        .await;

    let pipeline = pipeline_for(&endpoint, provider, test_config(staging.path()));
    pipeline
        .run("gs://mdl/export/", "gs://in/batches/solo.jsonl", "gs://out/results/")
        .await
        .unwrap();

    assert_eq!(get(&output_bucket, "results/prediction_solo.jsonl").await, b"{\"y\":1}\n");
}

#[tokio::test]
async fn empty_input_file_is_still_submitted() {
    let staging = tempfile::tempdir().unwrap();
    let provider = MemoryProvider::new(&["mdl", "in", "out"]);
    let output_bucket = provider.bucket("out");
    put(&provider.bucket("mdl"), "export/saved_model.pb", b"weights").await;
    put(&provider.bucket("in"), "batches/empty.jsonl", b"").await;

    let endpoint = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_json_string(r#"{"instances":[]}"#))
        .respond_with(
            ResponseTemplate::new(200).set_body_bytes(br#"{"predictions":[]}"#.to_vec()),
        )
        .mount(&endpoint)
        .await;

    let pipeline = pipeline_for(&endpoint, provider, test_config(staging.path()));
    pipeline
        .run("gs://mdl/export/", "gs://in/batches/", "gs://out/results/")
        .await
        .unwrap();

    assert_eq!(get(&output_bucket, "results/prediction_empty.jsonl").await, b"");
}

#[tokio::test]
async fn malformed_address_fails_before_any_activity() {
    let staging = tempfile::tempdir().unwrap();
    let provider = MemoryProvider::new(&["mdl", "in", "out"]);
    let endpoint = MockServer::start().await;

    let pipeline = pipeline_for(&endpoint, provider, test_config(staging.path()));
    let err = pipeline
        .run("mdl/export/", "gs://in/batches/", "gs://out/results/")
        .await
        .unwrap_err();

    assert!(matches!(err, PredictError::Validation(_)));
    // Validation happens before staging, downloads, or the model server.
    assert!(endpoint.received_requests().await.unwrap().is_empty());
    assert!(!staging.path().join("model").exists());
}

#[tokio::test]
async fn prediction_error_fails_request_and_keeps_prior_uploads() {
    let staging = tempfile::tempdir().unwrap();
    let provider = MemoryProvider::new(&["mdl", "in", "out"]);
    let output_bucket = provider.bucket("out");
    put(&provider.bucket("mdl"), "export/saved_model.pb", b"weights").await;
    put(&provider.bucket("in"), "batches/a/1.jsonl", b"{\"x\":1}\n").await;
    // Output from an earlier request that must survive the failure.
    put(&output_bucket, "results/prediction_0.jsonl", b"{\"y\":0}\n").await;

    let endpoint = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(br#"{"error":"shape mismatch"}"#.to_vec()),
        )
        .mount(&endpoint)
        .await;

    let pipeline = pipeline_for(&endpoint, provider, test_config(staging.path()));
    let err = pipeline
        .run("gs://mdl/export/", "gs://in/batches/", "gs://out/results/")
        .await
        .unwrap_err();

    match err {
        PredictError::Inference(InferenceError::Prediction(msg)) => {
            assert_eq!(msg, "shape mismatch");
        }
        other => panic!("expected Prediction, got {other:?}"),
    }
    assert_eq!(get(&output_bucket, "results/prediction_0.jsonl").await, b"{\"y\":0}\n");
    // The failed file produced no upload.
    assert!(
        output_bucket.get(&Path::from("results/a/prediction_1.jsonl")).await.is_err()
    );
}

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Default port for the service's own HTTP surface.
pub const DEFAULT_SERVICE_PORT: u16 = 8080;

/// gRPC port handed to the model server (unused by us, required by it).
pub const DEFAULT_GRPC_PORT: u16 = 8500;

/// REST port the model server exposes the predict endpoint on.
pub const DEFAULT_REST_PORT: u16 = 8501;

/// Name the model is registered under when the model server starts.
pub const DEFAULT_MODEL_NAME: &str = "mymodel";

/// Binary launched to serve the staged model.
pub const DEFAULT_SERVER_BINARY: &str = "tensorflow_model_server";

/// Local staging directory for the model.
pub const DEFAULT_MODEL_DIR: &str = "/tmp/model";

/// Local staging directory for the input file(s).
pub const DEFAULT_INPUT_DIR: &str = "/tmp/input";

/// Local staging directory for the prediction output file(s).
pub const DEFAULT_OUTPUT_DIR: &str = "/tmp/output";

/// Version number nested under the model directory. The model server requires
/// one; the value itself doesn't matter here.
pub const MODEL_VERSION_SEGMENT: &str = "000000";

/// Prefix added to the leaf name of every generated prediction file.
pub const OUTPUT_FILE_PREFIX: &str = "prediction_";

/// Prefix of a bucket address.
pub const STORE_ADDRESS_PREFIX: &str = "gs://";

/// Substring of the model server's startup log that marks it ready.
pub const READINESS_MARKER: &str = "Exporting HTTP/REST API";

/// How long to wait for the readiness marker before giving up.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for one prediction run.
///
/// Everything the orchestrator treats as fixed lives here so tests can run
/// against temporary directories and free ports instead of the deployment
/// defaults.
#[derive(Debug, Clone)]
pub struct PredictConfig {
    pub server_binary: String,
    pub grpc_port: u16,
    pub rest_port: u16,
    pub model_name: String,
    pub model_dir: PathBuf,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub version_segment: String,
    pub output_prefix: String,
    pub store_prefix: String,
    pub readiness_marker: String,
    pub startup_timeout: Duration,
    /// Double every backslash in the predict response before parsing it.
    /// Compatibility workaround for model server builds that emit embedded
    /// arrays as strings with unescaped backslashes; costs one level of
    /// escaping on any backslash the server emits legitimately.
    pub escape_backslashes: bool,
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            server_binary: DEFAULT_SERVER_BINARY.to_string(),
            grpc_port: DEFAULT_GRPC_PORT,
            rest_port: DEFAULT_REST_PORT,
            model_name: DEFAULT_MODEL_NAME.to_string(),
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            version_segment: MODEL_VERSION_SEGMENT.to_string(),
            output_prefix: OUTPUT_FILE_PREFIX.to_string(),
            store_prefix: STORE_ADDRESS_PREFIX.to_string(),
            readiness_marker: READINESS_MARKER.to_string(),
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            escape_backslashes: true,
        }
    }
}

impl PredictConfig {
    /// Directory the model files are staged into, version segment included.
    pub fn versioned_model_dir(&self) -> PathBuf {
        self.model_dir.join(&self.version_segment)
    }

    /// Loopback URL of the model server's predict endpoint.
    pub fn predict_url(&self) -> String {
        format!(
            "http://localhost:{}/v1/models/{}:predict",
            self.rest_port, self.model_name
        )
    }
}

#[derive(Parser, Debug, Clone)]
#[clap(name = "predict-server", about = "On-demand batch prediction server")]
pub struct ServeConfig {
    /// Port to listen on
    #[clap(long, env = "PORT", default_value_t = DEFAULT_SERVICE_PORT)]
    pub port: u16,

    /// Host IP to bind to
    #[clap(long, default_value = "0.0.0.0")]
    pub host_ip: String,

    /// Model server binary to launch per request
    #[clap(long, default_value = DEFAULT_SERVER_BINARY)]
    pub server_binary: String,

    /// REST port the model server should expose
    #[clap(long, default_value_t = DEFAULT_REST_PORT)]
    pub rest_api_port: u16,

    /// gRPC port the model server should expose
    #[clap(long, default_value_t = DEFAULT_GRPC_PORT)]
    pub grpc_port: u16,

    /// Seconds to wait for the model server to report readiness
    #[clap(long, default_value_t = DEFAULT_STARTUP_TIMEOUT.as_secs())]
    pub startup_timeout_secs: u64,

    /// Trust the model server to emit valid JSON (skip the backslash
    /// escaping workaround)
    #[clap(long)]
    pub raw_backslashes: bool,
}

impl ServeConfig {
    /// Per-request settings derived from the command line.
    pub fn predict_config(&self) -> PredictConfig {
        PredictConfig {
            server_binary: self.server_binary.clone(),
            grpc_port: self.grpc_port,
            rest_port: self.rest_api_port,
            startup_timeout: Duration::from_secs(self.startup_timeout_secs),
            escape_backslashes: !self.raw_backslashes,
            ..PredictConfig::default()
        }
    }
}

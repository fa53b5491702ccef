//! Command Line Interface (CLI) arguments.

use crate::error::TransformerError;
use crate::models::output_object_name;
use crate::s3_client::S3Credentials;
use crate::selection::{Selection, DEFAULT_SELECTION};
use crate::transform::{TransformOptions, DEFAULT_TREE};
use crate::worker::{AckPolicy, WorkerConfig};

use clap::{Parser, ValueEnum};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use url::Url;

/// Where request outputs are published
#[derive(Clone, Copy, Debug, Default, PartialEq, ValueEnum)]
pub enum ResultDestination {
    /// Upload outputs to the object store and delete the local copy
    #[default]
    ObjectStore,
    /// Leave outputs in the output directory
    Volume,
}

/// Transformer command line interface
#[derive(Clone, Debug, Parser)]
pub struct CommandLineArgs {
    /// AMQP URI of the message broker
    #[arg(long, env = "RABBIT_URI")]
    pub rabbit_uri: Option<String>,
    /// Transform request identifier; requests are consumed from the queue of this name
    #[arg(long, env = "REQUEST_ID")]
    pub request_id: Option<String>,
    /// Transform a single file and exit, without the queue, status reporting or upload
    #[arg(long)]
    pub path: Option<PathBuf>,
    /// Output file for a single-file transform
    #[arg(long, requires = "path")]
    pub output: Option<PathBuf>,
    /// Directory in which output files are written
    #[arg(long, default_value = "/home/atlas", env = "OUTPUT_DIR")]
    pub output_dir: PathBuf,
    /// Name of the tree to read from each input file
    #[arg(long, default_value = DEFAULT_TREE, env = "TREE_NAME")]
    pub tree: String,
    /// Row selection, written `<branch> <op> <number>`
    #[arg(long, default_value = DEFAULT_SELECTION, env = "SELECTION")]
    pub selection: String,
    /// Where request outputs are published
    #[arg(long, value_enum, default_value_t = ResultDestination::ObjectStore)]
    pub result_destination: ResultDestination,
    /// Object store API URL
    #[arg(long, env = "MINIO_URL")]
    pub s3_url: Option<Url>,
    /// Object store access key
    #[arg(long, env = "MINIO_ACCESS_KEY")]
    pub s3_access_key: Option<String>,
    /// Object store secret key
    #[arg(long, env = "MINIO_SECRET_KEY", hide_env_values = true)]
    pub s3_secret_key: Option<String>,
    /// When request messages are acknowledged
    #[arg(long, value_enum, default_value_t = AckPolicy::Always, env = "ACK_POLICY")]
    pub ack_policy: AckPolicy,
    /// Whether to use Rayon for execution of CPU-bound tasks.
    #[arg(long, default_value_t = false, env = "USE_RAYON")]
    pub use_rayon: bool,
    /// Port on which to serve metrics and health endpoints
    #[arg(long, env = "METRICS_PORT")]
    pub metrics_port: Option<u16>,
    /// Maximum time in seconds to wait for the metrics server to close upon receiving `ctrl+c`
    /// signal.
    #[arg(long, default_value_t = 60, env = "SHUTDOWN_TIMEOUT")]
    pub graceful_shutdown_timeout: u64,
}

impl CommandLineArgs {
    /// Returns the transform options, parsing the selection.
    pub fn transform_options(&self) -> Result<TransformOptions, TransformerError> {
        let selection: Selection = self.selection.parse()?;
        Ok(TransformOptions {
            tree: self.tree.clone(),
            selection,
            use_rayon: self.use_rayon,
        })
    }

    /// Returns the configuration of the request worker.
    pub fn worker_config(&self) -> Result<WorkerConfig, TransformerError> {
        Ok(WorkerConfig {
            output_dir: self.output_dir.clone(),
            transform: self.transform_options()?,
            ack_policy: self.ack_policy,
        })
    }

    /// Returns the broker URI and request queue name.
    pub fn queue(&self) -> Result<(&str, &str), TransformerError> {
        match (&self.rabbit_uri, &self.request_id) {
            (Some(uri), Some(request_id)) => Ok((uri, request_id)),
            _ => Err(TransformerError::Config {
                message: "--rabbit-uri and --request-id are required unless --path is given"
                    .to_string(),
            }),
        }
    }

    /// Returns the object store URL.
    pub fn s3_url(&self) -> Result<&Url, TransformerError> {
        self.s3_url.as_ref().ok_or_else(|| TransformerError::Config {
            message: "--s3-url is required for object-store results".to_string(),
        })
    }

    /// Returns the object store credentials.
    ///
    /// Anonymous access is used unless both keys are given.
    pub fn s3_credentials(&self) -> S3Credentials {
        match (&self.s3_access_key, &self.s3_secret_key) {
            (Some(access_key), Some(secret_key)) => {
                S3Credentials::access_key(access_key, secret_key)
            }
            _ => S3Credentials::None,
        }
    }

    /// Returns the output path for a single-file transform of `path`.
    pub fn direct_output(&self, path: &Path) -> PathBuf {
        match &self.output {
            Some(output) => output.clone(),
            None => self
                .output_dir
                .join(output_object_name(&path.to_string_lossy())),
        }
    }

    /// Returns the address of the metrics server, if enabled.
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_port
            .map(|port| SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
    }
}

/// Returns parsed command line arguments.
pub fn parse() -> CommandLineArgs {
    CommandLineArgs::parse()
}

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::report::ResultMergePolicy;

/// API coverage quality gate: certifies APIs against observed production traffic.
#[derive(Parser, Debug, Clone)]
#[command(name = "api-coverage-gate", version)]
pub struct CliArgs {
    /// HTTP port for the report API
    #[arg(long = "port", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory holding the report database
    #[arg(long = "data-dir", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Base URL of the quality gate config service
    #[arg(long = "config-service-url", conflicts_with = "quality_gates_file")]
    pub config_service_url: Option<Url>,

    /// JSON file of quality gate definitions, used instead of the config service
    #[arg(long = "quality-gates-file")]
    pub quality_gates_file: Option<PathBuf>,

    /// Base URL of the OpenAPI catalog
    #[arg(long = "catalog-url")]
    pub catalog_url: Url,

    /// Base URL of the tracing store
    #[arg(long = "tracing-store-url")]
    pub tracing_store_url: Url,

    /// Bucket queried in the tracing store
    #[arg(long = "tracing-bucket", default_value = DEFAULT_TRACING_BUCKET)]
    pub tracing_bucket: String,

    /// Lookback window when a submission does not name one
    #[arg(long = "default-lookback-secs", default_value_t = DEFAULT_LOOKBACK_SECS)]
    pub default_lookback_secs: u64,

    /// Age after which an unfinished report is logged as stale
    #[arg(long = "stale-report-secs", default_value_t = DEFAULT_STALE_REPORT_SECS)]
    pub stale_report_secs: u64,

    /// How a repeated result for the same criterion is attached
    #[arg(long = "result-merge", value_enum, default_value_t = ResultMergePolicy::Replace)]
    pub result_merge: ResultMergePolicy,

    /// Deliveries of one bus message before it is dead-lettered
    #[arg(long = "max-delivery-attempts", default_value_t = DEFAULT_MAX_DELIVERY_ATTEMPTS)]
    pub max_delivery_attempts: u32,

    /// Also write daily-rolling log files here
    #[arg(long = "log-dir")]
    pub log_dir: Option<PathBuf>,
}

/// Where quality gate definitions come from.
#[derive(Debug, Clone, PartialEq)]
pub enum QualityGateSource {
    Service(Url),
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub quality_gates: QualityGateSource,
    pub catalog_url: Url,
    pub tracing_store_url: Url,
    pub tracing_bucket: String,
    pub default_lookback_secs: u64,
    pub stale_report_after: Duration,
    pub result_merge: ResultMergePolicy,
    pub max_delivery_attempts: u32,
    pub log_dir: Option<PathBuf>,
}

// Server
pub const DEFAULT_PORT: u16 = 8085;
pub const DEFAULT_DATA_DIR: &str = "./data";

// Collaborators
pub const DEFAULT_TRACING_BUCKET: &str = "traces";
pub const UPSTREAM_TIMEOUT_SECS: u64 = 30;

// Reports
pub const DEFAULT_LOOKBACK_SECS: u64 = 86_400; // 24 hours
pub const DEFAULT_STALE_REPORT_SECS: u64 = 1_800; // 30 minutes
pub const STALE_REPORT_CHECK_INTERVAL_SECS: u64 = 60;

// Bus
pub const DEFAULT_MAX_DELIVERY_ATTEMPTS: u32 = 5;
pub const REDELIVERY_BACKOFF_MS: u64 = 500;

impl ServiceConfig {
    pub fn from_args(args: CliArgs) -> anyhow::Result<Self> {
        let quality_gates = match (args.config_service_url, args.quality_gates_file) {
            (Some(url), None) => QualityGateSource::Service(url),
            (None, Some(path)) => QualityGateSource::File(path),
            (Some(_), Some(_)) => {
                anyhow::bail!("--config-service-url and --quality-gates-file are mutually exclusive")
            }
            (None, None) => {
                anyhow::bail!("one of --config-service-url or --quality-gates-file is required")
            }
        };

        if args.max_delivery_attempts == 0 {
            anyhow::bail!("--max-delivery-attempts must be at least 1");
        }

        Ok(ServiceConfig {
            port: args.port,
            data_dir: args.data_dir,
            quality_gates,
            catalog_url: args.catalog_url,
            tracing_store_url: args.tracing_store_url,
            tracing_bucket: args.tracing_bucket,
            default_lookback_secs: args.default_lookback_secs,
            stale_report_after: Duration::from_secs(args.stale_report_secs),
            result_merge: args.result_merge,
            max_delivery_attempts: args.max_delivery_attempts,
            log_dir: args.log_dir,
        })
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(UPSTREAM_TIMEOUT_SECS)
    }
}

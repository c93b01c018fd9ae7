use envconfig::Envconfig;

use bridge_common::config::{KafkaConfig, MongoConfig, SalesforceConfig};

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    /// Port of the liveness/metrics listener; the worker serves no API.
    #[envconfig(from = "BIND_PORT", default = "3301")]
    pub port: u16,

    /// How often the continuation-token refresh pass runs.
    #[envconfig(from = "REFRESH_INTERVAL_SECS", default = "900")]
    pub refresh_interval_secs: u64,

    #[envconfig(from = "PARTITION_COUNT", default = "9")]
    pub partition_count: i32,

    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    #[envconfig(nested = true)]
    pub mongo: MongoConfig,

    #[envconfig(nested = true)]
    pub salesforce: SalesforceConfig,
}

impl Config {
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

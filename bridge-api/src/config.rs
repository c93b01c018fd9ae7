use envconfig::Envconfig;

use bridge_common::config::{KafkaConfig, MongoConfig, SalesforceConfig};

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "8888")]
    pub port: u16,

    /// Highest partition index the token acquisition pass iterates up to,
    /// inclusive.
    #[envconfig(from = "PARTITION_COUNT", default = "9")]
    pub partition_count: i32,

    #[envconfig(default = "false")]
    pub print_publisher: bool,

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

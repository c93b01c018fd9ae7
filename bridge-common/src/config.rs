use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct KafkaConfig {
    #[envconfig(from = "KAFKA_HOSTS", default = "kafka:9092")]
    pub kafka_hosts: String,

    #[envconfig(from = "KAFKA_TOPIC", default = "conversation_create")]
    pub kafka_topic: String,

    #[envconfig(from = "KAFKA_GROUP_NAME", default = "conversation_bridge")]
    pub kafka_group_name: String,

    #[envconfig(from = "KAFKA_TLS", default = "false")]
    pub kafka_tls: bool,

    #[envconfig(from = "KAFKA_PRODUCER_LINGER_MS", default = "20")]
    pub kafka_producer_linger_ms: u32,

    #[envconfig(from = "KAFKA_MESSAGE_TIMEOUT_MS", default = "10000")]
    pub kafka_message_timeout_ms: u32,
}

#[derive(Envconfig, Clone)]
pub struct MongoConfig {
    #[envconfig(from = "MONGO_URI", default = "mongodb://localhost:27017")]
    pub mongo_uri: String,

    #[envconfig(from = "MONGO_DATABASE_NAME", default = "conversation_bridge")]
    pub mongo_database_name: String,

    #[envconfig(from = "MONGO_CONNECTION_TIMEOUT_MS", default = "5000")]
    pub mongo_connection_timeout_ms: u64,

    #[envconfig(from = "MONGO_MAX_CONNECTION_IDLE_MS", default = "60000")]
    pub mongo_max_connection_idle_ms: u64,

    #[envconfig(from = "MONGO_MIN_POOL_SIZE", default = "1")]
    pub mongo_min_pool_size: u32,

    #[envconfig(from = "MONGO_MAX_POOL_SIZE", default = "16")]
    pub mongo_max_pool_size: u32,
}

#[derive(Envconfig, Clone)]
pub struct SalesforceConfig {
    #[envconfig(from = "SALESFORCE_HOST", default = "https://example.my.salesforce-scrt.com")]
    pub host: String,

    #[envconfig(from = "SALESFORCE_ORG_ID")]
    pub org_id: String,

    #[envconfig(from = "SALESFORCE_REQUEST_TIMEOUT_MS", default = "5000")]
    pub request_timeout_ms: u64,
}

use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::Client;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};

use crate::{
    config::Config,
    services::{events::EventBus, scheduler::SchedulerHandle},
};

pub struct AppState {
    pub db: Client,
    pub jwt: (EncodingKey, DecodingKey, Header),
    pub events: EventBus,
    pub scheduler: SchedulerHandle,
    pub config: Config,
}

pub async fn connect(config: &Config) -> Client {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));
    if let Some(endpoint) = &config.store_endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    let sdk_config = loader.load().await;
    Client::new(&sdk_config)
}

impl AppState {
    pub fn new(config: Config, db: Client, scheduler: SchedulerHandle) -> Self {
        let jwt = (
            EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            Header::new(Algorithm::HS256),
        );
        Self {
            db,
            jwt,
            events: EventBus::new(),
            scheduler,
            config,
        }
    }

    /// State wired to a local store endpoint, with the scheduler's wheel
    /// running but nothing armed.
    #[cfg(test)]
    pub async fn test() -> std::sync::Arc<Self> {
        let mut config = Config::from_env();
        config.store_endpoint = Some("http://localhost:8000".to_string());
        config.region = "test".to_string();
        let db = connect(&config).await;
        let (fire_tx, _fire_rx) = tokio::sync::mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let (scheduler, _wheel) = crate::services::scheduler::spawn(db.clone(), fire_tx, shutdown_rx);
        std::sync::Arc::new(Self::new(config, db, scheduler))
    }
}

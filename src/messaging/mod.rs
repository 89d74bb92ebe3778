mod config;
mod publisher;

pub use config::RabbitMqConfig;
pub use publisher::{BatchProcessedMessage, PublisherError, RabbitMqPublisher};

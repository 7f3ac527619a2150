//! Error types for gnss2mqtt.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("MQTT connection: {0}")]
    MqttConnection(#[from] rumqttc::ConnectionError),

    #[error("MQTT client: {0}")]
    MqttClient(#[from] rumqttc::ClientError),

    #[error("termios: {0}")]
    Termios(#[from] nix::Error),

    #[error("transport: {0}")]
    Transport(String),

    #[error("config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

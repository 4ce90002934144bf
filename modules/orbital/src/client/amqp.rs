//! AMQP operator client (lapin).

use async_trait::async_trait;
use lapin::options::{BasicGetOptions, BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties,
    tcp::{OwnedIdentity, OwnedTLSConfig},
};
use prost::Message;
use registry_grpc::operator::v1::{OperatorRequest, OperatorResponse};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{ClientError, OperatorClient};
use crate::config::{AmqpConfig, AuthKind, MtlsConfig, TargetConfig};

/// One AMQP connection per region, shared by every worker of the process.
pub struct AmqpClient {
    region: String,
    source: String,
    target: String,
    connection: Connection,
    channel: Mutex<Channel>,
}

impl std::fmt::Debug for AmqpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpClient")
            .field("region", &self.region)
            .field("source", &self.source)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl AmqpClient {
    /// Connect and declare both queues.
    ///
    /// # Errors
    /// Fails when the broker is unreachable, TLS material cannot be read or
    /// the queues cannot be declared.
    pub async fn connect(target_cfg: &TargetConfig) -> Result<Self, ClientError> {
        let amqp = &target_cfg.connection.amqp;
        let props = ConnectionProperties::default()
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio);

        let connection = match target_cfg.connection.auth.kind {
            AuthKind::None => Connection::connect(&amqp.url, props).await?,
            AuthKind::Mtls => {
                let Some(mtls) = target_cfg.connection.auth.mtls.as_ref() else {
                    return Err(ClientError::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "mtls auth without tls material",
                    )));
                };
                let tls = load_tls(mtls)?;
                Connection::connect_with_config(&amqp.url, props, tls).await?
            }
        };

        let channel = open_channel(&connection, amqp).await?;
        debug!(region = %target_cfg.region, source = %amqp.source, target = %amqp.target, "operator client connected");

        Ok(Self {
            region: target_cfg.region.clone(),
            source: amqp.source.clone(),
            target: amqp.target.clone(),
            connection,
            channel: Mutex::new(channel),
        })
    }

    /// Get the shared channel, reopening it when the broker dropped it.
    async fn channel(&self) -> Result<tokio::sync::MutexGuard<'_, Channel>, ClientError> {
        let mut guard = self.channel.lock().await;
        if !guard.status().connected() {
            warn!(region = %self.region, "amqp channel lost, reopening");
            *guard = self
                .connection
                .create_channel()
                .await
                .map_err(ClientError::Amqp)?;
        }
        Ok(guard)
    }
}

async fn open_channel(connection: &Connection, amqp: &AmqpConfig) -> Result<Channel, ClientError> {
    let channel = connection.create_channel().await?;
    let opts = QueueDeclareOptions {
        durable: true,
        ..QueueDeclareOptions::default()
    };
    channel
        .queue_declare(&amqp.target, opts, FieldTable::default())
        .await?;
    channel
        .queue_declare(&amqp.source, opts, FieldTable::default())
        .await?;
    Ok(channel)
}

fn load_tls(mtls: &MtlsConfig) -> Result<OwnedTLSConfig, ClientError> {
    let cert_chain = std::fs::read_to_string(&mtls.ca_file)?;
    let der = std::fs::read(&mtls.cert_file)?;
    let password = std::fs::read_to_string(&mtls.key_file)?
        .trim()
        .to_owned();
    Ok(OwnedTLSConfig {
        identity: Some(OwnedIdentity { der, password }),
        cert_chain: Some(cert_chain),
    })
}

#[async_trait]
impl OperatorClient for AmqpClient {
    async fn send(&self, request: OperatorRequest) -> Result<(), ClientError> {
        let payload = request.encode_to_vec();
        let channel = self.channel().await?;
        channel
            .basic_publish(
                "",
                &self.target,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default(),
            )
            .await?
            .await?;
        Ok(())
    }

    async fn try_receive(&self) -> Result<Option<OperatorResponse>, ClientError> {
        let channel = self.channel().await?;
        // Auto-ack: a response lost to a crash is re-covered by the resend
        // path, the reconcile state machine tolerates duplicates.
        let Some(message) = channel
            .basic_get(&self.source, BasicGetOptions { no_ack: true })
            .await?
        else {
            return Ok(None);
        };
        let response = OperatorResponse::decode(message.delivery.data.as_slice())?;
        Ok(Some(response))
    }
}

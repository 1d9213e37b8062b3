//! AMQP consumers.
//!
//! Both event kinds arrive on durable fanout exchanges; this service binds
//! its own queue to each and forwards raw payloads into the in-process
//! queues. Decoding and all aggregation happen behind that seam, so the
//! rest of the service never sees the broker.

use gridcover_core::config::AmqpConfig;
use futures::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::mpsc;

/// Subscribe to one fanout exchange and forward deliveries until the
/// broker connection or the receiving worker goes away.
pub async fn run_consumer(
    config: AmqpConfig,
    exchange: String,
    queue: String,
    deliveries: mpsc::Sender<Vec<u8>>,
) -> lapin::Result<()> {
    let connection = Connection::connect(&config.uri(), ConnectionProperties::default()).await?;
    let channel = connection.create_channel().await?;

    channel
        .exchange_declare(
            &exchange,
            ExchangeKind::Fanout,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    let declared = channel
        .queue_declare(&queue, QueueDeclareOptions::default(), FieldTable::default())
        .await?;

    channel
        .queue_bind(
            declared.name().as_str(),
            &exchange,
            "",
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    channel
        .basic_qos(config.prefetch, BasicQosOptions::default())
        .await?;

    let mut consumer = channel
        .basic_consume(
            declared.name().as_str(),
            "",
            BasicConsumeOptions {
                no_ack: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    tracing::info!(exchange, queue, "AMQP consumer started");

    while let Some(delivery) = consumer.next().await {
        let delivery = delivery?;
        if deliveries.send(delivery.data).await.is_err() {
            // The worker side hung up; we are shutting down.
            break;
        }
    }

    Ok(())
}

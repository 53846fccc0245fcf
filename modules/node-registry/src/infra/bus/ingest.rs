use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::source::MessageSource;
use crate::domain::service::Service;

/// Feeds every message of `source` into the service until cancelled
/// or until the bus goes away.
///
/// Retained clears are dropped here: they are the echo of a delete and must
/// not bring the node back.
#[must_use]
pub fn spawn_ingestion<S>(
    service: Service,
    mut source: S,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    S: MessageSource + 'static,
{
    tokio::spawn(async move {
        info!("telemetry ingestion started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                msg = source.recv() => {
                    let Some(msg) = msg else { break };
                    if msg.is_retained_clear() {
                        debug!(topic = %msg.topic, "retained clear skipped");
                        continue;
                    }
                    if service.ingest(&msg.topic, &msg.payload).is_none() {
                        debug!(topic = %msg.topic, "message produced no update");
                    }
                }
            }
        }
        info!("telemetry ingestion stopped");
    })
}

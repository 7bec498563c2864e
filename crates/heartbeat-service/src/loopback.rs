//! Loopback responder for local runs
//!
//! Subscribes to every probed endpoint and answers each heartbeat request as a
//! healthy service would. Never enable it against a real fleet: it would mask
//! every outage.

use chrono::Utc;
use heartbeat_core::{
    HealthError, HeartbeatReply, HeartbeatRequest, MessageBus, MonitorConfig, ReplyStatus,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Healthy reply for `request`, as service `service_name` would send it
pub fn reply_to(request: &HeartbeatRequest, service_name: &str) -> HeartbeatReply {
    HeartbeatReply {
        id: request.id.clone(),
        name: service_name.to_string(),
        status: ReplyStatus { code: 0 },
        sended: request.timestamp,
        received: Utc::now(),
    }
}

/// Start one responder task per probed service on `tasks`.
pub async fn spawn(
    bus: Arc<dyn MessageBus>,
    config: &MonitorConfig,
    shutdown: CancellationToken,
    tasks: &TaskTracker,
) -> Result<(), HealthError> {
    for service in config.probed_services() {
        let mut requests =
            bus.subscribe(&service.endpoint)
                .await
                .map_err(|e| HealthError::SubscribeFailed {
                    topic: service.endpoint.clone(),
                    reason: e.to_string(),
                })?;
        let bus = Arc::clone(&bus);
        let name = service.name.clone();
        let shutdown = shutdown.clone();

        info!(service = %name, topic = %service.endpoint, "Loopback responder enabled");
        tasks.spawn(async move {
            loop {
                let message = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    message = requests.recv() => match message {
                        Some(message) => message,
                        None => break,
                    },
                };

                let request: HeartbeatRequest = match serde_json::from_slice(&message.payload) {
                    Ok(request) => request,
                    Err(e) => {
                        warn!(service = %name, error = %e, "Loopback: ignoring malformed request");
                        continue;
                    }
                };
                let reply = match serde_json::to_vec(&reply_to(&request, &name)) {
                    Ok(reply) => reply,
                    Err(e) => {
                        warn!(service = %name, error = %e, "Loopback: cannot encode reply");
                        continue;
                    }
                };
                match bus.publish(&request.destination, reply).await {
                    Ok(()) => debug!(service = %name, attempt_id = %request.id, "Loopback replied"),
                    Err(e) => warn!(service = %name, error = %e, "Loopback: reply not published"),
                }
            }
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use heartbeat_core::{AttemptId, MemoryBus, ServiceDefinition};

    #[test]
    fn test_reply_round_trips_through_parser() {
        let request = HeartbeatRequest {
            id: AttemptId::from("abc"),
            destination: "health/_callback".to_string(),
            timestamp: Utc::now(),
        };
        let bytes = serde_json::to_vec(&reply_to(&request, "billing")).unwrap();
        let parsed = HeartbeatReply::parse(&bytes).unwrap();

        assert_eq!(parsed.id, request.id);
        assert_eq!(parsed.name, "billing");
        assert!(parsed.is_healthy());
    }

    #[tokio::test]
    async fn test_answers_on_destination() {
        let bus: Arc<MemoryBus> = Arc::new(MemoryBus::new());
        let config = MonitorConfig::new(vec![ServiceDefinition::bus("billing", "billing/ping", 5)]);
        let shutdown = CancellationToken::new();
        let tasks = TaskTracker::new();
        tokio_test::assert_ok!(spawn(bus.clone(), &config, shutdown.clone(), &tasks).await);

        let mut replies = bus.subscribe("replies").await.unwrap();
        let request = HeartbeatRequest {
            id: AttemptId::from("abc"),
            destination: "replies".to_string(),
            timestamp: Utc::now(),
        };
        bus.publish("billing/ping", serde_json::to_vec(&request).unwrap())
            .await
            .unwrap();

        let message = replies.recv().await.unwrap();
        let reply = HeartbeatReply::parse(&message.payload).unwrap();
        assert_eq!(reply.name, "billing");

        shutdown.cancel();
        tasks.close();
        tasks.wait().await;
    }
}

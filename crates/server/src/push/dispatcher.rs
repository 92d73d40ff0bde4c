//! Isolated push dispatch
//!
//! Each notification is sent from its own task. A slow, failing or panicking
//! provider call only affects the notification it carries; the semaphore caps
//! how many provider calls are in flight at once.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::{PushError, PushGateway, PushNotification};

#[derive(Clone)]
pub struct PushDispatcher {
    gateway: Arc<dyn PushGateway>,
    permits: Arc<Semaphore>,
}

impl PushDispatcher {
    pub fn new(gateway: Arc<dyn PushGateway>, max_in_flight: usize) -> Self {
        Self {
            gateway,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// Launch delivery of `notification` on its own task
    ///
    /// The task logs its own outcome; awaiting the handle is optional.
    pub fn dispatch(&self, notification: PushNotification) -> JoinHandle<Result<(), PushError>> {
        let gateway = self.gateway.clone();
        let permits = self.permits.clone();

        tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| PushError::Shutdown)?;

            let kind = notification.kind().to_string();
            match gateway.send(&notification).await {
                Ok(()) => {
                    debug!("Sent {} notification via {}", kind, gateway.name());
                    Ok(())
                }
                Err(e) => {
                    warn!("Failed to send {} notification via {}: {}", kind, gateway.name(), e);
                    Err(e)
                }
            }
        })
    }

    /// Dispatch and wait for the verdict
    ///
    /// Returns whether the provider accepted the notification. A panic inside
    /// the provider call counts as a failure.
    pub async fn deliver(&self, notification: PushNotification) -> bool {
        match self.dispatch(notification).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => false,
            Err(e) => {
                error!("Push task aborted: {}", e);
                false
            }
        }
    }

    pub fn gateway_name(&self) -> &str {
        self.gateway.name()
    }
}

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::{CalculationRequest, CoverageResponse, Envelope, MessageBus, MessageHandler};
use crate::error::ServiceError;

pub const CALCULATION_REQUESTS_TOPIC: &str = "calculation-requests";
pub const COVERAGE_RESPONSES_TOPIC: &str = "coverage-responses";

/// In-process bus: one unbounded channel per topic.
#[derive(Clone)]
pub struct InMemoryBus {
    requests: mpsc::UnboundedSender<Envelope<CalculationRequest>>,
    responses: mpsc::UnboundedSender<Envelope<CoverageResponse>>,
}

/// Receiving ends handed to the consumers.
pub struct BusReceivers {
    pub requests: mpsc::UnboundedReceiver<Envelope<CalculationRequest>>,
    pub responses: mpsc::UnboundedReceiver<Envelope<CoverageResponse>>,
}

impl InMemoryBus {
    pub fn new() -> (Self, BusReceivers) {
        let (requests, requests_rx) = mpsc::unbounded_channel();
        let (responses, responses_rx) = mpsc::unbounded_channel();
        (
            Self {
                requests,
                responses,
            },
            BusReceivers {
                requests: requests_rx,
                responses: responses_rx,
            },
        )
    }

    pub fn request_sender(&self) -> mpsc::UnboundedSender<Envelope<CalculationRequest>> {
        self.requests.clone()
    }

    pub fn response_sender(&self) -> mpsc::UnboundedSender<Envelope<CoverageResponse>> {
        self.responses.clone()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish_calculation_request(&self, request: CalculationRequest) -> Result<(), ServiceError> {
        debug!(
            "Publishing calculation request {} for {}/{}",
            request.calculation_id, request.service_name, request.api_name
        );
        self.requests
            .send(Envelope::new(request.calculation_id, request))
            .map_err(|_| ServiceError::Bus(format!("{} topic is closed", CALCULATION_REQUESTS_TOPIC)))
    }

    async fn publish_coverage_response(&self, response: CoverageResponse) -> Result<(), ServiceError> {
        debug!(
            "Publishing coverage response {} for {}/{} ({} results)",
            response.calculation_id,
            response.service_name,
            response.api_name,
            response.results.len()
        );
        self.responses
            .send(Envelope::new(response.calculation_id, response))
            .map_err(|_| ServiceError::Bus(format!("{} topic is closed", COVERAGE_RESPONSES_TOPIC)))
    }
}

/// Redelivery policy for transient handler failures.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryPolicy {
    pub max_attempts: u32,
    /// Multiplied by the attempt number before redelivering.
    pub backoff: Duration,
}

/// Spawn a consumer for one topic. Each message is handled on its own task;
/// transient failures are requeued until `max_attempts`, everything else is
/// logged and dropped.
pub fn spawn_consumer<T>(
    topic: &'static str,
    mut rx: mpsc::UnboundedReceiver<Envelope<T>>,
    requeue: mpsc::UnboundedSender<Envelope<T>>,
    policy: DeliveryPolicy,
    handler: Arc<dyn MessageHandler<T>>,
) -> tokio::task::JoinHandle<()>
where
    T: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        debug!("Consumer for {} started", topic);
        while let Some(envelope) = rx.recv().await {
            let handler = handler.clone();
            let requeue = requeue.clone();
            tokio::spawn(async move {
                deliver(topic, envelope, requeue, policy, handler).await;
            });
        }
        debug!("Consumer for {} stopped", topic);
    })
}

async fn deliver<T>(
    topic: &'static str,
    envelope: Envelope<T>,
    requeue: mpsc::UnboundedSender<Envelope<T>>,
    policy: DeliveryPolicy,
    handler: Arc<dyn MessageHandler<T>>,
) where
    T: Clone + Send + Sync + 'static,
{
    let key = envelope.key;
    let attempt = envelope.attempt;
    match handler.handle(envelope.payload.clone()).await {
        Ok(()) => {}
        Err(e) if e.is_transient() && attempt < policy.max_attempts => {
            warn!(
                "{} message {} failed on attempt {}/{}, redelivering: {}",
                topic, key, attempt, policy.max_attempts, e
            );
            tokio::time::sleep(policy.backoff * attempt).await;
            let retry = Envelope {
                key,
                attempt: attempt + 1,
                payload: envelope.payload,
            };
            if requeue.send(retry).is_err() {
                error!("{} message {} lost: topic closed during redelivery", topic, key);
            }
        }
        Err(e) if e.is_transient() => {
            error!(
                "{} message {} dead-lettered after {} attempts: {}",
                topic, key, attempt, e
            );
        }
        Err(e) => {
            error!("{} message {} failed: {}", topic, key, e);
        }
    }
}

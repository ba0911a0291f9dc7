use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use api_coverage_gate::bus::memory::{spawn_consumer, DeliveryPolicy, InMemoryBus};
use api_coverage_gate::bus::{CalculationRequest, MessageBus, MessageHandler};
use api_coverage_gate::error::ServiceError;

/// Fails the first `failures` deliveries with the given error kind.
struct FlakyHandler {
    calls: AtomicU32,
    failures: u32,
    transient: bool,
}

impl FlakyHandler {
    fn new(failures: u32, transient: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            failures,
            transient,
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler<CalculationRequest> for FlakyHandler {
    async fn handle(&self, _message: CalculationRequest) -> Result<(), ServiceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call > self.failures {
            return Ok(());
        }
        if self.transient {
            Err(ServiceError::TracingStoreUnavailable("connection refused".to_string()))
        } else {
            Err(ServiceError::InvalidRequest("bad message".to_string()))
        }
    }
}

fn request() -> CalculationRequest {
    CalculationRequest {
        calculation_id: uuid::Uuid::new_v4(),
        service_name: "billing".to_string(),
        api_name: "invoices".to_string(),
        api_version: None,
        lookback_window: 60,
        attribute_filters: vec![],
    }
}

async fn run(handler: Arc<FlakyHandler>, max_attempts: u32) {
    let (bus, receivers) = InMemoryBus::new();
    let policy = DeliveryPolicy {
        max_attempts,
        backoff: Duration::from_millis(1),
    };
    spawn_consumer(
        "calculation-requests",
        receivers.requests,
        bus.request_sender(),
        policy,
        handler,
    );
    bus.publish_calculation_request(request()).await.unwrap();
    // Generous settle time for redeliveries with millisecond backoff.
    tokio::time::sleep(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn test_transient_failure_is_redelivered_until_success() {
    let handler = FlakyHandler::new(2, true);
    run(handler.clone(), 5).await;
    assert_eq!(handler.calls(), 3);
}

#[tokio::test]
async fn test_transient_failure_stops_at_max_attempts() {
    let handler = FlakyHandler::new(u32::MAX, true);
    run(handler.clone(), 3).await;
    assert_eq!(handler.calls(), 3);
}

#[tokio::test]
async fn test_permanent_failure_is_not_redelivered() {
    let handler = FlakyHandler::new(u32::MAX, false);
    run(handler.clone(), 5).await;
    assert_eq!(handler.calls(), 1);
}

#[tokio::test]
async fn test_publish_fails_once_consumers_are_gone() {
    let (bus, receivers) = InMemoryBus::new();
    drop(receivers);
    let err = bus.publish_calculation_request(request()).await.unwrap_err();
    assert!(matches!(err, ServiceError::Bus(_)));
    assert!(err.is_transient());
}

#[test]
fn test_wire_format_is_camel_case() {
    let value = serde_json::to_value(request()).unwrap();
    assert!(value.get("calculationId").is_some());
    assert_eq!(value["lookbackWindow"], 60);
    assert!(value.get("apiVersion").is_none());
}

//! Request/response dispatch through the full stack.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use courier::prelude::*;
use courier::{AnyValue, ConfigurationError};

// =============================================================================
// Handlers
// =============================================================================

pub struct Ping {
    pub value: i32,
}

#[derive(Default)]
pub struct PingHandler;

#[handlers(default)]
impl PingHandler {
    async fn handle(&self, ping: Ping) -> String {
        format!("Result: {}", ping.value)
    }
}

pub struct Double(pub i32);

#[derive(Default)]
pub struct DoubleHandler;

#[handlers(default)]
impl DoubleHandler {
    fn handle(&self, request: Double) -> i32 {
        request.0 * 2
    }
}

pub struct Record(pub &'static str);

pub struct RecordHandler {
    log: Arc<Mutex<Vec<&'static str>>>,
}

#[handlers]
impl RecordHandler {
    async fn handle(&self, command: Record) {
        self.log.lock().unwrap().push(command.0);
    }
}

pub struct Wait;

#[derive(Default)]
pub struct WaitHandler;

#[handlers(default)]
impl WaitHandler {
    async fn handle(&self, _: Wait, cancel: CancellationToken) -> Result<&'static str, BoxError> {
        tokio::select! {
            _ = cancel.cancelled() => Err("cancelled".into()),
            _ = tokio::time::sleep(Duration::from_secs(30)) => Ok("done"),
        }
    }
}

#[derive(Default)]
pub struct ShadowPingHandler;

#[handlers(default, unlinked)]
impl ShadowPingHandler {
    fn handle(&self, ping: Ping) -> String {
        format!("Shadow: {}", ping.value)
    }
}

pub struct Orphan;

// =============================================================================
// Helpers
// =============================================================================

fn mediator<I>(modules: I) -> Arc<Mediator>
where
    I: IntoIterator<Item = HandlerModule>,
{
    let mut services = ServiceCollection::new();
    services.add_mediator(modules);
    services.build().mediator().unwrap()
}

fn app() -> HandlerModule {
    HandlerModule::new("app")
        .with::<PingHandler>()
        .with::<DoubleHandler>()
        .with::<WaitHandler>()
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_async_value_handler() {
    let mediator = mediator([app()]);
    let result = mediator.send::<String, _>(Ping { value: 42 }).await.unwrap();
    assert_eq!(result, "Result: 42");
}

#[tokio::test]
async fn test_sync_value_handler() {
    let mediator = mediator([app()]);
    assert_eq!(mediator.send::<i32, _>(Double(21)).await.unwrap(), 42);
}

#[tokio::test]
async fn test_unit_command() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut services = ServiceCollection::new();
    services
        .add_mediator([HandlerModule::new("commands").with::<RecordHandler>()])
        .add_singleton(RecordHandler { log: log.clone() });
    let mediator = services.build().mediator().unwrap();

    mediator.execute(Record("first")).await.unwrap();
    let unit = mediator.send::<Unit, _>(Record("second")).await.unwrap();

    assert_eq!(unit, Unit);
    assert_eq!(*log.lock().unwrap(), ["first", "second"]);
}

#[tokio::test]
async fn test_handler_not_found() {
    let mediator = mediator([app()]);
    let err = mediator.send::<i32, _>(Orphan).await.unwrap_err();
    assert!(err.is_handler_not_found());
    assert!(err.to_string().contains("Orphan"));

    // Failures are not cached.
    assert_eq!(mediator.request_binding_count(), 0);
}

#[tokio::test]
async fn test_response_type_mismatch() {
    let mediator = mediator([app()]);
    let err = mediator.send::<u64, _>(Double(1)).await.unwrap_err();
    assert!(err.is_response_type_mismatch());

    let message = err.to_string();
    assert!(message.contains("i32"), "{message}");
    assert!(message.contains("u64"), "{message}");
}

#[tokio::test]
async fn test_binding_is_cached() {
    let mediator = mediator([app()]);
    assert!(mediator.cached_request_binding::<i32, Double>().is_none());

    mediator.send::<i32, _>(Double(1)).await.unwrap();
    mediator.send::<i32, _>(Double(2)).await.unwrap();

    let first = mediator.cached_request_binding::<i32, Double>().unwrap();
    let second = mediator.request_binding::<i32, Double>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(mediator.request_binding_count(), 1);
    assert!(first.handler().name().ends_with("DoubleHandler"));
}

#[tokio::test]
async fn test_fresh_mediator_starts_cold() {
    let first = mediator([app()]);
    first.send::<i32, _>(Double(1)).await.unwrap();

    let second = mediator([app()]);
    assert_eq!(second.request_binding_count(), 0);
}

#[tokio::test]
async fn test_erased_response() {
    let mediator = mediator([app()]);
    let value: AnyValue = mediator.send::<AnyValue, _>(Double(4)).await.unwrap();
    assert_eq!(*value.downcast::<i32>().unwrap(), 8);
}

#[tokio::test]
async fn test_cancellation_reaches_handler() {
    let mediator = mediator([app()]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = mediator
        .send_with::<&'static str, _>(Wait, cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, MediatorError::Handler(_)));
    assert_eq!(err.to_string(), "cancelled");
}

#[tokio::test]
async fn test_routes_override_convention() {
    let mediator = mediator([HandlerModule::new("shadow")
        .with::<PingHandler>()
        .with::<ShadowPingHandler>()
        .route::<Ping, ShadowPingHandler>()]);
    let result = mediator.send::<String, _>(Ping { value: 1 }).await.unwrap();
    assert_eq!(result, "Shadow: 1");
}

#[tokio::test]
async fn test_ambiguous_routes() {
    let mediator = mediator([
        HandlerModule::new("a")
            .with::<PingHandler>()
            .route::<Ping, PingHandler>(),
        HandlerModule::new("b")
            .with::<ShadowPingHandler>()
            .route::<Ping, ShadowPingHandler>(),
    ]);
    let err = mediator.send::<String, _>(Ping { value: 1 }).await.unwrap_err();
    assert!(matches!(
        err,
        MediatorError::Configuration(ConfigurationError::AmbiguousHandler { .. })
    ));
}

#[tokio::test]
async fn test_linked_handlers() {
    let mediator = mediator([HandlerModule::linked(module_path!())]);
    let result = mediator.send::<String, _>(Ping { value: 7 }).await.unwrap();
    assert_eq!(result, "Result: 7");

    // `unlinked` types stay out of the link-time list.
    let module = HandlerModule::linked(module_path!());
    assert!(
        module
            .handlers()
            .iter()
            .all(|d| !d.handler().name().ends_with("ShadowPingHandler"))
    );
}

#[tokio::test]
async fn test_handler_without_instance() {
    // `RecordHandler` has no default factory and no registered instance.
    let mediator = mediator([HandlerModule::new("commands").with::<RecordHandler>()]);
    let err = mediator.execute(Record("lost")).await.unwrap_err();
    assert!(matches!(err, MediatorError::HandlerUnavailable { .. }));
}

#[tokio::test]
async fn test_tower_service() {
    use tower::ServiceExt;

    let mediator = mediator([app()]);
    let result = mediator
        .service::<Double, i32>()
        .oneshot(Double(5))
        .await
        .unwrap();
    assert_eq!(result, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_send_binds_once() {
    let mediator = mediator([app()]);
    let start = Arc::new(tokio::sync::Barrier::new(32));
    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..32 {
        let mediator = mediator.clone();
        let start = start.clone();
        tasks.spawn(async move {
            start.wait().await;
            let doubled = mediator.send::<i32, _>(Double(i)).await.unwrap();
            assert_eq!(doubled, i * 2);
            mediator.cached_request_binding::<i32, Double>().unwrap()
        });
    }
    let bindings = tasks.join_all().await;

    assert_eq!(bindings.len(), 32);
    assert_eq!(mediator.request_binding_count(), 1);
    assert!(bindings.iter().all(|b| Arc::ptr_eq(b, &bindings[0])));
}

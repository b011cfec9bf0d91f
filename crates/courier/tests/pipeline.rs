//! Middleware pipelines around request handlers.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use courier::prelude::*;
use courier::{Container, middleware_fn};

// =============================================================================
// Shared log
// =============================================================================

#[derive(Default)]
pub struct Log(Mutex<Vec<String>>);

impl Log {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

// =============================================================================
// Requests and handlers
// =============================================================================

pub struct Greet(pub &'static str);

pub struct GreetHandler {
    log: Arc<Log>,
}

#[handlers]
impl GreetHandler {
    fn handle(&self, greet: Greet) -> String {
        self.log.push("Handler");
        format!("Hello, {}", greet.0)
    }
}

pub struct Number(pub i32);

#[derive(Default)]
pub struct NumberHandler;

#[handlers(default)]
impl NumberHandler {
    async fn handle(&self, number: Number) -> String {
        format!("Modified: {}", number.0)
    }
}

pub struct Check;

#[derive(Default)]
pub struct CheckHandler;

#[handlers(default)]
impl CheckHandler {
    fn handle(&self, _: Check, cancel: &CancellationToken) -> bool {
        cancel.is_cancelled()
    }
}

// =============================================================================
// Middleware
// =============================================================================

struct Tag {
    name: &'static str,
    log: Arc<Log>,
}

#[async_trait]
impl Middleware<Greet, String> for Tag {
    async fn handle(
        &self,
        request: Greet,
        next: Next<Greet, String>,
        cancel: CancellationToken,
    ) -> Result<String, BoxError> {
        self.log.push(format!("{}-before", self.name));
        let response = next.run(request, cancel).await;
        self.log.push(format!("{}-after", self.name));
        response
    }
}

fn tag(name: &'static str) -> impl Fn(&Container) -> Tag + Send + Sync + 'static {
    move |container: &Container| Tag {
        name,
        log: container.get::<Log>().unwrap(),
    }
}

struct OpenTag {
    log: Arc<Log>,
}

#[async_trait]
impl OpenMiddleware for OpenTag {
    async fn handle(
        &self,
        request: Envelope,
        next: Next<Envelope, AnyValue>,
        cancel: CancellationToken,
    ) -> Result<AnyValue, BoxError> {
        self.log
            .push(format!("Open({})", request.request_type().short_name()));
        next.run(request, cancel).await
    }
}

struct Counting {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl OpenMiddleware for Counting {
    async fn handle(
        &self,
        request: Envelope,
        next: Next<Envelope, AnyValue>,
        cancel: CancellationToken,
    ) -> Result<AnyValue, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        next.run(request, cancel).await
    }
}

/// Swaps the request for a value of another type.
struct Smuggler;

#[async_trait]
impl OpenMiddleware for Smuggler {
    async fn handle(
        &self,
        _: Envelope,
        next: Next<Envelope, AnyValue>,
        cancel: CancellationToken,
    ) -> Result<AnyValue, BoxError> {
        next.run(Envelope::new::<u8, String>(0), cancel).await
    }
}

/// Answers every request itself without calling the handler.
struct Canned;

#[async_trait]
impl OpenMiddleware for Canned {
    async fn handle(
        &self,
        _: Envelope,
        _: Next<Envelope, AnyValue>,
        _: CancellationToken,
    ) -> Result<AnyValue, BoxError> {
        Ok(Box::new(String::from("canned")))
    }
}

/// Records the handler's response as seen from an open middleware.
struct Inspect {
    log: Arc<Log>,
}

#[async_trait]
impl OpenMiddleware for Inspect {
    async fn handle(
        &self,
        request: Envelope,
        next: Next<Envelope, AnyValue>,
        cancel: CancellationToken,
    ) -> Result<AnyValue, BoxError> {
        let response = next.run(request, cancel).await?;
        match response.downcast_ref::<String>() {
            Some(text) => self.log.push(format!("saw {text}")),
            None => self.log.push("saw something else"),
        }
        Ok(response)
    }
}

#[derive(Debug)]
struct Denied;

impl fmt::Display for Denied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("denied")
    }
}

impl std::error::Error for Denied {}

fn greeter() -> ServiceCollection {
    let mut services = ServiceCollection::new();
    services
        .add_mediator([HandlerModule::new("app")
            .with::<GreetHandler>()
            .with::<NumberHandler>()
            .with::<CheckHandler>()])
        .add_singleton(Log::default())
        .add_singleton_with(|container: &Container| GreetHandler {
            log: container.get::<Log>().unwrap(),
        });
    services
}

fn shared_log(provider: &ServiceProvider) -> Arc<Log> {
    provider.get::<Log>().unwrap()
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_no_middleware() {
    let services = greeter();
    let provider = services.build();
    let mediator = provider.mediator().unwrap();

    let response = mediator.send::<String, _>(Greet("world")).await.unwrap();
    assert_eq!(response, "Hello, world");
    assert_eq!(shared_log(&provider).entries(), ["Handler"]);
}

#[tokio::test]
async fn test_single_middleware_wraps_handler() {
    let mut services = greeter();
    services.add_middleware::<Greet, String, _, _>(|container: &Container| {
        let log = container.get::<Log>().unwrap();
        middleware_fn(
            move |greet: Greet, next: Next<Greet, String>, cancel: CancellationToken| {
                let log = log.clone();
                async move {
                    log.push("Before");
                    let response = next.run(greet, cancel).await;
                    log.push("After");
                    response
                }
            },
        )
    });
    let provider = services.build();
    let mediator = provider.mediator().unwrap();

    mediator.send::<String, _>(Greet("world")).await.unwrap();
    assert_eq!(
        shared_log(&provider).entries(),
        ["Before", "Handler", "After"]
    );
}

#[tokio::test]
async fn test_cancelled_request_short_circuits() {
    let mut services = greeter();
    services.add_middleware::<Greet, String, _, _>(|_| {
        middleware_fn(
            |greet: Greet, next: Next<Greet, String>, cancel: CancellationToken| async move {
                if cancel.is_cancelled() {
                    return Err::<String, BoxError>("cancelled".into());
                }
                next.run(greet, cancel).await
            },
        )
    });
    let provider = services.build();
    let mediator = provider.mediator().unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = mediator
        .send_with::<String, _>(Greet("world"), cancel)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "cancelled");
    assert!(shared_log(&provider).entries().is_empty());
}

#[tokio::test]
async fn test_registration_order_is_nesting_order() {
    let mut services = greeter();
    services
        .add_middleware::<Greet, String, _, _>(tag("M1"))
        .add_middleware::<Greet, String, _, _>(tag("M2"))
        .add_middleware::<Greet, String, _, _>(tag("M3"));
    let provider = services.build();
    let mediator = provider.mediator().unwrap();

    mediator.send::<String, _>(Greet("world")).await.unwrap();
    assert_eq!(
        shared_log(&provider).entries(),
        [
            "M1-before",
            "M2-before",
            "M3-before",
            "Handler",
            "M3-after",
            "M2-after",
            "M1-after",
        ]
    );
}

#[tokio::test]
async fn test_short_circuit() {
    let mut services = greeter();
    services.add_middleware::<Greet, String, _, _>(|_| {
        middleware_fn(|_: Greet, _: Next<Greet, String>, _: CancellationToken| async {
            Ok::<_, BoxError>(String::from("cached"))
        })
    });
    let provider = services.build();
    let mediator = provider.mediator().unwrap();

    let response = mediator.send::<String, _>(Greet("world")).await.unwrap();
    assert_eq!(response, "cached");
    assert!(shared_log(&provider).entries().is_empty());
}

#[tokio::test]
async fn test_middleware_replaces_request() {
    let mut services = greeter();
    services.add_middleware::<Number, String, _, _>(|_| {
        middleware_fn(
            |number: Number, next: Next<Number, String>, cancel: CancellationToken| {
                next.run(Number(number.0 * 2), cancel)
            },
        )
    });
    let mediator = services.build().mediator().unwrap();

    let response = mediator.send::<String, _>(Number(10)).await.unwrap();
    assert_eq!(response, "Modified: 20");
}

#[tokio::test]
async fn test_middleware_only_joins_its_pipeline() {
    let mut services = greeter();
    services.add_middleware::<Number, String, _, _>(|_| {
        middleware_fn(|_: Number, _: Next<Number, String>, _: CancellationToken| async {
            Err::<String, BoxError>(Box::new(Denied))
        })
    });
    let provider = services.build();
    let mediator = provider.mediator().unwrap();

    assert_eq!(
        mediator.send::<String, _>(Greet("world")).await.unwrap(),
        "Hello, world"
    );
    let err = mediator.send::<String, _>(Number(1)).await.unwrap_err();
    assert!(err.downcast_handler_error::<Denied>().is_some());
    assert_eq!(err.to_string(), "denied");
}

#[tokio::test]
async fn test_middleware_translates_errors() {
    let mut services = greeter();
    services.add_middleware::<Number, String, _, _>(|_| {
        middleware_fn(
            |number: Number, next: Next<Number, String>, cancel: CancellationToken| async move {
                match next.run(number, cancel).await {
                    Ok(response) => Err::<String, BoxError>(format!("rejected {response}").into()),
                    Err(err) => Err(err),
                }
            },
        )
    });
    let mediator = services.build().mediator().unwrap();

    let err = mediator.send::<String, _>(Number(3)).await.unwrap_err();
    assert_eq!(err.to_string(), "rejected Modified: 3");
}

#[tokio::test]
async fn test_cancellation_flows_through_pipeline() {
    let mut services = greeter();
    services.add_middleware::<Check, bool, _, _>(|_| {
        middleware_fn(
            |check: Check, next: Next<Check, bool>, cancel: CancellationToken| {
                next.run(check, cancel)
            },
        )
    });
    let mediator = services.build().mediator().unwrap();

    let cancel = CancellationToken::new();
    assert!(!mediator.send_with::<bool, _>(Check, cancel.clone()).await.unwrap());
    cancel.cancel();
    assert!(mediator.send_with::<bool, _>(Check, cancel).await.unwrap());
}

#[tokio::test]
async fn test_open_middleware_joins_every_pipeline() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut services = greeter();
    let counter = calls.clone();
    services
        .add_open_middleware(MiddlewareDescriptor::open(move |_| Counting {
            calls: counter.clone(),
        }))
        .unwrap();
    let mediator = services.build().mediator().unwrap();

    mediator.send::<String, _>(Greet("a")).await.unwrap();
    mediator.send::<String, _>(Number(1)).await.unwrap();
    mediator
        .send_with::<bool, _>(Check, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_open_and_closed_interleave() {
    let mut services = greeter();
    services.add_middleware::<Greet, String, _, _>(tag("M1"));
    services
        .add_open_middleware(MiddlewareDescriptor::open(|container: &Container| OpenTag {
            log: container.get::<Log>().unwrap(),
        }))
        .unwrap();
    services.add_middleware::<Greet, String, _, _>(tag("M2"));
    let provider = services.build();
    let mediator = provider.mediator().unwrap();

    mediator.send::<String, _>(Greet("world")).await.unwrap();
    assert_eq!(
        shared_log(&provider).entries(),
        [
            "M1-before",
            "Open(Greet)",
            "M2-before",
            "Handler",
            "M2-after",
            "M1-after",
        ]
    );
}

#[tokio::test]
async fn test_open_middleware_cannot_change_request_type() {
    let mut services = greeter();
    services
        .add_open_middleware(MiddlewareDescriptor::open(|_| Smuggler))
        .unwrap();
    let mediator = services.build().mediator().unwrap();

    let err = mediator.send::<String, _>(Greet("world")).await.unwrap_err();
    assert!(matches!(err, MediatorError::EnvelopeTypeMismatch { .. }));
}

#[tokio::test]
async fn test_open_middleware_answers_erased_send() {
    let mut services = greeter();
    services
        .add_open_middleware(MiddlewareDescriptor::open(|_| Canned))
        .unwrap();
    let mediator = services.build().mediator().unwrap();

    let typed = mediator.send::<String, _>(Number(1)).await.unwrap();
    assert_eq!(typed, "canned");
    let erased = mediator.send::<AnyValue, _>(Number(1)).await.unwrap();
    assert_eq!(*erased.downcast::<String>().unwrap(), "canned");
}

#[tokio::test]
async fn test_open_middleware_sees_erased_response_once_boxed() {
    let mut services = greeter();
    services
        .add_open_middleware(MiddlewareDescriptor::open(|container: &Container| Inspect {
            log: container.get::<Log>().unwrap(),
        }))
        .unwrap();
    let provider = services.build();
    let mediator = provider.mediator().unwrap();

    let erased = mediator.send::<AnyValue, _>(Number(7)).await.unwrap();
    assert_eq!(*erased.downcast::<String>().unwrap(), "Modified: 7");
    mediator.send::<String, _>(Number(8)).await.unwrap();
    assert_eq!(
        shared_log(&provider).entries(),
        ["saw Modified: 7", "saw Modified: 8"]
    );
}

//! Driving requests through a scripted registry.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::{advance, Duration};

use dns_request::request::{Config, Event, Events, Request, TestOverrides};
use dns_request::{Registry, ResolvConf};

//------------ TestRegistry --------------------------------------------------

/// A registry that records traffic and lets the test deliver outcomes.
#[derive(Default)]
struct TestRegistry {
    /// The next identifier to assign.
    next_id: AtomicU16,

    /// Requests handed over for transmission.
    sent: Mutex<Vec<Request<Vec<u8>>>>,

    /// Identifiers of removed requests, in removal order.
    removed: Mutex<Vec<Option<u16>>>,
}

impl TestRegistry {
    fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    fn sent_request(&self) -> Request<Vec<u8>> {
        self.sent.lock().first().expect("nothing was sent").clone()
    }

    fn removed(&self) -> Vec<Option<u16>> {
        self.removed.lock().clone()
    }
}

impl Registry<Vec<u8>> for TestRegistry {
    fn send(&self, request: Request<Vec<u8>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        request.set_identifier(id);
        self.sent.lock().push(request);
    }

    fn remove(&self, request: &Request<Vec<u8>>) {
        self.removed.lock().push(request.identifier());
    }
}

//------------ Helpers -------------------------------------------------------

fn resolv_conf() -> ResolvConf {
    let mut conf = ResolvConf::new();
    conf.push_server("9.9.9.9");
    conf
}

fn new_request(timeout: Duration) -> (Request<Vec<u8>>, Events) {
    let mut config = Config::new();
    config.set_server("1.2.3.4");
    config.set_timeout(timeout);
    Request::new(b"example.com.".to_vec(), config, &resolv_conf())
}

//------------ Tests ---------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn answer_beats_the_timer() {
    let registry = Arc::new(TestRegistry::default());
    let (request, mut events) = new_request(Duration::from_secs(1));

    request.send(&registry);
    assert_eq!(registry.sent_count(), 1);
    assert_eq!(request.identifier(), Some(0));

    registry
        .sent_request()
        .deliver_answer(Bytes::from_static(b"reply"));
    assert!(matches!(
        events.recv().await,
        Some(Event::Answer(msg)) if msg == Bytes::from_static(b"reply")
    ));
    assert!(matches!(events.recv().await, Some(Event::End)));

    // The deadline timer was released; letting the clock run well past it
    // must not produce a late timeout.
    advance(Duration::from_secs(10)).await;
    assert!(matches!(events.recv().await, None));
    assert_eq!(registry.removed(), vec![Some(0)]);
    assert_eq!(request.identifier(), None);
}

#[tokio::test(start_paused = true)]
async fn timeout_beats_the_registry() {
    let registry = Arc::new(TestRegistry::default());
    let (request, mut events) = new_request(Duration::from_secs(1));

    request.send(&registry);
    assert!(matches!(events.recv().await, Some(Event::Timeout)));
    assert!(matches!(events.recv().await, Some(Event::End)));
    assert!(matches!(events.recv().await, None));
    assert_eq!(registry.removed(), vec![Some(0)]);

    // The registry is late; its delivery must be dropped silently.
    registry
        .sent_request()
        .deliver_answer(Bytes::from_static(b"too late"));
    assert!(request.is_completed());
}

#[tokio::test(start_paused = true)]
async fn cancel_before_any_delivery() {
    let registry = Arc::new(TestRegistry::default());
    let (request, mut events) = new_request(Duration::from_secs(4));

    request.send(&registry);
    request.cancel();
    assert!(matches!(events.recv().await, Some(Event::Cancelled)));
    assert!(matches!(events.recv().await, Some(Event::End)));
    assert!(matches!(events.recv().await, None));

    // Removed exactly once, while the identifier was still known.
    assert_eq!(registry.removed(), vec![Some(0)]);
    assert_eq!(request.identifier(), None);

    // Cancelling again and running out the clock both stay silent.
    request.cancel();
    advance(Duration::from_secs(10)).await;
    assert!(request.is_completed());
    assert_eq!(registry.removed().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn second_send_is_ignored() {
    let registry = Arc::new(TestRegistry::default());
    let (request, mut events) = new_request(Duration::from_secs(1));

    request.send(&registry);
    request.send(&registry);
    assert_eq!(registry.sent_count(), 1);

    registry.sent_request().deliver_answer(Bytes::new());
    assert!(matches!(events.recv().await, Some(Event::Answer(_))));
    assert!(matches!(events.recv().await, Some(Event::End)));
    assert!(matches!(events.recv().await, None));
}

#[tokio::test(start_paused = true)]
async fn concurrent_cancel_and_delivery_yield_one_outcome() {
    let registry = Arc::new(TestRegistry::default());
    let (request, mut events) = new_request(Duration::from_secs(4));

    request.send(&registry);
    let sent = registry.sent_request();

    let canceller = {
        let request = request.clone();
        tokio::spawn(async move { request.cancel() })
    };
    let deliverer = tokio::spawn(async move {
        sent.deliver_answer(Bytes::from_static(b"reply"))
    });
    canceller.await.unwrap();
    deliverer.await.unwrap();

    // Whichever trigger won, there is exactly one primary outcome and one
    // end-of-lifecycle signal.
    let first = events.recv().await;
    assert!(matches!(
        first,
        Some(Event::Cancelled) | Some(Event::Answer(_))
    ));
    assert!(matches!(events.recv().await, Some(Event::End)));
    assert!(matches!(events.recv().await, None));
    assert_eq!(registry.removed().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn forced_timeout_bypasses_the_registry() {
    let registry = Arc::new(TestRegistry::default());
    let overrides = TestOverrides {
        timeout: Some(true),
        ..Default::default()
    };
    let (request, mut events) = Request::with_overrides(
        b"example.com.".to_vec(),
        Config::new(),
        &resolv_conf(),
        overrides,
    );

    request.send(&registry);
    assert!(matches!(events.recv().await, Some(Event::Timeout)));
    assert!(matches!(events.recv().await, Some(Event::End)));
    assert!(matches!(events.recv().await, None));

    // Completed synchronously, without the registry ever seeing it.
    assert_eq!(registry.sent_count(), 0);
    assert!(registry.removed().is_empty());
    assert!(request.is_completed());
}

#[test]
fn suppressed_timeout_still_removes_the_request() {
    tokio_test::block_on(async {
        let registry = Arc::new(TestRegistry::default());
        let overrides = TestOverrides {
            timeout: Some(false),
            ..Default::default()
        };
        let mut config = Config::new();
        config.set_timeout(Duration::from_millis(1));
        let (request, mut events) = Request::with_overrides(
            b"example.com.".to_vec(),
            config,
            &resolv_conf(),
            overrides,
        );

        request.send(&registry);
        // No Timeout event; the channel just closes after End.
        assert!(matches!(events.recv().await, Some(Event::End)));
        assert!(matches!(events.recv().await, None));
        assert!(request.is_completed());
        assert_eq!(registry.removed().len(), 1);
    });
}

#[test]
fn suppressed_end_closes_the_channel_quietly() {
    tokio_test::block_on(async {
        let registry = Arc::new(TestRegistry::default());
        let overrides = TestOverrides {
            end: Some(false),
            ..Default::default()
        };
        let (request, mut events) = Request::with_overrides(
            b"example.com.".to_vec(),
            Config::new(),
            &resolv_conf(),
            overrides,
        );

        request.send(&registry);
        registry
            .sent_request()
            .deliver_answer(Bytes::from_static(b"reply"));
        assert!(matches!(events.recv().await, Some(Event::Answer(_))));
        assert!(matches!(events.recv().await, None));
        assert_eq!(registry.removed(), vec![Some(0)]);
    });
}

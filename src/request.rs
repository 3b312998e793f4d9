//! A single outstanding DNS request.
//!
//! A [`Request`] ties together one query, the deadline timer armed for it,
//! and the registry entry that routes the response back. Four triggers can
//! complete it – answer delivery, error delivery, the timer, and an
//! explicit cancel – and they race freely; the first to pass the completion
//! guard wins and the rest fall silent. Completion is observed as typed
//! [`Event`]s on the channel handed out at construction time.

use core::cmp;
use core::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::{sleep, Duration};
use tracing::debug;

use crate::conf::{ResolvConf, ServerConf, ServerSpec};
use crate::error::Error;
use crate::registry::Registry;

//------------ Configuration Constants ---------------------------------------

/// Configuration limits for the request timeout.
const TIMEOUT: DefMinMax<Duration> = DefMinMax::new(
    Duration::from_millis(4000),
    Duration::from_millis(1),
    Duration::from_secs(60),
);

//------------ Config --------------------------------------------------------

/// Configuration for a single request.
#[derive(Clone, Debug)]
pub struct Config {
    /// Where to send the request, possibly partial.
    server: Option<ServerSpec>,

    /// Header field overrides to pass along.
    header: HeaderOverrides,

    /// How long to wait for a response before timing out.
    timeout: Duration,
}

impl Config {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the target server spec, if one was set.
    pub fn server(&self) -> Option<&ServerSpec> {
        self.server.as_ref()
    }

    /// Sets the target server.
    ///
    /// Accepts anything that converts into a [`ServerSpec`], in particular
    /// a bare address string. If no server is set, the first entry of the
    /// resolver configuration is used.
    pub fn set_server(&mut self, value: impl Into<ServerSpec>) {
        self.server = Some(value.into());
    }

    /// Returns the header overrides.
    pub fn header(&self) -> &HeaderOverrides {
        &self.header
    }

    /// Sets the header overrides.
    pub fn set_header(&mut self, value: HeaderOverrides) {
        self.header = value;
    }

    /// Returns the request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sets the request timeout.
    ///
    /// If this value is too small or too large, it will be caped.
    pub fn set_timeout(&mut self, value: Duration) {
        self.timeout = TIMEOUT.limit(value)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: None,
            header: HeaderOverrides::default(),
            timeout: TIMEOUT.default(),
        }
    }
}

//------------ HeaderOverrides -----------------------------------------------

/// Optional overrides for fields of the outgoing message header.
///
/// The request itself never reads these; they travel with it so that the
/// registry can apply them when composing the message.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HeaderOverrides {
    /// Force a specific message ID.
    pub id: Option<u16>,

    /// Override the OPCODE field.
    pub opcode: Option<u8>,

    /// Override the RCODE field.
    pub rcode: Option<u8>,

    /// Override the QR flag.
    pub qr: Option<bool>,

    /// Override the AA flag.
    pub aa: Option<bool>,

    /// Override the TC flag.
    pub tc: Option<bool>,

    /// Override the RD flag.
    pub rd: Option<bool>,

    /// Override the RA flag.
    pub ra: Option<bool>,

    /// Override the AD flag.
    pub ad: Option<bool>,

    /// Override the CD flag.
    pub cd: Option<bool>,
}

//------------ TestOverrides -------------------------------------------------

/// Test-only substitution and suppression of observable outcomes.
///
/// A request carries one of these, default on the production path, where
/// every field is `None` and behavior is entirely real. Tests inject a
/// value through [`Request::with_overrides`] to make outcomes
/// deterministic. Overrides only gate what is sent on the event channel;
/// the internal terminal transition – timer cleanup, registry removal,
/// identifier reset – always runs in full.
#[derive(Clone, Debug, Default)]
pub struct TestOverrides {
    /// Suppress or substitute the answer.
    pub answer: Option<AnswerOverride>,

    /// `Some(true)` forces the timeout path directly from `send`, without
    /// involving the registry. `Some(false)` keeps a real timeout from
    /// being observable.
    pub timeout: Option<bool>,

    /// `Some(false)` keeps a cancellation from being observable.
    pub cancelled: Option<bool>,

    /// `Some(false)` keeps the final [`Event::End`] from being observable.
    pub end: Option<bool>,
}

//------------ AnswerOverride ------------------------------------------------

/// What to do with a delivered answer under test overrides.
#[derive(Clone, Debug)]
pub enum AnswerOverride {
    /// Drop the answer; no [`Event::Answer`] is emitted.
    Suppress,

    /// Emit this message instead of the delivered answer.
    Substitute(Bytes),
}

//------------ Event ---------------------------------------------------------

/// An observable notification from a request.
///
/// Per request, at most one of the first four variants is emitted, followed
/// by at most one `End`.
#[derive(Clone, Debug)]
pub enum Event {
    /// The response to the question arrived.
    ///
    /// The payload is the opaque message as the registry delivered it;
    /// parsing it is the caller's business.
    Answer(Bytes),

    /// The deadline passed without a response.
    Timeout,

    /// The caller cancelled the request.
    Cancelled,

    /// The transport failed while the request was outstanding.
    Error(Error),

    /// The request has completed and left the registry.
    End,
}

//------------ Events --------------------------------------------------------

/// The receiving end of a request's event channel.
///
/// The channel closes once the request has delivered its final event, so
/// draining it with [`recv`][Self::recv] terminates.
#[derive(Debug)]
pub struct Events {
    /// The channel the request sends its events on.
    receiver: mpsc::UnboundedReceiver<Event>,
}

impl Events {
    /// Receives the next event.
    ///
    /// Returns `None` once the request has completed and all events have
    /// been read. This method is cancel safe.
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Returns the next event if one is already pending.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }
}

//------------ Request -------------------------------------------------------

/// One in-flight DNS query and its completion state.
///
/// A request is a cheaply clonable handle to shared state; the registry and
/// the deadline timer each hold a clone while the request is outstanding.
/// The question type `Q` is opaque and passed through to the registry
/// unmodified.
pub struct Request<Q> {
    /// Reference to the shared request state.
    inner: Arc<Inner<Q>>,
}

/// The shared state behind a [`Request`] handle.
struct Inner<Q> {
    /// The question to resolve, never interpreted here.
    question: Q,

    /// The normalized target server.
    server: ServerConf,

    /// Header overrides, passed through to the registry.
    header: HeaderOverrides,

    /// How long to wait for a response.
    timeout: Duration,

    /// Outcome substitution for tests. All `None` in production.
    overrides: TestOverrides,

    /// The mutable portion of the state.
    ///
    /// Everything that can change after construction lives behind this one
    /// mutex so that the completion check-and-set is a single critical
    /// section however the completion triggers race.
    state: Mutex<State<Q>>,
}

/// The mutable portion of a request's state.
struct State<Q> {
    /// Whether a terminal outcome has been delivered.
    ///
    /// Set to `true` exactly once. Every entry point checks it first and
    /// becomes a no-op if it is already set.
    completed: bool,

    /// The identifier assigned by the registry.
    ///
    /// `None` before the request is sent and again after it completed.
    identifier: Option<u16>,

    /// Handle to abort the deadline timer task.
    ///
    /// Exclusively owned; taken and aborted on every terminal transition.
    timer: Option<AbortHandle>,

    /// The registry the request was sent through.
    ///
    /// Kept so that the terminal transition can deregister the request.
    registry: Option<Arc<dyn Registry<Q> + Send + Sync>>,

    /// The sending end of the event channel.
    ///
    /// Dropped at the end of the terminal transition, closing the channel.
    events: Option<mpsc::UnboundedSender<Event>>,
}

impl<Q> Request<Q> {
    /// Creates a new request.
    ///
    /// The server named in `config` is normalized immediately; if none was
    /// set, the first entry of `conf` is used. No I/O happens here.
    ///
    /// Returns the request handle and the receiving end of its event
    /// channel.
    pub fn new(
        question: Q,
        config: Config,
        conf: &ResolvConf,
    ) -> (Self, Events) {
        Self::with_overrides(question, config, conf, TestOverrides::default())
    }

    /// Creates a new request with test overrides.
    ///
    /// Production code uses [`new`][Self::new]; this constructor exists for
    /// tests that need deterministic outcomes.
    pub fn with_overrides(
        question: Q,
        config: Config,
        conf: &ResolvConf,
        overrides: TestOverrides,
    ) -> (Self, Events) {
        let server = ServerConf::normalize(config.server, conf);
        debug!("request created for {}", server);
        let (sender, receiver) = mpsc::unbounded_channel();
        let request = Self {
            inner: Arc::new(Inner {
                question,
                server,
                header: config.header,
                timeout: config.timeout,
                overrides,
                state: Mutex::new(State {
                    completed: false,
                    identifier: None,
                    timer: None,
                    registry: None,
                    events: Some(sender),
                }),
            }),
        };
        (request, Events { receiver })
    }

    /// Returns the question.
    pub fn question(&self) -> &Q {
        &self.inner.question
    }

    /// Returns the normalized target server.
    pub fn server(&self) -> &ServerConf {
        &self.inner.server
    }

    /// Returns the header overrides.
    pub fn header(&self) -> &HeaderOverrides {
        &self.inner.header
    }

    /// Returns the request timeout.
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Returns the identifier the registry assigned.
    ///
    /// This is `Some` only while the request is outstanding with the
    /// registry.
    pub fn identifier(&self) -> Option<u16> {
        self.inner.state.lock().identifier
    }

    /// Returns whether a terminal outcome has been delivered.
    pub fn is_completed(&self) -> bool {
        self.inner.state.lock().completed
    }

    /// Records the identifier the registry assigned.
    ///
    /// Called by the registry from [`Registry::send`]. Ignored on a
    /// request that already completed.
    pub fn set_identifier(&self, identifier: u16) {
        let mut state = self.inner.state.lock();
        if !state.completed {
            state.identifier = Some(identifier);
        }
    }

    /// Marks the request completed.
    ///
    /// Returns whether the caller won the race and may deliver the
    /// outcome. This is the one indivisible check-and-set every completion
    /// path goes through; all side effects happen after it, outside the
    /// lock, so a re-entrant callback from the registry simply loses the
    /// race here.
    fn complete(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.completed {
            false
        } else {
            state.completed = true;
            true
        }
    }

    /// Sends an event to the observer, if it is still listening.
    fn emit(&self, event: Event) {
        let events = self.inner.state.lock().events.clone();
        if let Some(events) = events {
            let _ = events.send(event);
        }
    }

    /// Runs the terminal transition.
    ///
    /// Only called by whichever completion path won the race in
    /// [`complete`][Self::complete]. Releases the deadline timer, removes
    /// the request from the registry while the identifier is still set,
    /// clears the identifier, and emits [`Event::End`] unless suppressed.
    /// Dropping the sender closes the event channel.
    fn finish(&self) {
        let (timer, registry, events) = {
            let mut state = self.inner.state.lock();
            (state.timer.take(), state.registry.take(), state.events.take())
        };
        if let Some(timer) = timer {
            timer.abort();
        }
        if let Some(registry) = registry {
            registry.remove(self);
        }
        self.inner.state.lock().identifier = None;
        if self.inner.overrides.end != Some(false) {
            if let Some(events) = &events {
                let _ = events.send(Event::End);
            }
        }
        debug!("request finished");
    }

    /// Delivers the answer to the question.
    ///
    /// Called by the registry when the matching response arrived. A no-op
    /// if the request already completed.
    pub fn deliver_answer(&self, answer: Bytes) {
        if !self.complete() {
            return;
        }
        debug!("request {:?} answered", self.identifier());
        match &self.inner.overrides.answer {
            Some(AnswerOverride::Suppress) => {}
            Some(AnswerOverride::Substitute(message)) => {
                self.emit(Event::Answer(message.clone()))
            }
            None => self.emit(Event::Answer(answer)),
        }
        self.finish();
    }

    /// Delivers a transport error.
    ///
    /// Called by the registry when transmission or reception failed. The
    /// error is surfaced verbatim. A no-op if the request already
    /// completed.
    pub fn deliver_error(&self, error: Error) {
        if !self.complete() {
            return;
        }
        debug!("request {:?} failed: {}", self.identifier(), error);
        self.emit(Event::Error(error));
        self.finish();
    }

    /// Completes the request with a timeout.
    fn handle_timeout(&self) {
        if !self.complete() {
            return;
        }
        debug!("request {:?} timed out", self.identifier());
        if self.inner.overrides.timeout != Some(false) {
            self.emit(Event::Timeout);
        }
        self.finish();
    }

    /// Cancels the request.
    ///
    /// The registry may still transmit or receive on its own account, but
    /// this request no longer honors any outcome. A no-op if the request
    /// already completed; cancelling twice is harmless.
    pub fn cancel(&self) {
        if !self.complete() {
            return;
        }
        debug!("request {:?} cancelled", self.identifier());
        if self.inner.overrides.cancelled != Some(false) {
            self.emit(Event::Cancelled);
        }
        self.finish();
    }
}

impl<Q: Send + Sync + 'static> Request<Q> {
    /// Sends the request through the given registry.
    ///
    /// Arms the deadline timer and hands a clone of this request to
    /// [`Registry::send`]. Must be called within a Tokio runtime. A no-op
    /// on a request that already completed or was already sent.
    ///
    /// If the test overrides force a timeout, the timeout path runs
    /// synchronously and the registry is bypassed entirely.
    pub fn send<R>(&self, registry: &Arc<R>)
    where
        R: Registry<Q> + Send + Sync + 'static,
    {
        if self.inner.overrides.timeout == Some(true) {
            self.handle_timeout();
            return;
        }
        {
            let mut state = self.inner.state.lock();
            if state.completed || state.registry.is_some() {
                return;
            }
            let request = self.clone();
            let timeout = self.inner.timeout;
            let timer = tokio::spawn(async move {
                sleep(timeout).await;
                request.handle_timeout();
            });
            state.timer = Some(timer.abort_handle());
            state.registry = Some(registry.clone());
        }
        registry.send(self.clone());
    }
}

//--- Clone and Debug

impl<Q> Clone for Request<Q> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<Q> fmt::Debug for Request<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("server", &self.inner.server)
            .field("identifier", &self.identifier())
            .field("completed", &self.is_completed())
            .finish()
    }
}

//------------ DefMinMax -----------------------------------------------------

/// The default, minimum, and maximum values for a config variable.
#[derive(Clone, Copy)]
struct DefMinMax<T> {
    /// The default value,
    def: T,

    /// The minimum value,
    min: T,

    /// The maximum value,
    max: T,
}

impl<T> DefMinMax<T> {
    /// Creates a new value.
    const fn new(def: T, min: T, max: T) -> Self {
        Self { def, min, max }
    }

    /// Returns the default value.
    fn default(self) -> T {
        self.def
    }

    /// Trims the given value to fit into the minimum/maximum range.
    fn limit(self, value: T) -> T
    where
        T: Ord,
    {
        cmp::max(self.min, cmp::min(self.max, value))
    }
}

//============ Tests =========================================================

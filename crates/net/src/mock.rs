//! In-memory scripted transport.
//!
//! [`MockDialer`] answers calls from per-method scripts instead of the
//! network and counts dials and connection releases, so tests can check
//! that every call path releases its connection exactly once.

use crate::transport::{Connection, Dialer, FrameStream};
use bytes::Bytes;
use prost::Message;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tmrpc_common::{DialError, RemoteEndpoint};
use tokio::time::Duration;
use tonic::{Code, Status};

#[derive(Debug, Clone)]
enum Reply {
    Body(Bytes),
    Fail(Code, String),
}

impl Reply {
    fn into_result(self) -> Result<Bytes, Status> {
        match self {
            Reply::Body(body) => Ok(body),
            Reply::Fail(code, message) => Err(Status::new(code, message)),
        }
    }
}

#[derive(Debug, Clone)]
struct UnaryScript {
    delay: Duration,
    reply: Reply,
}

#[derive(Debug, Clone)]
enum Step {
    Frame(Bytes),
    Delay(Duration),
}

#[derive(Debug, Clone, Default)]
enum StreamEnd {
    #[default]
    Eof,
    Fail(Code, String),
    Hang,
}

/// Script for one server-streaming method.
#[derive(Debug, Clone, Default)]
pub struct MockStream {
    rejected: Option<(Code, String)>,
    steps: Vec<Step>,
    end: StreamEnd,
}

impl MockStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// The server refuses to open the stream.
    pub fn rejected(code: Code, message: impl Into<String>) -> Self {
        Self {
            rejected: Some((code, message.into())),
            ..Default::default()
        }
    }

    pub fn frame<M: Message>(mut self, msg: &M) -> Self {
        self.steps.push(Step::Frame(Bytes::from(msg.encode_to_vec())));
        self
    }

    pub fn raw_frame(mut self, body: Bytes) -> Self {
        self.steps.push(Step::Frame(body));
        self
    }

    /// Pause before the next step.
    pub fn delay(mut self, d: Duration) -> Self {
        self.steps.push(Step::Delay(d));
        self
    }

    /// End with a receive error instead of end-of-stream.
    pub fn fail(mut self, code: Code, message: impl Into<String>) -> Self {
        self.end = StreamEnd::Fail(code, message.into());
        self
    }

    /// Never end after the scripted steps.
    pub fn hang(mut self) -> Self {
        self.end = StreamEnd::Hang;
        self
    }
}

#[derive(Debug, Clone)]
struct Sent {
    method: String,
    body: Bytes,
    timeout: Option<Duration>,
}

#[derive(Debug, Default)]
struct Inner {
    unary: Mutex<HashMap<String, UnaryScript>>,
    streams: Mutex<HashMap<String, MockStream>>,
    requests: Mutex<Vec<Sent>>,
    dial_error: Mutex<Option<DialError>>,
    dial_count: AtomicUsize,
    release_count: AtomicUsize,
    frames_served: AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // Poisoning is ignored: scripts stay readable after a test thread panics.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scripted dialer. Clones share scripts and counters.
#[derive(Debug, Clone, Default)]
pub struct MockDialer {
    inner: Arc<Inner>,
}

impl MockDialer {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Scripting ──

    /// Answer `method` with `response` immediately.
    pub fn respond<M: Message>(&self, method: &str, response: &M) {
        self.respond_after(method, Duration::ZERO, response);
    }

    /// Answer `method` with `response` after `delay`.
    pub fn respond_after<M: Message>(&self, method: &str, delay: Duration, response: &M) {
        self.script(
            method,
            delay,
            Reply::Body(Bytes::from(response.encode_to_vec())),
        );
    }

    /// Answer `method` with an arbitrary, possibly malformed, body.
    pub fn respond_raw(&self, method: &str, body: Bytes) {
        self.script(method, Duration::ZERO, Reply::Body(body));
    }

    /// Fail `method` with a remote status.
    pub fn fail(&self, method: &str, code: Code, message: impl Into<String>) {
        self.fail_after(method, Duration::ZERO, code, message);
    }

    /// Fail `method` with a remote status after `delay`.
    pub fn fail_after(&self, method: &str, delay: Duration, code: Code, message: impl Into<String>) {
        self.script(method, delay, Reply::Fail(code, message.into()));
    }

    pub fn stream(&self, method: &str, script: MockStream) {
        lock(&self.inner.streams).insert(method.to_string(), script);
    }

    /// Make every subsequent dial fail with `err`.
    pub fn fail_dial(&self, err: DialError) {
        *lock(&self.inner.dial_error) = Some(err);
    }

    fn script(&self, method: &str, delay: Duration, reply: Reply) {
        lock(&self.inner.unary).insert(method.to_string(), UnaryScript { delay, reply });
    }

    // ── Inspection ──

    pub fn dial_count(&self) -> usize {
        self.inner.dial_count.load(Ordering::SeqCst)
    }

    /// Connections dropped so far.
    pub fn release_count(&self) -> usize {
        self.inner.release_count.load(Ordering::SeqCst)
    }

    /// Stream frames handed to the client so far, across all streams.
    pub fn frames_served(&self) -> usize {
        self.inner.frames_served.load(Ordering::SeqCst)
    }

    /// Method names in the order requests arrived.
    pub fn methods_called(&self) -> Vec<String> {
        lock(&self.inner.requests)
            .iter()
            .map(|sent| sent.method.clone())
            .collect()
    }

    fn last_sent(&self, method: &str) -> Option<Sent> {
        lock(&self.inner.requests)
            .iter()
            .rev()
            .find(|sent| sent.method == method)
            .cloned()
    }

    /// The most recent request sent for `method`, decoded.
    pub fn last_request<M: Message + Default>(&self, method: &str) -> Option<M> {
        M::decode(self.last_sent(method)?.body).ok()
    }

    /// The timeout the most recent `method` request carried, if any.
    pub fn last_timeout(&self, method: &str) -> Option<Duration> {
        self.last_sent(method)?.timeout
    }
}

#[async_trait::async_trait]
impl Dialer for MockDialer {
    type Conn = MockConnection;

    async fn dial(
        &self,
        _endpoint: &RemoteEndpoint,
        _timeout: Option<Duration>,
    ) -> Result<MockConnection, DialError> {
        self.inner.dial_count.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = lock(&self.inner.dial_error).clone() {
            return Err(err);
        }
        Ok(MockConnection {
            inner: self.inner.clone(),
        })
    }
}

/// Connection handed out by [`MockDialer`]. Dropping it counts as a release.
#[derive(Debug)]
pub struct MockConnection {
    inner: Arc<Inner>,
}

impl MockConnection {
    fn record(&self, method: &str, body: Bytes, timeout: Option<Duration>) {
        lock(&self.inner.requests).push(Sent {
            method: method.to_string(),
            body,
            timeout,
        });
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.inner.release_count.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Connection for MockConnection {
    async fn unary(
        &mut self,
        method: &'static str,
        request: Bytes,
        timeout: Option<Duration>,
    ) -> Result<Bytes, Status> {
        self.record(method, request, timeout);
        let script = lock(&self.inner.unary).get(method).cloned();
        let Some(script) = script else {
            return Err(Status::unimplemented(format!(
                "no scripted response for {}",
                method
            )));
        };
        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }
        script.reply.into_result()
    }

    async fn server_streaming(
        &mut self,
        method: &'static str,
        request: Bytes,
        timeout: Option<Duration>,
    ) -> Result<FrameStream, Status> {
        self.record(method, request, timeout);
        let script = lock(&self.inner.streams).get(method).cloned();
        let Some(script) = script else {
            return Err(Status::unimplemented(format!(
                "no scripted stream for {}",
                method
            )));
        };
        if let Some((code, message)) = script.rejected {
            return Err(Status::new(code, message));
        }
        Ok(replay(script.steps, script.end, self.inner.clone()))
    }
}

fn replay(steps: Vec<Step>, end: StreamEnd, inner: Arc<Inner>) -> FrameStream {
    use futures::StreamExt;

    let state = (VecDeque::from(steps), Some(end), inner);
    futures::stream::unfold(state, |(mut steps, end, inner)| async move {
        loop {
            match steps.pop_front() {
                Some(Step::Delay(d)) => tokio::time::sleep(d).await,
                Some(Step::Frame(body)) => {
                    inner.frames_served.fetch_add(1, Ordering::SeqCst);
                    return Some((Ok(body), (steps, end, inner)));
                }
                None => {
                    return match end {
                        Some(StreamEnd::Eof) | None => None,
                        Some(StreamEnd::Fail(code, message)) => {
                            Some((Err(Status::new(code, message)), (steps, None, inner)))
                        }
                        Some(StreamEnd::Hang) => {
                            futures::future::pending::<()>().await;
                            None
                        }
                    };
                }
            }
        }
    })
    .boxed()
}

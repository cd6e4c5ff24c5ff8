//! Server-streaming calls relayed through a bounded channel.
//!
//! [`forward`] hands the connection and its frame stream to a background
//! task. The task decodes each frame, translates it to a domain value and
//! sends it on a bounded `mpsc` channel, so a slow consumer stops the
//! receive loop instead of growing a buffer. When the stream ends the task
//! closes the channel, drops the connection and reports the terminal result
//! on a oneshot channel read by [`StreamCompletion::finish`].

use crate::context::{CallContext, DoneCause};
use crate::transport::{Connection, FrameStream};
use futures::StreamExt;
use prost::Message;
use tmrpc_common::{CallError, RemoteEndpoint, TabletAlias};
use tmrpc_metrics::{metrics, record_outcome, SHAPE_STREAM};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// Frames buffered between the receive loop and the consumer.
pub const DEFAULT_STREAM_BUFFER: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    pub buffer: usize,
    /// When set, the end of the call context stops the stream and is
    /// reported as [`CallError::Interrupted`]. Otherwise it is reported as
    /// the stream failing, the way a context-bound gRPC stream would.
    pub interruptible: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            buffer: DEFAULT_STREAM_BUFFER,
            interruptible: false,
        }
    }
}

impl StreamOptions {
    pub fn interruptible(mut self) -> Self {
        self.interruptible = true;
        self
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer;
        self
    }
}

type Outcome = Result<(), CallError>;

/// Terminal result of a forwarded stream.
#[derive(Debug)]
pub struct StreamCompletion {
    done: oneshot::Receiver<Outcome>,
    result: Option<Outcome>,
    release: CancellationToken,
    alias: TabletAlias,
    method: &'static str,
}

impl StreamCompletion {
    /// Wait for the stream to end and return how it ended.
    ///
    /// `Ok(())` after a clean end-of-stream. Called while frames are still
    /// arriving, this stops the stream, releases the connection and reports
    /// [`CallError::Interrupted`]. The first result is cached, so later
    /// calls return it again.
    pub async fn finish(&mut self) -> Result<(), CallError> {
        if let Some(result) = &self.result {
            return result.clone();
        }
        self.release.cancel();
        let result = match (&mut self.done).await {
            Ok(result) => result,
            Err(_) => Err(CallError::Stream {
                alias: self.alias.clone(),
                method: self.method,
                message: "stream task exited without a result".into(),
            }),
        };
        self.result = Some(result.clone());
        result
    }
}

/// Relay `frames` from `conn` into a bounded channel.
///
/// Must be called from within a tokio runtime: spawns one task that owns
/// `conn` until the stream ends.
pub fn forward<C, M, T, F>(
    ctx: &CallContext,
    conn: C,
    frames: FrameStream,
    endpoint: &RemoteEndpoint,
    method: &'static str,
    options: StreamOptions,
    translate: F,
) -> (mpsc::Receiver<T>, StreamCompletion)
where
    C: Connection,
    M: Message + Default + Send + 'static,
    T: Send + 'static,
    F: FnMut(M) -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel(options.buffer.max(1));
    let (done_tx, done_rx) = oneshot::channel();
    let release = CancellationToken::new();

    metrics().streams_opened.with_label_values(&[method]).inc();
    tracing::debug!(alias = %endpoint.alias, method, buffer = options.buffer, "stream opened");

    let pump = Pump {
        ctx: ctx.clone(),
        endpoint: endpoint.clone(),
        method,
        interruptible: options.interruptible,
        release: release.clone(),
    };
    tokio::spawn(async move {
        let timer = metrics()
            .call_latency_secs
            .with_label_values(&[method, SHAPE_STREAM])
            .start_timer();
        let outcome = pump.run(conn, frames, tx, translate).await;
        drop(timer);
        pump.report(&outcome);
        // The consumer may have dropped the completion handle.
        let _ = done_tx.send(outcome);
    });

    let completion = StreamCompletion {
        done: done_rx,
        result: None,
        release,
        alias: endpoint.alias.clone(),
        method,
    };
    (rx, completion)
}

struct Pump {
    ctx: CallContext,
    endpoint: RemoteEndpoint,
    method: &'static str,
    interruptible: bool,
    release: CancellationToken,
}

impl Pump {
    /// The receive loop. Returns only after the channel, the frame stream
    /// and the connection have all been dropped.
    async fn run<C, M, T, F>(
        &self,
        conn: C,
        mut frames: FrameStream,
        tx: mpsc::Sender<T>,
        mut translate: F,
    ) -> Outcome
    where
        C: Connection,
        M: Message + Default,
        F: FnMut(M) -> T,
    {
        let outcome = loop {
            let next = tokio::select! {
                biased;
                _ = self.release.cancelled() => break Err(self.interrupted()),
                cause = self.ctx.done() => break Err(self.context_done(cause)),
                _ = tx.closed() => break Ok(()),
                next = frames.next() => next,
            };

            let body = match next {
                None => break Ok(()),
                Some(Err(status)) => break Err(self.stream_failed(&status)),
                Some(Ok(body)) => body,
            };
            let item = match M::decode(body) {
                Ok(msg) => translate(msg),
                Err(e) => {
                    break Err(CallError::Decode {
                        alias: self.endpoint.alias.clone(),
                        method: self.method,
                        message: e.to_string(),
                    })
                }
            };

            tokio::select! {
                biased;
                _ = self.release.cancelled() => break Err(self.interrupted()),
                cause = self.ctx.done() => break Err(self.context_done(cause)),
                sent = tx.send(item) => {
                    if sent.is_err() {
                        break Ok(());
                    }
                    metrics().frames_forwarded.with_label_values(&[self.method]).inc();
                }
            }
        };

        drop(tx);
        drop(frames);
        drop(conn);
        outcome
    }

    fn interrupted(&self) -> CallError {
        CallError::Interrupted {
            alias: self.endpoint.alias.clone(),
            method: self.method,
        }
    }

    fn context_done(&self, cause: DoneCause) -> CallError {
        if self.interruptible {
            return self.interrupted();
        }
        let status = match cause {
            DoneCause::Canceled => Status::cancelled("call context cancelled"),
            DoneCause::DeadlineExceeded => Status::deadline_exceeded("call deadline exceeded"),
        };
        self.stream_failed(&status)
    }

    fn stream_failed(&self, status: &Status) -> CallError {
        let message = if status.message().is_empty() {
            status.code().description().to_string()
        } else {
            status.message().to_string()
        };
        CallError::Stream {
            alias: self.endpoint.alias.clone(),
            method: self.method,
            message,
        }
    }

    fn report(&self, outcome: &Outcome) {
        let label = match outcome {
            Ok(()) => "ok",
            Err(e) => e.kind().as_str(),
        };
        record_outcome(self.method, label);
        match outcome {
            Ok(()) => {
                tracing::debug!(alias = %self.endpoint.alias, method = self.method, "stream ended")
            }
            Err(e) if e.is_interrupted() => {
                tracing::debug!(alias = %self.endpoint.alias, method = self.method, "stream interrupted")
            }
            Err(e) => {
                tracing::warn!(alias = %self.endpoint.alias, method = self.method, error = %e, "stream failed")
            }
        }
    }
}

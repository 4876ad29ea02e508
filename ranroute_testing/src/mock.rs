//! Scripted in-memory transport.
//!
//! [`MockTransport`] replays queued inbound events to the connection's
//! listener and records every frame the connection writes. When the script
//! is empty, reads wait for new events until their deadline and then time
//! out, so a connection stays open until a close event is queued.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use ranroute::{
    Frame,
    FrameSink,
    FrameSource,
    Incoming,
    Transport,
    TransportError,
    TransportHandle,
};
use serde::Serialize;
use tokio::{
    sync::{Notify, watch},
    time::Instant,
};
use url::Url;

type Scripted = Result<Incoming, TransportError>;

struct Inner {
    script: Mutex<VecDeque<Scripted>>,
    script_changed: Notify,
    handshake_failures: Mutex<VecDeque<TransportError>>,
    handshake_gate: watch::Sender<bool>,
    sent: Mutex<Vec<Frame>>,
    sink_closed: Mutex<bool>,
    connects: Mutex<Vec<(Url, String)>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> { mutex.lock().expect("mock state poisoned") }

/// A [`Transport`] driven entirely by the test.
///
/// Clones share state, so a test keeps one clone to script events while the
/// connection owns another.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

impl Default for MockTransport {
    fn default() -> Self {
        let (handshake_gate, _) = watch::channel(true);
        Self {
            inner: Arc::new(Inner {
                script: Mutex::new(VecDeque::new()),
                script_changed: Notify::new(),
                handshake_failures: Mutex::new(VecDeque::new()),
                handshake_gate,
                sent: Mutex::new(Vec::new()),
                sink_closed: Mutex::new(false),
                connects: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl MockTransport {
    /// Create a transport with an empty script.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    fn push(&self, event: Scripted) {
        lock(&self.inner.script).push_back(event);
        self.inner.script_changed.notify_one();
    }

    /// Queue an inbound event.
    pub fn push_event(&self, event: Incoming) { self.push(Ok(event)); }

    /// Queue `message` encoded as a JSON text frame.
    ///
    /// # Panics
    ///
    /// Panics if `message` cannot be encoded.
    pub fn push_message<M: Serialize>(&self, message: &M) {
        let text = serde_json::to_string(message).expect("encode scripted message");
        self.push_text(&text);
    }

    /// Queue a raw text frame.
    pub fn push_text(&self, text: &str) { self.push_event(Incoming::Data(Frame::from(text))); }

    /// Queue a close frame.
    pub fn push_close(&self, code: u16, reason: &str) {
        self.push_event(Incoming::Close {
            code,
            reason: reason.to_owned(),
        });
    }

    /// Queue the end of the stream without a close frame.
    pub fn push_closed(&self) { self.push_event(Incoming::Closed); }

    /// Queue a read failure.
    pub fn push_error(&self, error: TransportError) { self.push(Err(error)); }

    /// Make the next handshake fail with `error`.
    pub fn fail_handshake(&self, error: TransportError) {
        lock(&self.inner.handshake_failures).push_back(error);
    }

    /// Hold handshakes until [`release_handshake`](Self::release_handshake).
    pub fn block_handshake(&self) { self.inner.handshake_gate.send_replace(false); }

    /// Let held handshakes complete.
    pub fn release_handshake(&self) { self.inner.handshake_gate.send_replace(true); }

    /// Frames written by the connection, oldest first.
    #[must_use]
    pub fn sent_frames(&self) -> Vec<Frame> { lock(&self.inner.sent).clone() }

    /// Frames written by the connection, parsed as JSON.
    ///
    /// # Panics
    ///
    /// Panics if a frame is not valid JSON.
    #[must_use]
    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent_frames()
            .iter()
            .map(|frame| serde_json::from_slice(frame.as_bytes()).expect("sent frame is JSON"))
            .collect()
    }

    /// Number of handshakes attempted.
    #[must_use]
    pub fn connect_count(&self) -> usize { lock(&self.inner.connects).len() }

    /// Endpoint of the latest handshake.
    #[must_use]
    pub fn last_endpoint(&self) -> Option<Url> {
        lock(&self.inner.connects).last().map(|(url, _)| url.clone())
    }

    /// Access token presented by the latest handshake.
    #[must_use]
    pub fn last_access_token(&self) -> Option<String> {
        lock(&self.inner.connects).last().map(|(_, token)| token.clone())
    }

    /// Whether the connection closed its write half.
    #[must_use]
    pub fn sink_closed(&self) -> bool { *lock(&self.inner.sink_closed) }

    /// Scripted events the listener has not read yet.
    #[must_use]
    pub fn pending_events(&self) -> usize { lock(&self.inner.script).len() }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        endpoint: &Url,
        access_token: &str,
    ) -> Result<TransportHandle, TransportError> {
        lock(&self.inner.connects).push((endpoint.clone(), access_token.to_owned()));
        let mut gate = self.inner.handshake_gate.subscribe();
        // The sender lives in `inner`, so the gate cannot be dropped here.
        let _ = gate.wait_for(|open| *open).await;
        if let Some(error) = lock(&self.inner.handshake_failures).pop_front() {
            return Err(error);
        }
        *lock(&self.inner.sink_closed) = false;
        Ok(TransportHandle::new(
            MockSink {
                inner: Arc::clone(&self.inner),
            },
            MockSource {
                inner: Arc::clone(&self.inner),
            },
        ))
    }
}

struct MockSink {
    inner: Arc<Inner>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if *lock(&self.inner.sink_closed) {
            return Err(TransportError::Connection("sink closed".into()));
        }
        lock(&self.inner.sent).push(frame);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        *lock(&self.inner.sink_closed) = true;
        Ok(())
    }
}

struct MockSource {
    inner: Arc<Inner>,
}

#[async_trait]
impl FrameSource for MockSource {
    async fn receive(&mut self, timeout: Duration) -> Result<Incoming, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            let changed = self.inner.script_changed.notified();
            if let Some(event) = lock(&self.inner.script).pop_front() {
                return event;
            }
            if tokio::time::timeout_at(deadline, changed).await.is_err() {
                return Err(TransportError::Timeout);
            }
        }
    }
}

//! Scripted collaborators for session tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value as JsonValue;

use crate::error::Error;
use crate::notify::Notifier;
use crate::transport::{ApiError, ApiRequest, Method, Transport};

pub(crate) type Reply = Result<JsonValue, ApiError>;

/// A request as the stub saw it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Recorded {
    pub method: Method,
    pub path: String,
    pub body: Option<JsonValue>,
    pub authorization: Option<String>,
}

#[derive(Default)]
struct StubInner {
    replies: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
    requests: Mutex<Vec<Recorded>>,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Transport answering from a per-route script.
///
/// Queued replies are consumed in order; the last one repeats. Routes with
/// no script fail like an unreachable server.
#[derive(Clone, Default)]
pub(crate) struct StubTransport {
    inner: Arc<StubInner>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, method: Method, path: &str, reply: Reply) -> &Self {
        self.inner
            .replies
            .lock()
            .entry((method, path.to_owned()))
            .or_default()
            .push_back(reply);
        self
    }

    pub fn ok(&self, method: Method, path: &str, body: JsonValue) -> &Self {
        self.reply(method, path, Ok(body))
    }

    pub fn fail(&self, method: Method, path: &str, status: u16, body: JsonValue) -> &Self {
        self.reply(method, path, Err(ApiError::new(Some(status), Some(body))))
    }

    /// Forget any script for the route.
    pub fn clear(&self, method: Method, path: &str) -> &Self {
        self.inner.replies.lock().remove(&(method, path.to_owned()));
        self
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.inner.delay.lock() = Some(delay);
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.inner.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.inner.requests.lock().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, method: Method, path: &str) -> Reply {
        let mut replies = self.inner.replies.lock();
        match replies.get_mut(&(method, path.to_owned())) {
            Some(queue) if queue.len() > 1 => {
                queue.pop_front().unwrap_or(Err(ApiError::new(None, None)))
            }
            Some(queue) => queue.front().cloned().unwrap_or(Err(ApiError::new(None, None))),
            None => Err(ApiError::new(None, None)),
        }
    }
}

impl Transport for StubTransport {
    async fn send(&self, request: ApiRequest) -> Result<JsonValue, Error> {
        self.inner.requests.lock().push(Recorded {
            method: request.method,
            path: request.path.clone(),
            body: request.body.clone(),
            authorization: request.authorization(),
        });

        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.inner.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.next_reply(request.method, &request.path).map_err(Into::into)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Note {
    Success(String),
    Failure(String),
}

/// Notifier that keeps every message.
#[derive(Clone, Default)]
pub(crate) struct RecordingNotifier {
    notes: Arc<Mutex<Vec<Note>>>,
}

impl RecordingNotifier {
    pub fn notes(&self) -> Vec<Note> {
        self.notes.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn success(&self, message: &str) {
        self.notes.lock().push(Note::Success(message.to_owned()));
    }

    fn failure(&self, message: &str) {
        self.notes.lock().push(Note::Failure(message.to_owned()));
    }
}

// ABOUTME: Callback strategy: a local HTTP listener receives one completion notification
// ABOUTME: The first valid notification fills a write-once mailbox; later ones are ignored

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::JobResult;
use crate::error::TrackerError;
use crate::remote::models::CallbackPayload;

pub const CALLBACK_PATH: &str = "/callback";

const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Single-slot holder for the one notification a tracking operation expects.
#[derive(Debug, Default)]
pub struct Mailbox {
    slot: Mutex<Option<CallbackPayload>>,
    notify: Notify,
    ignored: AtomicUsize,
    malformed: AtomicUsize,
    last_error: Mutex<Option<String>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `payload` if the slot is still empty. Returns whether this call filled it.
    pub fn deliver(&self, payload: CallbackPayload) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            self.ignored.fetch_add(1, Ordering::SeqCst);
            return false;
        }
        *slot = Some(payload);
        drop(slot);
        self.notify.notify_one();
        true
    }

    pub fn record_error(&self, err: &TrackerError) {
        self.malformed.fetch_add(1, Ordering::SeqCst);
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(err.to_string());
    }

    pub fn current(&self) -> Option<CallbackPayload> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn ignored_count(&self) -> usize {
        self.ignored.load(Ordering::SeqCst)
    }

    pub fn malformed_count(&self) -> usize {
        self.malformed.load(Ordering::SeqCst)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Waits until the slot is filled or `max_wait` elapses.
    pub async fn wait(&self, max_wait: Duration) -> Option<CallbackPayload> {
        let deadline = Instant::now() + max_wait;
        loop {
            if let Some(payload) = self.current() {
                return Some(payload);
            }
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return self.current();
            }
        }
    }
}

/// A running callback listener. Dropping it stops the server and closes the socket.
pub struct ListenerHandle {
    local_addr: SocketAddr,
    mailbox: Arc<Mailbox>,
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// URL the remote system should POST to, given a host it can reach us on.
    pub fn callback_url(&self, public_host: &str) -> String {
        format!("http://{}:{}{}", public_host, self.port(), CALLBACK_PATH)
    }

    pub fn mailbox(&self) -> &Arc<Mailbox> {
        &self.mailbox
    }

    pub fn ignored_count(&self) -> usize {
        self.mailbox.ignored_count()
    }

    pub fn malformed_count(&self) -> usize {
        self.mailbox.malformed_count()
    }

    pub fn last_error(&self) -> Option<String> {
        self.mailbox.last_error()
    }

    /// Stops the server and waits until the socket is released.
    pub async fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        debug!("Callback listener on {} stopped", self.local_addr);
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub async fn start_listener(port: u16) -> Result<ListenerHandle, TrackerError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| TrackerError::Listener(format!("failed to bind {}: {}", addr, e)))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| TrackerError::Listener(e.to_string()))?;

    let mailbox = Arc::new(Mailbox::new());
    let app = router(mailbox.clone());
    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!("Callback listener stopped with error: {}", e);
        }
    });

    info!("Callback listener started on {}", local_addr);

    Ok(ListenerHandle {
        local_addr,
        mailbox,
        task: Some(task),
    })
}

/// Waits for the listener's mailbox and interprets the notification it receives.
pub async fn await_notification(
    listener: &ListenerHandle,
    max_wait_secs: u64,
) -> Result<JobResult, TrackerError> {
    if max_wait_secs == 0 {
        return Err(TrackerError::InvalidConfig(
            "maximum wait must be greater than zero".to_string(),
        ));
    }

    let started = Instant::now();
    match listener
        .mailbox
        .wait(Duration::from_secs(max_wait_secs))
        .await
    {
        Some(payload) => Ok(interpret(&payload)),
        None => Err(TrackerError::Timeout {
            waited_secs: started.elapsed().as_secs(),
            last_error: listener.last_error(),
        }),
    }
}

fn interpret(payload: &CallbackPayload) -> JobResult {
    if payload.code != 200 {
        let msg = payload
            .msg
            .clone()
            .unwrap_or_else(|| "Unknown error".to_string());
        warn!("Callback reported failure (code {}): {}", payload.code, msg);
        return JobResult::Failed(msg);
    }

    let artifacts = payload.artifacts();
    if artifacts.is_empty() {
        warn!("Callback reported success without artifacts");
        return JobResult::Failed("callback reported success without artifacts".to_string());
    }

    info!("Callback delivered {} artifact(s)", artifacts.len());
    JobResult::Succeeded(artifacts.to_vec())
}

fn router(mailbox: Arc<Mailbox>) -> Router {
    Router::new()
        .route(CALLBACK_PATH, post(receive_callback))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(mailbox)
}

async fn receive_callback(
    State(mailbox): State<Arc<Mailbox>>,
    body: Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    match serde_json::from_slice::<CallbackPayload>(&body) {
        Ok(payload) => {
            if mailbox.deliver(payload) {
                info!("Callback received");
            } else {
                debug!("Callback ignored, a notification was already received");
            }
            (StatusCode::OK, Json(json!({"status": "ok"})))
        }
        Err(e) => {
            let err = TrackerError::MalformedCallback(e.to_string());
            warn!("{}", err);
            mailbox.record_error(&err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "error", "error": err.to_string()})),
            )
        }
    }
}

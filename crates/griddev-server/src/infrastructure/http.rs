//! HTTP front end: `/command`, `/status` and `/quit` on one TCP listener.
//!
//! # Endpoints
//!
//! | Method | Path       | Body                                   |
//! |--------|------------|----------------------------------------|
//! | POST   | `/command` | binary request in, binary reply out    |
//! | GET    | `/status`  | plain-text counters                    |
//! | GET    | `/quit`    | plain-text counters, then the server stops |
//!
//! `/command` always answers 200; application errors travel in the reply's
//! status byte.  The router runs on the blocking pool because devices may
//! write files.
//!
//! # Stopping
//!
//! The server stops after the reply that triggered it has been sent:
//! closing the last device, a fatal protocol error, `/quit`, or Ctrl-C.
//! [`serve`] returns the reason so `main` can pick the exit code.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use griddev_core::protocol::{COMMAND_PATH, QUIT_PATH, STATUS_PATH};
use griddev_core::Status;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use crate::application::command_router::{CommandRouter, Disposition, RouterResponse};

/// Why the server stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerExit {
    /// The last open device was closed.
    LastDeviceClosed,
    /// A client requested `/quit`.
    QuitRequested,
    /// A request could not be decoded.
    ProtocolError,
    /// Ctrl-C or SIGINT.
    Interrupted,
}

impl ServerExit {
    /// Process exit code for this reason.
    pub fn code(self) -> i32 {
        match self {
            ServerExit::ProtocolError => 1,
            _ => 0,
        }
    }
}

#[derive(Clone)]
struct AppState {
    router: Arc<CommandRouter>,
    exit: Arc<watch::Sender<Option<ServerExit>>>,
}

impl AppState {
    /// Records the first stop reason; later ones are ignored.
    fn request_exit(&self, reason: ServerExit) {
        let first = self.exit.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
        if first {
            info!(?reason, "server stop requested");
        }
    }
}

/// Serves `router` on `listener` until a stop condition occurs.
///
/// # Errors
///
/// Returns the I/O error that ended the accept loop, if any.
pub async fn serve(
    listener: TcpListener,
    router: Arc<CommandRouter>,
    no_delay: bool,
) -> std::io::Result<ServerExit> {
    let (exit_tx, exit_rx) = watch::channel(None);
    let state = AppState {
        router,
        exit: Arc::new(exit_tx),
    };

    let app = Router::new()
        .route(COMMAND_PATH, post(handle_command))
        .route(STATUS_PATH, get(handle_status))
        .route(QUIT_PATH, get(handle_quit))
        .with_state(state.clone());

    if let Ok(addr) = listener.local_addr() {
        info!(%addr, no_delay, "grid server listening");
    }

    let signal_state = state.clone();
    let shutdown = async move {
        tokio::select! {
            _ = exit_requested(exit_rx) => {}
            _ = ctrl_c() => signal_state.request_exit(ServerExit::Interrupted),
        }
    };

    axum::serve(listener, app)
        .tcp_nodelay(no_delay)
        .with_graceful_shutdown(shutdown)
        .await?;

    let exit = *state.exit.borrow();
    let exit = exit.unwrap_or(ServerExit::Interrupted);
    info!(?exit, stats = %state.router.snapshot(), "grid server stopped");
    Ok(exit)
}

async fn exit_requested(mut rx: watch::Receiver<Option<ServerExit>>) {
    while rx.borrow_and_update().is_none() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Resolves on Ctrl-C; never resolves where signals are unavailable.
async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn handle_command(State(state): State<AppState>, body: Bytes) -> Response {
    let router = Arc::clone(&state.router);
    let response = match tokio::task::spawn_blocking(move || router.handle(body.to_vec())).await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "command handler panicked");
            RouterResponse {
                body: vec![Status::ServerError as u8],
                disposition: Disposition::Abort,
            }
        }
    };

    match response.disposition {
        Disposition::Continue => {}
        Disposition::Shutdown => state.request_exit(ServerExit::LastDeviceClosed),
        Disposition::Abort => state.request_exit(ServerExit::ProtocolError),
    }

    ([(CONTENT_TYPE, "application/octet-stream")], response.body).into_response()
}

async fn handle_status(State(state): State<AppState>) -> String {
    format!("Grid server running\n{}\n", state.router.snapshot())
}

async fn handle_quit(State(state): State<AppState>) -> String {
    let text = format!("Grid server stopped\n{}\n", state.router.snapshot());
    state.request_exit(ServerExit::QuitRequested);
    text
}

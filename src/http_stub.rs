//! Local HTTP stand-ins for the remote APIs, used by the client tests.

use std::collections::VecDeque;
use std::future::{ready, Ready};
use std::sync::Arc;

use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpListener;

/// A listener on an ephemeral local port, bound before the router exists so
/// responses can mention the server's own address.
pub(crate) struct StubServer {
    listener: TcpListener,
    pub url: String,
}

impl StubServer {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        Self { listener, url }
    }

    /// Serve `router` in the background and return the base URL.
    pub fn serve(self, router: Router) -> String {
        tokio::spawn(async move {
            axum::serve(self.listener, router).await.unwrap();
        });
        self.url
    }
}

/// Scripted replies for one endpoint. Replies are handed out in order and
/// the last one repeats once the script runs out.
#[derive(Clone)]
pub(crate) struct Replies {
    script: Arc<Mutex<VecDeque<(StatusCode, Value)>>>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl Replies {
    pub fn new(script: impl IntoIterator<Item = (u16, Value)>) -> Self {
        let script = script
            .into_iter()
            .map(|(status, body)| (StatusCode::from_u16(status).unwrap(), body))
            .collect();
        Self {
            script: Arc::new(Mutex::new(script)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of requests served so far.
    pub fn hits(&self) -> usize {
        self.seen.lock().len()
    }

    /// Path and query of every request served, oldest first.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }

    fn reply(&self, uri: Uri) -> Response {
        self.seen.lock().push(
            uri.path_and_query()
                .map(|pq| pq.to_string())
                .unwrap_or_default(),
        );
        let mut script = self.script.lock();
        let (status, body) = if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script
                .front()
                .cloned()
                .unwrap_or((StatusCode::NOT_IMPLEMENTED, Value::Null))
        };
        (status, Json(body)).into_response()
    }

    /// Axum handler serving this script.
    pub fn handler(&self) -> impl Fn(Uri) -> Ready<Response> + Clone + Send + Sync + 'static {
        let replies = self.clone();
        move |uri: Uri| ready(replies.reply(uri))
    }
}

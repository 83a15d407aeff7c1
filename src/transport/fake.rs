// MIT License
// Scripted in-memory transport for unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use super::Transport;
use crate::error::{BridgeError, Result};

#[derive(Debug, Clone)]
enum Reply {
    Body(String),
    Status(u16),
}

/// One request seen by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: &'static str,
    /// Path without the query string.
    pub path: String,
    pub token: Option<String>,
    pub body: Option<String>,
}

/// Replies are queued per path (query string ignored). The last queued
/// reply for a path is repeated once the queue is down to one entry.
/// Unscripted paths answer 404.
#[derive(Debug, Default)]
pub struct FakeTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    log: Mutex<Vec<Request>>,
    latency: Option<Duration>,
}

fn key(path: &str) -> String {
    path.split('?').next().unwrap_or(path).to_string()
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request sleeps this long before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn reply(&self, path: &str, body: impl Into<String>) -> &Self {
        self.push(path, Reply::Body(body.into()))
    }

    pub fn reply_status(&self, path: &str, status: u16) -> &Self {
        self.push(path, Reply::Status(status))
    }

    /// Drop every scripted reply for `path`, then queue `body`.
    pub fn set(&self, path: &str, body: impl Into<String>) -> &Self {
        self.replies.lock().unwrap().remove(&key(path));
        self.reply(path, body)
    }

    /// Drop every scripted reply for `path`, then queue an error status.
    pub fn set_status(&self, path: &str, status: u16) -> &Self {
        self.replies.lock().unwrap().remove(&key(path));
        self.reply_status(path, status)
    }

    fn push(&self, path: &str, reply: Reply) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .entry(key(path))
            .or_default()
            .push_back(reply);
        self
    }

    pub fn requests(&self) -> Vec<Request> {
        self.log.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }

    pub fn count(&self, path: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|r| r.path == path).count()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    async fn answer(&self, request: Request) -> Result<String> {
        let reply = {
            let mut replies = self.replies.lock().unwrap();
            match replies.get_mut(&request.path) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        let path = request.path.clone();
        self.log.lock().unwrap().push(request);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match reply {
            Some(Reply::Body(body)) => Ok(body),
            Some(Reply::Status(status)) => Err(BridgeError::UnexpectedStatus { status, path }),
            None => Err(BridgeError::UnexpectedStatus { status: 404, path }),
        }
    }
}

impl Transport for FakeTransport {
    async fn get(&self, path: &str, token: &str) -> Result<String> {
        self.answer(Request {
            method: "GET",
            path: key(path),
            token: Some(token.to_string()),
            body: None,
        })
        .await
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<String> {
        let token = form
            .iter()
            .find(|(k, _)| *k == "guid")
            .map(|(_, v)| v.to_string());
        let body = form
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        self.answer(Request {
            method: "POST",
            path: key(path),
            token,
            body: Some(body),
        })
        .await
    }

    async fn post_body(&self, path: &str, body: String) -> Result<String> {
        let token = body.split("GUID=").nth(1).map(str::to_string);
        self.answer(Request {
            method: "POST",
            path: key(path),
            token,
            body: Some(body),
        })
        .await
    }
}

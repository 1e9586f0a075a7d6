#![allow(clippy::unwrap_used, dead_code)]
// In-memory scripted transport shared by the integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use sailor_api::{Error, EventHub, ResourceMessage, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    /// Query params for GET/DELETE, body for POST/PUT.
    pub payload: Value,
}

/// Replies are matched on method + path + params, falling back to
/// method + path. Queued replies are consumed in order; the last one
/// sticks.
#[derive(Default)]
pub struct MockTransport {
    hub: EventHub,
    replies: Mutex<HashMap<(Method, String, Option<String>), VecDeque<Value>>>,
    log: Mutex<Vec<Request>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, method: Method, path: &str, response: Value) {
        self.queue(method, path, None, response);
    }

    pub fn reply_to_query(&self, method: Method, path: &str, params: &Value, response: Value) {
        self.queue(method, path, Some(params.to_string()), response);
    }

    fn queue(&self, method: Method, path: &str, params: Option<String>, response: Value) {
        self.replies
            .lock()
            .unwrap()
            .entry((method, path.to_owned(), params))
            .or_default()
            .push_back(response);
    }

    pub fn publish(&self, message: ResourceMessage) -> usize {
        self.hub.publish(message)
    }

    pub fn requests(&self) -> Vec<Request> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    pub fn count_method(&self, method: Method) -> usize {
        self.requests().iter().filter(|r| r.method == method).count()
    }

    fn respond(&self, method: Method, path: &str, payload: &Value) -> Result<Value, Error> {
        self.log.lock().unwrap().push(Request {
            method,
            path: path.to_owned(),
            payload: payload.clone(),
        });

        let mut replies = self.replies.lock().unwrap();
        let exact = (method, path.to_owned(), Some(payload.to_string()));
        let any = (method, path.to_owned(), None);
        let queue = if replies.contains_key(&exact) {
            replies.get_mut(&exact)
        } else {
            replies.get_mut(&any)
        };
        match queue {
            Some(queue) if queue.len() > 1 => Ok(queue.pop_front().unwrap()),
            Some(queue) => Ok(queue.front().cloned().unwrap_or(Value::Null)),
            None => Err(Error::Remote {
                status: 404,
                message: format!("no reply scripted for {method:?} {path}"),
            }),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, path: &str, params: &Value) -> Result<Value, Error> {
        self.respond(Method::Get, path, params)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, Error> {
        self.respond(Method::Post, path, body)
    }

    async fn put(&self, path: &str, body: &Value) -> Result<Value, Error> {
        self.respond(Method::Put, path, body)
    }

    async fn delete(&self, path: &str, params: &Value) -> Result<Value, Error> {
        self.respond(Method::Delete, path, params)
    }

    fn subscribe(&self, resource: &str) -> broadcast::Receiver<Arc<ResourceMessage>> {
        self.hub.subscribe(resource)
    }
}

/// Let spawned background work (refreshes, computations) run to completion.
pub async fn quiesce() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

pub fn empty() -> Value {
    json!({})
}

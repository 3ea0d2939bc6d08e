//! Scripted transport for unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse, Transport};

/// Replays queued responses in order and records every request it sees.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: RefCell<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: RefCell<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, status: u16, body: &str) -> Self {
        self.responses.borrow_mut().push_back(Ok(HttpResponse {
            status,
            body: body.to_string(),
        }));
        self
    }

    pub fn fail(self, message: &str) -> Self {
        self.responses
            .borrow_mut()
            .push_back(Err(TransportError::new(message)));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.borrow().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.borrow_mut().push(request.clone());
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::new("no scripted response left")))
    }
}

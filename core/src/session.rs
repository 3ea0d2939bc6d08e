//! Session token lifecycle.
//!
//! # Design
//! `SessionManager` holds the only piece of mutable state in the library and
//! makes its transitions explicit:
//!
//! ```text
//! Unauthenticated --authenticate ok--> Authenticated --server rejects--> SessionInvalid
//!        ^                                   |                                 |
//!        +-------- authenticate fails -------+---------------------------------+
//! ```
//!
//! Tokens never expire locally and are never refreshed automatically; a
//! rejected session stays rejected until the caller authenticates again.

use std::fmt;

use tracing::{info, warn};

use crate::error::ApiError;
use crate::http::{HttpRequest, Transport};
use crate::request;
use crate::response::XmlDocument;
use crate::types::ConnectionParams;

/// Name of the cookie (and response element) carrying the token.
pub const SESSION_COOKIE: &str = "sess_id";

/// An opaque token issued by a successful auth exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
}

impl Session {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("token", &"<redacted>").finish()
    }
}

/// Observable client state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Unauthenticated,
    Authenticated,
    SessionInvalid,
}

#[derive(Debug, Default)]
enum SessionState {
    #[default]
    Unauthenticated,
    Authenticated(Session),
    Invalid,
}

/// Owns the auth handshake and the current session.
#[derive(Debug, Default)]
pub struct SessionManager {
    state: SessionState,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> SessionStatus {
        match self.state {
            SessionState::Unauthenticated => SessionStatus::Unauthenticated,
            SessionState::Authenticated(_) => SessionStatus::Authenticated,
            SessionState::Invalid => SessionStatus::SessionInvalid,
        }
    }

    /// The current session, only while authenticated.
    pub fn session(&self) -> Option<&Session> {
        match &self.state {
            SessionState::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    /// The current session, or the error an authenticated call must fail with.
    pub fn require(&self) -> Result<&Session, ApiError> {
        match &self.state {
            SessionState::Authenticated(session) => Ok(session),
            SessionState::Unauthenticated => Err(ApiError::NotAuthenticated),
            SessionState::Invalid => Err(ApiError::SessionInvalid),
        }
    }

    /// Marks the session as rejected. No-op unless authenticated.
    pub fn invalidate(&mut self) {
        if matches!(self.state, SessionState::Authenticated(_)) {
            self.state = SessionState::Invalid;
        }
    }

    /// Runs the auth exchange and stores the token on success. Any failure
    /// leaves the manager unauthenticated.
    pub fn authenticate<T: Transport + ?Sized>(
        &mut self,
        params: &ConnectionParams,
        transport: &T,
    ) -> Result<&Session, ApiError> {
        self.state = SessionState::Unauthenticated;

        let xml = request::auth_request(params.login(), params.password())?;
        let response = transport.send(&HttpRequest::post_xml(params.url(), xml))?;
        if !response.is_success() {
            warn!(status = response.status, "auth request rejected");
            return Err(ApiError::Auth(format!("server returned HTTP {}", response.status)));
        }
        let doc = XmlDocument::parse(&response.body).map_err(|e| {
            warn!(error = %e, "auth response is not well-formed");
            ApiError::Auth(e.to_string())
        })?;
        let session = session_from_response(&doc)?;

        info!(login = params.login(), "authenticated");
        self.state = SessionState::Authenticated(session);
        self.require()
    }
}

/// Extracts the token from an auth response.
///
/// Looks for `sess_id` under the root's `action` child first, then accepts a
/// bare `<action>` root. An empty token counts as missing.
pub fn session_from_response(doc: &XmlDocument) -> Result<Session, ApiError> {
    let path = format!("action.{SESSION_COOKIE}");
    let token = doc
        .get(&path)
        .or_else(|| match doc.root().name() {
            "action" => doc.root().child(SESSION_COOKIE),
            _ => None,
        })
        .map(|element| element.text().trim())
        .filter(|token| !token.is_empty());

    match token {
        Some(token) => Ok(Session::new(token)),
        None => {
            warn!(root = doc.root().name(), "auth response has no session token");
            Err(ApiError::Auth(format!(
                "response has no `{path}` element"
            )))
        }
    }
}

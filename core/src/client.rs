//! Public client for the XRM XML API.
//!
//! # Design
//! Every operation follows the same path: build the envelope (`request`),
//! POST it through the `Transport` with the `sess_id` cookie, parse the body
//! (`response`) and hand the tree back. Calls made without an authenticated
//! session are rejected before any I/O. HTTP 401/403, or a response matched
//! by the optional session check, moves the client to `SessionInvalid`.
//!
//! Methods take `&mut self` because a call may change session state; share a
//! client across threads only behind a lock, or use one client per caller.

use std::fmt;

use tracing::{debug, warn};

use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse, Transport};
use crate::request;
use crate::response::XmlDocument;
use crate::session::{Session, SessionManager, SessionStatus, SESSION_COOKIE};
use crate::types::{ActionType, ConnectionParams, Field, Filter, Limit, Order};

type SessionCheck = Box<dyn Fn(&XmlDocument) -> bool + Send + Sync>;

/// Synchronous client bound to one server and one set of credentials.
pub struct XrmClient<T> {
    params: ConnectionParams,
    transport: T,
    session: SessionManager,
    session_check: Option<SessionCheck>,
}

impl<T: Transport> XrmClient<T> {
    /// Creates an unauthenticated client. No I/O happens here.
    pub fn new(params: ConnectionParams, transport: T) -> Self {
        Self {
            params,
            transport,
            session: SessionManager::new(),
            session_check: None,
        }
    }

    /// Creates a client and authenticates it, failing if no token is issued.
    pub fn connect(params: ConnectionParams, transport: T) -> Result<Self, ApiError> {
        let mut client = Self::new(params, transport);
        client.authenticate()?;
        Ok(client)
    }

    /// Installs a predicate that recognizes server responses rejecting the
    /// session. Matching responses fail with `ApiError::SessionInvalid`.
    pub fn with_session_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&XmlDocument) -> bool + Send + Sync + 'static,
    {
        self.session_check = Some(Box::new(check));
        self
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.session()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.session().map(Session::token)
    }

    pub fn authenticate(&mut self) -> Result<&Session, ApiError> {
        self.session.authenticate(&self.params, &self.transport)
    }

    /// Moves an authenticated client to `SessionInvalid`, e.g. after the
    /// caller spotted a rejection in a returned document.
    pub fn invalidate_session(&mut self) {
        self.session.invalidate();
    }

    /// Lists rows of `structure` (action `list`).
    pub fn select(
        &mut self,
        structure: &str,
        fields: &[Field],
        filters: &[Filter],
        limit: Option<Limit>,
        orders: &[Order],
    ) -> Result<XmlDocument, ApiError> {
        self.call(ActionType::List, structure, || {
            request::select_request(structure, fields, filters, limit, orders)
        })
    }

    /// Creates a row (action `add`).
    pub fn add(&mut self, structure: &str, fields: &[Field]) -> Result<XmlDocument, ApiError> {
        self.call(ActionType::Add, structure, || {
            request::add_request(structure, fields)
        })
    }

    /// Updates rows matching `filters` (action `edit`).
    pub fn update(
        &mut self,
        structure: &str,
        fields: &[Field],
        filters: &[Filter],
    ) -> Result<XmlDocument, ApiError> {
        self.call(ActionType::Edit, structure, || {
            request::update_request(structure, fields, filters)
        })
    }

    /// Deletes the row `id` (action `wipe`).
    pub fn delete(&mut self, structure: &str, id: &str) -> Result<XmlDocument, ApiError> {
        self.call(ActionType::Wipe, structure, || {
            request::delete_request(structure, id)
        })
    }

    /// Attaches a file described by `fields` to the row `id`.
    pub fn file_add(
        &mut self,
        structure: &str,
        id: &str,
        fields: &[Field],
    ) -> Result<XmlDocument, ApiError> {
        self.call(ActionType::FileAdd, structure, || {
            request::file_add_request(structure, id, fields)
        })
    }

    /// Asks the server to calculate payments for the record `id`.
    pub fn payment_calc(&mut self, id: &str) -> Result<XmlDocument, ApiError> {
        self.call(ActionType::PaymentCalc, "", || request::payment_calc_request(id))
    }

    fn call<F>(&mut self, action: ActionType, structure: &str, build: F) -> Result<XmlDocument, ApiError>
    where
        F: FnOnce() -> Result<String, ApiError>,
    {
        let token = self.session.require()?.token().to_string();
        let xml = build()?;
        let request = HttpRequest::post_xml(self.params.url(), xml).with_cookie(SESSION_COOKIE, token);

        debug!(%action, structure, "sending request");
        let response = self.transport.send(&request)?;
        self.parse_response(response)
    }

    fn parse_response(&mut self, response: HttpResponse) -> Result<XmlDocument, ApiError> {
        if matches!(response.status, 401 | 403) {
            warn!(status = response.status, "session rejected");
            self.session.invalidate();
            return Err(ApiError::SessionInvalid);
        }
        if !response.is_success() {
            return Err(ApiError::Http {
                status: response.status,
                body: response.body,
            });
        }

        let doc = XmlDocument::parse(&response.body).inspect_err(|e| {
            warn!(error = %e, "response is not well-formed");
        })?;
        if self.session_check.as_ref().is_some_and(|check| check(&doc)) {
            warn!("session rejected");
            self.session.invalidate();
            return Err(ApiError::SessionInvalid);
        }
        Ok(doc)
    }
}

impl<T> fmt::Debug for XrmClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XrmClient")
            .field("params", &self.params)
            .field("session", &self.session)
            .field("session_check", &self.session_check.is_some())
            .finish()
    }
}

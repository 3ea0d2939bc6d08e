//! Synchronous client for the XRM XML-over-HTTP API.
//!
//! # Overview
//! Authenticates against the server, keeps the issued session token, and
//! sends list/add/edit/wipe/fileAdd/paymentCalc requests as XML envelopes.
//! Responses come back as a generic `XmlDocument` tree; the caller knows the
//! schema of the structure it queried.
//!
//! # Design
//! - `request` builds envelopes from typed parameters with escaping and name
//!   validation; `response` parses bodies into owned trees. Both are pure.
//! - `SessionManager` owns the auth handshake and the explicit session state.
//! - `XrmClient` composes them with a `Transport`. `UreqTransport` is the
//!   default; tests and embedders can supply their own.
//! - No retries, caching, or pooling: those belong to the transport.

pub mod client;
pub mod error;
pub mod http;
pub mod request;
pub mod response;
pub mod session;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use client::XrmClient;
pub use error::{ApiError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport};
pub use response::{XmlDocument, XmlElement};
pub use session::{Session, SessionManager, SessionStatus};
pub use transport::{TransportConfig, UreqTransport};
pub use types::{ActionType, ConnectionParams, Field, Filter, Limit, Order, PROTOCOL_UID};

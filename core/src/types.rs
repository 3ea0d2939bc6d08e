//! Request parameter types for the XRM XML API.
//!
//! # Design
//! These types describe what a request carries, not how it is serialized;
//! `request` turns them into XML. A field is either bare (requested for
//! output, empty element) or named with a value (set during writes); the
//! two cases are an explicit enum instead of being inferred from whether a
//! caller used a list or a map.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fixed `uid` attribute of every `<action>` element. A protocol constant,
/// not a user identifier.
pub const PROTOCOL_UID: &str = "80085";

/// Server address and credentials. Immutable for the life of a client.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    url: String,
    login: String,
    password: String,
}

impl ConnectionParams {
    pub fn new(url: impl Into<String>, login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            login: login.into(),
            password: password.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("url", &self.url)
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One entry of a `<fields>` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Field {
    /// Field requested for output; serialized as an empty element.
    Bare(String),
    /// Field set to an explicit value.
    Named { name: String, value: String },
}

impl Field {
    pub fn bare(name: impl Into<String>) -> Self {
        Field::Bare(name.into())
    }

    pub fn with_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Field::Named {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Field::Bare(name) | Field::Named { name, .. } => name,
        }
    }

    /// Element text: the value for named fields, empty for bare ones.
    pub fn value(&self) -> &str {
        match self {
            Field::Bare(_) => "",
            Field::Named { value, .. } => value,
        }
    }
}

impl From<&str> for Field {
    fn from(name: &str) -> Self {
        Field::bare(name)
    }
}

impl From<String> for Field {
    fn from(name: String) -> Self {
        Field::Bare(name)
    }
}

impl<N: Into<String>, V: Into<String>> From<(N, V)> for Field {
    fn from((name, value): (N, V)) -> Self {
        Field::with_value(name, value)
    }
}

/// A single predicate. The server ANDs multiple filters together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub operation: String,
    pub value: String,
}

impl Filter {
    pub fn new(field: impl Into<String>, operation: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operation: operation.into(),
            value: value.into(),
        }
    }
}

/// Sort order on one field. `direction` is passed through as the `<type>`
/// element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub field: String,
    #[serde(alias = "type")]
    pub direction: String,
}

impl Order {
    pub fn new(field: impl Into<String>, direction: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: direction.into(),
        }
    }
}

/// Pagination window: skip `offset` rows, return at most `count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    pub offset: u64,
    pub count: u64,
}

impl Limit {
    pub fn new(offset: u64, count: u64) -> Self {
        Self { offset, count }
    }
}

/// Value of the `type` attribute on `<action>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    #[serde(rename = "auth")]
    Auth,
    #[serde(rename = "list")]
    List,
    #[serde(rename = "add")]
    Add,
    #[serde(rename = "edit")]
    Edit,
    #[serde(rename = "fileAdd")]
    FileAdd,
    #[serde(rename = "paymentCalc")]
    PaymentCalc,
    #[serde(rename = "wipe")]
    Wipe,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Auth => "auth",
            ActionType::List => "list",
            ActionType::Add => "add",
            ActionType::Edit => "edit",
            ActionType::FileAdd => "fileAdd",
            ActionType::PaymentCalc => "paymentCalc",
            ActionType::Wipe => "wipe",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

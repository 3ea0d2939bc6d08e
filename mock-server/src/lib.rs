//! In-memory stand-in for the XRM XML endpoint.
//!
//! Accepts `POST /` with a form field `xml` holding a request envelope and
//! answers with `<response><action type='..'>..</action></response>`.
//! Sessions are issued by `auth` and checked through the `sess_id` cookie;
//! unknown sessions get HTTP 401.

pub mod xml;

use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use axum::{
    extract::{Form, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::xml::{esc, Node};

/// Credentials the mock accepts.
#[derive(Clone, Debug)]
pub struct MockConfig {
    pub login: String,
    pub password: String,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            login: "admin".to_string(),
            password: "secret".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Record {
    pub id: u64,
    pub fields: BTreeMap<String, String>,
    pub files: Vec<BTreeMap<String, String>>,
}

#[derive(Default, Debug)]
pub struct Store {
    pub sessions: HashSet<String>,
    pub structures: HashMap<String, Vec<Record>>,
    next_id: u64,
}

impl Store {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

pub type Db = Arc<RwLock<Store>>;

#[derive(Clone)]
struct AppState {
    config: Arc<MockConfig>,
    db: Db,
}

pub fn app() -> Router {
    app_with(MockConfig::default())
}

pub fn app_with(config: MockConfig) -> Router {
    let state = AppState {
        config: Arc::new(config),
        db: Arc::new(RwLock::new(Store::default())),
    };
    Router::new().route("/", post(handle)).with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn handle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let Some(raw) = form.get("xml") else {
        return error(StatusCode::BAD_REQUEST, "missing xml field");
    };
    let request = match xml::parse(raw) {
        Ok(node) if node.name == "request" => node,
        Ok(node) => return error(StatusCode::BAD_REQUEST, &format!("unexpected root <{}>", node.name)),
        Err(e) => return error(StatusCode::BAD_REQUEST, &e),
    };
    let Some(action) = request.child("action") else {
        return error(StatusCode::BAD_REQUEST, "missing action");
    };
    let action_type = action.attr("type").unwrap_or_default().to_string();
    if action.attr("uid") != Some("80085") {
        return error(StatusCode::BAD_REQUEST, "bad uid");
    }
    info!(action = %action_type, "request");

    if action_type == "auth" {
        return auth(&state, action).await;
    }

    let session = session_cookie(&headers);
    let mut store = state.db.write().await;
    if !session.is_some_and(|s| store.sessions.contains(&s)) {
        warn!(action = %action_type, "unknown session");
        return error(StatusCode::UNAUTHORIZED, "invalid session");
    }

    let Some(structure) = action.child("structure") else {
        return error(StatusCode::BAD_REQUEST, "missing structure");
    };
    let body = match action_type.as_str() {
        "list" => list(&store, structure),
        "add" => add(&mut store, structure),
        "edit" => edit(&mut store, structure),
        "wipe" => wipe(&mut store, structure),
        "fileAdd" => file_add(&mut store, structure),
        "paymentCalc" => payment_calc(&store, structure),
        other => return error(StatusCode::BAD_REQUEST, &format!("unknown action {other}")),
    };
    ok(&action_type, &body)
}

async fn auth(state: &AppState, action: &Node) -> Response {
    let login = action.child_text("login");
    let password = action.child_text("password");
    if login != state.config.login || password != state.config.password {
        warn!(login = %login, "bad credentials");
        return ok("auth", "<error>invalid login or password</error>");
    }
    let token = Uuid::new_v4().simple().to_string();
    state.db.write().await.sessions.insert(token.clone());
    ok("auth", &format!("<sess_id>{token}</sess_id>"))
}

fn list(store: &Store, structure: &Node) -> String {
    let name = structure.attr("name").unwrap_or_default();
    let requested: Vec<&str> = structure
        .child("fields")
        .map(|f| f.children.iter().map(|c| c.name.as_str()).collect())
        .unwrap_or_default();
    let filters = filters(structure);

    let mut rows: Vec<&Record> = store
        .structures
        .get(name)
        .map(|rows| rows.iter().filter(|r| matches_all(r, &filters)).collect())
        .unwrap_or_default();

    if let Some(orders) = structure.child("orders") {
        for order in orders.children.iter().rev() {
            let field = order.child_text("field");
            let desc = order.child_text("type").eq_ignore_ascii_case("desc");
            rows.sort_by(|a, b| {
                let ord = compare(&value_of(a, &field), &value_of(b, &field));
                if desc {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
    }

    if let Some(limit) = structure.child("limit") {
        let first = limit.child_text("first").parse().unwrap_or(0);
        let number = limit.child_text("number").parse().unwrap_or(usize::MAX);
        rows = rows.into_iter().skip(first).take(number).collect();
    }

    let items: String = rows
        .iter()
        .map(|row| {
            let fields: String = row
                .fields
                .iter()
                .filter(|(k, _)| requested.is_empty() || requested.contains(&k.as_str()))
                .map(|(k, v)| format!("<{k}>{}</{k}>", esc(v)))
                .collect();
            format!("<item id='{}'>{fields}</item>", row.id)
        })
        .collect();
    format!("<structure name='{}'>{items}</structure>", esc(name))
}

fn add(store: &mut Store, structure: &Node) -> String {
    let name = structure.attr("name").unwrap_or_default().to_string();
    let id = store.next_id();
    let record = Record {
        id,
        fields: field_values(structure),
        files: Vec::new(),
    };
    store.structures.entry(name.clone()).or_default().push(record);
    format!("<structure name='{}'><id>{id}</id></structure>", esc(&name))
}

fn edit(store: &mut Store, structure: &Node) -> String {
    let name = structure.attr("name").unwrap_or_default();
    let values = field_values(structure);
    let filters = filters(structure);
    let mut updated = 0;
    for row in store.structures.get_mut(name).into_iter().flatten() {
        if matches_all(row, &filters) {
            row.fields.extend(values.clone());
            updated += 1;
        }
    }
    format!("<structure name='{}'><updated>{updated}</updated></structure>", esc(name))
}

fn wipe(store: &mut Store, structure: &Node) -> String {
    let name = structure.attr("name").unwrap_or_default();
    let id = structure.attr("id").unwrap_or_default();
    let mut deleted = 0;
    if let Some(rows) = store.structures.get_mut(name) {
        let before = rows.len();
        rows.retain(|r| r.id.to_string() != id);
        deleted = before - rows.len();
    }
    format!(
        "<structure name='{}' id='{}'><deleted>{deleted}</deleted></structure>",
        esc(name),
        esc(id)
    )
}

fn file_add(store: &mut Store, structure: &Node) -> String {
    let name = structure.attr("name").unwrap_or_default().to_string();
    let id = structure.attr("id").unwrap_or_default().to_string();
    let file_id = store.next_id();
    let record = store
        .structures
        .get_mut(&name)
        .and_then(|rows| rows.iter_mut().find(|r| r.id.to_string() == id));
    match record {
        Some(record) => {
            record.files.push(field_values(structure));
            format!(
                "<structure name='{}' id='{}'><file id='{file_id}'></file></structure>",
                esc(&name),
                esc(&id)
            )
        }
        None => "<error>record not found</error>".to_string(),
    }
}

/// Sums `amount` over `payments` rows whose `deal` is the requested id.
fn payment_calc(store: &Store, structure: &Node) -> String {
    let id = structure.attr("id").unwrap_or_default();
    let total: f64 = store
        .structures
        .get("payments")
        .into_iter()
        .flatten()
        .filter(|r| r.fields.get("deal").map(String::as_str) == Some(id))
        .filter_map(|r| r.fields.get("amount")?.parse::<f64>().ok())
        .sum();
    format!("<structure id='{}'><sum>{total:.2}</sum></structure>", esc(id))
}

type Predicate = (String, String, String);

fn filters(structure: &Node) -> Vec<Predicate> {
    structure
        .child("filters")
        .map(|f| {
            f.children
                .iter()
                .map(|c| (c.child_text("field"), c.child_text("operation"), c.child_text("value")))
                .collect()
        })
        .unwrap_or_default()
}

fn field_values(structure: &Node) -> BTreeMap<String, String> {
    structure
        .child("fields")
        .map(|f| f.children.iter().map(|c| (c.name.clone(), c.text.clone())).collect())
        .unwrap_or_default()
}

fn value_of(record: &Record, field: &str) -> String {
    if field == "id" {
        return record.id.to_string();
    }
    record.fields.get(field).cloned().unwrap_or_default()
}

fn matches_all(record: &Record, filters: &[Predicate]) -> bool {
    filters.iter().all(|(field, op, value)| {
        let actual = value_of(record, field);
        let ord = compare(&actual, value);
        match op.as_str() {
            "=" => ord == Ordering::Equal,
            "!=" | "<>" => ord != Ordering::Equal,
            ">" => ord == Ordering::Greater,
            ">=" => ord != Ordering::Less,
            "<" => ord == Ordering::Less,
            "<=" => ord != Ordering::Greater,
            "like" => actual.to_lowercase().contains(&value.to_lowercase()),
            _ => false,
        }
    })
}

/// Numeric comparison when both sides are numbers, text comparison otherwise.
fn compare(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == "sess_id")
        .map(|(_, value)| value.to_string())
}

fn ok(action: &str, body: &str) -> Response {
    let xml = format!(
        "<?xml version='1.0' encoding='utf8' ?><response><action type='{}'>{body}</action></response>",
        esc(action)
    );
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/xml; charset=utf-8")], xml).into_response()
}

fn error(status: StatusCode, message: &str) -> Response {
    let xml = format!(
        "<?xml version='1.0' encoding='utf8' ?><response><error>{}</error></response>",
        esc(message)
    );
    (status, [(header::CONTENT_TYPE, "text/xml; charset=utf-8")], xml).into_response()
}

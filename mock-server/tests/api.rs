use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, app_with, MockConfig};
use tower::{Service, ServiceExt};

const HEAD: &str = "<?xml version='1.0' encoding='utf8' ?>";

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn xml_request(xml: &str, session: Option<&str>) -> Request<String> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/")
        .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(session) = session {
        builder = builder.header(http::header::COOKIE, format!("sess_id={session};"));
    }
    builder
        .body(format!("xml={}", urlencoding::encode(xml)))
        .unwrap()
}

fn auth_xml(login: &str, password: &str) -> String {
    format!(
        "{HEAD}<request><action type='auth' uid='80085'>\
         <login>{login}</login><password>{password}</password></action></request>"
    )
}

fn action_xml(action: &str, structure: &str) -> String {
    format!("{HEAD}<request><action type='{action}' uid='80085'>{structure}</action></request>")
}

/// Pulls the text between `<tag>` and `</tag>`.
fn extract<'a>(body: &'a str, tag: &str) -> &'a str {
    let open = format!("<{tag}>");
    let start = body.find(&open).unwrap() + open.len();
    let end = body[start..].find(&format!("</{tag}>")).unwrap() + start;
    &body[start..end]
}

// --- auth ---

#[tokio::test]
async fn auth_issues_session() {
    let resp = app()
        .oneshot(xml_request(&auth_xml("admin", "secret"), None))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(resp).await;
    assert!(body.contains("<response><action type='auth'><sess_id>"));
    assert!(!extract(&body, "sess_id").is_empty());
}

#[tokio::test]
async fn auth_with_bad_password_has_no_session() {
    let resp = app()
        .oneshot(xml_request(&auth_xml("admin", "wrong"), None))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(resp).await;
    assert!(!body.contains("sess_id"));
    assert!(body.contains("<error>"));
}

#[tokio::test]
async fn custom_credentials() {
    let config = MockConfig {
        login: "robot".to_string(),
        password: "p&ss".to_string(),
    };
    let resp = app_with(config)
        .oneshot(xml_request(&auth_xml("robot", "p&amp;ss"), None))
        .await
        .unwrap();
    let body = body_text(resp).await;
    assert!(body.contains("<sess_id>"));
}

// --- rejections ---

#[tokio::test]
async fn list_without_session_returns_401() {
    let resp = app()
        .oneshot(xml_request(&action_xml("list", "<structure name='contacts'></structure>"), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_session_returns_401() {
    let resp = app()
        .oneshot(xml_request(
            &action_xml("list", "<structure name='contacts'></structure>"),
            Some("forged"),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_xml_returns_400() {
    let resp = app()
        .oneshot(xml_request("<request><action type='auth'", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn wrong_uid_returns_400() {
    let xml = format!("{HEAD}<request><action type='auth' uid='1'></action></request>");
    let resp = app().oneshot(xml_request(&xml, None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- full lifecycle ---

#[tokio::test]
async fn crud_lifecycle() {
    let mut app = app().into_service();

    macro_rules! send {
        ($req:expr) => {{
            let resp = ServiceExt::ready(&mut app).await.unwrap().call($req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            body_text(resp).await
        }};
    }

    let body = send!(xml_request(&auth_xml("admin", "secret"), None));
    let session = extract(&body, "sess_id").to_string();
    let s = Some(session.as_str());

    // add two contacts
    let body = send!(xml_request(
        &action_xml("add", "<structure name='contacts'><fields><name>Ann</name><age>31</age></fields></structure>"),
        s
    ));
    let ann = extract(&body, "id").to_string();
    send!(xml_request(
        &action_xml("add", "<structure name='contacts'><fields><name>Bob</name><age>17</age></fields></structure>"),
        s
    ));

    // list adults, name only
    let body = send!(xml_request(
        &action_xml(
            "list",
            "<structure name='contacts'><fields><name></name></fields>\
             <filters><filter><field>age</field><operation>&gt;</operation><value>18</value></filter></filters>\
             <orders></orders></structure>"
        ),
        s
    ));
    assert!(body.contains(&format!("<item id='{ann}'><name>Ann</name></item>")));
    assert!(!body.contains("Bob"));
    assert!(!body.contains("<age>"));

    // order by age desc, first row only
    let body = send!(xml_request(
        &action_xml(
            "list",
            "<structure name='contacts'><fields></fields><filters></filters>\
             <orders><order><field>age</field><type>desc</type></order></orders>\
             <limit><first>1</first><number>1</number></limit></structure>"
        ),
        s
    ));
    assert!(body.contains("<name>Bob</name>"));
    assert!(!body.contains("Ann"));

    // edit
    let body = send!(xml_request(
        &action_xml(
            "edit",
            &format!(
                "<structure name='contacts'><fields><age>32</age></fields>\
                 <filters><filter><field>id</field><operation>=</operation><value>{ann}</value></filter></filters></structure>"
            )
        ),
        s
    ));
    assert_eq!(extract(&body, "updated"), "1");

    // attach a file
    let body = send!(xml_request(
        &action_xml(
            "fileAdd",
            &format!("<structure name='contacts' id='{ann}'><fields><name>cv.pdf</name></fields></structure>")
        ),
        s
    ));
    assert!(body.contains("<file id='"));

    // payments for a deal
    for amount in ["100.50", "20"] {
        send!(xml_request(
            &action_xml(
                "add",
                &format!("<structure name='payments'><fields><deal>9</deal><amount>{amount}</amount></fields></structure>")
            ),
            s
        ));
    }
    let body = send!(xml_request(&action_xml("paymentCalc", "<structure id='9'></structure>"), s));
    assert_eq!(extract(&body, "sum"), "120.50");

    // wipe
    let body = send!(xml_request(
        &action_xml("wipe", &format!("<structure name='contacts' id='{ann}'></structure>")),
        s
    ));
    assert_eq!(extract(&body, "deleted"), "1");

    let body = send!(xml_request(
        &action_xml("list", "<structure name='contacts'><fields></fields></structure>"),
        s
    ));
    assert!(!body.contains("Ann"));
    assert!(body.contains("Bob"));
}

//! Minimal W3C WebDriver client.
//!
//! Speaks the JSON wire protocol to a driver such as `chromedriver`. Only the
//! handful of commands the collector needs are implemented: new session,
//! navigate, execute script, screenshot, and delete session.

use std::time::Duration;

use base64::Engine as _;
use reqwest::{Client, RequestBuilder};
use serde_json::{Value, json};

use crate::{
  Error, Result,
  session::{BrowserSession, SessionFactory, SessionSpec},
};

/// Connection to a WebDriver server.
///
/// Clones share the inner [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct WebDriverClient {
  client:   Client,
  base_url: String,
}

impl WebDriverClient {
  pub fn new(base_url: &str) -> Result<Self> {
    let client = Client::builder()
      .connect_timeout(Duration::from_secs(10))
      .build()?;
    Ok(Self {
      client,
      base_url: base_url.trim_end_matches('/').to_owned(),
    })
  }

  fn capabilities(spec: &SessionSpec) -> Value {
    let mut args = vec![format!(
      "--window-size={},{}",
      spec.viewport.width, spec.viewport.height
    )];
    if spec.headless {
      args.push("--headless=new".to_owned());
    }
    if let Some(dir) = &spec.user_data_dir {
      args.push(format!("--user-data-dir={}", dir.display()));
    }

    let timeout_ms = spec.navigation_timeout.as_millis() as u64;
    json!({
      "capabilities": {
        "alwaysMatch": {
          "browserName": "chrome",
          "goog:chromeOptions": { "args": args },
          "timeouts": { "pageLoad": timeout_ms, "script": timeout_ms },
        }
      }
    })
  }
}

impl SessionFactory for WebDriverClient {
  type Session = WebDriverSession;

  async fn open(&self, spec: SessionSpec) -> Result<WebDriverSession> {
    let request = self
      .client
      .post(format!("{}/session", self.base_url))
      .json(&Self::capabilities(&spec));
    let value = send(request).await?;

    let id = value
      .get("sessionId")
      .and_then(Value::as_str)
      .ok_or_else(|| Error::Protocol("new session response has no sessionId".into()))?;

    tracing::debug!(session = id, "webdriver session opened");
    Ok(WebDriverSession {
      client:  self.client.clone(),
      url:     format!("{}/session/{id}", self.base_url),
      // Commands wait on the browser; allow headroom past its own deadline.
      timeout: spec.navigation_timeout + Duration::from_secs(30),
    })
  }
}

/// An open WebDriver session.
#[derive(Debug)]
pub struct WebDriverSession {
  client:  Client,
  url:     String,
  timeout: Duration,
}

impl WebDriverSession {
  fn command(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
    self
      .client
      .request(method, format!("{}{path}", self.url))
      .timeout(self.timeout)
  }
}

impl BrowserSession for WebDriverSession {
  async fn navigate(&self, url: String) -> Result<()> {
    send(self.command(reqwest::Method::POST, "/url").json(&json!({ "url": url }))).await?;
    Ok(())
  }

  async fn execute(&self, script: String, args: Vec<Value>) -> Result<Value> {
    send(
      self
        .command(reqwest::Method::POST, "/execute/sync")
        .json(&json!({ "script": script, "args": args })),
    )
    .await
  }

  async fn screenshot(&self) -> Result<Vec<u8>> {
    let value = send(self.command(reqwest::Method::GET, "/screenshot")).await?;
    let encoded = value
      .as_str()
      .ok_or_else(|| Error::Protocol("screenshot is not a string".into()))?;
    Ok(base64::engine::general_purpose::STANDARD.decode(encoded)?)
  }

  async fn close(&self) -> Result<()> {
    send(self.command(reqwest::Method::DELETE, "")).await?;
    Ok(())
  }
}

/// Send a command and unwrap the `{"value": ...}` envelope.
async fn send(request: RequestBuilder) -> Result<Value> {
  let resp = request.send().await?;
  let status = resp.status();
  let mut body: Value = resp.json().await?;
  let value = body.get_mut("value").map(Value::take).unwrap_or(Value::Null);

  if status.is_success() {
    return Ok(value);
  }

  let field = |name: &str| {
    value
      .get(name)
      .and_then(Value::as_str)
      .unwrap_or_default()
      .to_owned()
  };
  Err(Error::WebDriver {
    status:  status.as_u16(),
    error:   field("error"),
    message: field("message"),
  })
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
  };
  use base64::Engine as _;
  use chatlog_core::profile::Viewport;
  use serde_json::{Value, json};

  use super::*;

  #[derive(Clone, Default)]
  struct Stub {
    calls: Arc<Mutex<Vec<String>>>,
  }

  async fn new_session(State(stub): State<Stub>, Json(body): Json<Value>) -> Json<Value> {
    let args = &body["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"];
    stub.calls.lock().unwrap().push(format!("new {args}"));
    Json(json!({ "value": { "sessionId": "s1", "capabilities": {} } }))
  }

  async fn navigate(
    State(stub): State<Stub>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
  ) -> Json<Value> {
    stub.calls.lock().unwrap().push(format!("{id} url {}", body["url"]));
    Json(json!({ "value": null }))
  }

  async fn execute(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["script"] == "throw" {
      return (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "value": {
          "error": "javascript error",
          "message": "boom",
          "stacktrace": "",
        } })),
      );
    }
    (StatusCode::OK, Json(json!({ "value": body["args"] })))
  }

  async fn screenshot() -> Json<Value> {
    let png = base64::engine::general_purpose::STANDARD.encode(b"\x89PNG");
    Json(json!({ "value": png }))
  }

  async fn delete_session(State(stub): State<Stub>, Path(id): Path<String>) -> Json<Value> {
    stub.calls.lock().unwrap().push(format!("{id} delete"));
    Json(json!({ "value": null }))
  }

  async fn serve(stub: Stub) -> String {
    let app = Router::new()
      .route("/session", post(new_session))
      .route("/session/{id}", delete(delete_session))
      .route("/session/{id}/url", post(navigate))
      .route("/session/{id}/execute/sync", post(execute))
      .route("/session/{id}/screenshot", get(screenshot))
      .with_state(stub);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}/")
  }

  fn spec() -> SessionSpec {
    SessionSpec {
      viewport:           Viewport { width: 1600, height: 900 },
      headless:           true,
      user_data_dir:      None,
      navigation_timeout: Duration::from_secs(5),
    }
  }

  #[tokio::test]
  async fn drives_a_session_end_to_end() {
    let stub = Stub::default();
    let base = serve(stub.clone()).await;

    let client = WebDriverClient::new(&base).unwrap();
    let session = client.open(spec()).await.unwrap();

    session.navigate("https://chat.example".into()).await.unwrap();
    let echoed = session
      .execute("return arguments;".into(), vec![json!(1), json!("two")])
      .await
      .unwrap();
    assert_eq!(echoed, json!([1, "two"]));

    let png = session.screenshot().await.unwrap();
    assert_eq!(png, b"\x89PNG");

    session.close().await.unwrap();

    let calls = stub.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 3);
    assert!(calls[0].contains("--window-size=1600,900"));
    assert!(calls[0].contains("--headless=new"));
    assert_eq!(calls[1], r#"s1 url "https://chat.example""#);
    assert_eq!(calls[2], "s1 delete");
  }

  #[tokio::test]
  async fn error_payload_is_surfaced() {
    let base = serve(Stub::default()).await;
    let session = WebDriverClient::new(&base).unwrap().open(spec()).await.unwrap();

    let err = session.execute("throw".into(), vec![]).await.unwrap_err();
    match err {
      Error::WebDriver { status, error, message } => {
        assert_eq!(status, 500);
        assert_eq!(error, "javascript error");
        assert_eq!(message, "boom");
      }
      other => panic!("unexpected error: {other}"),
    }
  }
}

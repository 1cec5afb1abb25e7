//! Shared test doubles: a scripted HTTP transport and a scripted redirect capture

#![allow(dead_code)]

use async_trait::async_trait;
use minim_auth::capture::{CaptureRequest, CaptureResult, RedirectCapture};
use minim_auth::transport::{HttpRequest, HttpResponse, HttpTransport};
use minim_auth::{AuthError, Provider, Result};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use url::Url;

/// A request seen by [`ScriptedTransport`] and when it arrived
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub request: HttpRequest,
    pub at: Instant,
}

impl RecordedRequest {
    pub fn path(&self) -> &str {
        self.request.url.path()
    }

    pub fn authorization(&self) -> Option<&str> {
        self.request.header_value("Authorization")
    }

    pub fn form(&self, name: &str) -> Option<&str> {
        self.request.form_value(name)
    }
}

/// Answers requests from a queue of canned responses, recording each request
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new(responses: impl IntoIterator<Item = HttpResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path() == path)
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(RecordedRequest {
            request: request.clone(),
            at: Instant::now(),
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AuthError::invalid_response(format!("unexpected request to {}", request.url)))
    }
}

type Responder = Box<dyn Fn(&Url) -> BTreeMap<String, String> + Send + Sync>;

/// Redirect capture that answers from the authorization URL it was sent to
pub struct ScriptedCapture {
    responder: Responder,
    seen: Mutex<Vec<Url>>,
}

impl ScriptedCapture {
    pub fn new(responder: impl Fn(&Url) -> BTreeMap<String, String> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Approve with `code`, echoing the `state` of the authorization URL
    pub fn approving(code: &'static str) -> Arc<Self> {
        Self::new(move |url| {
            let mut params = BTreeMap::from([("code".to_string(), code.to_string())]);
            if let Some(state) = query_param(url, "state") {
                params.insert("state".to_string(), state);
            }
            params
        })
    }

    /// Redirect with fixed parameters
    pub fn fixed(params: &[(&str, &str)]) -> Arc<Self> {
        let params: BTreeMap<String, String> = params
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self::new(move |_| params.clone())
    }

    pub fn authorization_urls(&self) -> Vec<Url> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl RedirectCapture for ScriptedCapture {
    async fn capture(&self, request: CaptureRequest) -> Result<CaptureResult> {
        self.seen.lock().unwrap().push(request.authorization_url.clone());
        CaptureResult::from_params((self.responder)(&request.authorization_url)).ensure_granted()
    }
}

pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// OAuth 2.0 provider with short, fake endpoints
pub fn test_provider() -> Provider {
    Provider::builder()
        .name("test")
        .authorization_url("https://auth.test/authorize")
        .token_url("https://auth.test/token")
        .device_authorization_url("https://auth.test/device")
        .api_base_url("https://api.test/v1")
        .profile_url("https://api.test/v1/me")
        .user_id_pointer("/id")
        .build()
}

pub fn token_json(access_token: &str) -> HttpResponse {
    HttpResponse::new(
        200,
        format!(
            r#"{{"access_token":"{access_token}","token_type":"bearer","expires_in":3600,"refresh_token":"refresh-{access_token}"}}"#
        ),
    )
}

pub fn ok_json(body: &str) -> HttpResponse {
    HttpResponse::new(200, body).with_header("Content-Type", "application/json")
}

pub fn redirect_uri() -> Url {
    Url::parse("http://127.0.0.1:8888/callback").unwrap()
}

//! In-memory fakes of the outbound ports for unit tests.
use std::{
    convert::Infallible,
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use bytes::Bytes;
use http::{HeaderMap, Method, Response, StatusCode, header};
use http_body_util::BodyExt;
use hyper::{Request, body::Frame};

use crate::ports::{
    http_client::{HttpClient, HttpClientError, HttpClientResult},
    token_source::{AccessToken, TokenError, TokenSource},
};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Clone)]
enum Canned {
    Respond {
        status: StatusCode,
        content_type: String,
        body: String,
        headers: Vec<(String, String)>,
    },
    Unreachable,
    /// Headers arrive, the body never yields a frame
    Stalled { status: StatusCode },
}

/// Response body that stays pending forever.
struct StalledBody;

impl hyper::body::Body for StalledBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Poll::Pending
    }
}

/// Records every request and answers with one canned response.
pub struct FakeHttpClient {
    canned: Canned,
    delay: Option<Duration>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FakeHttpClient {
    pub fn respond(status: StatusCode, content_type: &str, body: &str) -> Self {
        Self {
            canned: Canned::Respond {
                status,
                content_type: content_type.to_string(),
                body: body.to_string(),
                headers: Vec::new(),
            },
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn json(status: StatusCode, body: &str) -> Self {
        Self::respond(status, "application/json; charset=utf-8", body)
    }

    pub fn unreachable() -> Self {
        Self {
            canned: Canned::Unreachable,
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn stalled(status: StatusCode) -> Self {
        Self {
            canned: Canned::Stalled { status },
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let Canned::Respond { headers, .. } = &mut self.canned {
            headers.push((name.to_string(), value.to_string()));
        }
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for FakeHttpClient {
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>> {
        let (parts, body) = req.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| HttpClientError::InvalidRequest(e.to_string()))?
            .to_bytes();
        self.requests.lock().unwrap().push(RecordedRequest {
            method: parts.method,
            uri: parts.uri.to_string(),
            headers: parts.headers,
            body,
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.canned {
            Canned::Respond {
                status,
                content_type,
                body,
                headers,
            } => {
                let mut builder = Response::builder()
                    .status(*status)
                    .header(header::CONTENT_TYPE, content_type.as_str())
                    .header(header::CONTENT_LENGTH, body.len());
                for (name, value) in headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                Ok(builder.body(AxumBody::from(body.clone())).unwrap())
            }
            Canned::Stalled { status } => Ok(Response::builder()
                .status(*status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(AxumBody::new(StalledBody))
                .unwrap()),
            Canned::Unreachable => Err(HttpClientError::ConnectionError(
                "connection refused".to_string(),
            )),
        }
    }
}

/// Hands out a fixed token, or always fails.
pub struct FakeTokenSource {
    token: Option<String>,
    pub calls: Arc<AtomicUsize>,
}

impl FakeTokenSource {
    pub fn new(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            token: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl TokenSource for FakeTokenSource {
    async fn fetch_token(&self, _audience: &str) -> Result<AccessToken, TokenError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.token {
            Some(token) => Ok(AccessToken::new(token.clone())),
            None => Err(TokenError::Transport("metadata endpoint down".to_string())),
        }
    }
}

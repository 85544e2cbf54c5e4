use http::{Method, Request, Response, StatusCode};
use kube::{Client, client::Body};
use serde::Serialize;

use crate::metrics::Metrics;

type ApiServerHandle = tower_test::mock::Handle<Request<Body>, Response<Body>>;

/// The api server side of a mocked `kube::Client`.
///
/// Requests are answered one at a time, in the order the client makes them.
/// A request nobody answers surfaces in the client as
/// `KubeError(Service(Closed(())))`.
pub struct ApiServerVerifier(ApiServerHandle);

pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: String,
    pub body: Vec<u8>,
    send: tower_test::mock::SendResponse<Response<Body>>,
}

impl ApiRequest {
    pub fn respond<T: Serialize>(self, status: StatusCode, body: &T) {
        self.send.send_response(
            Response::builder()
                .status(status)
                .body(Body::from(serde_json::to_vec(body).unwrap()))
                .unwrap(),
        );
    }

    /// Answers with the request's own body, as the api server does for
    /// creates and server-side applies.
    pub fn echo(self) {
        let body = self.body.clone();
        self.send
            .send_response(Response::builder().body(Body::from(body)).unwrap());
    }

    pub fn fail(self, status: StatusCode, reason: &str) {
        let code = status.as_u16();
        self.respond(
            status,
            &serde_json::json!({
                "apiVersion": "v1",
                "kind": "Status",
                "metadata": {},
                "status": "Failure",
                "message": reason,
                "reason": reason,
                "code": code,
            }),
        );
    }

    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

impl ApiServerVerifier {
    pub async fn next(&mut self) -> ApiRequest {
        let (request, send) = self.0.next_request().await.expect("service not called");
        let (parts, body) = request.into_parts();
        ApiRequest {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().unwrap_or_default().to_string(),
            body: body.collect_bytes().await.unwrap().to_vec(),
            send,
        }
    }

    /// Resolves once every clone of the client has been dropped, panicking
    /// on any request made before that.
    pub async fn finish(mut self) {
        if let Some((request, _)) = self.0.next_request().await {
            panic!("unexpected request: {} {}", request.method(), request.uri());
        }
    }
}

pub fn testcontext() -> (Client, ApiServerVerifier) {
    let (mock_service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
    (
        Client::new(mock_service, "default"),
        ApiServerVerifier(handle),
    )
}

pub fn metrics() -> Metrics {
    Metrics::new(&opentelemetry_sdk::metrics::SdkMeterProvider::builder().build())
}

pub async fn timeout_after_1s(handle: tokio::task::JoinHandle<()>) {
    tokio::time::timeout(std::time::Duration::from_secs(1), handle)
        .await
        .expect("timeout on mock apiserver")
        .expect("scenario succeeded");
}

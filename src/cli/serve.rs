//! Serve command: the worker as a local HTTP proxy.
//!
//! Every request to the listener is rewritten against the configured origin
//! and dispatched through the worker. Requests the worker does not govern
//! go straight to the network. Paths under `/__offcache/` are control
//! endpoints standing in for the page runtime and the push server:
//!
//! - `POST /__offcache/message` - control message, replies with its JSON reply
//! - `POST /__offcache/push` - push data, replies with the notification shown
//! - `POST /__offcache/sync[?tag=TAG]` - one sync pass, replies with the report
//! - `GET /__offcache/status` - worker state and cache generations

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, HeaderMap, HeaderName};
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use url::form_urlencoded;

use crate::cli::args::ServeArgs;
use crate::cli::{build_worker, live_network};
use crate::core::messages::ControlMessage;
use crate::core::models::{FetchRequest, FetchResponse, HeaderList, RequestMode, resolve_url};
use crate::core::network::Network;
use crate::core::worker::{CacheWorker, FetchDisposition, ResponseSource};
use crate::error::Result;
use crate::storage::ResolvedConfig;

/// Prefix of the control endpoints.
pub const CONTROL_PREFIX: &str = "/__offcache/";
/// Response header naming where a response came from.
pub const SOURCE_HEADER: &str = "x-offcache-source";

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

type ProxyResponse = Response<Full<Bytes>>;

/// Shared state of the proxy.
pub struct ProxyState {
    worker: CacheWorker,
    network: Arc<dyn Network>,
}

impl ProxyState {
    #[must_use]
    pub fn new(worker: CacheWorker, network: Arc<dyn Network>) -> Self {
        Self { worker, network }
    }

    async fn handle(&self, request: Request<Incoming>) -> ProxyResponse {
        let (parts, body) = request.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => return text(StatusCode::BAD_REQUEST, &format!("unreadable body: {err}")),
        };
        let path_and_query = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());

        if let Some(endpoint) = parts.uri.path().strip_prefix(CONTROL_PREFIX) {
            return self.control(&parts.method, endpoint, parts.uri.query(), body).await;
        }

        let url = match resolve_url(&self.worker.settings().origin, path_and_query) {
            Ok(url) => url,
            Err(err) => return text(StatusCode::BAD_REQUEST, &err.to_string()),
        };
        let request = FetchRequest {
            mode: request_mode(&parts.method, &parts.headers),
            headers: forwardable_headers(&parts.headers),
            method: parts.method,
            url,
            body,
        };

        match self.worker.dispatch_fetch(request.clone()).await {
            FetchDisposition::Respond { response, source } => into_http(response, Some(source)),
            FetchDisposition::Passthrough => match self.network.fetch(&request).await {
                Ok(response) => into_http(response, None),
                Err(err) => {
                    tracing::warn!(url = %request.url, error = %err, "passthrough request failed");
                    text(StatusCode::BAD_GATEWAY, &err.to_string())
                }
            },
        }
    }

    async fn control(
        &self,
        method: &Method,
        endpoint: &str,
        query: Option<&str>,
        body: Bytes,
    ) -> ProxyResponse {
        let result = match (method, endpoint) {
            (&Method::POST, "message") => match ControlMessage::parse(&body) {
                Ok(message) => self
                    .worker
                    .dispatch_message(message)
                    .await
                    .map(|reply| json_response(StatusCode::OK, &reply.map_or_else(|| json!({}), |r| json!(r)))),
                Err(err) => Err(err),
            },
            (&Method::POST, "push") => {
                let data = (!body.is_empty()).then_some(&body[..]);
                self.worker
                    .dispatch_push(data)
                    .await
                    .map(|intent| match intent {
                        Some(intent) => json_response(StatusCode::OK, &intent),
                        None => empty(StatusCode::NO_CONTENT),
                    })
            }
            (&Method::POST, "sync") => {
                let tag = query
                    .and_then(|q| {
                        form_urlencoded::parse(q.as_bytes())
                            .find_map(|(key, value)| (key == "tag").then(|| value.into_owned()))
                    })
                    .unwrap_or_else(|| self.worker.settings().sync_tag.clone());
                self.worker.dispatch_sync(&tag).await.map(|report| match report {
                    Some(report) => json_response(StatusCode::OK, &report),
                    None => json_response(StatusCode::ACCEPTED, &json!({ "ignored": tag })),
                })
            }
            (&Method::GET, "status") => self.status(),
            _ => Ok(text(StatusCode::NOT_FOUND, "unknown control endpoint")),
        };

        result.unwrap_or_else(|err| {
            tracing::warn!(endpoint, error = %err, "control request failed");
            let status = if err.exit_code() == crate::error::ExitCode::ParseError {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            json_response(
                status,
                &json!({ "error": err.to_string(), "code": err.error_code() }),
            )
        })
    }

    fn status(&self) -> Result<ProxyResponse> {
        let store = self.worker.store();
        let caches = store
            .keys()?
            .into_iter()
            .map(|name| {
                let entries = store.entry_count(&name)?;
                Ok(json!({ "name": name, "entries": entries }))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(json_response(
            StatusCode::OK,
            &json!({
                "state": self.worker.state(),
                "origin": self.worker.settings().origin.as_str(),
                "caches": caches,
            }),
        ))
    }
}

/// A page navigation is a GET that says so, or one that asks for HTML.
fn request_mode(method: &Method, headers: &HeaderMap) -> RequestMode {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    if header("sec-fetch-mode") == Some("navigate") {
        return RequestMode::Navigate;
    }
    let wants_html = headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"));
    if *method == Method::GET && wants_html {
        RequestMode::Navigate
    } else {
        RequestMode::SameOrigin
    }
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

fn forwardable_headers(headers: &HeaderMap) -> HeaderList {
    headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn into_http(response: FetchResponse, source: Option<ResponseSource>) -> ProxyResponse {
    let mut builder = Response::builder().status(response.status);
    for (name, value) in &response.headers {
        if !is_hop_by_hop(name) {
            builder = builder.header(name.as_str(), value.as_str());
        }
    }
    let source = source.map_or_else(|| "passthrough".to_string(), |s| s.to_string());
    builder = builder.header(HeaderName::from_static(SOURCE_HEADER), source);
    builder.body(Full::new(response.body)).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "upstream response could not be relayed");
        text(StatusCode::BAD_GATEWAY, "invalid upstream response")
    })
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> ProxyResponse {
    let body = serde_json::to_vec(value).unwrap_or_default();
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(http::header::CONTENT_TYPE, http::HeaderValue::from_static("application/json"));
    response
}

fn text(status: StatusCode, message: &str) -> ProxyResponse {
    let mut response = Response::new(Full::new(Bytes::from(message.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(http::header::CONTENT_TYPE, http::HeaderValue::from_static("text/plain"));
    response
}

fn empty(status: StatusCode) -> ProxyResponse {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

/// Accept connections on `listener` until `shutdown` resolves.
///
/// # Errors
/// Returns an error if accepting a connection fails.
pub async fn serve(
    listener: TcpListener,
    state: Arc<ProxyState>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let service = service_fn(move |request| {
                        let state = Arc::clone(&state);
                        async move { Ok::<_, Infallible>(state.handle(request).await) }
                    });
                    if let Err(err) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        tracing::debug!(%peer, error = %err, "connection closed with error");
                    }
                });
            }
            () = &mut shutdown => {
                tracing::info!("proxy shutting down");
                return Ok(());
            }
        }
    }
}

/// Fire the sync tag every `every` until the task is dropped.
pub async fn periodic_sync(worker: CacheWorker, every: Duration) {
    let tag = worker.settings().sync_tag.clone();
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match worker.dispatch_sync(&tag).await {
            Ok(Some(report)) if report.attempted > 0 => {
                tracing::info!(delivered = report.delivered, retained = report.retained, "periodic sync");
            }
            Ok(_) => tracing::trace!("periodic sync found nothing pending"),
            Err(err) => tracing::warn!(error = %err, "periodic sync failed"),
        }
    }
}

/// Execute the serve command.
///
/// # Errors
/// Returns an error if the store cannot be opened or the listener cannot bind.
pub async fn execute(args: &ServeArgs, config: &ResolvedConfig) -> Result<()> {
    let network = live_network(config)?;
    let worker = build_worker(config, Arc::clone(&network))?;

    match worker.start().await {
        Ok(state) => tracing::info!(%state, "worker started"),
        Err(err) => tracing::warn!(error = %err, "worker failed to start; requests pass through"),
    }

    let listener = TcpListener::bind(config.listen).await?;
    let local: SocketAddr = listener.local_addr()?;
    tracing::info!(listen = %local, origin = %config.origin, "proxy listening");
    eprintln!("offcache proxy for {} on http://{local}", config.origin);

    let interval = args.sync_interval.unwrap_or(config.config.sync.interval_secs);
    let sync_task = (interval > 0)
        .then(|| tokio::spawn(periodic_sync(worker.clone(), Duration::from_secs(interval))));

    let state = Arc::new(ProxyState::new(worker, network));
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "ctrl-c handler failed");
        }
    };
    let result = serve(listener, state, shutdown).await;

    if let Some(task) = sync_task {
        task.abort();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn navigation_detection() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_mode(&Method::GET, &headers), RequestMode::SameOrigin);
        headers.insert(ACCEPT, HeaderValue::from_static("text/html,application/xhtml+xml"));
        assert_eq!(request_mode(&Method::GET, &headers), RequestMode::Navigate);
        assert_eq!(request_mode(&Method::POST, &headers), RequestMode::SameOrigin);

        let mut fetch_mode = HeaderMap::new();
        fetch_mode.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
        assert_eq!(request_mode(&Method::GET, &fetch_mode), RequestMode::Navigate);
    }

    #[test]
    fn hop_by_hop_headers_are_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("127.0.0.1:8787"));
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        let forwarded = forwardable_headers(&headers);
        assert_eq!(
            forwarded,
            vec![("content-type".to_string(), "application/json".to_string())]
        );
    }

    #[test]
    fn relayed_response_carries_source() {
        let response = FetchResponse::new(200, "hi")
            .header("Content-Type", "text/plain")
            .header("Transfer-Encoding", "chunked");
        let relayed = into_http(response, Some(ResponseSource::Cache));
        assert_eq!(relayed.status(), StatusCode::OK);
        assert_eq!(relayed.headers()[SOURCE_HEADER], "cache");
        assert!(relayed.headers().get("transfer-encoding").is_none());
    }
}

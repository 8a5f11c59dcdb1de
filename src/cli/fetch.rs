//! Fetch command implementation.

use bytes::Bytes;
use http::Method;
use serde::Serialize;

use crate::cli::args::FetchArgs;
use crate::cli::{OutputFormat, build_worker, emit, live_network};
use crate::core::models::{FetchRequest, FetchResponse, RequestMode, resolve_url};
use crate::core::worker::{FetchDisposition, ResponseSource};
use crate::error::{OffcacheError, Result};
use crate::storage::ResolvedConfig;

/// A fetch result as printed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchOutput {
    pub url: String,
    pub status: u16,
    /// `None` when the request bypassed the worker.
    pub source: Option<ResponseSource>,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl FetchOutput {
    fn new(url: &str, response: FetchResponse, source: Option<ResponseSource>) -> Self {
        Self {
            url: url.to_string(),
            status: response.status,
            source,
            body: response.text(),
            headers: response.headers,
        }
    }
}

/// Build the request described by the command arguments.
///
/// # Errors
/// Returns an error for an unparseable URL, method, or header.
pub fn build_request(args: &FetchArgs, config: &ResolvedConfig) -> Result<FetchRequest> {
    let url = resolve_url(&config.origin, &args.path)?;
    let method = Method::from_bytes(args.method.to_uppercase().as_bytes())
        .map_err(|_| OffcacheError::MalformedPayload(format!("invalid method '{}'", args.method)))?;
    let body = args.data.clone().map(Bytes::from).unwrap_or_default();

    let mut request = FetchRequest::with_body(method, url, body);
    if args.navigate {
        request.mode = RequestMode::Navigate;
    }
    for header in &args.headers {
        let (name, value) = header.split_once(':').ok_or_else(|| {
            OffcacheError::MalformedPayload(format!("header '{header}' is not 'Name: value'"))
        })?;
        request = request.header(name.trim(), value.trim());
    }
    Ok(request)
}

/// Execute the fetch command.
///
/// The worker is started first (resumed from the store, or installed). If it
/// cannot start, the request goes straight to the network.
///
/// # Errors
/// Returns an error if the request is invalid, or it passed through and the
/// network failed.
pub async fn execute(
    args: &FetchArgs,
    config: &ResolvedConfig,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    let request = build_request(args, config)?;
    let network = live_network(config)?;
    let worker = build_worker(config, network.clone())?;

    if let Err(err) = worker.start().await {
        tracing::warn!(error = %err, "worker not active, request passes through");
    }

    let url = request.url.to_string();
    let output = match worker.dispatch_fetch(request.clone()).await {
        FetchDisposition::Respond { response, source } => FetchOutput::new(&url, response, Some(source)),
        FetchDisposition::Passthrough => FetchOutput::new(&url, network.fetch(&request).await?, None),
    };

    emit(format, pretty, "fetch", &output, render_human)
}

fn render_human(output: &FetchOutput) -> String {
    let source = output.source.map_or_else(|| "passthrough".to_string(), |s| s.to_string());
    let mut out = format!("{} {} ({source})\n", output.status, output.url);
    for (name, value) in &output.headers {
        out.push_str(&format!("{name}: {value}\n"));
    }
    out.push('\n');
    out.push_str(&output.body);
    if !output.body.ends_with('\n') {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Config;

    fn config() -> ResolvedConfig {
        let mut config = Config::default();
        config.general.origin = "https://app.test".to_string();
        ResolvedConfig {
            origin: url::Url::parse("https://app.test").unwrap(),
            timeout: std::time::Duration::from_secs(5),
            listen: "127.0.0.1:0".parse().unwrap(),
            sources: crate::storage::ConfigSources::default(),
            config,
        }
    }

    fn args(path: &str) -> FetchArgs {
        FetchArgs {
            path: path.to_string(),
            method: "post".to_string(),
            data: Some(r#"{"text":"hi"}"#.to_string()),
            navigate: false,
            headers: vec!["Content-Type: application/json".to_string()],
        }
    }

    #[test]
    fn builds_write_request() {
        let request = build_request(&args("/api/messages"), &config()).unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url.as_str(), "https://app.test/api/messages");
        assert_eq!(request.body, Bytes::from(r#"{"text":"hi"}"#));
        assert_eq!(
            request.headers,
            vec![("Content-Type".to_string(), "application/json".to_string())]
        );
    }

    #[test]
    fn rejects_bad_header() {
        let mut bad = args("/");
        bad.headers = vec!["no-colon".to_string()];
        assert!(build_request(&bad, &config()).is_err());
    }

    #[test]
    fn navigate_flag_sets_mode() {
        let mut nav = args("/inbox");
        nav.method = "GET".to_string();
        nav.data = None;
        nav.navigate = true;
        let request = build_request(&nav, &config()).unwrap();
        assert!(request.is_navigation());
        assert!(request.body.is_empty());
    }

    #[test]
    fn human_output_shows_source() {
        let output = FetchOutput::new(
            "https://app.test/",
            FetchResponse::new(503, "Offline"),
            Some(ResponseSource::Offline),
        );
        let text = render_human(&output);
        assert!(text.starts_with("503 https://app.test/ (offline)"));
        assert!(text.ends_with("Offline\n"));
    }
}

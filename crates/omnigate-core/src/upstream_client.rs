use std::time::Duration;

use futures_util::StreamExt;
use tracing::debug;
use wreq::{Client, Method, Proxy};

use omnigate_common::GatewayConfig;
use omnigate_provider_core::{
    Headers, HttpMethod, UpstreamBody, UpstreamChunk, UpstreamClient, UpstreamFailure,
    UpstreamFuture, UpstreamHttpRequest, UpstreamHttpResponse, UpstreamTransportErrorKind,
};

/// Forwarded chunks buffered between the socket and the relay.
const FORWARD_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamClientConfig {
    pub proxy: Option<String>,
    pub connect_timeout: Duration,
    /// Longest silence tolerated between two reads. There is no overall
    /// deadline: long generations keep the call open.
    pub read_idle_timeout: Duration,
}

impl Default for UpstreamClientConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            connect_timeout: Duration::from_secs(10),
            read_idle_timeout: Duration::from_secs(300),
        }
    }
}

impl UpstreamClientConfig {
    pub fn from_gateway(config: &GatewayConfig) -> Self {
        Self {
            proxy: normalize_proxy(config.proxy.clone()),
            ..Self::default()
        }
    }
}

/// [`UpstreamClient`] over `wreq`.
#[derive(Clone)]
pub struct WreqUpstreamClient {
    config: UpstreamClientConfig,
    client: Client,
}

impl WreqUpstreamClient {
    pub fn new(config: UpstreamClientConfig) -> Result<Self, wreq::Error> {
        let client = build_client(&config)?;
        Ok(Self { config, client })
    }
}

fn normalize_proxy(value: Option<String>) -> Option<String> {
    value
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
}

fn build_client(config: &UpstreamClientConfig) -> Result<Client, wreq::Error> {
    let mut builder = Client::builder()
        .connect_timeout(config.connect_timeout)
        .read_timeout(config.read_idle_timeout);

    if let Some(proxy) = normalize_proxy(config.proxy.clone()) {
        builder = builder.proxy(Proxy::all(proxy.as_str())?);
    }

    builder.build()
}

impl UpstreamClient for WreqUpstreamClient {
    fn send<'a>(&'a self, req: UpstreamHttpRequest) -> UpstreamFuture<'a> {
        Box::pin(async move {
            let method = match req.method {
                HttpMethod::Get => Method::GET,
                HttpMethod::Post => Method::POST,
            };
            let mut builder = self.client.request(method, &req.url);
            for (k, v) in &req.headers {
                builder = builder.header(k, v);
            }
            if let Some(body) = req.body {
                builder = builder.body(body);
            }

            let resp = builder.send().await.map_err(map_wreq_error)?;
            convert_response(resp, req.is_stream, self.config.read_idle_timeout).await
        })
    }
}

async fn convert_response(
    resp: wreq::Response,
    want_stream: bool,
    read_idle_timeout: Duration,
) -> Result<UpstreamHttpResponse, UpstreamFailure> {
    let status = resp.status().as_u16();
    let headers = headers_from_wreq(resp.headers());

    let is_success = (200..300).contains(&status);
    if !is_success || !want_stream {
        let body = resp.bytes().await.map_err(map_wreq_error)?;
        return Ok(UpstreamHttpResponse {
            status,
            headers,
            body: UpstreamBody::Bytes(body),
        });
    }

    // Dropping the receiver ends this task, which drops the response and
    // closes the upstream connection.
    let (tx, rx) = tokio::sync::mpsc::channel::<UpstreamChunk>(FORWARD_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let mut stream = resp.bytes_stream();
        loop {
            let next = tokio::select! {
                _ = tx.closed() => break,
                next = tokio::time::timeout(read_idle_timeout, stream.next()) => next,
            };
            let item = match next {
                Ok(Some(Ok(chunk))) => Ok(chunk),
                Ok(None) => break,
                Ok(Some(Err(err))) => {
                    debug!(event = "upstream_stream_read_error", error = %err);
                    Err(map_wreq_error(err))
                }
                Err(_) => {
                    debug!(event = "upstream_stream_idle_timeout");
                    Err(UpstreamFailure::Transport {
                        kind: UpstreamTransportErrorKind::ReadTimeout,
                        message: format!("no data from upstream for {}s", read_idle_timeout.as_secs()),
                    })
                }
            };
            let failed = item.is_err();
            if tx.send(item).await.is_err() || failed {
                break;
            }
        }
    });

    Ok(UpstreamHttpResponse {
        status,
        headers,
        body: UpstreamBody::Stream(rx),
    })
}

fn headers_from_wreq(map: &wreq::header::HeaderMap) -> Headers {
    map.iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.as_str().to_string(), s.to_string())))
        .collect()
}

fn map_wreq_error(err: wreq::Error) -> UpstreamFailure {
    let kind = classify_wreq_error(&err);
    UpstreamFailure::Transport {
        kind,
        message: err.to_string(),
    }
}

fn classify_wreq_error(err: &wreq::Error) -> UpstreamTransportErrorKind {
    let message = err.to_string().to_ascii_lowercase();
    if err.is_timeout() {
        if message.contains("read") || message.contains("idle") {
            return UpstreamTransportErrorKind::ReadTimeout;
        }
        return UpstreamTransportErrorKind::Timeout;
    }
    if err.is_connect() || err.is_connection_reset() {
        return classify_connect_message(&message);
    }
    if message.contains("tls") || message.contains("ssl") {
        return UpstreamTransportErrorKind::Tls;
    }
    UpstreamTransportErrorKind::Other
}

fn classify_connect_message(message: &str) -> UpstreamTransportErrorKind {
    if message.contains("dns") || message.contains("resolve") {
        UpstreamTransportErrorKind::Dns
    } else if message.contains("tls") || message.contains("ssl") {
        UpstreamTransportErrorKind::Tls
    } else {
        UpstreamTransportErrorKind::Connect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_gateway_limits() {
        let config = UpstreamClientConfig::from_gateway(&GatewayConfig {
            proxy: Some("   ".into()),
            ..GatewayConfig::default()
        });
        assert_eq!(config.proxy, None);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_idle_timeout, Duration::from_secs(300));
    }

    #[test]
    fn connect_failures_are_classified() {
        assert_eq!(
            classify_connect_message("error trying to connect: dns error: failed to lookup"),
            UpstreamTransportErrorKind::Dns
        );
        assert_eq!(
            classify_connect_message("tls handshake eof"),
            UpstreamTransportErrorKind::Tls
        );
        assert_eq!(
            classify_connect_message("connection refused"),
            UpstreamTransportErrorKind::Connect
        );
    }
}

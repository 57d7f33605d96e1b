use bytes::Bytes;
use http_body_util::Empty;
use hyper::Request;

use super::Result;

/// `Host` value for `url`. `Url::port` is `None` for the scheme's default port.
pub(super) fn host_header_value(url: &url::Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Builds a body-less GET. A caller-supplied `Host` header replaces the derived one.
pub(super) fn build_get(
    url: &url::Url,
    uri: hyper::Uri,
    headers: Vec<(String, String)>,
) -> Result<Request<Empty<Bytes>>> {
    let mut builder = Request::builder().method(http::Method::GET).uri(uri);

    let has_host = headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("host"));
    if !has_host && let Some(host) = host_header_value(url) {
        builder = builder.header(http::header::HOST, host);
    }

    for (k, v) in headers {
        let name = http::header::HeaderName::from_bytes(k.as_bytes())?;
        let value = http::header::HeaderValue::from_str(&v)?;
        builder = builder.header(name, value);
    }

    Ok(builder.body(Empty::new())?)
}

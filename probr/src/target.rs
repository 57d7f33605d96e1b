use anyhow::Context as _;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use clap::Args;
use probr_core::Endpoint;

pub const DEFAULT_HOST: &str = "cstr_traefik";
pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_USER: &str = "apiuser";
pub const DEFAULT_PASS: &str = "apipass-CHANGE-ME";

/// Where probes go and how they authenticate.
///
/// Every flag can also come from a `PROBR_*` environment variable; flags win.
#[derive(Debug, Clone, Args)]
pub struct TargetArgs {
    /// Full base URL (e.g. https://api.example.com). Takes precedence over --host/--port.
    #[arg(long, env = "PROBR_BASE_URL", value_name = "URL")]
    pub base_url: Option<String>,

    /// Target host
    #[arg(long, env = "PROBR_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Target port
    #[arg(long, env = "PROBR_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Basic auth user
    #[arg(long, env = "PROBR_USER", default_value = DEFAULT_USER)]
    pub user: String,

    /// Basic auth password
    #[arg(long, env = "PROBR_PASS", default_value = DEFAULT_PASS, hide_env_values = true)]
    pub pass: String,

    /// Send probes without an Authorization header
    #[arg(long)]
    pub no_auth: bool,
}

impl TargetArgs {
    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.clone(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }

    pub fn endpoint(&self) -> anyhow::Result<Endpoint> {
        let base_url = self.base_url();
        let parsed = url::Url::parse(&base_url)
            .with_context(|| format!("invalid target base URL `{base_url}`"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!(
                "unsupported scheme `{}` in `{base_url}` (expected http or https)",
                parsed.scheme()
            );
        }
        if parsed.query().is_some() || parsed.fragment().is_some() {
            anyhow::bail!("target base URL must not carry a query or fragment: `{base_url}`");
        }

        let endpoint = Endpoint::new(base_url);
        if self.no_auth {
            return Ok(endpoint);
        }
        Ok(endpoint.with_header("Authorization", basic_auth(&self.user, &self.pass)))
    }
}

pub fn basic_auth(user: &str, pass: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{user}:{pass}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> TargetArgs {
        TargetArgs {
            base_url: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            user: DEFAULT_USER.to_string(),
            pass: DEFAULT_PASS.to_string(),
            no_auth: false,
        }
    }

    #[test]
    fn defaults_point_at_the_gateway_with_basic_auth() {
        let endpoint = args().endpoint().unwrap_or_else(|e| panic!("{e:#}"));
        assert_eq!(endpoint.base_url, "http://cstr_traefik:80");
        assert_eq!(
            endpoint.headers,
            vec![(
                "Authorization".to_string(),
                "Basic YXBpdXNlcjphcGlwYXNzLUNIQU5HRS1NRQ==".to_string()
            )]
        );
    }

    #[test]
    fn base_url_overrides_host_and_port() {
        let mut a = args();
        a.base_url = Some("https://api.example.com/".to_string());
        a.user = "u".to_string();
        a.pass = "p".to_string();

        let endpoint = a.endpoint().unwrap_or_else(|e| panic!("{e:#}"));
        assert_eq!(endpoint.base_url, "https://api.example.com");
        assert_eq!(endpoint.headers[0].1, "Basic dTpw");
        assert_eq!(
            endpoint.url_for("/api/healthz"),
            "https://api.example.com/api/healthz"
        );
    }

    #[test]
    fn no_auth_sends_no_headers() {
        let mut a = args();
        a.no_auth = true;
        let endpoint = a.endpoint().unwrap_or_else(|e| panic!("{e:#}"));
        assert!(endpoint.headers.is_empty());
    }

    #[test]
    fn rejects_non_http_targets() {
        let mut a = args();
        a.base_url = Some("ftp://files.example.com".to_string());
        assert!(a.endpoint().is_err());

        a.base_url = Some("not a url".to_string());
        assert!(a.endpoint().is_err());

        a.base_url = Some("http://h/?x=1".to_string());
        assert!(a.endpoint().is_err());
    }
}

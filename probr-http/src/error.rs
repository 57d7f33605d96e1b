use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse failure class, used as the label on transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// The URL or a header could not be turned into a request.
    Malformed,
    /// TCP/TLS connection could not be established.
    Connect,
    /// The connection broke while sending or receiving.
    Exchange,
    Timeout,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid url {url}: {reason}")]
    Url { url: String, reason: String },

    #[error("invalid request header: {0}")]
    Header(String),

    #[error(transparent)]
    Build(#[from] http::Error),

    #[error("request failed: {0}")]
    Send(#[from] hyper_util::client::legacy::Error),

    #[error("reading response body failed: {0}")]
    Body(#[from] hyper::Error),

    #[error("no response within {0:?}")]
    Timeout(Duration),
}

impl From<http::header::InvalidHeaderName> for Error {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::Header(err.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::Header(err.to_string())
    }
}

impl Error {
    pub(crate) fn url(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Url {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Url { .. } | Self::Header(_) | Self::Build(_) => FailureKind::Malformed,
            Self::Send(err) if err.is_connect() => FailureKind::Connect,
            Self::Send(_) | Self::Body(_) => FailureKind::Exchange,
            Self::Timeout(_) => FailureKind::Timeout,
        }
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind() == FailureKind::Timeout
    }
}

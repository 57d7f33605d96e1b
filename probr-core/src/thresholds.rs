use std::fmt;

use probr_metrics::{LatencyStat, Metric, MetricParseError};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ThresholdError {
    #[error("empty threshold")]
    Empty,

    #[error("invalid threshold (missing operator): {0}")]
    MissingOperator(String),

    #[error("invalid numeric value in threshold: {0}")]
    InvalidBound(String),

    #[error("time unit is only allowed on latency metrics: {0}")]
    UnitNotAllowed(String),

    #[error("invalid threshold `{expr}`: {source}")]
    Metric {
        expr: String,
        source: MetricParseError,
    },

    #[error("invalid scope in threshold (expected `{{tag=<tag>}}`): {0}")]
    InvalidScope(String),

    #[error("unsupported aggregation `{agg}` for `{metric}` in threshold: {expr}")]
    UnsupportedAggregation {
        metric: String,
        agg: String,
        expr: String,
    },
}

pub type Result<T> = std::result::Result<T, ThresholdError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
}

impl ThresholdOp {
    pub fn compare(self, left: f64, right: f64) -> bool {
        match self {
            Self::Lt => left < right,
            Self::Lte => left <= right,
            Self::Gt => left > right,
            Self::Gte => left >= right,
            Self::Eq => left == right,
        }
    }
}

impl fmt::Display for ThresholdOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Eq => "==",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThresholdScope {
    Global,
    Tag(String),
}

/// A pass/fail predicate over one aggregated metric.
///
/// Latency bounds are stored in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: Metric,
    pub scope: ThresholdScope,
    pub op: ThresholdOp,
    pub bound: f64,
    /// A missing tag series passes instead of failing.
    pub allow_missing: bool,
    /// Evaluated during the run; a failure stops it.
    pub abort_on_fail: bool,
    /// Expression as written by the user.
    pub source: String,
}

impl Threshold {
    pub fn tag(&self) -> Option<&str> {
        match &self.scope {
            ThresholdScope::Global => None,
            ThresholdScope::Tag(tag) => Some(tag),
        }
    }

    #[must_use]
    pub fn with_allow_missing(mut self, allow_missing: bool) -> Self {
        self.allow_missing = allow_missing;
        self
    }

    #[must_use]
    pub fn with_abort_on_fail(mut self, abort_on_fail: bool) -> Self {
        self.abort_on_fail = abort_on_fail;
        self
    }

    pub fn check(&self, observed: f64) -> bool {
        self.op.compare(observed, self.bound)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Parses `<metric>[{tag=<tag>}] <op> <bound>[ms|s|us]`.
pub fn parse_threshold_expr(raw: &str) -> Result<Threshold> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(ThresholdError::Empty);
    }

    let (left, op, right) = split_op(s).ok_or_else(|| ThresholdError::MissingOperator(raw.into()))?;
    let (name, scope) = split_scope(left, raw)?;

    let metric: Metric = name.parse().map_err(|source| ThresholdError::Metric {
        expr: raw.to_string(),
        source,
    })?;
    let bound = parse_bound(right, metric.is_latency(), raw)?;

    Ok(Threshold {
        metric,
        scope,
        op,
        bound,
        allow_missing: false,
        abort_on_fail: false,
        source: s.to_string(),
    })
}

/// Splits at the first comparison operator outside a `{...}` scope.
fn split_op(s: &str) -> Option<(&str, ThresholdOp, &str)> {
    let bytes = s.as_bytes();
    let mut depth = 0u32;
    for (i, b) in bytes.iter().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            b'<' | b'>' | b'=' if depth == 0 => {
                let next_eq = bytes.get(i + 1) == Some(&b'=');
                let (op, len) = match (b, next_eq) {
                    (b'<', true) => (ThresholdOp::Lte, 2),
                    (b'<', false) => (ThresholdOp::Lt, 1),
                    (b'>', true) => (ThresholdOp::Gte, 2),
                    (b'>', false) => (ThresholdOp::Gt, 1),
                    (_, true) => (ThresholdOp::Eq, 2),
                    (_, false) => return None,
                };
                let left = s[..i].trim();
                let right = s[i + len..].trim();
                if left.is_empty() || right.is_empty() {
                    return None;
                }
                return Some((left, op, right));
            }
            _ => {}
        }
    }
    None
}

/// Splits `name{tag=<tag>}` (or k6's `name{name:<tag>}`) into the name and its scope.
fn split_scope<'a>(left: &'a str, raw: &str) -> Result<(&'a str, ThresholdScope)> {
    let Some(open) = left.find('{') else {
        return Ok((left.trim(), ThresholdScope::Global));
    };

    let inner = left[open + 1..]
        .strip_suffix('}')
        .ok_or_else(|| ThresholdError::InvalidScope(raw.into()))?;
    let tag = ["tag=", "tag:", "name:", "name="]
        .iter()
        .find_map(|p| inner.trim().strip_prefix(p))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ThresholdError::InvalidScope(raw.into()))?;

    Ok((left[..open].trim(), ThresholdScope::Tag(tag.to_string())))
}

/// Parses a bound. Latency bounds accept `us`, `ms` (default) or `s` and are returned in ms.
fn parse_bound(raw_bound: &str, is_latency: bool, raw: &str) -> Result<f64> {
    let units = [("ms", 1.0), ("us", 1e-3), ("µs", 1e-3), ("s", 1e3)];
    let (num, scale) = units
        .iter()
        .find_map(|(suffix, scale)| raw_bound.strip_suffix(suffix).map(|n| (n, Some(*scale))))
        .unwrap_or((raw_bound, None));

    if scale.is_some() && !is_latency {
        return Err(ThresholdError::UnitNotAllowed(raw.into()));
    }

    let value: f64 = num
        .trim()
        .parse()
        .map_err(|_| ThresholdError::InvalidBound(raw.into()))?;
    if !value.is_finite() {
        return Err(ThresholdError::InvalidBound(raw.into()));
    }

    Ok(value * scale.unwrap_or(1.0))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdSpec {
    pub expression: String,
    pub abort_on_fail: bool,
    pub allow_missing: bool,
}

impl ThresholdSpec {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            abort_on_fail: false,
            allow_missing: false,
        }
    }
}

/// Thresholds grouped under one metric key, as written in scenario files.
///
/// The key is either a native metric (`error_rate`, `latency_p95{tag=/api/healthz}`) whose
/// expressions are `<op> <bound>`, or a k6-style metric (`http_req_failed`,
/// `http_req_duration`, `http_reqs`, `dropped_iterations`) whose expressions are
/// `<agg> <op> <bound>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdSet {
    pub metric: String,
    pub expressions: Vec<ThresholdSpec>,
}

impl ThresholdSet {
    pub fn compile(&self) -> Result<Vec<Threshold>> {
        self.expressions
            .iter()
            .map(|spec| {
                let t = self.compile_one(&spec.expression)?;
                Ok(t.with_abort_on_fail(spec.abort_on_fail)
                    .with_allow_missing(spec.allow_missing))
            })
            .collect()
    }

    fn compile_one(&self, expr: &str) -> Result<Threshold> {
        let key = self.metric.trim();
        let full = format!("{key}: {}", expr.trim());
        let (base, scope) = split_scope(key, &full)?;

        if !is_k6_metric(base) {
            let mut t = parse_threshold_expr(&format!("{key} {}", expr.trim()))?;
            t.source = full;
            return Ok(t);
        }

        let (agg, op, right) =
            split_op(expr.trim()).ok_or_else(|| ThresholdError::MissingOperator(full.clone()))?;
        let agg = agg.to_ascii_lowercase();

        let metric = match (base, agg.as_str()) {
            ("http_req_failed", "rate") => Metric::ErrorRate,
            ("http_reqs", "count") => Metric::RequestsTotal,
            ("dropped_iterations", "count") => Metric::DroppedArrivals,
            ("http_req_duration", "avg") => Metric::Latency(LatencyStat::Avg),
            ("http_req_duration", "min") => Metric::Latency(LatencyStat::Min),
            ("http_req_duration", "med") => Metric::Latency(LatencyStat::Med),
            ("http_req_duration", "max") => Metric::Latency(LatencyStat::Max),
            ("http_req_duration", p) if p.starts_with("p(") => {
                let inner = p
                    .strip_prefix("p(")
                    .and_then(|v| v.strip_suffix(')'))
                    .unwrap_or_default();
                format!("latency_p({inner})")
                    .parse()
                    .map_err(|source| ThresholdError::Metric {
                        expr: full.clone(),
                        source,
                    })?
            }
            _ => {
                return Err(ThresholdError::UnsupportedAggregation {
                    metric: base.to_string(),
                    agg,
                    expr: full,
                });
            }
        };

        let bound = parse_bound(right, metric.is_latency(), &full)?;
        Ok(Threshold {
            metric,
            scope,
            op,
            bound,
            allow_missing: false,
            abort_on_fail: false,
            source: full,
        })
    }
}

fn is_k6_metric(name: &str) -> bool {
    matches!(
        name,
        "http_req_failed" | "http_req_duration" | "http_reqs" | "dropped_iterations"
    )
}

/// Compiles every set, in order.
pub fn compile_threshold_sets(sets: &[ThresholdSet]) -> Result<Vec<Threshold>> {
    let mut out = Vec::new();
    for set in sets {
        out.extend(set.compile()?);
    }
    Ok(out)
}

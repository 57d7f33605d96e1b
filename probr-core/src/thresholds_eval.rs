use std::collections::HashSet;

use probr_metrics::Snapshot;

use crate::config::ProbeTarget;
use crate::error::{Error, Result};
use crate::thresholds::Threshold;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Status {
    Pass,
    Fail,
}

impl Status {
    fn from_bool(passed: bool) -> Self {
        if passed { Self::Pass } else { Self::Fail }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdResult {
    pub threshold: Threshold,
    /// `None` when the scoped tag never recorded an outcome.
    pub observed: Option<f64>,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub overall: Status,
    /// One entry per threshold, in configuration order.
    pub results: Vec<ThresholdResult>,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.overall == Status::Pass
    }

    pub fn violations(&self) -> impl Iterator<Item = &ThresholdResult> + '_ {
        self.results.iter().filter(|r| r.status == Status::Fail)
    }
}

/// Judges `thresholds` against `snapshot`. Pure: identical inputs give identical verdicts.
pub fn evaluate(snapshot: &Snapshot, thresholds: &[Threshold]) -> Verdict {
    let results: Vec<ThresholdResult> = thresholds
        .iter()
        .map(|t| {
            let observed = snapshot.value(&t.metric, t.tag());
            let passed = match observed {
                Some(v) => t.check(v),
                None => t.allow_missing,
            };
            ThresholdResult {
                threshold: t.clone(),
                observed,
                status: Status::from_bool(passed),
            }
        })
        .collect();

    let overall = Status::from_bool(results.iter().all(|r| r.status == Status::Pass));
    Verdict { overall, results }
}

/// Setup-time check: a tag scope must name a configured target unless `allow_missing` is set.
pub fn validate_thresholds(thresholds: &[Threshold], targets: &[ProbeTarget]) -> Result<()> {
    let tags: HashSet<&str> = targets.iter().map(|t| t.tag.as_str()).collect();
    for t in thresholds {
        if let Some(tag) = t.tag()
            && !t.allow_missing
            && !tags.contains(tag)
        {
            return Err(Error::UnknownThresholdTag {
                threshold: t.source.clone(),
                tag: tag.to_string(),
            });
        }
    }
    Ok(())
}

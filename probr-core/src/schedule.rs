use std::time::Duration;

use crate::config::Stage;

#[derive(Debug, Clone, PartialEq)]
pub struct StageSnapshot {
    pub index: usize,
    pub count: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: f64,
    pub end_target: f64,
    pub current_target: f64,
}

/// Piecewise-linear rate curve with precomputed per-stage indices.
///
/// `cumulative_ends[i]` is the elapsed time at which stage `i` ends and `cumulative_area[i]`
/// the number of arrivals expected by then, so both the instantaneous rate and the expected
/// arrival count are a binary search plus one closed-form step.
#[derive(Debug, Clone)]
pub struct RateSchedule {
    start: f64,
    time_unit: Duration,
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
    cumulative_area: Vec<f64>,
}

impl RateSchedule {
    pub fn new(start: f64, time_unit: Duration, stages: Vec<Stage>) -> Self {
        let unit_s = time_unit.as_secs_f64().max(1e-9);

        let mut cumulative_ends = Vec::with_capacity(stages.len());
        let mut cumulative_area = Vec::with_capacity(stages.len());
        let mut end = Duration::ZERO;
        let mut area = 0.0f64;
        let mut from = start;
        for s in &stages {
            end = end.saturating_add(s.duration);
            // Trapezoid over the whole stage.
            area += (from + s.target) * 0.5 * s.duration.as_secs_f64() / unit_s;
            cumulative_ends.push(end);
            cumulative_area.push(area);
            from = s.target;
        }

        Self {
            start,
            time_unit,
            stages,
            cumulative_ends,
            cumulative_area,
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn time_unit(&self) -> Duration {
        self.time_unit
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    /// Index of the stage whose window contains `elapsed` (`elapsed < total`).
    fn stage_index(&self, elapsed: Duration) -> usize {
        // A stage covers `(start, end]`: the first stage ending at or after `elapsed` owns it,
        // so zero-length stages sharing that end are skipped over, producing a step.
        self.cumulative_ends.partition_point(|end| *end < elapsed)
    }

    fn stage_start(&self, idx: usize) -> Duration {
        if idx == 0 {
            Duration::ZERO
        } else {
            self.cumulative_ends[idx - 1]
        }
    }

    fn start_target(&self, idx: usize) -> f64 {
        if idx == 0 {
            self.start
        } else {
            self.stages[idx - 1].target
        }
    }

    /// Instantaneous target rate, in arrivals per `time_unit`.
    pub fn target_at(&self, elapsed: Duration) -> f64 {
        if self.stages.is_empty() || elapsed.is_zero() {
            return self.start;
        }

        if elapsed >= self.total_duration() {
            return self.stages.last().map(|s| s.target).unwrap_or(self.start);
        }

        let idx = self.stage_index(elapsed);
        let stage_start = self.stage_start(idx);
        let stage_duration = self.cumulative_ends[idx].saturating_sub(stage_start);
        let start_target = self.start_target(idx);
        let end_target = self.stages[idx].target;

        if stage_duration.is_zero() {
            return end_target;
        }

        // Linear interpolation across the stage.
        let frac = elapsed.saturating_sub(stage_start).as_secs_f64() / stage_duration.as_secs_f64();
        start_target + (end_target - start_target) * frac
    }

    /// Expected cumulative arrivals `A(t) = ∫₀ᵗ rate(s) / time_unit ds`, clamped to the curve's end.
    pub fn expected_arrivals(&self, elapsed: Duration) -> f64 {
        if self.stages.is_empty() || elapsed.is_zero() {
            return 0.0;
        }

        let total = self.total_duration();
        if elapsed >= total {
            return self.cumulative_area.last().copied().unwrap_or(0.0);
        }

        let idx = self.stage_index(elapsed);
        let before = if idx == 0 {
            0.0
        } else {
            self.cumulative_area[idx - 1]
        };

        let stage_start = self.stage_start(idx);
        let stage_duration = self.cumulative_ends[idx].saturating_sub(stage_start);
        if stage_duration.is_zero() {
            return before;
        }

        let start_target = self.start_target(idx);
        let end_target = self.stages[idx].target;
        let e = elapsed.saturating_sub(stage_start).as_secs_f64();
        let d = stage_duration.as_secs_f64();
        let unit_s = self.time_unit.as_secs_f64().max(1e-9);

        // Exact integral of the linear segment from the stage start to `e`.
        let within = start_target * e + (end_target - start_target) * e * e / (2.0 * d);
        before + within / unit_s
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> Option<StageSnapshot> {
        if self.stages.is_empty() {
            return None;
        }

        let total = self.total_duration();
        let clamped = elapsed.min(total);

        let idx = if clamped >= total {
            self.stages.len().saturating_sub(1)
        } else {
            self.stage_index(clamped)
        };

        let stage_start = self.stage_start(idx);
        let stage_duration = self.cumulative_ends[idx].saturating_sub(stage_start);
        let stage_elapsed = clamped.saturating_sub(stage_start);

        Some(StageSnapshot {
            index: idx,
            count: self.stages.len(),
            stage_elapsed,
            stage_remaining: stage_duration.saturating_sub(stage_elapsed),
            start_target: self.start_target(idx),
            end_target: self.stages[idx].target,
            current_target: self.target_at(clamped),
        })
    }
}

//! Timed orchestration phases.
//!
//! A [`PhaseContext`] is a drop guard: it starts a clock when opened and
//! reports a [`PhaseRecord`] to its [`PhaseSink`] when it goes out of scope,
//! whether the phase completed or an error unwound through it. It never
//! touches the error itself.
//!
//! ```ignore
//! let phase = PhaseContext::open("base_cluster_bringup", workers.len(), sink);
//! let result = bring_up(&workers).await;
//! phase.finish(result)?;
//! ```

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How a phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// The phase was finished with a successful result.
    Completed,
    /// The phase was dropped without a successful result.
    Failed,
}

impl PhaseOutcome {
    /// Lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseOutcome::Completed => "completed",
            PhaseOutcome::Failed => "failed",
        }
    }
}

/// Bookkeeping committed when a phase closes.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseRecord {
    /// Phase name.
    pub name: String,
    /// Name of the enclosing phase, for phases opened with [`PhaseContext::child`].
    pub parent: Option<String>,
    /// Expected number of units.
    pub units: usize,
    /// Units reported done via [`PhaseContext::advance`].
    pub completed: usize,
    /// Wall-clock duration.
    pub elapsed: Duration,
    /// How the phase ended.
    pub outcome: PhaseOutcome,
}

impl PhaseRecord {
    /// Units per second, when the phase has a unit count.
    pub fn rate(&self) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        if self.units == 0 || secs <= 0.0 {
            return None;
        }
        Some(self.units as f64 / secs)
    }
}

impl fmt::Display for PhaseRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} in {:.3}s",
            self.name,
            self.outcome.as_str(),
            self.elapsed.as_secs_f64()
        )?;
        if self.units > 0 {
            write!(f, " ({}/{} units", self.completed, self.units)?;
            if let Some(rate) = self.rate() {
                write!(f, ", {:.2}/s", rate)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Receives phase open/close events.
pub trait PhaseSink: Send + Sync {
    /// Called when a phase is opened.
    fn opened(&self, _name: &str, _units: usize) {}

    /// Called exactly once when a phase closes.
    fn closed(&self, record: &PhaseRecord);
}

/// Sink that logs through `tracing` and keeps every closed record for the
/// end-of-run summary.
#[derive(Debug, Clone, Default)]
pub struct PhaseLog {
    records: Arc<Mutex<Vec<PhaseRecord>>>,
}

impl PhaseLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Closed records, in closing order.
    pub fn records(&self) -> Vec<PhaseRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Plain-text summary, one line per closed phase.
    pub fn summary(&self) -> String {
        let records = self.records();
        let width = records.iter().map(|r| r.name.len()).max().unwrap_or(0);
        let mut out = String::new();
        for r in &records {
            let rate = r
                .rate()
                .map(|rate| format!("{:.2}/s", rate))
                .unwrap_or_else(|| "-".to_string());
            out.push_str(&format!(
                "{:<width$}  {:<9}  {:>10.3}s  {:>5}/{:<5}  {}\n",
                r.name,
                r.outcome.as_str(),
                r.elapsed.as_secs_f64(),
                r.completed,
                r.units,
                rate,
                width = width
            ));
        }
        out
    }
}

impl PhaseSink for PhaseLog {
    fn opened(&self, name: &str, units: usize) {
        tracing::info!(phase = name, units, "phase started");
    }

    fn closed(&self, record: &PhaseRecord) {
        match record.outcome {
            PhaseOutcome::Completed => tracing::info!(phase = %record.name, "{}", record),
            PhaseOutcome::Failed => tracing::warn!(phase = %record.name, "{}", record),
        }
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
    }
}

/// Scoped timer for one named phase.
///
/// Each context owns its own clock, so nested phases are timed
/// independently.
pub struct PhaseContext {
    name: String,
    parent: Option<String>,
    units: usize,
    completed: usize,
    started: Instant,
    succeeded: bool,
    sink: Arc<dyn PhaseSink>,
}

impl PhaseContext {
    /// Open a phase expecting `units` units of work (0 for none).
    pub fn open(name: impl Into<String>, units: usize, sink: Arc<dyn PhaseSink>) -> Self {
        Self::open_with_parent(name.into(), None, units, sink)
    }

    fn open_with_parent(
        name: String,
        parent: Option<String>,
        units: usize,
        sink: Arc<dyn PhaseSink>,
    ) -> Self {
        sink.opened(&name, units);
        Self {
            name,
            parent,
            units,
            completed: 0,
            started: Instant::now(),
            succeeded: false,
            sink,
        }
    }

    /// Open a nested phase reporting to the same sink.
    pub fn child(&self, name: impl Into<String>, units: usize) -> PhaseContext {
        Self::open_with_parent(
            name.into(),
            Some(self.name.clone()),
            units,
            Arc::clone(&self.sink),
        )
    }

    /// Phase name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Expected units.
    pub fn units(&self) -> usize {
        self.units
    }

    /// Units reported done so far.
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Mark one unit done.
    pub fn advance(&mut self) {
        self.advance_by(1);
    }

    /// Mark `n` units done.
    pub fn advance_by(&mut self, n: usize) {
        self.completed = self.completed.saturating_add(n);
    }

    /// Close the phase as completed.
    pub fn complete(mut self) {
        self.succeeded = true;
    }

    /// Close the phase according to `result` and hand it back untouched.
    pub fn finish<T, E>(mut self, result: Result<T, E>) -> Result<T, E> {
        self.succeeded = result.is_ok();
        drop(self);
        result
    }
}

impl Drop for PhaseContext {
    fn drop(&mut self) {
        let record = PhaseRecord {
            name: std::mem::take(&mut self.name),
            parent: self.parent.take(),
            units: self.units,
            completed: self.completed,
            elapsed: self.started.elapsed(),
            outcome: if self.succeeded {
                PhaseOutcome::Completed
            } else {
                PhaseOutcome::Failed
            },
        };
        self.sink.closed(&record);
    }
}

impl fmt::Debug for PhaseContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseContext")
            .field("name", &self.name)
            .field("units", &self.units)
            .field("completed", &self.completed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> (PhaseLog, Arc<dyn PhaseSink>) {
        let log = PhaseLog::new();
        let sink: Arc<dyn PhaseSink> = Arc::new(log.clone());
        (log, sink)
    }

    #[test]
    fn completed_phase_is_recorded() {
        let (log, sink) = log();
        let mut phase = PhaseContext::open("bringup", 2, sink);
        phase.advance();
        phase.advance();
        assert_eq!(phase.name(), "bringup");
        assert_eq!(phase.units(), 2);
        assert_eq!(phase.completed(), 2);
        phase.complete();

        let records = log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "bringup");
        assert_eq!(records[0].outcome, PhaseOutcome::Completed);
        assert_eq!(records[0].completed, 2);
        assert!(records[0].parent.is_none());
    }

    #[test]
    fn dropped_phase_is_recorded_as_failed() {
        let (log, sink) = log();
        fn step_two() -> Result<(), String> {
            Err("step 2 failed".to_string())
        }
        fn fails(sink: Arc<dyn PhaseSink>) -> Result<(), String> {
            let _phase = PhaseContext::open("doomed", 3, sink);
            step_two()?;
            Ok(())
        }

        assert_eq!(fails(sink), Err("step 2 failed".to_string()));
        let records = log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, PhaseOutcome::Failed);
        assert_eq!(records[0].completed, 0);
    }

    #[test]
    fn poisoned_log_keeps_recording() {
        let (log, sink) = log();
        PhaseContext::open("before", 0, Arc::clone(&sink)).complete();

        let holder = log.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.records.lock().unwrap();
            panic!("poison the log");
        })
        .join();
        assert!(log.records.is_poisoned());

        PhaseContext::open("after", 0, sink).complete();
        let names: Vec<_> = log.records().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["before", "after"]);
        assert!(log.summary().contains("after"));
    }

    #[test]
    fn finish_passes_the_result_through() {
        let (log, sink) = log();
        let phase = PhaseContext::open("ok", 0, Arc::clone(&sink));
        assert_eq!(phase.finish::<_, ()>(Ok(7)), Ok(7));

        let phase = PhaseContext::open("err", 0, sink);
        assert_eq!(phase.finish::<(), _>(Err("boom")), Err("boom"));

        let outcomes: Vec<_> = log.records().iter().map(|r| r.outcome).collect();
        assert_eq!(outcomes, vec![PhaseOutcome::Completed, PhaseOutcome::Failed]);
    }

    #[test]
    fn nested_phases_close_independently() {
        let (log, sink) = log();
        let outer = PhaseContext::open("outer", 0, sink);
        {
            let inner = outer.child("inner", 1);
            std::thread::sleep(Duration::from_millis(5));
            inner.complete();
        }
        std::thread::sleep(Duration::from_millis(5));
        outer.complete();

        let records = log.records();
        assert_eq!(records[0].name, "inner");
        assert_eq!(records[0].parent.as_deref(), Some("outer"));
        assert_eq!(records[1].name, "outer");
        assert!(records[1].elapsed > records[0].elapsed);
    }

    #[test]
    fn rate_only_with_units() {
        let mut record = PhaseRecord {
            name: "p".into(),
            parent: None,
            units: 10,
            completed: 10,
            elapsed: Duration::from_secs(2),
            outcome: PhaseOutcome::Completed,
        };
        assert_eq!(record.rate(), Some(5.0));
        assert_eq!(
            record.to_string(),
            "p completed in 2.000s (10/10 units, 5.00/s)"
        );

        record.units = 0;
        assert_eq!(record.rate(), None);
        assert_eq!(record.to_string(), "p completed in 2.000s");
    }

    #[test]
    fn summary_lists_every_phase() {
        let (log, sink) = log();
        PhaseContext::open("base_cluster_bringup", 4, Arc::clone(&sink)).complete();
        drop(PhaseContext::open("node_ready", 4, sink));

        let summary = log.summary();
        let lines: Vec<_> = summary.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("base_cluster_bringup"));
        assert!(lines[0].contains("completed"));
        assert!(lines[1].starts_with("node_ready"));
        assert!(lines[1].contains("failed"));
    }
}

//! Bounded parallel execution of units.
//!
//! Units share nothing mutable except the progress bar; every result comes
//! back to the calling thread, which alone touches the store.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::io::IsTerminal;

pub mod diagnostics;
pub mod output;
pub mod process;
pub mod unit;

pub use unit::{
    console_transcript, macro_fragment, stdout_path, ConsoleOutcome, ExecutionResult, ExecutionUnit,
    HighlightJob, SessionJob, SessionOutcome, UnitContext,
};

pub struct Scheduler {
    pool: rayon::ThreadPool,
    show_progress: bool,
}

impl Scheduler {
    pub fn new(max_concurrency: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_concurrency.max(1))
            .thread_name(|idx| format!("texrun-unit-{idx}"))
            .build()
            .context("Failed to build execution pool")?;
        Ok(Self { pool, show_progress: std::io::stderr().is_terminal() })
    }

    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }

    /// Run every unit and wait for all of them.
    ///
    /// Results come back in unit order regardless of completion order.
    pub fn run(&self, units: Vec<ExecutionUnit>, ctx: &UnitContext<'_>) -> Vec<ExecutionResult> {
        if units.is_empty() {
            return Vec::new();
        }
        let progress = self.progress_bar(units.len() as u64);
        tracing::info!("Dispatching {} units on {} threads", units.len(), self.pool.current_num_threads());

        let results = self.pool.install(|| {
            units
                .into_par_iter()
                .map(|unit| {
                    let label = unit.label().to_string();
                    let result = unit.execute(ctx);
                    progress.set_message(label);
                    progress.inc(1);
                    result
                })
                .collect()
        });
        progress.finish_and_clear();
        results
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {wide_msg}") {
            bar.set_style(style.progress_chars("=> "));
        }
        bar
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::domain::block::block;
    use crate::domain::Settings;
    use crate::engine::EngineRegistry;
    use crate::fingerprint::compute_fingerprints;
    use crate::highlight::PlainHighlighter;
    use tempfile::TempDir;

    #[test]
    fn results_cover_every_unit() {
        let tmp = TempDir::new().expect("tmp");
        let settings = Settings {
            output_dir: tmp.path().join("out"),
            working_dir: tmp.path().to_path_buf(),
            ..Settings::default()
        };
        let blocks: Vec<_> = (0..4)
            .map(|n| block("sh", &format!("s{n}"), 0, "code", &format!("echo {n}")))
            .collect();
        let engines = EngineRegistry::with_builtins();
        let set = compute_fingerprints(&blocks, &settings, &engines).expect("fingerprints");
        let highlighter = PlainHighlighter::new("default");
        let ctx = UnitContext {
            settings: &settings,
            engines: &engines,
            highlighter: &highlighter,
            custom_code: &set.custom_code,
        };
        let units: Vec<_> = set
            .sessions
            .values()
            .cloned()
            .map(|plan| ExecutionUnit::Session(SessionJob { plan }))
            .collect();

        let results = Scheduler::new(2).expect("pool").quiet().run(units, &ctx);
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.status().is_clean()));
    }
}

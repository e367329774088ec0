//! Terminal output for scenario batches

use comprobar::{BatchReport, ScenarioReport, ScenarioStatus};
use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Line prefix, with a symbol for color terminals and a word otherwise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Pass,
    Fail,
    Error,
    Info,
}

impl Mark {
    fn render(self, use_color: bool) -> String {
        if !use_color {
            return match self {
                Self::Pass => "PASS",
                Self::Fail => "FAIL",
                Self::Error => "ERROR",
                Self::Info => "INFO",
            }
            .to_string();
        }
        match self {
            Self::Pass => style("✓").green().bold().to_string(),
            Self::Fail => style("✗").red().bold().to_string(),
            Self::Error => style("!").magenta().bold().to_string(),
            Self::Info => style("ℹ").blue().bold().to_string(),
        }
    }

    /// Failures and errors print even in quiet mode
    const fn always_shown(self) -> bool {
        matches!(self, Self::Fail | Self::Error)
    }
}

/// Progress and result lines for a run.
///
/// Writes to stderr so that stdout stays free for machine-readable output.
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    use_color: bool,
    quiet: bool,
    verbose: bool,
}

impl ProgressReporter {
    /// Create a reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: None,
            use_color,
            quiet,
            verbose: false,
        }
    }

    /// Print step detail for every scenario
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Show a bar over `total` scenarios; skipped when quiet or not a terminal
    pub fn start_progress(&mut self, total: u64, message: &str) {
        if self.quiet || !self.term.is_term() {
            return;
        }
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
        self.progress_bar = Some(pb);
    }

    /// Clear the bar
    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_and_clear();
        }
    }

    fn write_line(&self, line: &str) {
        match self.progress_bar {
            Some(ref pb) => pb.suspend(|| {
                let _ = self.term.write_line(line);
            }),
            None => {
                let _ = self.term.write_line(line);
            }
        }
    }

    fn marked(&self, mark: Mark, message: &str) {
        if self.quiet && !mark.always_shown() {
            return;
        }
        self.write_line(&format!("{} {message}", mark.render(self.use_color)));
    }

    /// Print a success line
    pub fn success(&self, message: &str) {
        self.marked(Mark::Pass, message);
    }

    /// Print a failure line
    pub fn failure(&self, message: &str) {
        self.marked(Mark::Fail, message);
    }

    /// Print an errored-scenario line
    pub fn errored(&self, message: &str) {
        self.marked(Mark::Error, message);
    }

    /// Print an informational line
    pub fn info(&self, message: &str) {
        self.marked(Mark::Info, message);
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }
        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };
        self.write_line("");
        self.write_line(&styled);
    }

    /// Print one finished scenario and advance the bar
    pub fn scenario(&self, report: &ScenarioReport) {
        if let Some(ref pb) = self.progress_bar {
            pb.inc(1);
        }
        let mark = match report.status {
            ScenarioStatus::Passed => Mark::Pass,
            ScenarioStatus::Failed => Mark::Fail,
            ScenarioStatus::Errored => Mark::Error,
        };
        self.marked(mark, &report.summary_line());

        if let Some(ref artifact) = report.last_artifact {
            if report.status != ScenarioStatus::Passed || self.verbose {
                self.info(&format!("  evidence: {}", artifact.path.display()));
            }
        }
        if self.verbose && !self.quiet {
            for step in &report.steps {
                let marker = if step.outcome.is_passed() { "ok" } else { "--" };
                self.write_line(&format!(
                    "    {marker} {:>2} {} ({}ms)",
                    step.index, step.step, step.duration_ms
                ));
            }
        }
    }

    /// Print the batch totals line
    pub fn summary(&self, report: &BatchReport) {
        let passed = report.count(ScenarioStatus::Passed);
        let failed = report.count(ScenarioStatus::Failed);
        let errored = report.count(ScenarioStatus::Errored);
        if self.quiet && failed + errored == 0 {
            return;
        }
        self.write_line("");
        self.write_line(&self.totals_line(
            passed,
            failed,
            errored,
            Duration::from_millis(report.duration_ms),
        ));
    }

    fn totals_line(
        &self,
        passed: usize,
        failed: usize,
        errored: usize,
        duration: Duration,
    ) -> String {
        let total = passed + failed + errored;
        let secs = duration.as_secs_f64();
        let ok = failed + errored == 0;
        if !self.use_color {
            let status = if ok { "PASSED" } else { "FAILED" };
            return format!(
                "{status} {total} scenarios in {secs:.2}s ({passed} passed, {failed} failed, {errored} errored)"
            );
        }
        let green = Style::new().green().bold();
        let red = Style::new().red().bold();
        let status = if ok {
            green.apply_to("PASSED")
        } else {
            red.apply_to("FAILED")
        };
        let failed = if failed > 0 {
            red.apply_to(failed).to_string()
        } else {
            failed.to_string()
        };
        format!(
            "{status} {total} scenarios in {secs:.2}s ({} passed, {failed} failed, {} errored)",
            green.apply_to(passed),
            Style::new().magenta().apply_to(errored)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use comprobar::{FailureKind, LoginState, StepOutcome, StepResult};

    fn report(status: StepOutcome) -> ScenarioReport {
        ScenarioReport::new(
            "teacher history",
            None,
            LoginState::AuthenticatedTeacher,
            vec![StepResult::new(0, "navigate /", status, Duration::from_millis(3))],
            Utc::now(),
            Duration::from_millis(3),
        )
    }

    #[test]
    fn test_plain_marks() {
        assert_eq!(Mark::Pass.render(false), "PASS");
        assert_eq!(Mark::Error.render(false), "ERROR");
        assert!(Mark::Fail.always_shown());
        assert!(!Mark::Info.always_shown());
    }

    #[test]
    fn test_totals_line_plain() {
        let reporter = ProgressReporter::new(false, false);
        assert_eq!(
            reporter.totals_line(3, 1, 1, Duration::from_secs(2)),
            "FAILED 5 scenarios in 2.00s (3 passed, 1 failed, 1 errored)"
        );
        assert!(reporter
            .totals_line(2, 0, 0, Duration::from_millis(500))
            .starts_with("PASSED 2 scenarios"));
    }

    #[test]
    fn test_scenario_lines() {
        let reporter = ProgressReporter::new(false, false).with_verbose(true);
        reporter.scenario(&report(StepOutcome::Passed));
        reporter.scenario(&report(StepOutcome::from_kind(
            FailureKind::AssertionTimeout,
            "still hidden",
        )));
    }

    #[test]
    fn test_quiet_mode_skips_progress() {
        let mut reporter = ProgressReporter::new(false, true);
        reporter.start_progress(10, "running");
        assert!(reporter.progress_bar.is_none());
        reporter.success("hidden");
        reporter.failure("shown");
        reporter.finish();
    }
}

//! Progress and result reporting.
//!
//! The driver hands every step and the final summary to a [`Reporter`]. The
//! engine never reads anything back from it.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::uncertainty::FitSummary;

/// One line of fit progress.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationReport {
    pub iteration: usize,
    /// χ² at the current (accepted) point
    pub chisq: f64,
    /// χ² change since the start of the iteration
    pub delta_chisq: f64,
    /// Convergence limit on the χ² decrease
    pub limit: f64,
    pub lambda: f64,
    /// Physical parameter values of the reported point
    pub params: Vec<f64>,
    /// False for a rejected trial; `chisq` and `params` are then the trial's
    pub accepted: bool,
}

/// How much a [`LogReporter`] emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Verbosity {
    /// Nothing
    Quiet,
    /// Only the final summary
    #[default]
    Results,
    /// One line per accepted iteration
    Brief,
    /// A block per step, rejected trials included
    Verbose,
}

pub trait Reporter {
    fn on_start(&mut self, _names: &[String]) {}
    fn on_iteration(&mut self, report: &IterationReport);
    /// Called when an interrupt is pending, before the caller resolves it.
    fn on_interrupt(&mut self, _report: &IterationReport) {}
    fn on_finish(&mut self, _summary: &FitSummary) {}
}

impl<R: Reporter + ?Sized> Reporter for &mut R {
    fn on_start(&mut self, names: &[String]) {
        (**self).on_start(names)
    }

    fn on_iteration(&mut self, report: &IterationReport) {
        (**self).on_iteration(report)
    }

    fn on_interrupt(&mut self, report: &IterationReport) {
        (**self).on_interrupt(report)
    }

    fn on_finish(&mut self, summary: &FitSummary) {
        (**self).on_finish(summary)
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn on_iteration(&mut self, _report: &IterationReport) {}
}

/// Writes progress and results through the `log` facade.
#[derive(Debug, Clone, Default)]
pub struct LogReporter {
    verbosity: Verbosity,
    names: Vec<String>,
}

impl LogReporter {
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            names: Vec::new(),
        }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Column header of the brief listing; empty at other verbosities.
    pub fn start_lines(&self, names: &[String]) -> Vec<String> {
        if self.verbosity != Verbosity::Brief {
            return Vec::new();
        }
        let mut header =
            format!("{:>4} {:>14} {:>10} {:>9}", "iter", "chisq", "delta/lim", "lambda");
        for name in names {
            header.push_str(&format!(" {:>13.13}", name));
        }
        vec![header]
    }

    /// Lines emitted for one step at this verbosity.
    pub fn iteration_lines(&self, report: &IterationReport) -> Vec<String> {
        match self.verbosity {
            Verbosity::Brief if report.accepted => vec![self.brief_line(report)],
            Verbosity::Verbose => self.verbose_block(report),
            _ => Vec::new(),
        }
    }

    /// Lines emitted for a pending interrupt. The first one is the warning.
    pub fn interrupt_lines(&self, report: &IterationReport) -> Vec<String> {
        if self.verbosity == Verbosity::Quiet {
            return Vec::new();
        }
        let mut lines = vec![format!("Fit interrupted at iteration {}", report.iteration)];
        lines.extend(self.verbose_block(report));
        lines
    }

    /// The final summary, one entry per line.
    pub fn finish_lines(&self, summary: &FitSummary) -> Vec<String> {
        if self.verbosity == Verbosity::Quiet {
            return Vec::new();
        }
        summary.to_string().lines().map(str::to_string).collect()
    }

    fn brief_line(&self, report: &IterationReport) -> String {
        let mut line = format!(
            "{:>4} {:>14.8e} {:>10.2e} {:>9.2e}",
            report.iteration,
            report.chisq,
            relative(report.delta_chisq, report.chisq),
            report.lambda
        );
        for value in &report.params {
            line.push_str(&format!(" {:>13.6e}", value));
        }
        line
    }

    fn verbose_block(&self, report: &IterationReport) -> Vec<String> {
        let label = if report.accepted { "Iteration" } else { "Rejected trial in iteration" };
        let mut lines = vec![
            format!("{} {}", label, report.iteration),
            format!(
                "chisquare : {:<15e} delta(chisq)/chisq : {:e}",
                report.chisq,
                relative(report.delta_chisq, report.chisq)
            ),
            format!("lambda    : {:<15e} limit              : {:e}", report.lambda, report.limit),
        ];
        for (i, value) in report.params.iter().enumerate() {
            let name = self.names.get(i).map(String::as_str).unwrap_or("?");
            lines.push(format!("  {:<12} = {:e}", name, value));
        }
        lines
    }
}

fn relative(delta: f64, chisq: f64) -> f64 {
    if chisq > 0.0 {
        delta / chisq
    } else {
        0.0
    }
}

impl Reporter for LogReporter {
    fn on_start(&mut self, names: &[String]) {
        self.names = names.to_vec();
        for line in self.start_lines(names) {
            info!("{}", line);
        }
    }

    fn on_iteration(&mut self, report: &IterationReport) {
        for line in self.iteration_lines(report) {
            info!("{}", line);
        }
    }

    fn on_interrupt(&mut self, report: &IterationReport) {
        let mut lines = self.interrupt_lines(report).into_iter();
        if let Some(first) = lines.next() {
            warn!("{}", first);
        }
        for line in lines {
            info!("{}", line);
        }
    }

    fn on_finish(&mut self, summary: &FitSummary) {
        for line in self.finish_lines(summary) {
            info!("{}", line);
        }
    }
}

/// Keeps every report in memory.
#[derive(Debug, Clone, Default)]
pub struct CollectingReporter {
    pub names: Vec<String>,
    pub iterations: Vec<IterationReport>,
    pub interrupts: Vec<IterationReport>,
    pub summary: Option<FitSummary>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// χ² of the accepted steps, in order.
    pub fn accepted_chisq(&self) -> Vec<f64> {
        self.iterations
            .iter()
            .filter(|r| r.accepted)
            .map(|r| r.chisq)
            .collect()
    }
}

impl Reporter for CollectingReporter {
    fn on_start(&mut self, names: &[String]) {
        self.names = names.to_vec();
    }

    fn on_iteration(&mut self, report: &IterationReport) {
        self.iterations.push(report.clone());
    }

    fn on_interrupt(&mut self, report: &IterationReport) {
        self.interrupts.push(report.clone());
    }

    fn on_finish(&mut self, summary: &FitSummary) {
        self.summary = Some(summary.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lm::FitStatus;
    use crate::parameters::Parameter;
    use crate::uncertainty::FitStatistics;

    fn report(accepted: bool, chisq: f64) -> IterationReport {
        IterationReport {
            iteration: 2,
            chisq,
            delta_chisq: -0.5,
            limit: 1e-5,
            lambda: 0.01,
            params: vec![1.5, -2.0],
            accepted,
        }
    }

    #[test]
    fn test_verbosity_ordering() {
        assert_eq!(Verbosity::default(), Verbosity::Results);
        assert!(Verbosity::Quiet < Verbosity::Results);
        assert!(Verbosity::Brief < Verbosity::Verbose);
    }

    #[test]
    fn test_brief_line_contains_values() {
        let reporter = LogReporter::new(Verbosity::Brief);
        let line = reporter.brief_line(&report(true, 5.0));
        assert!(line.trim_start().starts_with('2'));
        assert!(line.contains("5.00000000e0"));
        assert!(line.contains("-1.00e-1"));
    }

    fn drive(mut reporter: impl Reporter) {
        reporter.on_start(&["a".to_string(), "b".to_string()]);
        reporter.on_iteration(&report(true, 4.0));
        reporter.on_iteration(&report(false, 9.0));
        reporter.on_iteration(&report(true, 3.0));
    }

    #[test]
    fn test_collecting_reporter_through_mut_ref() {
        let mut collector = CollectingReporter::new();
        drive(&mut collector);

        assert_eq!(collector.names, vec!["a", "b"]);
        assert_eq!(collector.iterations.len(), 3);
        assert_eq!(collector.accepted_chisq(), vec![4.0, 3.0]);
    }

    fn summary() -> FitSummary {
        FitSummary {
            status: FitStatus::Converged,
            iterations: 3,
            relative_change: -1e-8,
            statistics: FitStatistics::new(10, 2, 8.0),
            parameters: vec![Parameter::new("a", 1.5), Parameter::new("b", -2.0)],
            errors: Some(vec![0.1, 0.2]),
            correlation: Some(vec![vec![1.0, 0.5], vec![0.5, 1.0]]),
            covariance_valid: true,
            errors_scaled: true,
        }
    }

    fn names() -> Vec<String> {
        vec!["a".to_string(), "b".to_string()]
    }

    #[test]
    fn test_quiet_emits_nothing() {
        let mut reporter = LogReporter::new(Verbosity::Quiet);
        reporter.on_start(&names());

        assert!(reporter.start_lines(&names()).is_empty());
        assert!(reporter.iteration_lines(&report(true, 4.0)).is_empty());
        assert!(reporter.interrupt_lines(&report(true, 4.0)).is_empty());
        assert!(reporter.finish_lines(&summary()).is_empty());
    }

    #[test]
    fn test_results_emits_summary_and_interrupts_only() {
        let mut reporter = LogReporter::new(Verbosity::Results);
        reporter.on_start(&names());

        assert!(reporter.start_lines(&names()).is_empty());
        assert!(reporter.iteration_lines(&report(true, 4.0)).is_empty());
        assert!(reporter.iteration_lines(&report(false, 9.0)).is_empty());

        let interrupt = reporter.interrupt_lines(&report(true, 4.0));
        assert_eq!(interrupt[0], "Fit interrupted at iteration 2");
        assert_eq!(interrupt[1], "Iteration 2");
        assert_eq!(interrupt.len(), 6);

        let finish = reporter.finish_lines(&summary());
        assert_eq!(finish[0], "Fit converged after 3 iterations");
        assert!(finish.iter().any(|line| line.contains("+/-")));
        assert_eq!(finish, summary().to_string().lines().collect::<Vec<_>>());
    }

    #[test]
    fn test_brief_lists_accepted_steps() {
        let mut reporter = LogReporter::new(Verbosity::Brief);
        reporter.on_start(&names());

        let header = reporter.start_lines(&names());
        assert_eq!(header.len(), 1);
        assert!(header[0].contains("delta/lim"));
        assert!(header[0].trim_end().ends_with('b'));

        assert_eq!(reporter.iteration_lines(&report(true, 4.0)).len(), 1);
        assert!(reporter.iteration_lines(&report(false, 9.0)).is_empty());
        assert!(!reporter.finish_lines(&summary()).is_empty());
    }

    #[test]
    fn test_verbose_blocks_include_rejected_trials() {
        let mut reporter = LogReporter::new(Verbosity::Verbose);
        reporter.on_start(&names());

        assert!(reporter.start_lines(&names()).is_empty());
        let accepted = reporter.iteration_lines(&report(true, 4.0));
        assert_eq!(accepted[0], "Iteration 2");
        assert!(accepted[1].starts_with("chisquare : 4e0"));
        assert!(accepted[2].starts_with("lambda    : 1e-2"));
        assert!(accepted[3].starts_with("  a "));
        assert!(accepted[3].ends_with("= 1.5e0"));
        assert!(accepted[4].starts_with("  b "));

        let rejected = reporter.iteration_lines(&report(false, 9.0));
        assert_eq!(rejected[0], "Rejected trial in iteration 2");
        assert_eq!(rejected.len(), 5);

        // Unknown names fall back to a placeholder
        let mut wide = report(true, 4.0);
        wide.params.push(7.0);
        assert!(reporter.iteration_lines(&wide)[5].starts_with("  ? "));

        drive(&mut reporter);
        reporter.on_interrupt(&report(true, 4.0));
        reporter.on_finish(&summary());
    }
}

//! Review sub-checks.
//!
//! Each [`QualityCheck`] produces exactly one [`QualitySignal`]. Command checks
//! run a tool (type check, lint, tests) and score its failure output; the
//! security scan walks source files and counts lines matching risky patterns.
//! A check that cannot execute yields a failed signal with score 0 instead of
//! an error, so one broken tool never hides the others.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use crate::core::review::SECURITY_CATEGORY;
use crate::core::types::QualitySignal;
use crate::io::config::{CheckConfig, ReviewConfig, Scoring, SecurityScanConfig};
use crate::io::process::run_command;

pub trait QualityCheck {
    fn category(&self) -> &str;
    fn run(&self) -> QualitySignal;
}

/// Build the configured checks in order, security scan last.
pub fn configured_checks(
    review: &ReviewConfig,
    workdir: &Path,
) -> Result<Vec<Box<dyn QualityCheck>>> {
    let timeout = Duration::from_secs(review.check_timeout_secs);
    let mut checks: Vec<Box<dyn QualityCheck>> = review
        .checks
        .iter()
        .map(|check| {
            Box::new(CommandCheck::new(
                check.clone(),
                workdir,
                timeout,
                review.output_limit_bytes,
            )) as Box<dyn QualityCheck>
        })
        .collect();
    checks.push(Box::new(SecurityScan::new(&review.security, workdir)?));
    Ok(checks)
}

/// Run every check in order and collect the signals.
pub fn run_checks(checks: &[Box<dyn QualityCheck>]) -> Vec<QualitySignal> {
    checks
        .iter()
        .map(|check| {
            let signal = check.run();
            debug!(
                category = %signal.category,
                passed = signal.passed,
                score = signal.score,
                "quality check finished"
            );
            signal
        })
        .collect()
}

fn unavailable(category: &str, reason: impl std::fmt::Display) -> QualitySignal {
    QualitySignal {
        category: category.to_string(),
        passed: false,
        score: 0,
        details: format!("check could not run: {reason}"),
    }
}

/// A tool invocation scored from its output when it exits non-zero.
#[derive(Debug, Clone)]
pub struct CommandCheck {
    check: CheckConfig,
    workdir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandCheck {
    pub fn new(
        check: CheckConfig,
        workdir: &Path,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Self {
        Self {
            check,
            workdir: workdir.to_path_buf(),
            timeout,
            output_limit_bytes,
        }
    }
}

impl QualityCheck for CommandCheck {
    fn category(&self) -> &str {
        &self.check.category
    }

    #[instrument(skip(self), fields(category = %self.check.category))]
    fn run(&self) -> QualitySignal {
        let Some((program, args)) = self.check.command.split_first() else {
            return unavailable(&self.check.category, "empty command");
        };
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.workdir);

        let output = match run_command(cmd, Some(self.timeout), self.output_limit_bytes) {
            Ok(output) => output,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "quality check failed to start");
                return unavailable(&self.check.category, format!("{err:#}"));
            }
        };
        if output.timed_out {
            return unavailable(
                &self.check.category,
                format!("timed out after {}s", self.timeout.as_secs()),
            );
        }
        if output.success() {
            return QualitySignal {
                category: self.check.category.clone(),
                passed: true,
                score: 100,
                details: passing_details(self.check.scoring).to_string(),
            };
        }

        let text = format!("{}\n{}", output.stdout_text(), output.stderr_text());
        let (passed, score, details) = score_failure(self.check.scoring, &text);
        QualitySignal {
            category: self.check.category.clone(),
            passed,
            score,
            details,
        }
    }
}

fn passing_details(scoring: Scoring) -> &'static str {
    match scoring {
        Scoring::TypeErrors => "No type errors found",
        Scoring::Lint => "No lint errors found",
        Scoring::FailedTests => "All tests passed",
    }
}

/// Score the output of a command that exited non-zero.
pub fn score_failure(scoring: Scoring, output: &str) -> (bool, u32, String) {
    match scoring {
        Scoring::TypeErrors => {
            let errors = count_diagnostics(output, "error");
            (
                false,
                deduct(&[(errors, 10)]),
                format!("{errors} type error(s) found"),
            )
        }
        Scoring::Lint => {
            let errors = count_diagnostics(output, "error");
            let warnings = count_diagnostics(output, "warning");
            (
                errors == 0,
                deduct(&[(errors, 15), (warnings, 5)]),
                format!("{errors} error(s), {warnings} warning(s)"),
            )
        }
        Scoring::FailedTests => {
            let failed = count_failed_tests(output);
            (
                false,
                deduct(&[(failed, 20)]),
                format!("{failed} test(s) failed"),
            )
        }
    }
}

fn deduct(penalties: &[(u32, u32)]) -> u32 {
    let total = penalties
        .iter()
        .fold(0u32, |acc, (count, each)| acc.saturating_add(count.saturating_mul(*each)));
    100u32.saturating_sub(total)
}

/// Count compiler-style diagnostics (`error: ...`, `error[E0308]: ...`),
/// skipping the summary lines cargo prints after them.
fn count_diagnostics(output: &str, level: &str) -> u32 {
    static DIAGNOSTIC_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^(error|warning)(\[[A-Za-z0-9_:]+\])?: (.*)$").expect("valid diagnostic regex")
    });
    let count = output
        .lines()
        .filter_map(|line| DIAGNOSTIC_RE.captures(line.trim_end()))
        .filter(|caps| &caps[1] == level)
        .filter(|caps| {
            let message = &caps[3];
            !(message.starts_with("could not compile")
                || message.starts_with("aborting due to")
                || (message.contains("generated ") && message.contains(" warning")))
        })
        .count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Sum of `N failed` counts across test binaries; at least 1 for a failing run.
fn count_failed_tests(output: &str) -> u32 {
    static FAILED_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(\d+) failed").expect("valid failed-count regex"));
    let failed: u32 = FAILED_RE
        .captures_iter(output)
        .filter_map(|caps| caps[1].parse::<u32>().ok())
        .fold(0, u32::saturating_add);
    failed.max(1)
}

/// Line-based pattern scan over source files.
#[derive(Debug, Clone)]
pub struct SecurityScan {
    roots: Vec<PathBuf>,
    extensions: Vec<String>,
    patterns: Vec<Regex>,
    penalty: u32,
}

impl SecurityScan {
    pub fn new(config: &SecurityScanConfig, workdir: &Path) -> Result<Self> {
        let patterns = config
            .patterns
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("compile security pattern '{p}'")))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            roots: config.roots.iter().map(|r| workdir.join(r)).collect(),
            extensions: config.extensions.clone(),
            patterns,
            penalty: config.penalty,
        })
    }

    fn is_source(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }

    fn count_hits(&self) -> Result<u32> {
        let mut hits = 0u32;
        for root in &self.roots {
            if !root.exists() {
                debug!(root = %root.display(), "security scan root missing, skipping");
                continue;
            }
            for entry in WalkDir::new(root).sort_by_file_name() {
                let entry = entry.with_context(|| format!("walk {}", root.display()))?;
                if !entry.file_type().is_file() || !self.is_source(entry.path()) {
                    continue;
                }
                let contents = fs::read(entry.path())
                    .with_context(|| format!("read {}", entry.path().display()))?;
                let text = String::from_utf8_lossy(&contents);
                for (idx, line) in text.lines().enumerate() {
                    if self.patterns.iter().any(|re| re.is_match(line)) {
                        debug!(
                            path = %entry.path().display(),
                            line = idx + 1,
                            "security pattern hit"
                        );
                        hits = hits.saturating_add(1);
                    }
                }
            }
        }
        Ok(hits)
    }
}

impl QualityCheck for SecurityScan {
    fn category(&self) -> &str {
        SECURITY_CATEGORY
    }

    #[instrument(skip(self))]
    fn run(&self) -> QualitySignal {
        let hits = match self.count_hits() {
            Ok(hits) => hits,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "security scan failed");
                return unavailable(SECURITY_CATEGORY, format!("{err:#}"));
            }
        };
        QualitySignal {
            category: SECURITY_CATEGORY.to_string(),
            passed: hits == 0,
            score: deduct(&[(hits, self.penalty)]),
            details: if hits == 0 {
                "No obvious vulnerabilities detected".to_string()
            } else {
                format!("{hits} potential vulnerability pattern(s) found")
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(category: &str, script: &str, scoring: Scoring) -> CommandCheck {
        CommandCheck::new(
            CheckConfig {
                category: category.to_string(),
                command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
                scoring,
            },
            Path::new("."),
            Duration::from_secs(10),
            10_000,
        )
    }

    #[test]
    fn passing_command_scores_100() {
        let signal = check("TypeCheck", "true", Scoring::TypeErrors).run();
        assert!(signal.passed);
        assert_eq!(signal.score, 100);
        assert_eq!(signal.details, "No type errors found");
    }

    #[test]
    fn type_errors_deduct_ten_each() {
        let output = "error[E0308]: mismatched types\n  --> src/a.rs:1:1\n\
                      error[E0425]: cannot find value `x`\n\
                      error: could not compile `demo` (lib) due to 2 previous errors\n";
        assert_eq!(
            score_failure(Scoring::TypeErrors, output),
            (false, 80, "2 type error(s) found".to_string())
        );
    }

    #[test]
    fn lint_passes_with_only_warnings() {
        let output = "warning: unused variable: `a`\nwarning: unused import\n\
                      warning: `demo` (lib) generated 2 warnings\n";
        let (passed, score, details) = score_failure(Scoring::Lint, output);
        assert!(passed);
        assert_eq!(score, 90);
        assert_eq!(details, "0 error(s), 2 warning(s)");
    }

    #[test]
    fn lint_errors_fail() {
        let output = "error: this looks like a bug\nwarning: unused\n";
        assert_eq!(
            score_failure(Scoring::Lint, output),
            (false, 80, "1 error(s), 1 warning(s)".to_string())
        );
    }

    #[test]
    fn failed_tests_are_parsed_and_default_to_one() {
        let output = "test result: FAILED. 10 passed; 2 failed; 0 ignored";
        assert_eq!(score_failure(Scoring::FailedTests, output).1, 60);
        assert_eq!(
            score_failure(Scoring::FailedTests, "something broke"),
            (false, 80, "1 test(s) failed".to_string())
        );
    }

    #[test]
    fn scores_never_go_below_zero() {
        let output = "error: x\n".repeat(20);
        assert_eq!(score_failure(Scoring::TypeErrors, &output).1, 0);
    }

    #[test]
    fn failing_command_is_scored_from_its_output() {
        let signal = check(
            "Tests",
            "echo 'test result: FAILED. 1 passed; 3 failed;'; exit 101",
            Scoring::FailedTests,
        )
        .run();
        assert!(!signal.passed);
        assert_eq!(signal.score, 40);
    }

    #[test]
    fn unrunnable_command_scores_zero() {
        let mut command = check("Lint", "true", Scoring::Lint);
        command.check.command = vec!["definitely-not-a-linter-xyz".to_string()];
        let signal = command.run();
        assert!(!signal.passed);
        assert_eq!(signal.score, 0);
        assert!(signal.details.starts_with("check could not run"));
    }

    #[test]
    fn timed_out_command_scores_zero() {
        let mut command = check("Tests", "sleep 5", Scoring::FailedTests);
        command.timeout = Duration::from_millis(100);
        let signal = command.run();
        assert!(!signal.passed);
        assert_eq!(signal.score, 0);
    }

    #[test]
    fn security_scan_counts_matching_lines() {
        let temp = tempfile::tempdir().expect("tempdir");
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("nested")).expect("mkdir");
        fs::write(src.join("a.rs"), "fn a() {\n    unsafe { x() }\n}\n").expect("write");
        fs::write(
            src.join("nested/b.rs"),
            "let y = std::mem::transmute(x);\nlet z = 1;\n",
        )
        .expect("write");
        fs::write(src.join("notes.txt"), "unsafe { ignored }\n").expect("write");

        let scan = SecurityScan::new(&SecurityScanConfig::default(), temp.path()).expect("scan");
        let signal = scan.run();
        assert_eq!(signal.category, SECURITY_CATEGORY);
        assert!(!signal.passed);
        assert_eq!(signal.score, 50);
        assert_eq!(signal.details, "2 potential vulnerability pattern(s) found");
    }

    #[test]
    fn clean_tree_passes_security() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("src")).expect("mkdir");
        fs::write(temp.path().join("src/lib.rs"), "pub fn ok() {}\n").expect("write");
        let signal = SecurityScan::new(&SecurityScanConfig::default(), temp.path())
            .expect("scan")
            .run();
        assert!(signal.passed);
        assert_eq!(signal.score, 100);
    }

    #[test]
    fn configured_checks_end_with_security() {
        let checks = configured_checks(&ReviewConfig::default(), Path::new(".")).expect("checks");
        let categories: Vec<_> = checks.iter().map(|c| c.category().to_string()).collect();
        assert_eq!(categories, ["TypeCheck", "Lint", "Tests", SECURITY_CATEGORY]);
    }
}

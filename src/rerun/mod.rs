//! Rerun policy: whether a session must execute this build.

use crate::domain::{ExitStatus, Fingerprint, RerunPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RerunDecision {
    pub rerun: bool,
    /// The session changed but the policy kept the cached result.
    pub drift: bool,
}

impl RerunDecision {
    fn run() -> Self {
        Self { rerun: true, drift: false }
    }
}

/// Pure decision function, evaluated once per session.
///
/// A session with no stored fingerprint always runs regardless of policy.
pub fn should_rerun(
    new_fp: &Fingerprint,
    old_fp: Option<&Fingerprint>,
    old_exit_status: Option<ExitStatus>,
    policy: RerunPolicy,
    deps_stale: bool,
) -> RerunDecision {
    let Some(old_fp) = old_fp else {
        return RerunDecision::run();
    };
    let modified = new_fp != old_fp || deps_stale;
    let status = old_exit_status.unwrap_or_default();

    let rerun = match policy {
        RerunPolicy::Never => false,
        RerunPolicy::Modified => modified,
        RerunPolicy::Errors => modified || status.errors != 0,
        RerunPolicy::Warnings => modified || !status.is_clean(),
        RerunPolicy::Always => true,
    };
    RerunDecision { rerun, drift: policy == RerunPolicy::Never && modified }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(code: &str) -> Fingerprint {
        Fingerprint { code: code.to_string(), custom_code: "cc".to_string(), engine: "e".to_string() }
    }

    fn decide(policy: RerunPolicy, same: bool, deps_stale: bool, status: (u32, u32)) -> bool {
        let old = fp("a");
        let new = if same { fp("a") } else { fp("b") };
        should_rerun(&new, Some(&old), Some(ExitStatus::new(status.0, status.1)), policy, deps_stale)
            .rerun
    }

    #[test]
    fn truth_table_matches_policies() {
        let statuses = [(0, 0), (2, 0), (0, 3), (1, 1)];
        for same in [true, false] {
            for deps_stale in [false, true] {
                for status in statuses {
                    let modified = !same || deps_stale;
                    let expected = [
                        (RerunPolicy::Never, false),
                        (RerunPolicy::Modified, modified),
                        (RerunPolicy::Errors, modified || status.0 != 0),
                        (RerunPolicy::Warnings, modified || status != (0, 0)),
                        (RerunPolicy::Always, true),
                    ];
                    for (policy, want) in expected {
                        assert_eq!(
                            decide(policy, same, deps_stale, status),
                            want,
                            "{policy} same={same} deps_stale={deps_stale} status={status:?}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn errors_policy_reruns_failed_session_but_modified_does_not() {
        assert!(decide(RerunPolicy::Errors, true, false, (2, 0)));
        assert!(!decide(RerunPolicy::Modified, true, false, (2, 0)));
    }

    #[test]
    fn never_policy_reports_drift() {
        let decision =
            should_rerun(&fp("b"), Some(&fp("a")), None, RerunPolicy::Never, false);
        assert!(!decision.rerun);
        assert!(decision.drift);

        let calm = should_rerun(&fp("a"), Some(&fp("a")), None, RerunPolicy::Never, false);
        assert!(!calm.drift);
    }

    #[test]
    fn first_sighting_always_runs() {
        let decision = should_rerun(&fp("a"), None, None, RerunPolicy::Never, false);
        assert!(decision.rerun);
        assert!(!decision.drift);
    }

    #[test]
    fn engine_change_alone_counts_as_modified() {
        let mut new = fp("a");
        new.engine = "e2".to_string();
        assert!(should_rerun(&new, Some(&fp("a")), None, RerunPolicy::Modified, false).rerun);
    }
}

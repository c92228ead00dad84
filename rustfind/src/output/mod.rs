//! Output aggregation helpers: path formatting, the progress spinner and
//! the unattended-context check. The aggregation loop itself runs in
//! [`crate::engine::Finder::run`].
pub mod format;
pub mod progress;

use crossterm::tty::IsTty;
use std::io;

pub use format::Formatter;
pub use progress::Progress;

/// Environment variables set by common CI systems
const CI_VARIABLES: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "TF_BUILD",
    "JENKINS_URL",
    "GITLAB_CI",
    "BUILDKITE",
    "TEAMCITY_VERSION",
];

/// True when nobody is watching: forced by the caller, running under CI, or
/// with stdout or stdin redirected
pub fn is_unattended(forced: bool) -> bool {
    forced || running_in_ci(|name| std::env::var_os(name)) || !io::stdout().is_tty() || !io::stdin().is_tty()
}

fn running_in_ci<F, V>(lookup: F) -> bool
where
    F: Fn(&str) -> Option<V>,
{
    CI_VARIABLES.iter().any(|name| lookup(name).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forced_unattended() {
        assert!(is_unattended(true));
    }

    #[test]
    fn test_ci_detection() {
        assert!(running_in_ci(|name| (name == "TF_BUILD").then_some("True")));
        assert!(!running_in_ci(|_| None::<String>));
    }
}

//! Test-only fault injection via the `OSTREE_REPO_TEST_ERROR` environment
//! variable (spec §6 supplemented: "fault injection for write-path
//! testing"). Each write path that wants an injectable failure point
//! calls [`check`] with its own checkpoint name; the error fires only
//! when the environment variable's value matches that name exactly, so
//! a single test run can target one checkpoint without tripping others.

use crate::error::{Error, Result};

const ENV_VAR: &str = "OSTREE_REPO_TEST_ERROR";

/// The checkpoint reached just before an object is linked into
/// `objects/`, after all validation has passed.
pub const PRE_COMMIT: &str = "pre-commit";

/// Return `Err` if `OSTREE_REPO_TEST_ERROR` is set to exactly `checkpoint`.
pub fn check(checkpoint: &str) -> Result<()> {
    match std::env::var(ENV_VAR) {
        Ok(v) if v == checkpoint => Err(Error::Unsupported(format!(
            "fault injected at checkpoint {checkpoint} via {ENV_VAR}"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_without_env_var() {
        std::env::remove_var(ENV_VAR);
        assert!(check(PRE_COMMIT).is_ok());
    }

    #[test]
    fn fires_only_for_matching_checkpoint() {
        std::env::set_var(ENV_VAR, "some-other-point");
        assert!(check(PRE_COMMIT).is_ok());
        std::env::set_var(ENV_VAR, PRE_COMMIT);
        assert!(check(PRE_COMMIT).is_err());
        std::env::remove_var(ENV_VAR);
    }
}

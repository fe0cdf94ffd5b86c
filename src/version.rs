//! Build metadata embedded by vergen.

use std::fmt;

use serde::Serialize;

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git branch at build time, or "unknown" outside a git checkout.
pub const GIT_BRANCH: &str = match option_env!("VERGEN_GIT_BRANCH") {
    Some(branch) => branch,
    None => "unknown",
};

/// Git commit SHA at build time, or "unknown" outside a git checkout.
pub const GIT_SHA: &str = match option_env!("VERGEN_GIT_SHA") {
    Some(sha) => sha,
    None => "unknown",
};

/// Whether the working tree was dirty at build time.
pub fn git_dirty() -> bool {
    option_env!("VERGEN_GIT_DIRTY") == Some("true")
}

/// Build identity, attached to engine startup logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_branch: &'static str,
    pub git_sha: &'static str,
    pub dirty: bool,
}

/// Build identity of this crate.
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: PKG_VERSION,
        git_branch: GIT_BRANCH,
        git_sha: GIT_SHA,
        dirty: git_dirty(),
    }
}

/// Renders `{version}+{branch}.{sha7}`, with `.dirty` appended for dirty trees.
impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sha = &self.git_sha[..7.min(self.git_sha.len())];
        write!(f, "{}+{}.{}", self.version, self.git_branch, sha)?;
        if self.dirty {
            f.write_str(".dirty")?;
        }
        Ok(())
    }
}

/// Full version string, e.g. `0.1.0+main.abc1234`.
pub fn version_string() -> String {
    build_info().to_string()
}

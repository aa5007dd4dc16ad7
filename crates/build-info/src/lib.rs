//! Source revision and build time stamped into the deskit binaries.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    /// Short commit hash, `+dirty` when built from a modified tree.
    pub git_rev: &'static str,
    /// RFC 3339, UTC.
    pub built_at: &'static str,
}

pub const BUILD: BuildInfo = BuildInfo {
    git_rev: stamped(option_env!("DESKIT_GIT_REV")),
    built_at: stamped(option_env!("DESKIT_BUILT_AT")),
};

const fn stamped(value: Option<&'static str>) -> &'static str {
    match value {
        Some(value) => value,
        None => "unknown",
    }
}

impl BuildInfo {
    /// `<rev>@<built_at>`, the form reported in `STATUS`.
    pub fn id(&self) -> String {
        format!("{}@{}", self.git_rev, self.built_at)
    }
}

pub fn build_id() -> String {
    BUILD.id()
}

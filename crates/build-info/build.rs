use std::process::Command;

use chrono::{SecondsFormat, Utc};

fn main() {
    if let Some(git_dir) = git(&["rev-parse", "--absolute-git-dir"]) {
        println!("cargo:rerun-if-changed={git_dir}/HEAD");
        println!("cargo:rerun-if-changed={git_dir}/index");
    }

    let rev = git(&["rev-parse", "--short=10", "HEAD"]).map(|rev| {
        // Any tracked change makes the tree dirty.
        match git(&["status", "--porcelain", "--untracked-files=no"]) {
            Some(_) => format!("{rev}+dirty"),
            None => rev,
        }
    });

    println!(
        "cargo:rustc-env=DESKIT_GIT_REV={}",
        rev.as_deref().unwrap_or("unknown")
    );
    println!(
        "cargo:rustc-env=DESKIT_BUILT_AT={}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    );
}

/// Trimmed stdout of a successful git call, `None` when empty.
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

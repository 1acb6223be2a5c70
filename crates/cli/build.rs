//! Stamps the commit and target triple reported by `cohort --version`.

use std::process::Command;

/// Trimmed stdout of a successful, non-empty git invocation.
fn git(args: &[&str]) -> Option<String> {
    let out = Command::new("git").args(args).output().ok()?;
    if !out.status.success() {
        return None;
    }
    let text = String::from_utf8(out.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_owned())
}

fn main() {
    for watched in ["../../.git/HEAD", "../../.git/index"] {
        println!("cargo:rerun-if-changed={watched}");
    }

    let head = git(&["rev-parse", "--short=7", "HEAD"]);
    let changes = git(&["status", "--porcelain", "--untracked-files=no"]);
    let commit = match (head, changes) {
        (Some(hash), Some(_)) => format!("{hash}-dirty"),
        (Some(hash), None) => hash,
        (None, _) => String::from("unknown"),
    };
    println!("cargo:rustc-env=GIT_COMMIT_HASH={commit}");

    let target = std::env::var("TARGET").unwrap_or_else(|_| String::from("unknown"));
    println!("cargo:rustc-env=TARGET={target}");
}

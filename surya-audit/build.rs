//! Stamps the binary with the commit it was built from
//!
//! Certified records outlive the binary that produced them, so `/health` and
//! the startup log name the exact build. Release tarballs have no `.git`;
//! packagers set `SURYA_COMMIT` instead.

use std::env;
use std::process::Command;

fn commit() -> String {
    if let Ok(commit) = env::var("SURYA_COMMIT") {
        if !commit.trim().is_empty() {
            return commit.trim().to_string();
        }
    }

    Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn main() {
    let built_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=SURYA_COMMIT={}", commit());
    println!("cargo:rustc-env=SURYA_BUILT_AT={}", built_at);
    println!("cargo:rustc-env=SURYA_PROFILE={}", profile);
    println!("cargo:rerun-if-env-changed=SURYA_COMMIT");
    println!("cargo:rerun-if-changed=../.git/HEAD");
}

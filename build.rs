//! Build script for lamco-screen-manager
//!
//! Stamps the daemon banner with the build date and commit.

use std::process::Command;

fn command_output(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn main() {
    let date = command_output("date", &["+%Y-%m-%d"]).unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=SCREEN_MANAGER_BUILD_DATE={}", date);

    let commit = command_output("git", &["rev-parse", "--short", "HEAD"])
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=SCREEN_MANAGER_COMMIT={}", commit);

    println!("cargo:rerun-if-changed=.git/HEAD");
}

use std::process::Command;

fn main() {
    let base = env!("CARGO_PKG_VERSION");

    // Development builds carry the short git sha so deployed controllers can be traced
    let is_dev = std::env::var("LADEWERK_DEV_BUILD")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let mut sha: Option<String> = None;
    if let Ok(output) = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        && output.status.success()
    {
        let s = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !s.is_empty() {
            sha = Some(s);
        }
    }
    if sha.is_none()
        && let Ok(s) = std::env::var("GIT_SHA")
        && !s.is_empty()
    {
        sha = Some(s);
    }

    let version = match (is_dev, sha) {
        (true, Some(s)) => format!("{}-dev+{}", base, s),
        (true, None) => format!("{}-dev", base),
        (false, _) => base.to_string(),
    };

    println!("cargo:rustc-env=LADEWERK_VERSION={}", version);
    println!("cargo:rerun-if-env-changed=LADEWERK_DEV_BUILD");
    println!("cargo:rerun-if-env-changed=GIT_SHA");
    println!("cargo:rerun-if-changed=.git/HEAD");
}

use std::process::Command;

fn git_short_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short=10", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?;
    Some(hash.trim().to_owned()).filter(|h| !h.is_empty())
}

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-env-changed=MARKETDESK_GIT_HASH");

    let stamp = chrono::Utc::now().format("%Y-%m-%dT%H:%MZ");
    println!("cargo:rustc-env=BUILD_TIMESTAMP={stamp}");

    // source tarballs have no .git; packagers pass the hash in
    let hash = std::env::var("MARKETDESK_GIT_HASH").ok().or_else(git_short_hash);
    if let Some(hash) = hash {
        println!("cargo:rustc-env=GIT_HASH={hash}");
    }
}

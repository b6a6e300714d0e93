use std::process::Command;

fn main() {
    if let Some(hash) = git_hash() {
        println!("cargo:rustc-env=POLREPO_GIT_HASH={hash}");
    }

    println!("cargo:rerun-if-changed=../.git/HEAD");
    println!("cargo:rerun-if-changed=../.git/refs/");
}

/// Short commit hash of the checkout, suffixed with `-dirty` when the work
/// tree has uncommitted changes.
fn git_hash() -> Option<String> {
    let git = |args: &[&str]| {
        Command::new("git")
            .args(args)
            .output()
            .ok()
            .filter(|o| o.status.success())
    };

    let hash = String::from_utf8_lossy(&git(&["rev-parse", "--short", "HEAD"])?.stdout)
        .trim()
        .to_string();
    if hash.is_empty() {
        return None;
    }

    let dirty = git(&["status", "--porcelain"]).is_some_and(|o| !o.stdout.is_empty());
    Some(if dirty { format!("{hash}-dirty") } else { hash })
}

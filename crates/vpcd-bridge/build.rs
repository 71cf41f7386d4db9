use std::process::Command;

fn main() {
    if let Ok(target) = std::env::var("TARGET") {
        println!("cargo:rustc-env=VPCD_BRIDGE_BUILD_TARGET={target}");
    }

    let git_hash = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok());
    if let Some(hash) = git_hash {
        println!("cargo:rustc-env=VPCD_BRIDGE_GIT_HASH={}", hash.trim());
    }

    println!("cargo:rerun-if-env-changed=TARGET");
}

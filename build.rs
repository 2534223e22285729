use std::{env, fs, path::Path, process::Command};

fn main() {
    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is not set");
    let mut version = env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());

    if let Ok(out) = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
    {
        if out.status.success() {
            let hash = String::from_utf8_lossy(&out.stdout);
            let hash = hash.trim();
            if !hash.is_empty() {
                version = format!("{version}-{hash}");
            }
        }
    }

    fs::write(Path::new(&out_dir).join("VERSION"), version).expect("failed to write VERSION");
    println!("cargo:rerun-if-changed=build.rs");
}

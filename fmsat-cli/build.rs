use std::{env, process::Command, str::from_utf8};

fn main() {
    let rustc = env::var("RUSTC").unwrap();

    let rustc_version = Command::new(rustc)
        .arg("--version")
        .output()
        .ok()
        .filter(|result| result.status.success())
        .expect("Failed to query rustc version");

    println!(
        "cargo:rustc-env=FMSAT_RUSTC_VERSION={}",
        from_utf8(rustc_version.stdout.as_slice()).unwrap().trim()
    );
    println!(
        "cargo:rustc-env=FMSAT_PROFILE={}",
        env::var("PROFILE").unwrap()
    );
}

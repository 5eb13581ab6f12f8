fn main() {
    // Exposed to the binary as BUILD_VERSION, e.g. 2026-01-31T08:15:00Z
    let built_at = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    println!("cargo:rustc-env=BUILD_VERSION={}", built_at);
    println!("cargo:rerun-if-changed=build.rs");
}

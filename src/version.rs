/// Build identifier: the UTC compile timestamp injected by build.rs
/// (`YYYY-MM-DDTHH:MM:SSZ`), or the package version when built without it.
pub fn current_version() -> &'static str {
    option_env!("BUILD_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}

pub fn log_startup() {
    tracing::info!(
        "{} {} (build {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        current_version()
    );
}

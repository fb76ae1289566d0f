fn main() {
    // On Windows, raise the main thread stack size to 8MB to match Linux/macOS defaults.
    // Reverse expansion recurses once per newly discovered batch of dependents,
    // so deep reverse chains (threaded comments, category trees) can exceed the
    // 1MB Windows default.
    //
    // CARGO_CFG_TARGET_OS is used instead of #[cfg] so cross-compilation picks
    // the target's linker flags, not the host's.
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os == "windows" {
        let target_env = std::env::var("CARGO_CFG_TARGET_ENV").unwrap_or_default();

        if target_env == "msvc" {
            println!("cargo:rustc-link-arg=/STACK:8388608");
        } else {
            println!("cargo:rustc-link-arg=-Wl,--stack,8388608");
        }
    }
}

use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins when set; otherwise `-v` picks the level (warn, info,
/// debug, trace). Logs go to stderr so stdout stays machine readable.
pub fn init(verbose: u8, json: bool) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = installed {
        eprintln!("logging not initialized: {e}");
    }
}

use std::sync::OnceLock;

/// Set up log levels, formatting, and other configurations for the logger
pub struct Logger;

static LOGGER: OnceLock<Logger> = OnceLock::new();

impl Logger {
    pub fn init() -> &'static Self {
        LOGGER.get_or_init(|| {
            let result = env_logger::Builder::from_env(
                // No logs shown by default, only human-friendly messages
                // Enable logs output with "export RUST_LOG=info" in terminal
                env_logger::Env::default().default_filter_or("off"),
            )
            .format_timestamp(None)
            .try_init();

            if let Err(e) = result {
                eprintln!("Failed to initialize logger: {e}");
            }

            Self
        })
    }
}

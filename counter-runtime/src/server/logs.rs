use {
    tracing::Level,
    tracing_subscriber::FmtSubscriber,
    crate::server::config::{ServerConfig, LoggerConfig},
};

/// Installs the global tracing subscriber described by server config.
/// Stdout logging at info level is the default.
pub fn init_logging(config: &ServerConfig) {
    match config.logger.as_ref().unwrap_or(&LoggerConfig::Stdout) {
        LoggerConfig::Stdout => {
            let level = config.log_level.map(Level::from).unwrap_or(Level::INFO);
            FmtSubscriber::builder().with_max_level(level).init();
        },
        LoggerConfig::Noop => {},
    }
}

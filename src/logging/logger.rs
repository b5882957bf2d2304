use log::LevelFilter;

/// Installs the global logger. Everything goes to stderr so stdout stays free
/// for the Sensu backend.
pub fn setup_logging(level: LevelFilter) -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        // The HTTP stack under the ClickHouse client is chatty at debug.
        .level_for("hyper", LevelFilter::Warn)
        .level_for("hyper_util", LevelFilter::Warn)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}

use anyhow::{anyhow, Context, Result};
use log::LevelFilter;

use crate::settings::LoggingConfig;

pub fn init(config: &LoggingConfig) -> Result<()> {
    let level: LevelFilter = config
        .level
        .parse()
        .map_err(|_| anyhow!("Unknown log level {:?}", config.level))?;

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout());

    if let Some(file) = &config.file {
        let log_file = fern::log_file(file)
            .with_context(|| format!("Cannot open log file {}", file.display()))?;
        dispatch = dispatch.chain(log_file);
    }

    dispatch.apply().map_err(|e| anyhow!("{}", e))
}

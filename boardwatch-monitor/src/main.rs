use anyhow::Result;
use tracing::info;

use boardwatch_common::logging::init_logging;
use boardwatch_common::Config;
use boardwatch_monitor::MonitorService;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load_with_env()?;
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    info!(
        host = %config.server.host,
        port = config.server.port,
        "starting boardwatch monitor"
    );

    let service = MonitorService::new(config)?;
    service.start().await?;
    Ok(())
}

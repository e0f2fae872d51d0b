use mvc_dispatch::cli::run_cli;
use mvc_dispatch::telemetry::{init_logging_with_config, LogConfig};

fn main() -> anyhow::Result<()> {
    init_logging_with_config(&LogConfig::from_env())?;
    run_cli()
}

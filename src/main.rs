use anyhow::{Context, Result};

fn init_logging() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_env("HIVEKEEP_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
        .context("failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}

fn main() -> Result<()> {
    init_logging()?;
    hivekeep::run().context("hivekeep failed")?;
    Ok(())
}

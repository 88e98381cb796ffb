use clap::Parser;
use color_eyre::eyre::Report;
use kubectl_view_usage::{CliOpts, do_main};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_error::ErrorLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

fn init_tracing() {
    let app_name = concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION")).to_string();
    // stdout is for the report, logs go to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = Registry::default()
        .with(filter)
        .with(ErrorLayer::default())
        .with(JsonStorageLayer)
        .with(BunyanFormattingLayer::new(app_name, std::io::stderr));
    tracing::subscriber::set_global_default(subscriber)
        .expect("failed to set the global tracing subscriber");
}

#[tokio::main]
async fn main() -> Result<(), Report> {
    color_eyre::install()?;
    init_tracing();
    let cli_opts = CliOpts::parse();
    do_main(&cli_opts).await?;
    Ok(())
}

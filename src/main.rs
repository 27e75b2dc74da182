use anyhow::Context;
use gridlife::{app::App, config::EngineConfig};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = EngineConfig::default();
    let app = App::new(config).context("Failed to start gridlife")?;
    app.run().context("gridlife stopped with an error")
}

use anyhow::{Context, Result};
use startlist::TrackerConfig;

pub fn handle_show_config(config: &TrackerConfig) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    print!("{}", rendered);
    Ok(())
}

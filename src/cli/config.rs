//! `config` command: show the effective configuration.

use crate::config::Config;

/// Print every setting, optionally only those under `filter`.
pub fn run_config_command(config: &Config, filter: Option<&str>) -> anyhow::Result<()> {
    let lines = format_settings(config, filter);
    if lines.is_empty() {
        anyhow::bail!("No settings match: {}", filter.unwrap_or_default());
    }

    println!("Settings:");
    println!();
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

/// One aligned line per setting. Secrets are already redacted by
/// `Config::list`.
pub fn format_settings(config: &Config, filter: Option<&str>) -> Vec<String> {
    let settings: Vec<_> = config
        .list()
        .into_iter()
        .filter(|(key, _)| filter.is_none_or(|f| key.starts_with(f)))
        .collect();

    // Find the longest key for alignment
    let width = settings.iter().map(|(k, _)| k.len()).max().unwrap_or(0);

    settings
        .into_iter()
        .map(|(key, value)| {
            let value = if value.chars().count() > 60 {
                format!("{}...", value.chars().take(57).collect::<String>())
            } else {
                value
            };
            format!("  {:width$}  {}", key, value, width = width)
        })
        .collect()
}

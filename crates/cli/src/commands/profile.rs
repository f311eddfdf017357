//! Local CLI profile commands

use anyhow::Result;
use colored::Colorize;

use crate::config::{Config, DEFAULT_API_URL};
use crate::output::{print_info, print_json, print_success, OutputFormat};

/// Show the stored profile
pub fn show_profile(format: OutputFormat) -> Result<()> {
    let config = Config::load()?;

    match format {
        OutputFormat::Json => print_json(&config)?,
        OutputFormat::Table => {
            println!("{}", "CLI Profile".bold());
            println!("{}", "=".repeat(50));
            println!("File:      {}", Config::config_path()?.display());
            println!(
                "API URL:   {}",
                config
                    .api_url
                    .as_deref()
                    .unwrap_or(DEFAULT_API_URL)
                    .cyan()
            );
            println!(
                "Namespace: {}",
                config
                    .default_namespace
                    .as_deref()
                    .unwrap_or("(controller default)")
                    .cyan()
            );
        }
    }

    Ok(())
}

/// Update the stored profile; unset fields are kept
pub fn set_profile(api_url: Option<String>, namespace: Option<String>) -> Result<()> {
    if api_url.is_none() && namespace.is_none() {
        print_info("Nothing to update; pass --api-url or --namespace");
        return Ok(());
    }

    let mut config = Config::load()?;
    if let Some(url) = api_url {
        url::Url::parse(&url).map_err(|e| anyhow::anyhow!("Invalid API URL `{}`: {}", url, e))?;
        config.api_url = Some(url);
    }
    if namespace.is_some() {
        config.default_namespace = namespace;
    }

    let path = config.save()?;
    print_success(&format!("Profile saved to {}", path.display()));
    Ok(())
}

//! Controller health command

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, ApiError, HealthResponse};
use crate::output::{color_status, print_json, OutputFormat};

#[derive(Tabled)]
struct BackendRow {
    #[tabled(rename = "Backend")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Failures")]
    failures: u32,
    #[tabled(rename = "Last Error")]
    last_error: String,
}

/// Show controller health; an unhealthy controller still reports its backends
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result: HealthResponse = match client.get("healthz", &[]).await {
        Ok(health) => health,
        Err(err) => {
            let reported = match err.downcast_ref::<ApiError>() {
                Some(api_err) if api_err.status == 503 => {
                    serde_json::from_str::<HealthResponse>(&api_err.message).ok()
                }
                _ => None,
            };
            match reported {
                Some(health) => health,
                None => return Err(err),
            }
        }
    };

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            println!("{} {}", "Controller:".bold(), color_status(&result.status));
            println!();

            let rows: Vec<BackendRow> = result
                .backends
                .iter()
                .map(|(name, backend)| BackendRow {
                    name: name.clone(),
                    status: color_status(&backend.status),
                    failures: backend.consecutive_failures,
                    last_error: backend.last_error.clone().unwrap_or_else(|| "-".to_string()),
                })
                .collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}

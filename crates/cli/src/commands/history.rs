//! Per-replica telemetry history command

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, HistoryResponse};
use crate::output::{color_cpu, format_latency, format_timestamp, print_json, OutputFormat};

#[derive(Tabled)]
struct SnapshotRow {
    #[tabled(rename = "Recorded")]
    recorded_at: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Requests")]
    requests: u64,
    #[tabled(rename = "Latency")]
    latency: String,
    #[tabled(rename = "Speed")]
    speed: String,
}

/// Show recent snapshots recorded for one replica
pub async fn show_history(
    client: &ApiClient,
    replica: &str,
    last: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let path = format!("api/v1/history/{}", replica);
    let result: HistoryResponse = client
        .get(&path, &[("last", last.map(|n| n.to_string()))])
        .await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            println!("{}", "Telemetry History".bold());
            println!("{}", "=".repeat(60));
            println!("Replica: {}", result.replica.cyan());
            if let Some(avg) = result.average_cpu {
                println!("Avg CPU: {:.1}%", avg);
            }
            println!();

            let rows: Vec<SnapshotRow> = result
                .snapshots
                .iter()
                .map(|s| SnapshotRow {
                    recorded_at: format_timestamp(&s.recorded_at),
                    cpu: color_cpu(s.cpu_utilization),
                    requests: s.request_count,
                    latency: format_latency(s.request_latency_ms),
                    speed: format!("{:.2}", s.clock_speed),
                })
                .collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} snapshots", result.snapshots.len());
        }
    }

    Ok(())
}

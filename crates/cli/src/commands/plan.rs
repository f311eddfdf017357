//! Traffic-split plan command

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, PlanReport};
use crate::output::{
    format_thresholds, format_timestamp, print_json, print_warning, shares, OutputFormat,
};

/// Row for one source replica's split list
#[derive(Tabled)]
struct SplitRow {
    #[tabled(rename = "Source Replica")]
    source_replica: String,
    #[tabled(rename = "Thresholds")]
    thresholds: String,
    #[tabled(rename = "Shares")]
    shares: String,
}

/// Compute and show a traffic-split plan
pub async fn show_plan(
    client: &ApiClient,
    namespace: Option<String>,
    strategy: Option<String>,
    window: Option<u64>,
    source: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let mut report: PlanReport = client
        .get(
            "api/v1/plan",
            &[
                ("namespace", namespace),
                ("strategy", strategy),
                ("window", window.map(|w| w.to_string())),
            ],
        )
        .await?;

    if let Some(source) = &source {
        report.plan.retain(|component, _| component == source);
    }

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            println!("{}", "Traffic-Split Plan".bold());
            println!("{}", "=".repeat(60));
            println!("Namespace: {}", report.namespace.cyan());
            println!("Strategy:  {}", report.strategy.cyan());
            println!("Window:    {}s", report.window_secs);
            println!("Generated: {}", format_timestamp(&report.generated_at).dimmed());

            if report.plan.is_empty() {
                println!();
                print_warning("Plan has no routes");
                return Ok(());
            }

            for (source_component, destinations) in &report.plan {
                for (destination_component, splits) in destinations {
                    println!();
                    println!(
                        "{} {} {}",
                        source_component.bold(),
                        "->".dimmed(),
                        destination_component.bold()
                    );

                    let rows: Vec<SplitRow> = splits
                        .iter()
                        .map(|(replica, targets)| {
                            let thresholds: Vec<u8> = targets.iter().map(|t| t.threshold).collect();
                            SplitRow {
                                source_replica: replica.clone(),
                                thresholds: format_thresholds(
                                    targets
                                        .iter()
                                        .map(|t| (t.destination_replica.as_str(), t.threshold)),
                                ),
                                shares: shares(&thresholds)
                                    .iter()
                                    .map(|s| format!("{}%", s))
                                    .collect::<Vec<_>>()
                                    .join(" / "),
                            }
                        })
                        .collect();
                    let table = tabled::Table::new(rows)
                        .with(tabled::settings::Style::rounded())
                        .to_string();
                    println!("{}", table);
                }
            }
        }
    }

    Ok(())
}

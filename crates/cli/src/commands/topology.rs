//! Dependency graph and replica catalog commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, GraphResponse, ReplicaMap};
use crate::output::{
    color_cpu, format_cpu, format_latency, print_json, print_warning, OutputFormat,
};

/// Row for the edge table
#[derive(Tabled)]
struct EdgeRow {
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Destination")]
    destination: String,
}

/// Row for the replica table
#[derive(Tabled)]
struct ReplicaRow {
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Replica")]
    name: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Node")]
    host: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "CPU Req")]
    cpu_request: String,
    #[tabled(rename = "Requests")]
    requests: u64,
    #[tabled(rename = "Latency")]
    latency: String,
    #[tabled(rename = "Speed")]
    speed: String,
}

/// Show the dependency graph
pub async fn show_graph(
    client: &ApiClient,
    namespace: Option<String>,
    window: Option<u64>,
    format: OutputFormat,
) -> Result<()> {
    let result: GraphResponse = client
        .get(
            "api/v1/graph",
            &[
                ("namespace", namespace),
                ("window", window.map(|w| w.to_string())),
            ],
        )
        .await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            println!("{}", "Dependency Graph".bold());
            println!("{}", "=".repeat(50));
            println!("Namespace:  {}", result.namespace.cyan());
            println!("Components: {}", result.components.len());
            println!();

            if result.edges.is_empty() {
                print_warning("No traffic observed in this window");
                return Ok(());
            }

            let rows: Vec<EdgeRow> = result
                .edges
                .iter()
                .map(|e| EdgeRow {
                    source: e.source.clone(),
                    destination: e.destination.clone(),
                })
                .collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);

            match &result.order {
                Some(order) => println!("\nOrder: {}", order.join(" -> ")),
                None => print_warning("Graph contains a cycle; capacity-aware plans are unavailable"),
            }
        }
    }

    Ok(())
}

/// Show the replica catalog with its load signals
pub async fn show_replicas(
    client: &ApiClient,
    namespace: Option<String>,
    component: Option<String>,
    window: Option<u64>,
    naming: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let params = [
        ("namespace", namespace),
        ("component", component),
        ("window", window.map(|w| w.to_string())),
    ];

    match format {
        OutputFormat::Json => {
            let mut params = params.to_vec();
            params.push(("naming", naming));
            let result: serde_json::Value = client.get("api/v1/replicas", &params).await?;
            print_json(&result)?;
        }
        OutputFormat::Table => {
            let result: ReplicaMap = client.get("api/v1/replicas", &params).await?;
            if result.values().all(Vec::is_empty) {
                print_warning("No replicas found");
                return Ok(());
            }

            let rows: Vec<ReplicaRow> = result
                .values()
                .flatten()
                .map(|r| ReplicaRow {
                    component: r.component.clone(),
                    name: r.name.clone(),
                    address: r.address.clone(),
                    host: r.host.clone(),
                    cpu: color_cpu(r.cpu_utilization),
                    cpu_request: format_cpu(r.cpu_request_millicores),
                    requests: r.request_count,
                    latency: format_latency(r.request_latency_ms),
                    speed: format!("{:.2}", r.clock_speed),
                })
                .collect();
            let total = rows.len();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} replicas in {} components", total, result.len());
        }
    }

    Ok(())
}

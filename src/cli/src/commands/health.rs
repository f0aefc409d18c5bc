//! Health check command.
//!
//! Queries the `/health` endpoint and displays service status.

use anyhow::Result;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

pub async fn execute(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: serde_json::Value = client.get_raw("/health").await?;

    if !format.is_table() {
        output::print_serialized(&health, format);
        return Ok(());
    }

    let status = health
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");

    output::print_field("Status", status);
    output::print_field("API URL", client.base_url());
    if let Some(version) = health.get("version").and_then(|v| v.as_str()) {
        output::print_field("Version", version);
    }
    if let Some(ts) = health.get("timestamp").and_then(|v| v.as_str()) {
        output::print_field("Timestamp", ts);
    }

    if status == "healthy" {
        output::print_success("Service operational");
    } else {
        output::print_error("Service reported an unhealthy status");
    }

    Ok(())
}

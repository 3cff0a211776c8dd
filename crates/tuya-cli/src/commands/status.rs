//! Status command - read device data points

use anyhow::Result;
use tuya_client::TuyaClient;

use crate::output::{format_value, OutputContext, StatusRow};

/// Show the current status data points of a device
pub async fn status(client: &TuyaClient, device_id: &str, ctx: &OutputContext) -> Result<()> {
    let status = client.get_device_status(device_id).await?;

    let rows: Vec<StatusRow> = status
        .iter()
        .map(|s| StatusRow {
            code: s.code.clone(),
            value: format_value(&s.value),
        })
        .collect();

    ctx.print(&rows);
    Ok(())
}

//! List command - show devices of the cloud project

use anyhow::Result;
use tuya_client::TuyaClient;

use crate::output::{DeviceRow, OutputContext};

/// List devices, following every page unless `first_page` is set
pub async fn list(
    client: &TuyaClient,
    page_size: u32,
    first_page: bool,
    ctx: &OutputContext,
) -> Result<()> {
    let devices = client.list_devices(page_size, !first_page).await?;

    let rows: Vec<DeviceRow> = devices
        .into_iter()
        .map(|d| DeviceRow {
            online: if d.online_state() { "yes" } else { "no" }.to_string(),
            id: d.id.unwrap_or_else(|| "-".to_string()),
            name: d.name.unwrap_or_default(),
            custom_name: d.custom_name.unwrap_or_default(),
        })
        .collect();

    ctx.print(&rows);
    Ok(())
}

//! Info command - show device details

use anyhow::Result;
use tuya_client::TuyaClient;

use crate::output::{format_value, OutputContext};

/// Show detailed information about a device
pub async fn info(client: &TuyaClient, device_id: &str, ctx: &OutputContext) -> Result<()> {
    let device = client.get_device_info(device_id).await?;

    let mut pairs = vec![
        ("ID", device.id.clone().unwrap_or_else(|| "-".to_string())),
        ("Name", device.name.clone().unwrap_or_else(|| "-".to_string())),
        (
            "Custom Name",
            device.custom_name.clone().unwrap_or_else(|| "-".to_string()),
        ),
        ("Online", device.online_state().to_string()),
    ];
    pairs.extend(
        device
            .extra
            .iter()
            .map(|(key, value)| (key.as_str(), format_value(value))),
    );

    ctx.print_kv(&pairs);
    Ok(())
}

//! Online command - connectivity check

use anyhow::Result;
use tuya_client::TuyaClient;

use crate::output::OutputContext;

/// Report whether a device (by id, name or custom name) is online
pub async fn online(client: &TuyaClient, id_or_name: &str, ctx: &OutputContext) -> Result<()> {
    let online = client.is_device_online(id_or_name).await?;
    ctx.print_kv(&[
        ("Device", id_or_name.to_string()),
        ("Online", online.to_string()),
    ]);
    Ok(())
}

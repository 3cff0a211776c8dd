//! Find command - device id by name

use anyhow::Result;
use tuya_client::TuyaClient;

use crate::output::OutputContext;

/// Print the id of the device called `name`
pub async fn find(
    client: &TuyaClient,
    name: &str,
    by_product_name: bool,
    ctx: &OutputContext,
) -> Result<()> {
    match client.get_device_id_by_name(name, !by_product_name).await? {
        Some(id) => ctx.print_kv(&[("Name", name.to_string()), ("ID", id)]),
        None => ctx.warn(&format!("No device named '{}'", name)),
    }
    Ok(())
}

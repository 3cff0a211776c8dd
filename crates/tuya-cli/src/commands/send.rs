//! Send command - dispatch device commands

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tuya_client::{Command, TuyaClient};

use crate::output::{OutputContext, OutputFormat};

/// Send one command, or a JSON batch, to a device
pub async fn send(
    client: &TuyaClient,
    device_id: &str,
    code: Option<&str>,
    value: Option<&str>,
    commands_json: Option<&str>,
    ctx: &OutputContext,
) -> Result<()> {
    let commands = build_commands(code, value, commands_json)?;

    let response = client
        .set_device_status(device_id, &commands)
        .await
        .context("Failed to send commands")?;

    if ctx.format == OutputFormat::Json {
        ctx.print_json(&response);
    } else {
        let codes: Vec<&str> = commands.iter().map(|c| c.code.as_str()).collect();
        ctx.success(&format!("Sent {} to {}", codes.join(", "), device_id));
    }
    Ok(())
}

fn build_commands(
    code: Option<&str>,
    value: Option<&str>,
    commands_json: Option<&str>,
) -> Result<Vec<Command>> {
    match (code, value, commands_json) {
        (None, None, Some(json)) => {
            serde_json::from_str(json).context("--commands must be a JSON array of {code, value}")
        }
        (Some(code), Some(value), None) => Ok(vec![Command::new(code, parse_value(value)?)]),
        _ => bail!("Give either <CODE> <VALUE> or --commands"),
    }
}

/// Parse a command-line value as JSON where it looks like JSON, else a string
fn parse_value(value: &str) -> Result<Value> {
    let json_value = if value.starts_with('{')
        || value.starts_with('[')
        || value == "true"
        || value == "false"
        || value == "null"
    {
        serde_json::from_str(value).context("Failed to parse value as JSON")?
    } else if let Ok(num) = value.parse::<i64>() {
        Value::Number(num.into())
    } else if let Ok(num) = value.parse::<f64>() {
        serde_json::Number::from_f64(num)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()))
    } else {
        Value::String(value.to_string())
    };
    Ok(json_value)
}

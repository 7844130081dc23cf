//! Connection-info command implementation.

use tablesync_engine::{EndpointResolver, HttpEndpointResolver, SyncConfig};
use tablesync_protocol::FrameProtocol;

/// Runs the connection-info command.
pub async fn run(config: &SyncConfig, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let resolver = HttpEndpointResolver::from_config(config)?;
    let info = resolver.resolve().await?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        _ => {
            let framing = match FrameProtocol::from_subprotocol(info.protocol.as_deref()) {
                FrameProtocol::Bare => "bare JSON",
                FrameProtocol::WebPubSubJson => "broker envelope",
            };
            println!("Push Channel");
            println!("============");
            println!();
            println!("URL:      {}", info.url);
            println!("Protocol: {}", info.protocol.as_deref().unwrap_or("(none)"));
            println!("Framing:  {framing}");
        }
    }

    Ok(())
}

//! Delete command implementation.

use tablesync_engine::{CollectionClient, SyncConfig};

/// Runs the delete command.
pub async fn run(config: &SyncConfig, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !force {
        return Err("delete removes every record in the collection; pass --force to proceed".into());
    }

    let client = CollectionClient::from_config(config)?;
    client.delete_all().await?;
    println!("Deleted all records at {}", config.collection_url()?);
    Ok(())
}

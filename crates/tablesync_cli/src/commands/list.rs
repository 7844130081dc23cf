//! List command implementation.

use serde::Serialize;
use serde_json::Value;
use tablesync_engine::{CollectionClient, SyncConfig};

/// Collection listing result.
#[derive(Debug, Serialize)]
pub struct ListResult {
    /// Collection URL.
    pub url: String,
    /// Cursor reported by the service, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Value>,
    /// Records in service order.
    pub records: Vec<Value>,
}

/// Runs the list command.
pub async fn run(config: &SyncConfig, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = CollectionClient::from_config(config)?;
    let body = client.list().await?;
    let response = config.pull_shape.decode(body)?;

    let result = ListResult {
        url: config.collection_url()?.to_string(),
        cursor: response.next_cursor.map(|c| c.as_value().clone()),
        records: response.records.into_records(),
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => print_text(&result, config),
    }

    Ok(())
}

fn print_text(result: &ListResult, config: &SyncConfig) {
    println!("Collection: {}", result.url);
    if let Some(cursor) = &result.cursor {
        println!("Cursor:     {cursor}");
    }
    println!("Records:    {}", result.records.len());
    println!();
    for record in &result.records {
        let key = config
            .key_path
            .extract(record)
            .map(|k| k.to_string())
            .unwrap_or_else(|| "-".into());
        println!("  {key:<36} {record}");
    }
}

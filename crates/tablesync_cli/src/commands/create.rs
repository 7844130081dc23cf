//! Create command implementation.

use serde_json::Value;
use tablesync_engine::{CollectionClient, SyncConfig};
use tablesync_protocol::{KeyPath, RequiredFields};
use uuid::Uuid;

/// Runs the create command.
pub async fn run(
    config: &SyncConfig,
    json: &str,
    generate_id: bool,
    require: &[String],
    require_elements: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let record = prepare_record(json, &config.key_path, generate_id)?;
    let rules = build_rules(require, require_elements);

    let client = CollectionClient::from_config(config)?.with_rules(rules);
    let stored = client.create(&record).await?;
    if stored.is_null() {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&stored)?);
    }
    Ok(())
}

/// Parses a record and fills in a random key when asked and none is set.
///
/// Only a top-level key field can be generated.
pub fn prepare_record(json: &str, key_path: &KeyPath, generate_id: bool) -> Result<Value, String> {
    let mut record: Value =
        serde_json::from_str(json).map_err(|e| format!("invalid record JSON: {e}"))?;
    if !generate_id || key_path.extract(&record).is_some() {
        return Ok(record);
    }

    let field = key_path
        .as_pointer()
        .strip_prefix('/')
        .filter(|f| !f.is_empty() && !f.contains('/'))
        .ok_or_else(|| format!("cannot generate a key at nested path {}", key_path.as_pointer()))?;
    let object = record
        .as_object_mut()
        .ok_or("record must be a JSON object to generate a key")?;
    object.insert(field.to_string(), Value::String(Uuid::new_v4().to_string()));
    Ok(record)
}

fn build_rules(require: &[String], require_elements: &[String]) -> RequiredFields {
    let rules = require.iter().fold(RequiredFields::new(), |rules, p| rules.require(p.clone()));
    require_elements
        .iter()
        .fold(rules, |rules, p| rules.require_elements(p.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generates_missing_key() {
        let record = prepare_record(r#"{"customer":"ann"}"#, &KeyPath::default(), true).unwrap();
        let id = record["id"].as_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert_eq!(record["customer"], "ann");
    }

    #[test]
    fn keeps_existing_key() {
        let record = prepare_record(r#"{"id":"o-1"}"#, &KeyPath::default(), true).unwrap();
        assert_eq!(record, json!({"id": "o-1"}));
    }

    #[test]
    fn no_generation_unless_asked() {
        let record = prepare_record(r#"{"customer":"ann"}"#, &KeyPath::default(), false).unwrap();
        assert!(record.get("id").is_none());
    }

    #[test]
    fn nested_key_cannot_be_generated() {
        let err =
            prepare_record(r#"{"message":{}}"#, &KeyPath::new("/message/id"), true).unwrap_err();
        assert!(err.contains("nested"));
    }

    #[test]
    fn rejects_bad_json() {
        assert!(prepare_record("{", &KeyPath::default(), false).is_err());
        assert!(prepare_record("[1]", &KeyPath::default(), true).is_err());
    }

    #[test]
    fn rules_from_flags() {
        let rules = build_rules(&["/customer".into()], &["/items".into()]);
        let err = rules.check(&json!({"items": [null]})).unwrap_err();
        assert_eq!(err.errors.len(), 2);
    }
}

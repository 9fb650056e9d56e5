use serde_json::Value;

use crate::record::{expect_object, lookup, scalar_text, text_at, NormalizeError, Record, UNKNOWN};

/// Flattens an ELink payload into one record per (linkset, target database).
///
/// The record `id` is the comma-joined list of source ids of the linkset.
/// Linksets without any linked database contribute nothing.
pub fn normalize_links(raw: &Value) -> Result<Vec<Record>, NormalizeError> {
    let root = expect_object(raw, "elink")?;

    if let Some(message) = root.get("ERROR").and_then(scalar_text) {
        return Err(NormalizeError::Upstream(message));
    }

    let linksets = root
        .get("linksets")
        .and_then(Value::as_array)
        .ok_or(NormalizeError::MissingSection {
            payload: "elink",
            section: "linksets",
        })?;

    let mut records = Vec::new();
    for linkset in linksets {
        let source_ids = string_list(linkset.get("ids")).join(",");
        let dbfrom = text_at(linkset, &["dbfrom"], UNKNOWN);

        let Some(targets) = lookup(linkset, &["linksetdbs"]).and_then(Value::as_array) else {
            continue;
        };

        for target in targets {
            let mut record = Record::new();
            record.insert("id".to_string(), Value::String(source_ids.clone()));
            record.insert("dbfrom".to_string(), Value::String(dbfrom.clone()));
            record.insert("dbto".to_string(), text_at(target, &["dbto"], UNKNOWN).into());
            record.insert("linkname".to_string(), text_at(target, &["linkname"], UNKNOWN).into());
            record.insert("links".to_string(), string_list(target.get("links")).into());
            records.push(record);
        }
    }

    Ok(records)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(scalar_text).collect())
        .unwrap_or_default()
}

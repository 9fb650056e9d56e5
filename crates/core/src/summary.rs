use serde_json::Value;

use crate::record::{expect_object, NormalizeError, Record};

/// Key in an ESummary `result` map that lists the uids instead of holding a record.
pub const UIDS_KEY: &str = "uids";

/// Flattens an id-keyed ESummary payload into one record per uid.
///
/// Records follow the order of the `uids` list when upstream provides one.
/// Only the requested `fields` are kept; an empty field list keeps every
/// upstream field. The `id` field is always present and never overwritten.
pub fn normalize_summary(raw: &Value, fields: &[String]) -> Result<Vec<Record>, NormalizeError> {
    let root = expect_object(raw, "esummary")?;
    let result = root
        .get("result")
        .ok_or(NormalizeError::MissingSection {
            payload: "esummary",
            section: "result",
        })?
        .as_object()
        .ok_or(NormalizeError::NotAnObject("esummary result"))?;

    let uids: Vec<&str> = match result.get(UIDS_KEY).and_then(Value::as_array) {
        Some(listed) => listed.iter().filter_map(Value::as_str).collect(),
        None => result
            .keys()
            .map(String::as_str)
            .filter(|key| *key != UIDS_KEY)
            .collect(),
    };

    Ok(uids
        .into_iter()
        .filter_map(|uid| result.get(uid).map(|entry| summarize(uid, entry, fields)))
        .collect())
}

fn summarize(uid: &str, entry: &Value, fields: &[String]) -> Record {
    let mut record = Record::new();
    record.insert("id".to_string(), Value::String(uid.to_string()));

    let Some(entry) = entry.as_object() else {
        return record;
    };

    if fields.is_empty() {
        for (key, value) in entry.iter().filter(|(key, _)| key.as_str() != "id") {
            record.insert(key.clone(), value.clone());
        }
    } else {
        for field in fields.iter().filter(|field| field.as_str() != "id") {
            if let Some(value) = entry.get(field) {
                record.insert(field.clone(), value.clone());
            }
        }
    }

    record
}

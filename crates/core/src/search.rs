use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{expect_object, lookup, scalar_text, NormalizeError, Record};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub count: u64,
    pub retstart: u64,
    pub retmax: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub records: Vec<Record>,
    pub pagination: Pagination,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
}

/// Reshapes an ESearch payload into id records plus paging information.
///
/// Paging values reported by upstream win; `requested` fills in whatever
/// upstream leaves out.
pub fn normalize_search(raw: &Value, requested: Pagination) -> Result<SearchPage, NormalizeError> {
    let root = expect_object(raw, "esearch")?;
    let result = root.get("esearchresult").ok_or(NormalizeError::MissingSection {
        payload: "esearch",
        section: "esearchresult",
    })?;

    if let Some(message) = lookup(result, &["ERROR"]).and_then(scalar_text) {
        return Err(NormalizeError::Upstream(message));
    }

    let ids = result
        .get("idlist")
        .and_then(Value::as_array)
        .ok_or(NormalizeError::MissingSection {
            payload: "esearch",
            section: "idlist",
        })?;

    let records = ids
        .iter()
        .filter_map(scalar_text)
        .map(|id| {
            let mut record = Record::new();
            record.insert("id".to_string(), Value::String(id));
            record
        })
        .collect();

    let pagination = Pagination {
        count: counter(result, "count").unwrap_or(requested.count),
        retstart: counter(result, "retstart").unwrap_or(requested.retstart),
        retmax: counter(result, "retmax").unwrap_or(requested.retmax),
    };

    Ok(SearchPage {
        records,
        pagination,
        translation: lookup(result, &["querytranslation"]).and_then(scalar_text),
    })
}

// ESearch reports its counters as strings.
fn counter(result: &Value, key: &str) -> Option<u64> {
    match result.get(key)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

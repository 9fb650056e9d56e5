use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{expect_object, text_at, NormalizeError, UNKNOWN};

/// Flattened view of one genome assembly report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyRecord {
    pub id: String,
    pub organism: String,
    pub tax_id: String,
    pub assembly_name: String,
    pub assembly_level: String,
    pub release_date: String,
    pub refseq_category: String,
    pub total_sequence_length: String,
}

impl AssemblyRecord {
    pub fn from_report(report: &Value) -> Self {
        let id = match text_at(report, &["accession"], UNKNOWN) {
            id if id == UNKNOWN => text_at(report, &["current_accession"], UNKNOWN),
            id => id,
        };

        Self {
            id,
            organism: text_at(report, &["organism", "organism_name"], UNKNOWN),
            tax_id: text_at(report, &["organism", "tax_id"], UNKNOWN),
            assembly_name: text_at(report, &["assembly_info", "assembly_name"], UNKNOWN),
            assembly_level: text_at(report, &["assembly_info", "assembly_level"], UNKNOWN),
            release_date: text_at(report, &["assembly_info", "release_date"], UNKNOWN),
            refseq_category: text_at(report, &["assembly_info", "refseq_category"], UNKNOWN),
            total_sequence_length: text_at(
                report,
                &["assembly_stats", "total_sequence_length"],
                UNKNOWN,
            ),
        }
    }
}

/// Normalizes a genome summary payload. A payload without `reports` (the CLI
/// omits it when nothing matched) is an empty list.
pub fn normalize_genomes(raw: &Value) -> Result<Vec<AssemblyRecord>, NormalizeError> {
    let root = expect_object(raw, "genome")?;

    Ok(root
        .get("reports")
        .and_then(Value::as_array)
        .map(|reports| reports.iter().map(AssemblyRecord::from_report).collect())
        .unwrap_or_default())
}

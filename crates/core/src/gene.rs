use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{expect_object, lookup, scalar_text, text_at, NormalizeError, UNKNOWN};

pub const NO_DESCRIPTION: &str = "No description available";
pub const NO_SUMMARY: &str = "No summary available";

/// Flattened view of one gene report from the datasets CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    pub chromosome: String,
    pub map_location: String,
    #[serde(rename = "type")]
    pub gene_type: String,
    pub summary: String,
}

impl GeneRecord {
    /// Returned when no report carries a gene at all.
    pub fn placeholder() -> Self {
        Self {
            id: UNKNOWN.to_string(),
            name: UNKNOWN.to_string(),
            description: NO_DESCRIPTION.to_string(),
            chromosome: UNKNOWN.to_string(),
            map_location: UNKNOWN.to_string(),
            gene_type: UNKNOWN.to_string(),
            summary: NO_SUMMARY.to_string(),
        }
    }

    pub fn from_gene(gene: &Value) -> Self {
        let chromosome = lookup(gene, &["chromosomes"])
            .and_then(Value::as_array)
            .and_then(|chromosomes| chromosomes.first())
            .and_then(scalar_text)
            .unwrap_or_else(|| UNKNOWN.to_string());

        Self {
            id: text_at(gene, &["gene_id"], UNKNOWN),
            name: text_at(gene, &["symbol"], UNKNOWN),
            description: text_at(gene, &["description"], NO_DESCRIPTION),
            chromosome,
            map_location: map_location(gene).unwrap_or_else(|| UNKNOWN.to_string()),
            gene_type: text_at(gene, &["type"], UNKNOWN),
            summary: summary_text(gene).unwrap_or_else(|| NO_SUMMARY.to_string()),
        }
    }
}

/// Normalizes a gene report payload into a single record.
///
/// `query` is the symbol or id the caller asked for; when absent the query
/// echoed in the first report is used. Selection order: exact symbol match,
/// then synonym match, then the first report that has a gene. A payload with
/// no gene anywhere yields [`GeneRecord::placeholder`].
pub fn normalize_gene(raw: &Value, query: Option<&str>) -> Result<GeneRecord, NormalizeError> {
    let root = expect_object(raw, "gene")?;

    let reports = match root.get("reports").and_then(Value::as_array) {
        Some(reports) if !reports.is_empty() => reports.as_slice(),
        _ => return Ok(GeneRecord::placeholder()),
    };

    let query = query
        .map(str::to_string)
        .or_else(|| echoed_query(&reports[0]))
        .unwrap_or_default();

    Ok(select_gene(reports, &query)
        .map(GeneRecord::from_gene)
        .unwrap_or_else(GeneRecord::placeholder))
}

/// Picks the gene sub-object that best answers `query`.
pub fn select_gene<'a>(reports: &'a [Value], query: &str) -> Option<&'a Value> {
    let genes: Vec<&Value> = reports.iter().filter_map(|r| r.get("gene")).collect();

    genes
        .iter()
        .find(|gene| gene.get("symbol").and_then(Value::as_str) == Some(query))
        .or_else(|| {
            genes.iter().find(|gene| {
                gene.get("synonyms")
                    .and_then(Value::as_array)
                    .is_some_and(|synonyms| synonyms.iter().any(|s| s.as_str() == Some(query)))
            })
        })
        .or_else(|| genes.first())
        .copied()
}

fn echoed_query(report: &Value) -> Option<String> {
    report
        .get("query")
        .and_then(Value::as_array)
        .and_then(|q| q.first())
        .and_then(scalar_text)
}

fn map_location(gene: &Value) -> Option<String> {
    gene.get("annotations")?
        .as_array()?
        .iter()
        .filter_map(|annotation| annotation.get("genomic_locations")?.as_array())
        .flatten()
        .find_map(|location| location.get("sequence_name").and_then(scalar_text))
}

fn summary_text(gene: &Value) -> Option<String> {
    let blurbs: Vec<&str> = gene
        .get("summary")?
        .as_array()?
        .iter()
        .filter_map(|item| item.get("description")?.as_str())
        .collect();

    (!blurbs.is_empty()).then(|| blurbs.join(" "))
}

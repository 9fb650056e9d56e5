use async_trait::async_trait;
use ncbi_mcp_core::{normalize_gene, normalize_genomes, AssemblyRecord, GeneRecord};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

use super::{
    non_blank, parse_args, to_object, ParamKind, ParamSpec, RegistryError, ResourceDescriptor,
    ToolDescriptor, ToolError, ToolHandler, ToolRegistry,
};
use crate::providers::{AssemblyQuery, DatasetsCli, GeneQuery, GeneTarget, GenomeQuery, ProviderError};

pub const DEFAULT_TAXON: &str = "human";

fn default_taxon() -> String {
    DEFAULT_TAXON.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneArgs {
    pub gene_id: Option<String>,
    pub symbol: Option<String>,
    #[serde(default = "default_taxon")]
    pub taxon: String,
    pub report: Option<String>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub ortholog: Vec<String>,
}

impl GeneArgs {
    pub fn by_id(gene_id: &str) -> Self {
        Self {
            gene_id: Some(gene_id.to_string()),
            symbol: None,
            taxon: default_taxon(),
            report: None,
            limit: None,
            ortholog: Vec::new(),
        }
    }

    /// A gene id wins over a symbol when both are given.
    pub fn to_query(&self) -> Result<GeneQuery, ToolError> {
        let present = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let target = match (present(&self.gene_id), present(&self.symbol)) {
            (Some(id), _) => GeneTarget::Id(id),
            (None, Some(symbol)) => GeneTarget::Symbol {
                symbol,
                taxon: non_blank("taxon", &self.taxon)?.to_string(),
            },
            (None, None) => {
                return Err(ToolError::InvalidParams(
                    "either `gene_id` or `symbol` is required".to_string(),
                ))
            }
        };

        Ok(GeneQuery {
            target,
            report: self.report.clone(),
            limit: self.limit,
            ortholog: self.ortholog.clone(),
        })
    }
}

pub async fn gene_info(cli: &DatasetsCli, args: &GeneArgs) -> Result<GeneRecord, ToolError> {
    let query = args.to_query()?;
    let command = query.args()?;
    debug!(gene = ?query.target, "gene lookup");

    let raw = cli.run_json(command).await?;
    Ok(normalize_gene(&raw, query.target.symbol())?)
}

pub async fn genome_info(cli: &DatasetsCli, query: &GenomeQuery) -> Result<Vec<AssemblyRecord>, ToolError> {
    let command = query.args()?;
    let raw = cli.run_json(command).await?;
    Ok(normalize_genomes(&raw)?)
}

pub async fn genome_assembly(cli: &DatasetsCli, query: &AssemblyQuery) -> Result<AssemblyRecord, ToolError> {
    let command = query.args()?;
    let raw = cli.run_json(command).await?;

    normalize_genomes(&raw)?.into_iter().next().ok_or_else(|| {
        ToolError::Provider(ProviderError::NotFound(format!(
            "no assembly found for accession {}",
            query.accession.trim()
        )))
    })
}

struct GeneInfo(Arc<DatasetsCli>);
struct GenomeInfo(Arc<DatasetsCli>);
struct GenomeAssembly(Arc<DatasetsCli>);

#[async_trait]
impl ToolHandler for GeneInfo {
    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        let args: GeneArgs = parse_args(&args)?;
        to_object(&gene_info(&self.0, &args).await?)
    }
}

#[async_trait]
impl ToolHandler for GenomeInfo {
    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        let query: GenomeQuery = parse_args(&args)?;
        let records = genome_info(&self.0, &query).await?;
        Ok(json!({ "records": records }))
    }
}

#[async_trait]
impl ToolHandler for GenomeAssembly {
    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        let query: AssemblyQuery = parse_args(&args)?;
        to_object(&genome_assembly(&self.0, &query).await?)
    }
}

fn assembly_filter_params() -> Vec<ParamSpec> {
    vec![
        ParamSpec::optional("report", ParamKind::String, "Report type: genome, sequence or ids_only")
            .with_default(json!("genome")),
        ParamSpec::optional("assembly_source", ParamKind::String, "RefSeq, GenBank or all")
            .with_default(json!("all")),
        ParamSpec::optional("assembly_version", ParamKind::String, "latest or all")
            .with_default(json!("latest")),
        ParamSpec::optional("exclude_atypical", ParamKind::Boolean, "Exclude atypical assemblies"),
        ParamSpec::optional(
            "exclude_multi_isolate",
            ParamKind::Boolean,
            "Exclude assemblies from multi-isolate projects",
        ),
        ParamSpec::optional("from_type", ParamKind::Boolean, "Only assemblies from type material"),
    ]
}

pub fn descriptors() -> Vec<ToolDescriptor> {
    let mut genome_params = vec![
        ParamSpec::required("organism", ParamKind::String, "Taxonomic name or NCBI Taxonomy ID"),
        ParamSpec::optional("reference", ParamKind::Boolean, "Only reference genomes"),
        ParamSpec::optional("annotated", ParamKind::Boolean, "Only annotated genomes"),
        ParamSpec::optional(
            "assembly_level",
            ParamKind::String,
            "Comma-separated levels: chromosome, complete, contig, scaffold",
        ),
        ParamSpec::optional("released_after", ParamKind::String, "Release date lower bound (YYYY-MM-DD)"),
        ParamSpec::optional("released_before", ParamKind::String, "Release date upper bound (YYYY-MM-DD)"),
        ParamSpec::optional("search", ParamKind::StringList, "Text filters on assembly metadata"),
        ParamSpec::optional("limit", ParamKind::Integer, "Maximum number of assemblies"),
        ParamSpec::optional("mag", ParamKind::String, "Metagenome-assembled genomes: all, only or exclude")
            .with_default(json!("all")),
        ParamSpec::optional(
            "tax_exact_match",
            ParamKind::Boolean,
            "Exclude sub-species when a species-level taxon is given",
        ),
    ];
    genome_params.extend(assembly_filter_params());

    let mut assembly_params = vec![ParamSpec::required(
        "accession",
        ParamKind::String,
        "Assembly accession (e.g. GCF_000001405.40)",
    )];
    assembly_params.extend(assembly_filter_params());

    vec![
        ToolDescriptor {
            name: "gene_info",
            description: "Look up a gene by NCBI Gene ID or by symbol and taxon",
            params: vec![
                ParamSpec::optional("gene_id", ParamKind::String, "NCBI Gene ID"),
                ParamSpec::optional("symbol", ParamKind::String, "Gene symbol (used when gene_id is absent)"),
                ParamSpec::optional("taxon", ParamKind::String, "Taxon for symbol lookups")
                    .with_default(json!(DEFAULT_TAXON)),
                ParamSpec::optional("report", ParamKind::String, "Report type: gene, product or ids_only"),
                ParamSpec::optional("limit", ParamKind::Integer, "Maximum number of genes"),
                ParamSpec::optional("ortholog", ParamKind::StringList, "Taxa to fetch orthologs for"),
            ],
        },
        ToolDescriptor {
            name: "genome_info",
            description: "List genome assemblies for an organism",
            params: genome_params,
        },
        ToolDescriptor {
            name: "genome_assembly",
            description: "Describe a single genome assembly by accession",
            params: assembly_params,
        },
    ]
}

pub fn resource() -> ResourceDescriptor {
    ResourceDescriptor {
        uri: "ncbi://datasets".to_string(),
        name: "NCBI Datasets CLI".to_string(),
        description: "Gene and genome metadata from the local datasets executable".to_string(),
        mime_type: "application/json".to_string(),
    }
}

pub fn register(registry: &mut ToolRegistry, cli: Arc<DatasetsCli>) -> Result<(), RegistryError> {
    for descriptor in descriptors() {
        let handler: Arc<dyn ToolHandler> = match descriptor.name {
            "gene_info" => Arc::new(GeneInfo(cli.clone())),
            "genome_info" => Arc::new(GenomeInfo(cli.clone())),
            _ => Arc::new(GenomeAssembly(cli.clone())),
        };
        registry.register(descriptor, handler)?;
    }
    registry.add_resource(resource());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gene_id_wins_over_symbol() {
        let args: GeneArgs = serde_json::from_value(json!({
            "gene_id": "672",
            "symbol": "BRCA1"
        }))
        .unwrap();

        assert_eq!(args.to_query().unwrap().target, GeneTarget::Id("672".to_string()));
    }

    #[test]
    fn symbol_lookup_defaults_to_human() {
        let args: GeneArgs = serde_json::from_value(json!({"symbol": "TP53"})).unwrap();

        assert_eq!(
            args.to_query().unwrap().target,
            GeneTarget::Symbol {
                symbol: "TP53".to_string(),
                taxon: "human".to_string()
            }
        );
    }

    #[test]
    fn gene_lookup_needs_an_id_or_symbol() {
        let args: GeneArgs = serde_json::from_value(json!({"gene_id": "  "})).unwrap();
        assert!(matches!(args.to_query(), Err(ToolError::InvalidParams(_))));
    }

    #[test]
    fn descriptors_declare_required_fields() {
        let descriptors = descriptors();
        let required = |name: &str| {
            descriptors
                .iter()
                .find(|d| d.name == name)
                .map(|d| d.input_schema()["required"].clone())
                .unwrap()
        };

        assert_eq!(required("gene_info"), json!([]));
        assert_eq!(required("genome_info"), json!(["organism"]));
        assert_eq!(required("genome_assembly"), json!(["accession"]));
    }
}

use async_trait::async_trait;
use ncbi_mcp_core::{
    normalize_links, normalize_search, normalize_summary, Pagination, QueryTerm, Record,
    SearchFilters,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

use super::{
    id_list, non_blank, parse_args, to_object, ParamKind, ParamSpec, ResourceDescriptor,
    RegistryError, ToolDescriptor, ToolError, ToolHandler, ToolRegistry,
};
use crate::providers::EutilsClient;

pub const DEFAULT_RETMAX: u64 = 20;
pub const DEFAULT_RETTYPE: &str = "gb";
pub const DEFAULT_RETMODE: &str = "xml";

fn default_retmax() -> u64 {
    DEFAULT_RETMAX
}

fn default_rettype() -> String {
    DEFAULT_RETTYPE.to_string()
}

fn default_retmode() -> String {
    DEFAULT_RETMODE.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchArgs {
    pub database: String,
    pub term: String,
    #[serde(default)]
    pub filters: SearchFilters,
    #[serde(default)]
    pub retstart: u64,
    #[serde(default = "default_retmax")]
    pub retmax: u64,
}

impl SearchArgs {
    pub fn new(database: &str, term: &str) -> Self {
        Self {
            database: database.to_string(),
            term: term.to_string(),
            filters: SearchFilters::default(),
            retstart: 0,
            retmax: DEFAULT_RETMAX,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub records: Vec<Record>,
    pub pagination: Pagination,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummaryArgs {
    pub database: String,
    pub ids: Vec<String>,
    #[serde(default)]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchArgs {
    pub database: String,
    pub ids: Vec<String>,
    #[serde(default = "default_rettype")]
    pub rettype: String,
    #[serde(default = "default_retmode")]
    pub retmode: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchedRecord {
    pub id: String,
    pub database: String,
    pub rettype: String,
    pub retmode: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkArgs {
    pub database: String,
    pub ids: Vec<String>,
    pub linkname: String,
}

pub async fn search(eutils: &EutilsClient, args: &SearchArgs) -> Result<SearchResult, ToolError> {
    let database = non_blank("database", &args.database)?;
    let term = QueryTerm::from_filters(&args.term, &args.filters)?;
    debug!(database, term = %term, "esearch");

    let raw = eutils
        .esearch(database, &term, args.retstart, args.retmax)
        .await?;
    let requested = Pagination {
        count: 0,
        retstart: args.retstart,
        retmax: args.retmax,
    };
    let page = normalize_search(&raw, requested)?;

    Ok(SearchResult {
        records: page.records,
        pagination: page.pagination,
        query: term.render(),
        translation: page.translation,
    })
}

pub async fn summary(eutils: &EutilsClient, args: &SummaryArgs) -> Result<Value, ToolError> {
    let database = non_blank("database", &args.database)?;
    let ids = id_list(&args.ids)?;

    let raw = eutils.esummary(database, &ids).await?;
    let records = normalize_summary(&raw, &args.fields)?;
    Ok(json!({ "records": records }))
}

pub async fn fetch(eutils: &EutilsClient, args: &FetchArgs) -> Result<Value, ToolError> {
    let database = non_blank("database", &args.database)?;
    let ids = id_list(&args.ids)?;
    let rettype = non_blank("rettype", &args.rettype)?;
    let retmode = non_blank("retmode", &args.retmode)?;

    let content = eutils.efetch(database, &ids, rettype, retmode).await?;
    to_object(&FetchedRecord {
        id: ids.join(","),
        database: database.to_string(),
        rettype: rettype.to_string(),
        retmode: retmode.to_string(),
        content,
    })
}

pub async fn link(eutils: &EutilsClient, args: &LinkArgs) -> Result<Value, ToolError> {
    let database = non_blank("database", &args.database)?;
    let ids = id_list(&args.ids)?;
    let linkname = non_blank("linkname", &args.linkname)?;

    let raw = eutils.elink(database, &ids, linkname).await?;
    let records = normalize_links(&raw)?;
    Ok(json!({ "records": records }))
}

struct Search(Arc<EutilsClient>);
struct Summary(Arc<EutilsClient>);
struct Fetch(Arc<EutilsClient>);
struct Link(Arc<EutilsClient>);

#[async_trait]
impl ToolHandler for Search {
    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        let args: SearchArgs = parse_args(&args)?;
        to_object(&search(&self.0, &args).await?)
    }
}

#[async_trait]
impl ToolHandler for Summary {
    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        summary(&self.0, &parse_args(&args)?).await
    }
}

#[async_trait]
impl ToolHandler for Fetch {
    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        fetch(&self.0, &parse_args(&args)?).await
    }
}

#[async_trait]
impl ToolHandler for Link {
    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        link(&self.0, &parse_args(&args)?).await
    }
}

fn database_param() -> ParamSpec {
    ParamSpec::required(
        "database",
        ParamKind::String,
        "Entrez database name (e.g. pubmed, gene, nuccore, protein, assembly)",
    )
}

fn ids_param() -> ParamSpec {
    ParamSpec::required("ids", ParamKind::StringList, "Entrez UIDs")
}

pub fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "ncbi_search",
            description: "Search an Entrez database and return matching UIDs with paging information",
            params: vec![
                database_param(),
                ParamSpec::required("term", ParamKind::String, "Entrez query term"),
                ParamSpec::optional(
                    "filters",
                    ParamKind::Object,
                    "Optional narrowing: {organism, date_range: {start, end}, field}. Dates are YYYY, YYYY/MM or YYYY/MM/DD",
                ),
                ParamSpec::optional("retstart", ParamKind::Integer, "Index of the first result")
                    .with_default(json!(0)),
                ParamSpec::optional("retmax", ParamKind::Integer, "Maximum number of results")
                    .with_default(json!(DEFAULT_RETMAX)),
            ],
        },
        ToolDescriptor {
            name: "ncbi_summary",
            description: "Fetch document summaries for Entrez UIDs as one record per UID",
            params: vec![
                database_param(),
                ids_param(),
                ParamSpec::optional(
                    "fields",
                    ParamKind::StringList,
                    "Summary fields to keep; every field is kept when empty",
                ),
            ],
        },
        ToolDescriptor {
            name: "ncbi_fetch",
            description: "Fetch full Entrez records as text in the requested format",
            params: vec![
                database_param(),
                ids_param(),
                ParamSpec::optional("rettype", ParamKind::String, "Record type (e.g. gb, fasta, abstract)")
                    .with_default(json!(DEFAULT_RETTYPE)),
                ParamSpec::optional("retmode", ParamKind::String, "Record format (e.g. xml, text)")
                    .with_default(json!(DEFAULT_RETMODE)),
            ],
        },
        ToolDescriptor {
            name: "ncbi_link",
            description: "Find records linked to Entrez UIDs through a named link (e.g. gene_pubmed)",
            params: vec![
                database_param(),
                ids_param(),
                ParamSpec::required("linkname", ParamKind::String, "Entrez link name"),
            ],
        },
    ]
}

pub fn resource() -> ResourceDescriptor {
    ResourceDescriptor {
        uri: "ncbi://eutils".to_string(),
        name: "NCBI E-utilities".to_string(),
        description: "Entrez search, summary, fetch and link over HTTP".to_string(),
        mime_type: "application/json".to_string(),
    }
}

pub fn register(registry: &mut ToolRegistry, eutils: Arc<EutilsClient>) -> Result<(), RegistryError> {
    for descriptor in descriptors() {
        let handler: Arc<dyn ToolHandler> = match descriptor.name {
            "ncbi_search" => Arc::new(Search(eutils.clone())),
            "ncbi_summary" => Arc::new(Summary(eutils.clone())),
            "ncbi_fetch" => Arc::new(Fetch(eutils.clone())),
            _ => Arc::new(Link(eutils.clone())),
        };
        registry.register(descriptor, handler)?;
    }
    registry.add_resource(resource());
    Ok(())
}

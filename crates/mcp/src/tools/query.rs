//! `ncbi_query`: routes a plain-English question to one of the other tools.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

use super::datasets::{gene_info, genome_info, GeneArgs};
use super::eutils::{search, summary, SearchArgs, SummaryArgs, DEFAULT_RETMAX};
use super::{
    parse_args, to_object, ParamKind, ParamSpec, RegistryError, ToolDescriptor, ToolError,
    ToolHandler, ToolRegistry,
};
use crate::providers::{GenomeQuery, Providers};

const LITERATURE_CUES: &[&str] = &["article", "paper", "research", "publication", "pubmed"];
const GENE_CUES: &[&str] = &["gene"];
const DETAIL_CUES: &[&str] = &["information", "details"];
const GENOME_CUES: &[&str] = &["genome", "species", "organism"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Literature,
    GeneDetails,
    GeneSearch,
    Genome,
}

impl Intent {
    fn fillers(self) -> &'static [&'static str] {
        match self {
            Intent::Literature => &[
                "find", "search", "show", "me", "the", "research", "articles", "article", "papers",
                "paper", "publications", "publication", "pubmed", "about", "on", "for",
            ],
            Intent::GeneDetails => &[
                "get", "find", "show", "me", "the", "gene", "genes", "information", "info",
                "details", "about", "for", "on", "of",
            ],
            Intent::GeneSearch => &["find", "search", "show", "me", "the", "gene", "genes", "for"],
            Intent::Genome => &[
                "get", "find", "show", "me", "the", "genome", "genomes", "information", "about",
                "for", "of", "organism", "organisms", "species",
            ],
        }
    }
}

/// Picks an intent from cue words. Literature cues win over gene cues, which
/// win over genome cues; anything else is treated as a literature search.
pub fn classify(query: &str) -> Intent {
    let lowered = query.to_lowercase();
    let mentions = |cues: &[&str]| cues.iter().any(|cue| lowered.contains(cue));

    if mentions(LITERATURE_CUES) {
        Intent::Literature
    } else if mentions(GENE_CUES) {
        if mentions(DETAIL_CUES) {
            Intent::GeneDetails
        } else {
            Intent::GeneSearch
        }
    } else if mentions(GENOME_CUES) {
        Intent::Genome
    } else {
        Intent::Literature
    }
}

/// Removes the intent's filler words, whole words only. Surviving words are
/// kept exactly as typed so Entrez syntax like `BRCA1[sym]` or quotes passes
/// through; punctuation is ignored only when matching fillers.
pub fn search_term(query: &str, intent: Intent) -> String {
    let fillers = intent.fillers();

    query
        .split_whitespace()
        .filter(|word| {
            let bare = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            !bare.is_empty() && !fillers.contains(&bare.as_str())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Deserialize)]
struct QueryArgs {
    query: String,
}

pub struct QueryRouter {
    providers: Providers,
}

impl QueryRouter {
    pub fn new(providers: Providers) -> Self {
        Self { providers }
    }

    pub async fn answer(&self, query: &str) -> Result<Value, ToolError> {
        let intent = classify(query);
        let term = search_term(query, intent);
        if term.is_empty() {
            return Err(ToolError::InvalidParams(format!(
                "no search term left in query `{}`",
                query.trim()
            )));
        }
        debug!(?intent, term = %term, "routing query");

        let result = match intent {
            Intent::Literature => self.search("pubmed", &term).await?,
            Intent::GeneSearch => self.search("gene", &term).await?,
            Intent::GeneDetails => self.gene_details(&term).await?,
            Intent::Genome => self.genome(&term).await?,
        };

        Ok(json!({
            "intent": intent,
            "term": term,
            "result": result
        }))
    }

    async fn search(&self, database: &str, term: &str) -> Result<Value, ToolError> {
        to_object(&search(&self.providers.eutils, &SearchArgs::new(database, term)).await?)
    }

    /// Resolves the term to a gene id, then describes the first hit. Without
    /// a hit the search page itself is the answer.
    async fn gene_details(&self, term: &str) -> Result<Value, ToolError> {
        let hits = search(&self.providers.eutils, &SearchArgs::new("gene", term)).await?;
        let first = hits
            .records
            .first()
            .and_then(|record| record.get("id"))
            .and_then(Value::as_str);

        let Some(gene_id) = first else {
            return to_object(&hits);
        };

        match &self.providers.datasets {
            Some(cli) => to_object(&gene_info(cli, &GeneArgs::by_id(gene_id)).await?),
            None => {
                let args = SummaryArgs {
                    database: "gene".to_string(),
                    ids: vec![gene_id.to_string()],
                    fields: Vec::new(),
                };
                summary(&self.providers.eutils, &args).await
            }
        }
    }

    async fn genome(&self, organism: &str) -> Result<Value, ToolError> {
        match &self.providers.datasets {
            Some(cli) => {
                let query = GenomeQuery {
                    limit: Some(DEFAULT_RETMAX as u32),
                    ..GenomeQuery::new(organism)
                };
                let records = genome_info(cli, &query).await?;
                Ok(json!({ "records": records }))
            }
            None => self.search("assembly", organism).await,
        }
    }
}

#[async_trait]
impl ToolHandler for QueryRouter {
    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        let args: QueryArgs = parse_args(&args)?;
        self.answer(&args.query).await
    }
}

pub fn descriptor() -> ToolDescriptor {
    ToolDescriptor {
        name: "ncbi_query",
        description: "Answer a natural-language question by routing it to PubMed, gene or genome lookups",
        params: vec![ParamSpec::required(
            "query",
            ParamKind::String,
            "Question such as \"find research articles about CRISPR\" or \"get gene information for BRCA1\"",
        )],
    }
}

pub fn register(registry: &mut ToolRegistry, providers: Providers) -> Result<(), RegistryError> {
    registry.register(descriptor(), Arc::new(QueryRouter::new(providers)))
}

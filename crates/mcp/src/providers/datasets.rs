use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tracing::debug;

use super::{verify_invocable, ProcessRunner, ProviderError};

static RELEASE_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

const VERSION_PROBE: &str = "--version";
const API_KEY_FLAG: &str = "--api-key";

const ASSEMBLY_LEVELS: &[&str] = &["chromosome", "complete", "contig", "scaffold"];
const ASSEMBLY_SOURCES: &[&str] = &["RefSeq", "GenBank", "all"];
const ASSEMBLY_VERSIONS: &[&str] = &["latest", "all"];
const MAG_FILTERS: &[&str] = &["all", "only", "exclude"];
const GENOME_REPORTS: &[&str] = &["genome", "sequence", "ids_only"];
const GENE_REPORTS: &[&str] = &["gene", "product", "ids_only"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("invalid {field} `{value}` (expected {expected})")]
    Invalid {
        field: &'static str,
        value: String,
        expected: String,
    },
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

fn one_of(field: &'static str, value: &str, allowed: &[&str]) -> Result<(), FilterError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(FilterError::Invalid {
            field,
            value: value.to_string(),
            expected: format!("one of {}", allowed.join(", ")),
        })
    }
}

fn release_date(field: &'static str, value: &str) -> Result<(), FilterError> {
    if RELEASE_DATE_RE.is_match(value) {
        Ok(())
    } else {
        Err(FilterError::Invalid {
            field,
            value: value.to_string(),
            expected: "YYYY-MM-DD".to_string(),
        })
    }
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, FilterError> {
    let value = value.trim();
    if value.is_empty() {
        Err(FilterError::Empty(field))
    } else {
        Ok(value)
    }
}

fn push_flag(args: &mut Vec<String>, enabled: bool, flag: &str) {
    if enabled {
        args.push(flag.to_string());
    }
}

fn push_value(args: &mut Vec<String>, flag: &str, value: impl Into<String>) {
    args.push(flag.to_string());
    args.push(value.into());
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneTarget {
    Id(String),
    Symbol { symbol: String, taxon: String },
}

impl GeneTarget {
    /// The string the gene tie-break compares symbols against, when the
    /// lookup itself names one.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            GeneTarget::Id(_) => None,
            GeneTarget::Symbol { symbol, .. } => Some(symbol.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneQuery {
    pub target: GeneTarget,
    pub report: Option<String>,
    pub limit: Option<u32>,
    pub ortholog: Vec<String>,
}

impl GeneQuery {
    pub fn new(target: GeneTarget) -> Self {
        Self {
            target,
            report: None,
            limit: None,
            ortholog: Vec::new(),
        }
    }

    pub fn args(&self) -> Result<Vec<String>, FilterError> {
        let mut args = vec!["summary".to_string(), "gene".to_string()];

        match &self.target {
            GeneTarget::Id(id) => {
                args.push("gene-id".to_string());
                args.push(required("gene_id", id)?.to_string());
            }
            GeneTarget::Symbol { symbol, taxon } => {
                args.push("symbol".to_string());
                args.push(required("symbol", symbol)?.to_string());
                push_value(&mut args, "--taxon", required("taxon", taxon)?);
            }
        }

        if let Some(report) = &self.report {
            one_of("report", report, GENE_REPORTS)?;
            push_value(&mut args, "--report", report);
        }
        if let Some(limit) = self.limit {
            push_value(&mut args, "--limit", limit.to_string());
        }
        for taxon in &self.ortholog {
            push_value(&mut args, "--ortholog", required("ortholog", taxon)?);
        }

        Ok(args)
    }
}

/// Filters shared by taxon-wide genome summaries and accession lookups.
/// Values equal to the CLI's own defaults emit no flag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AssemblyFilters {
    pub report: Option<String>,
    pub assembly_source: Option<String>,
    pub assembly_version: Option<String>,
    pub exclude_atypical: bool,
    pub exclude_multi_isolate: bool,
    pub from_type: bool,
}

impl AssemblyFilters {
    fn push_args(&self, args: &mut Vec<String>) -> Result<(), FilterError> {
        if let Some(report) = &self.report {
            one_of("report", report, GENOME_REPORTS)?;
            if report != "genome" {
                push_value(args, "--report", report);
            }
        }
        if let Some(source) = &self.assembly_source {
            one_of("assembly_source", source, ASSEMBLY_SOURCES)?;
            if source != "all" {
                push_value(args, "--assembly-source", source);
            }
        }
        if let Some(version) = &self.assembly_version {
            one_of("assembly_version", version, ASSEMBLY_VERSIONS)?;
            if version != "latest" {
                push_value(args, "--assembly-version", version);
            }
        }
        push_flag(args, self.exclude_atypical, "--exclude-atypical");
        push_flag(args, self.exclude_multi_isolate, "--exclude-multi-isolate");
        push_flag(args, self.from_type, "--from-type");
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GenomeQuery {
    pub organism: String,
    pub reference: bool,
    pub annotated: bool,
    /// Comma-separated subset of chromosome, complete, contig, scaffold.
    pub assembly_level: Option<String>,
    pub released_after: Option<String>,
    pub released_before: Option<String>,
    pub search: Vec<String>,
    pub limit: Option<u32>,
    pub mag: Option<String>,
    pub tax_exact_match: bool,
    #[serde(flatten)]
    pub filters: AssemblyFilters,
}

impl GenomeQuery {
    pub fn new(organism: &str) -> Self {
        Self {
            organism: organism.to_string(),
            ..Self::default()
        }
    }

    pub fn args(&self) -> Result<Vec<String>, FilterError> {
        let mut args = vec![
            "summary".to_string(),
            "genome".to_string(),
            "taxon".to_string(),
            required("organism", &self.organism)?.to_string(),
        ];

        push_flag(&mut args, self.reference, "--reference");
        push_flag(&mut args, self.annotated, "--annotated");

        if let Some(levels) = &self.assembly_level {
            let levels = levels
                .split(',')
                .map(str::trim)
                .filter(|level| !level.is_empty())
                .collect::<Vec<_>>();
            if levels.is_empty() {
                return Err(FilterError::Empty("assembly_level"));
            }
            for level in &levels {
                one_of("assembly_level", level, ASSEMBLY_LEVELS)?;
            }
            push_value(&mut args, "--assembly-level", levels.join(","));
        }
        if let Some(after) = &self.released_after {
            release_date("released_after", after)?;
            push_value(&mut args, "--released-after", after);
        }
        if let Some(before) = &self.released_before {
            release_date("released_before", before)?;
            push_value(&mut args, "--released-before", before);
        }
        for term in &self.search {
            push_value(&mut args, "--search", required("search", term)?);
        }

        self.filters.push_args(&mut args)?;

        if let Some(limit) = self.limit {
            push_value(&mut args, "--limit", limit.to_string());
        }
        if let Some(mag) = &self.mag {
            one_of("mag", mag, MAG_FILTERS)?;
            if mag != "all" {
                push_value(&mut args, "--mag", mag);
            }
        }
        push_flag(&mut args, self.tax_exact_match, "--tax-exact-match");

        Ok(args)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AssemblyQuery {
    pub accession: String,
    #[serde(flatten)]
    pub filters: AssemblyFilters,
}

impl AssemblyQuery {
    pub fn args(&self) -> Result<Vec<String>, FilterError> {
        let mut args = vec![
            "summary".to_string(),
            "genome".to_string(),
            "accession".to_string(),
            required("accession", &self.accession)?.to_string(),
        ];
        self.filters.push_args(&mut args)?;
        Ok(args)
    }
}

/// Adapter for the NCBI `datasets` command-line tool. Construction checks the
/// executable before any tool can reach it.
pub struct DatasetsCli {
    program: PathBuf,
    api_key: Option<String>,
    runner: Arc<dyn ProcessRunner>,
}

impl std::fmt::Debug for DatasetsCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetsCli")
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

impl DatasetsCli {
    pub async fn new(
        program: PathBuf,
        api_key: Option<String>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Result<Self, ProviderError> {
        verify_invocable(runner.as_ref(), &program, Some(VERSION_PROBE)).await?;
        Ok(Self {
            program,
            api_key,
            runner,
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Runs `datasets` with already-validated arguments and parses stdout as
    /// JSON.
    pub async fn run_json(&self, mut args: Vec<String>) -> Result<Value, ProviderError> {
        if let Some(key) = &self.api_key {
            push_value(&mut args, API_KEY_FLAG, key.as_str());
        }

        let program = self.program.display().to_string();
        debug!(program, args = %redacted(&args).join(" "), "running datasets");

        let output = self.runner.run(&self.program, &args).await?;
        if !output.success() {
            return Err(ProviderError::Exit {
                program,
                status: output.status_text(),
                stderr: output.stderr.trim().to_string(),
            });
        }

        serde_json::from_str(&output.stdout).map_err(|e| ProviderError::Decode {
            origin: program,
            message: e.to_string(),
        })
    }
}

fn redacted(args: &[String]) -> Vec<&str> {
    let mut out = Vec::with_capacity(args.len());
    let mut hide_next = false;
    for arg in args {
        if hide_next {
            out.push("***");
            hide_next = false;
        } else {
            hide_next = arg == API_KEY_FLAG;
            out.push(arg.as_str());
        }
    }
    out
}

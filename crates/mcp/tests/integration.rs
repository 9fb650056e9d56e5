use async_trait::async_trait;
use ncbi_mcp::providers::{
    DatasetsCli, EutilsClient, EutilsConfig, HttpGet, HttpReply, ProcessOutput, ProcessRunner,
    ProviderError, Providers,
};
use ncbi_mcp::transport::{
    INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
};
use ncbi_mcp::{build_registry, McpServer, Strictness};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Serves canned bodies keyed by E-utilities endpoint and records every URL.
#[derive(Default)]
struct StubHttp {
    routes: Vec<(&'static str, u16, String)>,
    urls: Mutex<Vec<String>>,
}

impl StubHttp {
    fn route(mut self, endpoint: &'static str, status: u16, body: Value) -> Self {
        let body = match body {
            Value::String(text) => text,
            other => other.to_string(),
        };
        self.routes.push((endpoint, status, body));
        self
    }

    fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpGet for StubHttp {
    async fn get(&self, url: &str) -> Result<HttpReply, ProviderError> {
        self.urls.lock().unwrap().push(url.to_string());
        let reply = self
            .routes
            .iter()
            .find(|(endpoint, _, _)| url.contains(&format!("/{}.fcgi", endpoint)))
            .map(|(_, status, body)| HttpReply {
                status: *status,
                body: body.clone(),
            })
            .unwrap_or(HttpReply {
                status: 404,
                body: String::new(),
            });
        Ok(reply)
    }
}

/// Stands in for the `datasets` executable: answers `--version`, then
/// returns canned JSON for gene and genome summaries.
struct StubCli {
    gene: Value,
    genome: Value,
    calls: Mutex<Vec<Vec<String>>>,
}

impl StubCli {
    fn new(gene: Value, genome: Value) -> Self {
        Self {
            gene,
            genome,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ProcessRunner for StubCli {
    async fn run(&self, _program: &Path, args: &[String]) -> Result<ProcessOutput, ProviderError> {
        self.calls.lock().unwrap().push(args.to_vec());
        let stdout = match args.get(1).map(String::as_str) {
            _ if args.first().map(String::as_str) == Some("--version") => {
                "datasets version: 16.22.1".to_string()
            }
            Some("gene") => self.gene.to_string(),
            Some("genome") => self.genome.to_string(),
            _ => return Ok(ProcessOutput {
                code: Some(1),
                stdout: String::new(),
                stderr: "unknown command".to_string(),
            }),
        };
        Ok(ProcessOutput {
            code: Some(0),
            stdout,
            stderr: String::new(),
        })
    }
}

fn providers(http: Arc<StubHttp>, datasets: Option<Arc<DatasetsCli>>) -> Providers {
    Providers {
        eutils: Arc::new(EutilsClient::new(EutilsConfig::default(), http)),
        datasets,
    }
}

fn server(providers: &Providers) -> McpServer {
    let registry = build_registry(providers).unwrap();
    McpServer::new(Arc::new(registry), Strictness::Strict)
}

fn eutils_server(http: StubHttp) -> (McpServer, Arc<StubHttp>) {
    let http = Arc::new(http);
    (server(&providers(http.clone(), None)), http)
}

fn request(id: i64, method: &str, params: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params
    })
    .to_string()
}

fn tool_call(id: i64, name: &str, arguments: Value) -> String {
    request(id, "tools/call", json!({ "name": name, "arguments": arguments }))
}

async fn send(server: &McpServer, line: &str) -> Value {
    let output = server.handle_line(line).await.expect("expected a response line");
    serde_json::from_str(&output).unwrap()
}

fn tool_names(response: &Value) -> Vec<String> {
    response["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tool| tool["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn initialize_returns_server_info() {
    let (server, _) = eutils_server(StubHttp::default());

    let response = send(&server, &request(1, "initialize", json!({}))).await;

    assert_eq!(response["jsonrpc"], "2.0");
    assert_eq!(response["id"], 1);
    assert_eq!(response["result"]["serverInfo"]["name"], "ncbi-mcp");
    assert!(response["result"]["protocolVersion"].is_string());
    assert!(response.get("error").is_none());
}

#[tokio::test]
async fn without_datasets_only_http_tools_are_listed() {
    let (server, _) = eutils_server(StubHttp::default());

    let tools = send(&server, &request(1, "tools/list", json!({}))).await;
    assert_eq!(
        tool_names(&tools),
        vec!["ncbi_search", "ncbi_summary", "ncbi_fetch", "ncbi_link", "ncbi_query"]
    );
    for tool in tools["result"]["tools"].as_array().unwrap() {
        assert_eq!(tool["inputSchema"]["type"], "object");
    }

    let resources = send(&server, &request(2, "resources/list", json!({}))).await;
    assert_eq!(
        resources["result"]["resources"],
        json!([{
            "uri": "ncbi://eutils",
            "name": "NCBI E-utilities",
            "description": "Entrez search, summary, fetch and link over HTTP",
            "mimeType": "application/json"
        }])
    );
}

#[tokio::test]
async fn summary_keeps_requested_fields_in_uid_order() {
    let (server, _) = eutils_server(StubHttp::default().route(
        "esummary",
        200,
        json!({"result": {"uids": ["1", "2"], "1": {"title": "A", "x": 1}, "2": {"title": "B"}}}),
    ));

    let response = send(
        &server,
        &tool_call(7, "ncbi_summary", json!({"database": "pubmed", "ids": ["1", "2"], "fields": ["title"]})),
    )
    .await;

    assert_eq!(response["id"], 7);
    assert_eq!(
        response["result"]["structuredContent"]["records"],
        json!([{"id": "1", "title": "A"}, {"id": "2", "title": "B"}])
    );
}

#[tokio::test]
async fn search_composes_filters_into_the_term() {
    let (server, http) = eutils_server(StubHttp::default().route(
        "esearch",
        200,
        json!({"esearchresult": {"count": "120", "retstart": "10", "retmax": "2", "idlist": ["11", "12"]}}),
    ));

    let response = send(
        &server,
        &tool_call(
            1,
            "ncbi_search",
            json!({
                "database": "pubmed",
                "term": "CRISPR",
                "filters": {
                    "organism": "Mus musculus",
                    "date_range": {"start": "2020", "end": "2023/06"},
                    "field": "Title"
                },
                "retstart": 10,
                "retmax": 2
            }),
        ),
    )
    .await;

    let result = &response["result"]["structuredContent"];
    assert_eq!(
        result["query"],
        "CRISPR[Title] AND Mus musculus[Organism] AND 2020:2023/06[Date - Publication]"
    );
    assert_eq!(result["pagination"], json!({"count": 120, "retstart": 10, "retmax": 2}));
    assert_eq!(result["records"], json!([{"id": "11"}, {"id": "12"}]));
    assert!(http.urls()[0].contains("retstart=10&retmax=2"));
}

#[tokio::test]
async fn fetch_returns_text_content() {
    let (server, _) = eutils_server(StubHttp::default().route(
        "efetch",
        200,
        json!("LOCUS       NM_007294"),
    ));

    let response = send(
        &server,
        &tool_call(1, "ncbi_fetch", json!({"database": "nuccore", "ids": ["NM_007294"], "rettype": "fasta"})),
    )
    .await;

    let record = &response["result"]["structuredContent"];
    assert_eq!(record["id"], "NM_007294");
    assert_eq!(record["rettype"], "fasta");
    assert_eq!(record["retmode"], "xml");
    assert_eq!(record["content"], "LOCUS       NM_007294");
}

#[tokio::test]
async fn link_flattens_linksets() {
    let (server, _) = eutils_server(StubHttp::default().route(
        "elink",
        200,
        json!({"linksets": [{
            "dbfrom": "gene",
            "ids": ["672"],
            "linksetdbs": [{"dbto": "pubmed", "linkname": "gene_pubmed", "links": ["100", "200"]}]
        }]}),
    ));

    let response = send(
        &server,
        &tool_call(1, "ncbi_link", json!({"database": "gene", "ids": ["672"], "linkname": "gene_pubmed"})),
    )
    .await;

    assert_eq!(
        response["result"]["structuredContent"]["records"],
        json!([{
            "id": "672",
            "dbfrom": "gene",
            "dbto": "pubmed",
            "linkname": "gene_pubmed",
            "links": ["100", "200"]
        }])
    );
}

#[tokio::test]
async fn tool_errors_map_to_protocol_codes() {
    let (server, _) = eutils_server(StubHttp::default().route("esummary", 500, json!("oops")));

    let unknown = send(&server, &tool_call(1, "gene_info", json!({"symbol": "BRCA1"}))).await;
    assert_eq!(unknown["error"]["code"], METHOD_NOT_FOUND);
    assert!(unknown.get("result").is_none());

    let missing = send(&server, &tool_call(2, "ncbi_summary", json!({"database": "gene"}))).await;
    assert_eq!(missing["error"]["code"], INVALID_PARAMS);
    assert_eq!(missing["id"], 2);

    let upstream = send(
        &server,
        &tool_call(3, "ncbi_summary", json!({"database": "gene", "ids": ["1"]})),
    )
    .await;
    assert_eq!(upstream["error"]["code"], INTERNAL_ERROR);
    assert!(upstream["error"]["message"].as_str().unwrap().contains("500"));
}

#[tokio::test]
async fn unknown_method_and_malformed_input() {
    let (server, _) = eutils_server(StubHttp::default());

    let unknown = send(&server, &request(9, "tools/destroy", json!({}))).await;
    assert_eq!(unknown["id"], 9);
    assert_eq!(unknown["error"]["code"], METHOD_NOT_FOUND);
    assert!(unknown.get("result").is_none());

    let parse = send(&server, "{\"jsonrpc\": ").await;
    assert_eq!(parse["error"]["code"], PARSE_ERROR);
    assert_eq!(parse["id"], Value::Null);

    let no_marker = send(&server, r#"{"id":4,"method":"ping"}"#).await;
    assert_eq!(no_marker["error"]["code"], INVALID_REQUEST);
    assert_eq!(no_marker["id"], 4);

    let positional = send(&server, r#"{"jsonrpc":"2.0","id":5,"method":"ping","params":[1]}"#).await;
    assert_eq!(positional["error"]["code"], INVALID_PARAMS);
}

#[tokio::test]
async fn lenient_server_accepts_a_missing_marker() {
    let http = Arc::new(StubHttp::default());
    let registry = build_registry(&providers(http, None)).unwrap();
    let server = McpServer::new(Arc::new(registry), Strictness::Lenient);

    let ok = send(&server, r#"{"id":"p","method":"ping"}"#).await;
    assert_eq!(ok["result"], json!({}));

    let wrong = send(&server, r#"{"jsonrpc":"1.0","id":"q","method":"ping"}"#).await;
    assert_eq!(wrong["error"]["code"], INVALID_REQUEST);
}

#[tokio::test]
async fn batch_answers_in_order_without_notifications() {
    let (server, _) = eutils_server(StubHttp::default().route(
        "esummary",
        200,
        json!({"result": {"uids": ["5"], "5": {"name": "X"}}}),
    ));

    let batch = json!([
        {"jsonrpc": "2.0", "id": "first", "method": "ping"},
        {"jsonrpc": "2.0", "method": "notifications/initialized"},
        {"jsonrpc": "2.0", "id": 2, "method": "ncbi_summary", "params": {"database": "gene", "ids": ["5"]}},
        {"jsonrpc": "2.0", "method": "ncbi_summary", "params": {"database": "gene", "ids": ["5"]}},
        {"jsonrpc": "2.0", "id": 3, "method": "nope"}
    ]);

    let response = send(&server, &batch.to_string()).await;
    let responses = response.as_array().unwrap();

    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0]["id"], "first");
    assert_eq!(responses[1]["result"]["records"], json!([{"id": "5", "name": "X"}]));
    assert_eq!(responses[2]["error"]["code"], METHOD_NOT_FOUND);
}

#[tokio::test]
async fn notification_only_batch_is_silent() {
    let (server, _) = eutils_server(StubHttp::default());

    let output = server
        .handle_line(r#"[{"jsonrpc":"2.0","method":"ping"},{"jsonrpc":"2.0","method":"notifications/initialized"}]"#)
        .await;
    assert!(output.is_none());
    assert!(server
        .handle_line(r#"{"jsonrpc":"2.0","method":"ncbi_search","params":{}}"#)
        .await
        .is_none());
}

#[tokio::test]
async fn query_falls_back_to_http_without_datasets() {
    let (server, http) = eutils_server(
        StubHttp::default()
            .route("esearch", 200, json!({"esearchresult": {"count": "1", "idlist": ["672"]}}))
            .route("esummary", 200, json!({"result": {"uids": ["672"], "672": {"name": "BRCA1"}}})),
    );

    let details = send(
        &server,
        &tool_call(1, "ncbi_query", json!({"query": "get gene information for BRCA1"})),
    )
    .await;
    let result = &details["result"]["structuredContent"];
    assert_eq!(result["intent"], "gene_details");
    assert_eq!(result["term"], "BRCA1");
    assert_eq!(result["result"]["records"], json!([{"id": "672", "name": "BRCA1"}]));

    let genome = send(
        &server,
        &tool_call(2, "ncbi_query", json!({"query": "genome of Escherichia coli"})),
    )
    .await;
    assert_eq!(genome["result"]["structuredContent"]["intent"], "genome");
    assert!(http.urls().last().unwrap().contains("db=assembly"));

    let empty = send(&server, &tool_call(3, "ncbi_query", json!({"query": "find the gene"}))).await;
    assert_eq!(empty["error"]["code"], INVALID_PARAMS);
}

#[cfg(unix)]
mod with_datasets {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn executable(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("datasets");
        fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn gene(id: &str, symbol: &str, synonyms: &[&str]) -> Value {
        json!({
            "gene": {
                "gene_id": id,
                "symbol": symbol,
                "synonyms": synonyms,
                "description": format!("{} DNA repair associated", symbol),
                "type": "PROTEIN_CODING",
                "chromosomes": ["17"],
                "annotations": [{"genomic_locations": [{"sequence_name": "17q21.31"}]}],
                "summary": [{"description": "Part one."}, {"description": "Part two."}]
            }
        })
    }

    async fn datasets_server(cli: StubCli, http: StubHttp) -> (McpServer, Arc<StubCli>, TempDir) {
        let dir = TempDir::new().unwrap();
        let cli = Arc::new(cli);
        let datasets = DatasetsCli::new(executable(&dir), None, cli.clone())
            .await
            .unwrap();
        let server = server(&providers(Arc::new(http), Some(Arc::new(datasets))));
        (server, cli, dir)
    }

    #[tokio::test]
    async fn datasets_tools_and_resource_are_registered() {
        let (server, _, _dir) =
            datasets_server(StubCli::new(json!({}), json!({})), StubHttp::default()).await;

        let tools = send(&server, &request(1, "tools/list", json!({}))).await;
        assert_eq!(
            tool_names(&tools),
            vec![
                "ncbi_search",
                "ncbi_summary",
                "ncbi_fetch",
                "ncbi_link",
                "gene_info",
                "genome_info",
                "genome_assembly",
                "ncbi_query"
            ]
        );

        let resources = send(&server, &request(2, "resources/list", json!({}))).await;
        let uris: Vec<_> = resources["result"]["resources"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["uri"].clone())
            .collect();
        assert_eq!(uris, vec![json!("ncbi://eutils"), json!("ncbi://datasets")]);
    }

    #[tokio::test]
    async fn gene_info_prefers_the_exact_symbol() {
        let reports = json!({"reports": [gene("675", "BRCA2", &["FANCD1"]), gene("672", "BRCA1", &["RNF53"])]});
        let (server, cli, _dir) = datasets_server(StubCli::new(reports, json!({})), StubHttp::default()).await;

        let response = send(&server, &tool_call(1, "gene_info", json!({"symbol": "BRCA1"}))).await;

        assert_eq!(
            response["result"]["structuredContent"],
            json!({
                "id": "672",
                "name": "BRCA1",
                "description": "BRCA1 DNA repair associated",
                "chromosome": "17",
                "map_location": "17q21.31",
                "type": "PROTEIN_CODING",
                "summary": "Part one. Part two."
            })
        );
        let calls = cli.calls.lock().unwrap();
        assert_eq!(
            calls.last().unwrap(),
            &vec!["summary", "gene", "symbol", "BRCA1", "--taxon", "human"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn gene_info_without_any_gene_is_a_placeholder() {
        let reports = json!({"reports": [{"query": ["BRCA1"], "warnings": []}]});
        let (server, _, _dir) = datasets_server(StubCli::new(reports, json!({})), StubHttp::default()).await;

        let response = send(&server, &tool_call(1, "gene_info", json!({"gene_id": "672"}))).await;

        assert_eq!(
            response["result"]["structuredContent"],
            json!({
                "id": "Unknown",
                "name": "Unknown",
                "description": "No description available",
                "chromosome": "Unknown",
                "map_location": "Unknown",
                "type": "Unknown",
                "summary": "No summary available"
            })
        );
    }

    #[tokio::test]
    async fn genome_tools_normalize_reports() {
        let reports = json!({"reports": [{
            "accession": "GCF_000001405.40",
            "organism": {"organism_name": "Homo sapiens", "tax_id": 9606},
            "assembly_info": {
                "assembly_name": "GRCh38.p14",
                "assembly_level": "Chromosome",
                "release_date": "2022-02-03",
                "refseq_category": "reference genome"
            },
            "assembly_stats": {"total_sequence_length": "3099441038"}
        }]});
        let (server, _, _dir) = datasets_server(StubCli::new(json!({}), reports), StubHttp::default()).await;

        let listed = send(
            &server,
            &tool_call(1, "genome_info", json!({"organism": "human", "reference": true})),
        )
        .await;
        let records = listed["result"]["structuredContent"]["records"].as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["id"], "GCF_000001405.40");

        let single = send(
            &server,
            &tool_call(2, "genome_assembly", json!({"accession": "GCF_000001405.40"})),
        )
        .await;
        assert_eq!(single["result"]["structuredContent"]["id"], "GCF_000001405.40");
    }

    #[tokio::test]
    async fn empty_assembly_lookup_is_a_provider_error() {
        let (server, _, _dir) =
            datasets_server(StubCli::new(json!({}), json!({"total_count": 0})), StubHttp::default()).await;

        let response = send(
            &server,
            &tool_call(1, "genome_assembly", json!({"accession": "GCF_404"})),
        )
        .await;
        assert_eq!(response["error"]["code"], INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn bad_filters_are_invalid_params() {
        let (server, cli, _dir) =
            datasets_server(StubCli::new(json!({}), json!({})), StubHttp::default()).await;

        let response = send(
            &server,
            &tool_call(1, "genome_info", json!({"organism": "human", "released_after": "02/03/2022"})),
        )
        .await;

        assert_eq!(response["error"]["code"], INVALID_PARAMS);
        assert_eq!(cli.calls.lock().unwrap().len(), 1, "only the version probe ran");
    }

    #[tokio::test]
    async fn query_describes_the_first_gene_hit() {
        let http = StubHttp::default().route(
            "esearch",
            200,
            json!({"esearchresult": {"count": "2", "idlist": ["672", "675"]}}),
        );
        let reports = json!({"reports": [gene("672", "BRCA1", &[])]});
        let (server, cli, _dir) = datasets_server(StubCli::new(reports, json!({})), http).await;

        let response = send(
            &server,
            &tool_call(1, "ncbi_query", json!({"query": "BRCA1 gene details"})),
        )
        .await;

        let result = &response["result"]["structuredContent"];
        assert_eq!(result["intent"], "gene_details");
        assert_eq!(result["result"]["name"], "BRCA1");
        let calls = cli.calls.lock().unwrap();
        assert_eq!(calls.last().unwrap()[2..4], ["gene-id".to_string(), "672".to_string()]);
    }

    #[tokio::test]
    async fn missing_executable_fails_construction() {
        let dir = TempDir::new().unwrap();
        let cli = Arc::new(StubCli::new(json!({}), json!({})));

        let err = DatasetsCli::new(dir.path().join("datasets"), None, cli.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::ExecutableNotFound(_)));
        assert!(cli.calls.lock().unwrap().is_empty());
    }
}

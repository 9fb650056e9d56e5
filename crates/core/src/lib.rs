pub mod gene;
pub mod genome;
pub mod link;
pub mod query;
pub mod record;
pub mod search;
pub mod summary;

pub use gene::{normalize_gene, select_gene, GeneRecord, NO_DESCRIPTION, NO_SUMMARY};
pub use genome::{normalize_genomes, AssemblyRecord};
pub use link::normalize_links;
pub use query::{DateRange, QueryError, QueryTerm, SearchFilters};
pub use record::{NormalizeError, Record, UNKNOWN};
pub use search::{normalize_search, Pagination, SearchPage};
pub use summary::{normalize_summary, UIDS_KEY};

//! Paginated search queries.
//!
//! [`QueryEngine`] drives a [`SearchTransport`] page by page, melting every
//! returned issue with a registry built from the caller's field list.

pub mod paginate;
pub mod transport;

pub use paginate::{QueryEngine, QueryOptions, QueryOutcome, QueryWarning, DEFAULT_PAGE_SIZE};
pub use transport::{
    Auth, ClientConfig, HttpSearchClient, SearchPage, SearchRequest, SearchTransport, StaticPages,
    DEFAULT_SEARCH_PATH,
};

use thiserror::Error;

/// Errors surfaced by catalog queries.
///
/// Resolution misses (unknown service, node or workload) are deliberately
/// *not* errors: those come back as `None` or empty collections. The only
/// failure a query can produce is a request that cannot be interpreted at
/// all.
#[derive(Debug, Error)]
pub enum Error {
    /// The hostname cannot be split into a service name and namespace.
    #[error("invalid service hostname {0:?}: expected <name>.<namespace>[.<suffix>]")]
    InvalidHostname(String),
}

use thiserror::Error;

/// Errors returned by the routing authority client.
#[derive(Debug, Error)]
pub enum AuthorityError {
    /// Network, TLS, or timeout failure from the underlying HTTP client.
    /// The caller may retry the whole operation; no state was committed.
    #[error("authority unreachable: {0}")]
    Http(#[from] reqwest::Error),

    /// The authority rejected the request with an error body.
    #[error("authority error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The response body could not be deserialized into the expected type.
    #[error("unexpected response for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The authority already holds a different outcome for this execution
    /// id. Never auto-resolved; the discrepancy needs human attention.
    #[error("outcome conflict for execution {execution_id}: authority holds '{existing}', submitted '{submitted}'")]
    OutcomeConflict {
        execution_id: i64,
        existing: String,
        submitted: String,
    },
}

use thiserror::Error;

/// Errors raised while loading or validating a site topology.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("duplicate topology entity: {0}")]
    Duplicate(String),

    #[error("{owner} references unknown entity {target}")]
    UnknownReference { owner: String, target: String },

    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: String, value: f64 },

    #[error("topology parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("topology io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for topology results.
pub type TopologyResult<T> = Result<T, TopologyError>;

use crate::name::FeatureName;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Unknown vertex: {0}")]
    UnknownVertex(FeatureName),
    #[error("Edge already exists between {0} and {1}")]
    EdgeExists(FeatureName, FeatureName),
    #[error("Vertex {0} still has edges")]
    VertexHasEdges(FeatureName),
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Json error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Corrupt graph file: {0}")]
    CorruptGraph(String),
}

pub type Result<T = ()> = std::result::Result<T, Error>;

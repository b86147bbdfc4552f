use graph::FeatureName;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Duplicate key in input: {0}")]
    DuplicateInput(FeatureName),
    #[error("Key already present in table: {0}")]
    KeyConflict(FeatureName),
    #[error("Null geometry for key: {0}")]
    NullGeometry(FeatureName),
    #[error("Schema mismatch: required column '{0}' missing")]
    SchemaMismatch(String),
    #[error("Unknown key: {0}")]
    UnknownKey(FeatureName),
    #[error("CRS mismatch: source is {source}, target is {target}")]
    CrsMismatch { source: i32, target: i32 },
    #[error("Cut produced inconsistent bounds/CRS across parallel directories for '{0}'")]
    InconsistentCutParallelDirs(String),
    #[error("Missing attrs.json at {}", .0.display())]
    MissingAttrsFile(std::path::PathBuf),
    #[error("Corrupt attrs.json at {}: {1}", .0.display())]
    CorruptAttrsFile(std::path::PathBuf, String),
    #[error("Value for attribute '{0}' is not JSON-serializable")]
    NotSerializable(String),
    #[error("Unknown cutter mode: {0}")]
    UnknownMode(String),
    #[error("Label maker '{maker}' does not match connector label_type '{existing}'")]
    LabelTypeMismatch { maker: String, existing: String },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Graph(#[from] graph::Error),
    #[error(transparent)]
    Geo(#[from] geo::Error),
    #[error(transparent)]
    Inf(#[from] inf::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T = ()> = std::result::Result<T, Error>;

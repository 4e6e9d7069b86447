//! Rich diagnostic error types for kge-denoise.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly what
//! went wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum KgeError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Train(#[from] TrainError),
}

// ---------------------------------------------------------------------------
// Data errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum DataError {
    #[error("failed to read {path}")]
    #[diagnostic(
        code(kge::data::io),
        help(
            "Check that the dataset directory contains entities.dict, relations.dict, \
             the training file, valid.txt and test.txt, and that they are readable."
        )
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: expected {expected} tab-separated fields, found {found}")]
    #[diagnostic(
        code(kge::data::malformed_line),
        help(
            "Dictionary files hold `id<TAB>name` and triple files hold \
             `head<TAB>relation<TAB>tail`, one record per line."
        )
    )]
    MalformedLine {
        path: String,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("{path}:{line}: invalid id \"{value}\"")]
    #[diagnostic(
        code(kge::data::invalid_id),
        help("Dictionary ids must be non-negative integers forming the range [0, n).")
    )]
    InvalidId {
        path: String,
        line: usize,
        value: String,
    },

    #[error("{path}:{line}: unknown {kind} \"{name}\"")]
    #[diagnostic(
        code(kge::data::unknown_name),
        help("Every name used in a triple file must be listed in the matching .dict file.")
    )]
    UnknownName {
        path: String,
        line: usize,
        kind: String,
        name: String,
    },

    #[error("{kind} vocabulary in {path} is not a bijection onto [0, {len})")]
    #[diagnostic(
        code(kge::data::not_bijective),
        help(
            "Each id in [0, n) must appear exactly once and each name must be unique. \
             Regenerate the dictionary file."
        )
    )]
    NotBijective {
        path: String,
        kind: String,
        len: usize,
    },

    #[error("fake triple file {path} is not valid JSON: {message}")]
    #[diagnostic(
        code(kge::data::fake_format),
        help("The file must hold a JSON array of [head_id, relation_id, tail_id] integer triples.")
    )]
    FakeFormat { path: String, message: String },

    #[error("fake triple ({head}, {relation}, {tail}) is outside the vocabulary")]
    #[diagnostic(
        code(kge::data::fake_out_of_range),
        help(
            "Injected triples must use entity ids below {nentity} and relation ids below \
             {nrelation}."
        )
    )]
    FakeOutOfRange {
        head: u32,
        relation: u32,
        tail: u32,
        nentity: usize,
        nrelation: usize,
    },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("one of train/valid/test mode must be chosen")]
    #[diagnostic(
        code(kge::config::no_mode),
        help("Pass at least one of --do-train, --do-valid or --do-test.")
    )]
    NoMode,

    #[error("one of init checkpoint/data path must be chosen")]
    #[diagnostic(
        code(kge::config::no_data_path),
        help("Pass --data-path, or --init-checkpoint pointing at a directory with config.json.")
    )]
    NoDataPath,

    #[error("training requested without a save path")]
    #[diagnostic(
        code(kge::config::no_save_path),
        help("Pass --save-path so checkpoints and train.log have somewhere to go.")
    )]
    NoSavePath,

    #[error("{model} cannot be used with {reason}")]
    #[diagnostic(
        code(kge::config::incompatible_model),
        help(
            "RotatE needs --double-entity-embedding, ComplEx needs both doubling flags, \
             TransE and DistMult need neither."
        )
    )]
    IncompatibleModel { model: String, reason: String },

    #[error("invalid value for {field}: {message}")]
    #[diagnostic(
        code(kge::config::invalid_value),
        help("Check the command-line value for {field}.")
    )]
    InvalidValue { field: String, message: String },

    #[error("could not read run configuration {path}")]
    #[diagnostic(
        code(kge::config::unreadable),
        help("The checkpoint directory must contain the config.json written by a previous run.")
    )]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("run configuration {path} is malformed: {message}")]
    #[diagnostic(
        code(kge::config::malformed),
        help("config.json was written by an incompatible version. Retrain or edit it by hand.")
    )]
    Malformed { path: String, message: String },

    #[error("log file {path} could not be opened")]
    #[diagnostic(code(kge::config::log_file), help("Check write permissions on the save path."))]
    LogFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Checkpoint errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointError {
    #[error("checkpoint I/O failed at {path}")]
    #[diagnostic(
        code(kge::checkpoint::io),
        help(
            "A filesystem operation failed. Check that the save directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint serialization error: {message}")]
    #[diagnostic(
        code(kge::checkpoint::serde),
        help(
            "Failed to serialize or deserialize the checkpoint. \
             This usually means it was written by an incompatible version."
        )
    )]
    Serialization { message: String },

    #[error("checkpoint model does not match the run: {message}")]
    #[diagnostic(
        code(kge::checkpoint::shape_mismatch),
        help("The checkpoint was trained on a different dataset or embedding size.")
    )]
    ShapeMismatch { message: String },
}

// ---------------------------------------------------------------------------
// Training errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TrainError {
    #[error("{name} dataset is empty")]
    #[diagnostic(
        code(kge::train::empty_dataset),
        help("A batch stream needs at least one triple. Check the training file.")
    )]
    EmptyDataset { name: String },

    #[error("thread pool could not be built: {message}")]
    #[diagnostic(code(kge::train::thread_pool), help("Lower --cpu-num."))]
    ThreadPool { message: String },

    #[error("method {method} needs {component}")]
    #[diagnostic(
        code(kge::train::missing_component),
        help("The engine was built without this component. Rebuild it with the matching --method.")
    )]
    MissingComponent { method: String, component: String },
}

/// Convenience alias for functions returning kge-denoise results.
pub type KgeResult<T> = std::result::Result<T, KgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_error_converts_to_kge_error() {
        let err = DataError::MalformedLine {
            path: "train.txt".into(),
            line: 3,
            expected: 3,
            found: 2,
        };
        let kge: KgeError = err.into();
        assert!(matches!(kge, KgeError::Data(DataError::MalformedLine { .. })));
    }

    #[test]
    fn config_error_converts_to_kge_error() {
        let kge: KgeError = ConfigError::NoMode.into();
        assert!(matches!(kge, KgeError::Config(ConfigError::NoMode)));
    }

    #[test]
    fn malformed_line_message_names_location() {
        let err = DataError::MalformedLine {
            path: "valid.txt".into(),
            line: 17,
            expected: 3,
            found: 4,
        };
        let msg = format!("{err}");
        assert!(msg.contains("valid.txt:17"));
        assert!(msg.contains("expected 3"));
        assert!(msg.contains("found 4"));
    }
}

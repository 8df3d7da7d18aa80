use thiserror::Error;

use crate::validation::ImageRejection;

/// Failures that abort a whole sheet evaluation.
///
/// Everything else (no sheet outline found, a degenerate warp, an unreadable
/// cell) degrades to a best-effort result and is reported through
/// [`crate::Diagnostics`] instead.
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("could not decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("image rejected: {0}")]
    InvalidImage(#[from] ImageRejection),

    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("answer key '{0}' has no subjects")]
    EmptyKey(String),

    #[error("subject '{subject}' in answer key '{version}' has no questions")]
    EmptySubject { version: String, subject: String },

    #[error("subject '{subject}' appears more than once in answer key '{version}'")]
    DuplicateSubject { version: String, subject: String },

    #[error(
        "question {question} of subject '{subject}' expects option {option}, \
         but the sheet only has {options} options"
    )]
    OptionOutOfRange {
        subject: String,
        question: usize,
        option: usize,
        options: usize,
    },

    #[error("layout has {layout} subjects but answer key '{version}' has {key}")]
    SubjectCountMismatch {
        version: String,
        layout: usize,
        key: usize,
    },

    #[error(
        "subject '{subject}' has {key} questions in the answer key but the layout \
         expects {layout}"
    )]
    QuestionCountMismatch {
        subject: String,
        layout: usize,
        key: usize,
    },

    #[error("decoded {decoded} questions but the answer key has {key}")]
    DecodedCountMismatch { decoded: usize, key: usize },

    #[error("layout field '{0}' must be greater than zero")]
    ZeroLayoutField(&'static str),

    #[error("option pitch {pitch} is smaller than the cell width {width}, cells would overlap")]
    OverlappingCells { pitch: u32, width: u32 },

    #[error("layout does not fit in pixel coordinates, margins or pitches are too large")]
    LayoutTooLarge,

    #[error("unknown answer key version '{0}'")]
    UnknownVersion(String),

    #[error("option '{name}' must be within {range}, got {value}")]
    InvalidOption {
        name: &'static str,
        range: &'static str,
        value: f32,
    },
}

/// Errors from loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Invalid(#[from] ConfigurationError),
}

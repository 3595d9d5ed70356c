use thiserror::Error;

pub type Result<T> = std::result::Result<T, ParseFailure>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("empty time expression")]
    Empty,

    #[error("could not understand time expression {input:?}")]
    Unrecognized { input: String },

    #[error("{strategy} expression {input:?} could not be resolved: {reason}")]
    Unresolvable {
        strategy: &'static str,
        input: String,
        reason: String,
    },

    #[error("unknown time zone {zone:?}")]
    UnknownTimeZone { zone: String },

    #[error("time resolution cancelled")]
    Cancelled,
}

//! Scene loading errors.
//!
//! Most malformed input is recoverable: the offending statement is logged
//! and skipped, and the load continues. These variants are the hard
//! failures that abort the whole load.

/// A fatal scene-load failure.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    /// The text ended inside a statement.
    #[error("unexpected end of scene text in '{statement}' (line {line})")]
    UnexpectedEnd { statement: &'static str, line: u32 },

    /// A numeric field held a non-numeric token.
    #[error("line {line}: expected a number in '{statement}', found \"{token}\"")]
    BadNumber {
        statement: &'static str,
        line: u32,
        token: String,
    },

    /// More than the maximum nesting of `origin` blocks.
    #[error("line {line}: origin stack overflow")]
    OriginOverflow { line: u32 },

    /// An `endorigin` with no matching `origin`.
    #[error("line {line}: origin stack underflow")]
    OriginUnderflow { line: u32 },

    /// The loader config file did not parse.
    #[error("loader config: {0}")]
    Config(#[from] ron::error::SpannedError),

    /// The terrain bake did not serialize.
    #[error("terrain bake: {0}")]
    Bake(#[from] ron::Error),

    /// The terrain bake could not be written out.
    #[error("terrain bake: {0}")]
    BakeIo(#[from] std::io::Error),
}

/// Errors surfaced by the world engine.
///
/// Most bad input degrades the offending construct and is reported through
/// the log stream instead of failing the caller; these variants cover the
/// few operations with a hard contract.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// A track end already holds a link and relinking was not explicit.
    #[error("track '{track}' {end} end is already connected")]
    TrackLinkConflict { track: String, end: &'static str },

    /// A track's occupancy array is at capacity.
    #[error("track '{track}' holds the maximum of {max} vehicles")]
    TooManyVehicles { track: String, max: usize },

    /// A node id no longer resolves in the registry arena.
    #[error("stale node id")]
    StaleNode,

    /// A payload of the wrong kind was found where another was required.
    #[error("node '{node}' is not a {expected}")]
    WrongKind { node: String, expected: &'static str },
}

//! Deterministic container identity derivation.
//!
//! Analyzer containers are named and port-assigned purely from the image
//! reference and their ordinal position in the configured list. The same
//! inputs always yield the same identity, which is what makes container
//! reuse detection possible across separate runs.

/// Base of the port range handed out to analyzer containers. Kept clear of
/// the main service port (10007).
pub const ANALYZER_PORT_BASE: u16 = 10010;

/// Stable identity of an analyzer container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerId {
    pub name: String,
    pub port: u16,
}

/// Derives the container name and port for the analyzer at `index`.
///
/// An image reference (`[registry[:port]/]path[:tag]`) can carry a colon in
/// two places: the registry host port and the tag. Only a colon that comes
/// after the last slash is a tag separator; anything else belongs to the
/// registry and stays out of the short name.
pub fn resolve(full_image: &str, index: usize) -> ContainerId {
    let colon = full_image.rfind(':');
    let slash = full_image.rfind('/');

    let end = match (colon, slash) {
        (Some(c), Some(s)) if c < s => full_image.len(),
        (None, _) => full_image.len(),
        (Some(c), _) => c,
    };
    let start = slash.map(|s| s + 1).unwrap_or(0);
    let short = &full_image[start..end];

    // Fleet sizes are tiny in practice; clamp rather than wrap if an index
    // ever runs the port past the u16 range.
    let port = u16::try_from(index)
        .ok()
        .and_then(|offset| ANALYZER_PORT_BASE.checked_add(offset))
        .unwrap_or(u16::MAX);

    ContainerId {
        name: format!("{}_{}", short, index),
        port,
    }
}

use crate::traits::Observable;

/// Signal telling whether this instance is the active one
///
/// When several instances share a store, only the active one fetches;
/// inactive instances keep their timers running and re-check later.
pub trait TabActivity: Observable + Send + Sync {
    /// Whether this instance is currently active
    fn active(&self) -> bool;
}

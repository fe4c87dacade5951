//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// A persisted stock record is an entity: its quantities are overwritten on every
/// rebuild, but its identity (warehouse + reference) never changes.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

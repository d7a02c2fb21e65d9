//! Value-keyed, reference-counted registry of drawing contexts.
//!
//! Clients create the same style bundle many times.  The registry hands out
//! one id per distinct [`DrawingContextValue`] and counts how many clients
//! (or how many registrations on one client) hold it.  The entry disappears
//! when the count drops to zero.
//!
//! # Invariants
//!
//! - `by_id` and `by_value` always describe the same set of entries: an id
//!   maps to a value exactly when that value maps back to the id.
//! - Every live entry has `ref_count >= 1`.
//! - Ids come from a counter that only increases, so a released id is never
//!   handed out again.
//!
//! The registry itself is not synchronised; the command router keeps it
//! behind its single state lock.

use std::collections::HashMap;
use std::sync::Arc;

use griddev_core::DrawingContextValue;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ContextRegistryError {
    #[error("drawing context {0} does not exist on the server")]
    UnknownContext(i32),
}

#[derive(Debug)]
struct ContextEntry {
    value: Arc<DrawingContextValue>,
    ref_count: u32,
}

/// Outcome of [`ContextRegistry::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Released {
    /// Other holders remain; carries the new count.
    Retained(u32),
    /// The count reached zero and both mappings were removed.
    Removed,
}

#[derive(Debug, Default)]
pub struct ContextRegistry {
    by_id: HashMap<i32, ContextEntry>,
    by_value: HashMap<Arc<DrawingContextValue>, i32>,
    last_id: i32,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one more holder of `value` and returns its id.
    ///
    /// A value already present keeps its id and gains a reference; a new
    /// value gets the next id with a count of one.
    pub fn acquire(&mut self, value: DrawingContextValue) -> i32 {
        if let Some(&id) = self.by_value.get(&value) {
            if let Some(entry) = self.by_id.get_mut(&id) {
                entry.ref_count += 1;
                return id;
            }
        }

        self.last_id += 1;
        let id = self.last_id;
        let value = Arc::new(value);
        self.by_value.insert(Arc::clone(&value), id);
        self.by_id.insert(id, ContextEntry { value, ref_count: 1 });
        id
    }

    /// Drops one reference to `id`, removing the entry at zero.
    ///
    /// # Errors
    ///
    /// Returns [`ContextRegistryError::UnknownContext`] if `id` is not live.
    pub fn release(&mut self, id: i32) -> Result<Released, ContextRegistryError> {
        let entry = self
            .by_id
            .get_mut(&id)
            .ok_or(ContextRegistryError::UnknownContext(id))?;
        entry.ref_count -= 1;
        if entry.ref_count > 0 {
            return Ok(Released::Retained(entry.ref_count));
        }
        if let Some(entry) = self.by_id.remove(&id) {
            self.by_value.remove(&entry.value);
        }
        Ok(Released::Removed)
    }

    /// Looks up the value registered under `id`.
    pub fn get(&self, id: i32) -> Option<Arc<DrawingContextValue>> {
        self.by_id.get(&id).map(|e| Arc::clone(&e.value))
    }

    /// Id currently assigned to `value`, if any.
    pub fn id_of(&self, value: &DrawingContextValue) -> Option<i32> {
        self.by_value.get(value).copied()
    }

    pub fn ref_count(&self, id: i32) -> Option<u32> {
        self.by_id.get(&id).map(|e| e.ref_count)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Total number of ids ever assigned.
    pub fn created(&self) -> i32 {
        self.last_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use griddev_core::{Color, LineType};

    fn red() -> DrawingContextValue {
        DrawingContextValue::builder()
            .color(Color::from_rgba(255, 0, 0, 255))
            .build()
    }

    fn dashed() -> DrawingContextValue {
        DrawingContextValue::builder()
            .line_type(LineType::Pattern(vec![2, 2]))
            .build()
    }

    #[test]
    fn test_first_acquire_assigns_id_one() {
        let mut registry = ContextRegistry::new();
        assert_eq!(registry.acquire(red()), 1);
        assert_eq!(registry.ref_count(1), Some(1));
    }

    #[test]
    fn test_acquiring_equal_value_reuses_id_and_counts_reference() {
        // Arrange
        let mut registry = ContextRegistry::new();
        let first = registry.acquire(red());

        // Act
        let second = registry.acquire(red());

        // Assert
        assert_eq!(first, second);
        assert_eq!(registry.ref_count(first), Some(2));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_distinct_values_get_distinct_ids() {
        let mut registry = ContextRegistry::new();
        let a = registry.acquire(red());
        let b = registry.acquire(dashed());
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_release_to_zero_removes_both_mappings() {
        // Arrange
        let mut registry = ContextRegistry::new();
        let id = registry.acquire(red());
        registry.acquire(red());

        // Act
        let first = registry.release(id).unwrap();
        let second = registry.release(id).unwrap();

        // Assert
        assert_eq!(first, Released::Retained(1));
        assert_eq!(second, Released::Removed);
        assert!(registry.get(id).is_none());
        assert!(registry.id_of(&red()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_released_id_is_never_reused() {
        let mut registry = ContextRegistry::new();
        let id = registry.acquire(red());
        registry.release(id).unwrap();
        let again = registry.acquire(red());
        assert_eq!(again, id + 1);
        assert_eq!(registry.created(), 2);
    }

    #[test]
    fn test_release_of_unknown_id_is_an_error() {
        let mut registry = ContextRegistry::new();
        assert_eq!(
            registry.release(42),
            Err(ContextRegistryError::UnknownContext(42))
        );
    }
}

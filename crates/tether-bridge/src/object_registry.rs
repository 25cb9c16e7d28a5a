//! Stable `obj_N` handles for object references.
//!
//! Handles are only meaningful while the owning thread stays suspended: any
//! resume (VM-wide, per-thread, or implicit via stepping) invalidates the
//! whole registry, because the VM is free to move or collect objects once it
//! runs again. Ids are never reused within an attached session so a stale
//! handle fails loudly instead of aliasing a new object.

use std::collections::HashMap;

use tether_jdi::ObjectRef;

pub struct ObjectRegistry {
    next_id: u64,
    handle_by_unique_id: HashMap<u64, String>,
    entry_by_handle: HashMap<String, ObjectRef>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            handle_by_unique_id: HashMap::new(),
            entry_by_handle: HashMap::new(),
        }
    }

    /// Handle for the object, allocating `obj_<n>` on first sight.
    pub fn handle_for(&mut self, object: &ObjectRef) -> String {
        let unique_id = object.unique_id();
        if let Some(handle) = self.handle_by_unique_id.get(&unique_id) {
            return handle.clone();
        }
        self.next_id += 1;
        let handle = format!("obj_{}", self.next_id);
        self.handle_by_unique_id.insert(unique_id, handle.clone());
        self.entry_by_handle.insert(handle.clone(), object.clone());
        handle
    }

    pub fn get(&self, handle: &str) -> Option<ObjectRef> {
        self.entry_by_handle.get(handle).cloned()
    }

    pub fn is_handle(text: &str) -> bool {
        text.strip_prefix("obj_")
            .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
    }

    /// Drop every live handle. The id counter keeps counting so invalidated
    /// handles are never resurrected by a later allocation.
    pub fn invalidate(&mut self) {
        self.handle_by_unique_id.clear();
        self.entry_by_handle.clear();
    }

    pub fn len(&self) -> usize {
        self.entry_by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_by_handle.is_empty()
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use tether_jdi::fake::FakeObject;

    use super::*;

    #[test]
    fn same_object_keeps_its_handle() {
        let mut registry = ObjectRegistry::new();
        let object = FakeObject::of("com.example.A").build();
        let a: ObjectRef = object.clone();
        let b: ObjectRef = object;
        let h1 = registry.handle_for(&a);
        let h2 = registry.handle_for(&b);
        assert_eq!(h1, h2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn handles_are_never_reused_after_invalidation() {
        let mut registry = ObjectRegistry::new();
        let first: ObjectRef = FakeObject::of("com.example.A").build();
        let h1 = registry.handle_for(&first);
        registry.invalidate();
        assert!(registry.get(&h1).is_none());

        let second: ObjectRef = FakeObject::of("com.example.B").build();
        let h2 = registry.handle_for(&second);
        assert_ne!(h1, h2);
    }

    #[test]
    fn handle_shape() {
        assert!(ObjectRegistry::is_handle("obj_12"));
        assert!(!ObjectRegistry::is_handle("obj_"));
        assert!(!ObjectRegistry::is_handle("obj_x"));
        assert!(!ObjectRegistry::is_handle("helper"));
    }

    #[test]
    fn distinct_objects_get_distinct_handles() {
        let mut registry = ObjectRegistry::new();
        let a: ObjectRef = FakeObject::of("com.example.A").build();
        let b: ObjectRef = FakeObject::of("com.example.A").build();
        assert_ne!(registry.handle_for(&a), registry.handle_for(&b));
    }
}

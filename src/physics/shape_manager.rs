//! Reference-counted cache of collision shapes
//!
//! Every body that uses a shape holds exactly one reference, taken with
//! `get_shape` and given back with `release_shape`. An entry lives exactly as
//! long as its count is positive.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::shape::{CollisionShape, ShapeDescriptor};

/// Handle to a cached collision shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeHandle(pub u32);

#[derive(Debug)]
struct ShapeReference {
    handle: ShapeHandle,
    ref_count: u32,
    shape: Arc<CollisionShape>,
}

/// Cache mapping descriptors to shared collision shapes
#[derive(Debug, Default)]
pub struct ShapeManager {
    shapes: FxHashMap<ShapeDescriptor, ShapeReference>,
    descriptors: FxHashMap<ShapeHandle, ShapeDescriptor>,
    next_handle: u32,
}

impl ShapeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a handle for the descriptor, building the shape on first use.
    ///
    /// Returns `None` only when the geometry is degenerate; the count is left
    /// untouched in that case.
    pub fn get_shape(&mut self, descriptor: &ShapeDescriptor) -> Option<ShapeHandle> {
        if let Some(reference) = self.shapes.get_mut(descriptor) {
            reference.ref_count += 1;
            return Some(reference.handle);
        }

        let shape = CollisionShape::build(descriptor)?;
        let handle = ShapeHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);

        self.shapes.insert(
            descriptor.clone(),
            ShapeReference {
                handle,
                ref_count: 1,
                shape: Arc::new(shape),
            },
        );
        self.descriptors.insert(handle, descriptor.clone());
        Some(handle)
    }

    /// Drop one reference by handle; returns false for an unknown handle
    pub fn release_shape(&mut self, handle: ShapeHandle) -> bool {
        match self.descriptors.get(&handle).cloned() {
            Some(descriptor) => self.release_descriptor(&descriptor),
            None => false,
        }
    }

    /// Drop one reference by descriptor; returns false for an unknown descriptor
    pub fn release_descriptor(&mut self, descriptor: &ShapeDescriptor) -> bool {
        let Some(reference) = self.shapes.get_mut(descriptor) else {
            return false;
        };

        reference.ref_count -= 1;
        if reference.ref_count == 0 {
            let handle = reference.handle;
            self.shapes.remove(descriptor);
            self.descriptors.remove(&handle);
        }
        true
    }

    /// Shape data for a live handle
    pub fn shape(&self, handle: ShapeHandle) -> Option<Arc<CollisionShape>> {
        let descriptor = self.descriptors.get(&handle)?;
        self.shapes.get(descriptor).map(|r| Arc::clone(&r.shape))
    }

    pub fn descriptor(&self, handle: ShapeHandle) -> Option<&ShapeDescriptor> {
        self.descriptors.get(&handle)
    }

    /// Current count for a descriptor, zero when not cached
    pub fn ref_count(&self, descriptor: &ShapeDescriptor) -> u32 {
        self.shapes.get(descriptor).map_or(0, |r| r.ref_count)
    }

    pub fn num_shapes(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Snapshot of every cached descriptor and its count
    pub fn ref_counts(&self) -> FxHashMap<ShapeDescriptor, u32> {
        self.shapes
            .iter()
            .map(|(descriptor, r)| (descriptor.clone(), r.ref_count))
            .collect()
    }

    /// Drop every entry regardless of count
    pub fn clear(&mut self) {
        self.shapes.clear();
        self.descriptors.clear();
    }
}

use std::any::Any;

use crate::component::Component;

/// A densely packed list of components of a single type. One column exists per component type
/// per chunk.
#[derive(Debug)]
pub struct Column<T: Component> {
    data: Vec<T>,
}

/// Type-erased interface to a [`Column`].
pub trait AnyColumn: Send + Sync {
    /// Converts the type into an any reference.
    fn as_any(&self) -> &dyn Any;

    /// Converts the type into a mutable any reference.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creates an empty column holding the same component type.
    fn new_empty(&self) -> Box<dyn AnyColumn>;

    /// Removes an object from the column and swaps the last element in the column with the
    /// destroyed object.
    ///
    /// # Panics
    /// Panics if the index is out of bounds.
    fn swap_remove(&mut self, index: usize);

    /// Moves an object to the end of `dst` and swaps the last element of this column into its
    /// place.
    ///
    /// # Panics
    /// Panics if `dst` holds a different component type or if the index is out of bounds.
    fn swap_move(&mut self, dst: &mut dyn AnyColumn, index: usize);

    /// Appends `count` clones of the object at `index` to the end of `dst`.
    fn push_clones(&self, dst: &mut dyn AnyColumn, index: usize, count: usize);

    /// Moves the first `count` objects of this column to the end of `dst`, preserving order.
    fn drain_front(&mut self, dst: &mut dyn AnyColumn, count: usize);

    /// Adds a new object to the end of the column.
    fn push(&mut self, object: Box<dyn Any>);

    /// Replaces an object in the column with a new one.
    fn replace(&mut self, object: Box<dyn Any>, index: usize);
}

impl std::fmt::Debug for dyn AnyColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyColumn").field("len", &self.len()).finish()
    }
}

impl<T: Component> Default for Column<T> {
    #[inline]
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}

impl<T: Component> From<Vec<T>> for Column<T> {
    #[inline]
    fn from(data: Vec<T>) -> Self {
        Self { data }
    }
}

impl<T: Component> Column<T> {
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    #[inline]
    pub fn into_inner(self) -> Vec<T> {
        self.data
    }

    #[inline]
    fn downcast_mut(column: &mut dyn AnyColumn) -> &mut Self {
        column
            .as_any_mut()
            .downcast_mut::<Self>()
            .expect("mismatched column type")
    }
}

impl<T: Component> AnyColumn for Column<T> {
    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    #[inline]
    fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    fn new_empty(&self) -> Box<dyn AnyColumn> {
        Box::new(Self::default())
    }

    #[inline]
    fn swap_remove(&mut self, index: usize) {
        self.data.swap_remove(index);
    }

    #[inline]
    fn swap_move(&mut self, dst: &mut dyn AnyColumn, index: usize) {
        Self::downcast_mut(dst).data.push(self.data.swap_remove(index));
    }

    #[inline]
    fn push_clones(&self, dst: &mut dyn AnyColumn, index: usize, count: usize) {
        let src = &self.data[index];
        let dst = Self::downcast_mut(dst);
        dst.data.reserve(count);
        for _ in 0..count {
            dst.data.push(src.clone());
        }
    }

    #[inline]
    fn drain_front(&mut self, dst: &mut dyn AnyColumn, count: usize) {
        Self::downcast_mut(dst).data.extend(self.data.drain(..count));
    }

    #[inline]
    fn push(&mut self, object: Box<dyn Any>) {
        self.data.push(
            *object
                .downcast::<T>()
                .expect("wrong object type provided to column for push"),
        );
    }

    #[inline]
    fn replace(&mut self, object: Box<dyn Any>, index: usize) {
        self.data[index] = *object
            .downcast::<T>()
            .expect("wrong type for replacement in column");
    }
}

use paste::paste;

use crate::component::{
    column::{AnyColumn, Column},
    Component, ComponentId, Components,
};

/// A component pack holds a set of components for one or more entities.
pub trait ComponentPack: Send + Sync {
    fn is_valid(&self) -> bool;

    /// Gets the number of entities represented by the components in the pack.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool;

    /// Registers the component types of the pack and converts it into one column per type.
    ///
    /// # Panics
    /// Panics if the pack is invalid.
    fn into_columns(self, components: &mut Components) -> Vec<(ComponentId, Box<dyn AnyColumn>)>;
}

/// Macro to help implement the `ComponentPack` trait for tuples of component vectors.
macro_rules! component_pack_impl {
    ( $n:expr, $( $name:ident )+ ) => {
        /// Implementation for a tuple of vectors of components.
        impl<$($name: Component, )*> ComponentPack for ($(Vec<$name>,)*) {
            #[inline]
            fn is_valid(&self) -> bool {
                paste! {
                    #[allow(non_snake_case)]
                    let ($([<$name _ref>],)*) = self;
                }

                let len = self.0.len();
                paste! {$(
                    if [<$name _ref>].len() != len {
                        return false;
                    }
                )*}

                true
            }

            #[inline]
            fn len(&self) -> usize {
                debug_assert!(self.is_valid());
                self.0.len()
            }

            #[inline]
            fn is_empty(&self) -> bool {
                debug_assert!(self.is_valid());
                self.0.is_empty()
            }

            fn into_columns(
                self,
                components: &mut Components,
            ) -> Vec<(ComponentId, Box<dyn AnyColumn>)> {
                assert!(self.is_valid(), "component pack vectors differ in length");

                paste! {
                    #[allow(non_snake_case)]
                    let ($([<$name _vec>],)*) = self;
                }

                let mut columns: Vec<(ComponentId, Box<dyn AnyColumn>)> = Vec::with_capacity($n);
                paste! {$(
                    columns.push((
                        components.register::<$name>(),
                        Box::new(Column::from([<$name _vec>])),
                    ));
                )*}
                columns
            }
        }
    }
}

component_pack_impl! { 1, A }
component_pack_impl! { 2, A B }
component_pack_impl! { 3, A B C }
component_pack_impl! { 4, A B C D }
component_pack_impl! { 5, A B C D E }
component_pack_impl! { 6, A B C D E F }
component_pack_impl! { 7, A B C D E F G }
component_pack_impl! { 8, A B C D E F G H }
component_pack_impl! { 9, A B C D E F G H I }
component_pack_impl! { 10, A B C D E F G H I J }
component_pack_impl! { 11, A B C D E F G H I J K }
component_pack_impl! { 12, A B C D E F G H I J K L }

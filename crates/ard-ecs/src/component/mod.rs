pub mod column;
pub mod pack;

use std::any::{Any, TypeId};

pub use ard_ecs_derive::Component;
use rustc_hash::FxHashMap;

use crate::component::column::{AnyColumn, Column};

/// A component represents a unique piece of data in an ECS. Components are associated with a
/// particular entity within a world.
///
/// Enableable components carry a per-entity enable bit in their chunk. Toggling that bit is a
/// cheap alternative to removing and re-adding the component.
pub trait Component: Clone + Send + Sync + 'static {
    const NAME: &'static str;

    const ENABLEABLE: bool = false;
}

/// Stable numeric identity of a component type within one world.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(u32);

/// Type-erased description of a registered component type.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    id: ComponentId,
    type_id: TypeId,
    name: &'static str,
    size: usize,
    enableable: bool,
    new_column: fn() -> Box<dyn AnyColumn>,
}

/// All component types known to a world.
#[derive(Debug, Default)]
pub struct Components {
    infos: Vec<ComponentInfo>,
    by_type: FxHashMap<TypeId, ComponentId>,
}

/// A single boxed component, used to add components without knowing their type statically.
pub trait ComponentExt: Send + Sync {
    fn component_type_id(&self) -> TypeId;

    fn name(&self) -> &'static str;

    /// Registers the component type if needed and returns its ID.
    fn register(&self, components: &mut Components) -> ComponentId;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Component> ComponentExt for T {
    #[inline]
    fn component_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    #[inline]
    fn name(&self) -> &'static str {
        T::NAME
    }

    #[inline]
    fn register(&self, components: &mut Components) -> ComponentId {
        components.register::<T>()
    }

    #[inline]
    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl ComponentInfo {
    pub fn of<T: Component>(id: ComponentId) -> Self {
        Self {
            id,
            type_id: TypeId::of::<T>(),
            name: T::NAME,
            size: std::mem::size_of::<T>(),
            enableable: T::ENABLEABLE,
            new_column: || Box::new(Column::<T>::default()),
        }
    }

    #[inline]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_enableable(&self) -> bool {
        self.enableable
    }

    /// Creates an empty column able to hold this component type.
    #[inline]
    pub fn new_column(&self) -> Box<dyn AnyColumn> {
        (self.new_column)()
    }
}

impl Components {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a component type. Does nothing but return the existing ID if the type is
    /// already known.
    pub fn register<T: Component>(&mut self) -> ComponentId {
        if let Some(id) = self.by_type.get(&TypeId::of::<T>()) {
            return *id;
        }

        let id = ComponentId::from(self.infos.len());
        self.infos.push(ComponentInfo::of::<T>(id));
        self.by_type.insert(TypeId::of::<T>(), id);
        id
    }

    /// Registers a type described by another world's registry. The returned ID is local to this
    /// registry.
    pub fn register_info(&mut self, info: &ComponentInfo) -> ComponentId {
        if let Some(id) = self.by_type.get(&info.type_id) {
            return *id;
        }

        let id = ComponentId::from(self.infos.len());
        self.infos.push(ComponentInfo {
            id,
            ..info.clone()
        });
        self.by_type.insert(info.type_id, id);
        id
    }

    #[inline]
    pub fn id_of<T: Component>(&self) -> Option<ComponentId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    #[inline]
    pub fn id_of_type(&self, type_id: TypeId) -> Option<ComponentId> {
        self.by_type.get(&type_id).copied()
    }

    /// Gets the description of a component.
    ///
    /// # Panics
    /// Panics if the ID did not come from this registry.
    #[inline]
    pub fn info(&self, id: ComponentId) -> &ComponentInfo {
        &self.infos[usize::from(id)]
    }

    #[inline]
    pub fn get(&self, id: ComponentId) -> Option<&ComponentInfo> {
        self.infos.get(usize::from(id))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, ComponentInfo> {
        self.infos.iter()
    }
}

impl From<u32> for ComponentId {
    #[inline]
    fn from(item: u32) -> Self {
        ComponentId(item)
    }
}

impl From<usize> for ComponentId {
    #[inline]
    fn from(item: usize) -> Self {
        ComponentId(item as u32)
    }
}

impl From<ComponentId> for usize {
    #[inline]
    fn from(item: ComponentId) -> Self {
        item.0 as usize
    }
}

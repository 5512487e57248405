pub mod commands;
pub mod entities;
pub mod remap;
mod structure;

pub use structure::ChunkRestore;

use crossbeam_channel::{unbounded, Receiver};

use crate::{
    archetype::{chunk::Chunk, ArchetypeId, Archetypes},
    component::{Component, ComponentId, Components},
    config::WorldConfig,
    entity::Entity,
    error::{EcsError, EcsResult},
    key::TypeKey,
    version::{MonotonicVersion, VersionCounter},
    world::{
        commands::{EntityCommand, EntityCommands},
        entities::{Entities, EntityLocation},
    },
};

/// A world contains the data of the ECS. It is used to create entities and add and remove
/// components from those entities.
pub struct World {
    /// Component types known to the world.
    pub(crate) components: Components,
    /// Archetypes and their chunks.
    pub(crate) archetypes: Archetypes,
    /// Entities belonging to the world.
    pub(crate) entities: Entities,
    pub(crate) versions: Box<dyn VersionCounter>,
    config: WorldConfig,
    commands: EntityCommands,
    commands_receiver: Receiver<EntityCommand>,
}

impl Default for World {
    fn default() -> Self {
        World::with_config(WorldConfig::default())
    }
}

impl World {
    pub fn new() -> World {
        World::default()
    }

    pub fn with_config(config: WorldConfig) -> World {
        World::with_version_counter(config, Box::<MonotonicVersion>::default())
    }

    /// Creates a world whose change versions come from `versions`.
    pub fn with_version_counter(config: WorldConfig, versions: Box<dyn VersionCounter>) -> World {
        let (sender, receiver) = unbounded();
        World {
            components: Components::default(),
            archetypes: Archetypes::new(config.chunk_bytes),
            entities: Entities::default(),
            versions,
            config,
            commands: EntityCommands::new(sender),
            commands_receiver: receiver,
        }
    }

    #[inline]
    pub fn components(&self) -> &Components {
        &self.components
    }

    #[inline]
    pub fn archetypes(&self) -> &Archetypes {
        &self.archetypes
    }

    #[inline]
    pub fn entities(&self) -> &Entities {
        &self.entities
    }

    #[inline]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    #[inline]
    pub fn versions(&self) -> &dyn VersionCounter {
        self.versions.as_ref()
    }

    /// Handle for deferring structural changes. See [`World::process_commands`].
    #[inline]
    pub fn commands(&self) -> &EntityCommands {
        &self.commands
    }

    /// Number of living entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[inline]
    pub fn register<C: Component>(&mut self) -> ComponentId {
        self.components.register::<C>()
    }

    /// Finds or creates the archetype holding exactly the given registered components.
    pub fn archetype_of(&mut self, ids: impl IntoIterator<Item = ComponentId>) -> ArchetypeId {
        let key = TypeKey::from_ids(ids);
        self.archetypes.get_or_create(&key, &self.components)
    }

    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Checks if an entity has a component.
    pub fn has_component<C: Component>(&self, entity: Entity) -> EcsResult<bool> {
        let location = self.entities.location(entity)?;
        Ok(self
            .components
            .id_of::<C>()
            .map(|id| self.archetypes.get(location.archetype).key().contains(id))
            .unwrap_or(false))
    }

    pub fn get<C: Component>(&self, entity: Entity) -> EcsResult<&C> {
        let (location, column) = self.locate_column::<C>(entity)?;
        Ok(&self.chunk(location).column::<C>(column)[location.slot as usize])
    }

    /// Mutable access to a component. Marks the component's column as changed.
    pub fn get_mut<C: Component>(&mut self, entity: Entity) -> EcsResult<&mut C> {
        let (location, column) = self.locate_column::<C>(entity)?;
        let version = self.versions.next_version();
        Ok(&mut self.chunk_mut(location).column_mut::<C>(column, version)[location.slot as usize])
    }

    pub fn is_enabled<C: Component>(&self, entity: Entity) -> EcsResult<bool> {
        if !C::ENABLEABLE {
            return Err(EcsError::NotEnableable(C::NAME));
        }

        let location = self.entities.location(entity)?;
        let enable_idx = self
            .components
            .id_of::<C>()
            .and_then(|id| {
                self.archetypes
                    .get(location.archetype)
                    .enableable_index_of(id)
            })
            .ok_or(EcsError::MissingComponent(entity, C::NAME))?;

        self.chunk(location)
            .enable_bits()
            .is_enabled(enable_idx, location.slot as usize)
    }

    /// Enables or disables a component of an entity without moving the entity. Returns `true` if
    /// the state changed.
    pub fn set_enabled<C: Component>(&mut self, entity: Entity, value: bool) -> EcsResult<bool> {
        if !C::ENABLEABLE {
            return Err(EcsError::NotEnableable(C::NAME));
        }

        match self.components.id_of::<C>() {
            Some(id) => self.set_enabled_by_id(entity, id, value),
            None => {
                self.entities.location(entity)?;
                Err(EcsError::MissingComponent(entity, C::NAME))
            }
        }
    }

    /// Same as [`World::set_enabled`] with the component type given by ID.
    pub fn set_enabled_by_id(
        &mut self,
        entity: Entity,
        id: ComponentId,
        value: bool,
    ) -> EcsResult<bool> {
        let info = self
            .components
            .get(id)
            .ok_or(EcsError::MissingComponent(entity, "<unregistered>"))?;
        if !info.is_enableable() {
            return Err(EcsError::NotEnableable(info.name()));
        }

        let location = self.entities.location(entity)?;
        let enable_idx = self
            .archetypes
            .get(location.archetype)
            .enableable_index_of(id)
            .ok_or(EcsError::MissingComponent(entity, info.name()))?;

        let version = self.versions.next_version();
        self.chunk_mut(location)
            .set_enabled(enable_idx, location.slot as usize, value, version)
    }

    /// Verifies every chunk of the world against the storage invariants and checks that the
    /// entity table agrees with chunk contents.
    pub fn check_consistency(&self) -> EcsResult<()> {
        for (archetype_idx, archetype) in self.archetypes.archetypes().iter().enumerate() {
            for (chunk_idx, chunk) in archetype.chunks().iter().enumerate() {
                let violation = |reason: String| EcsError::InvariantViolation {
                    archetype: archetype_idx,
                    chunk: chunk_idx,
                    reason,
                };

                chunk.check().map_err(violation)?;
                if chunk.is_empty() {
                    return Err(violation("empty chunk was not released".into()));
                }

                for (slot, entity) in chunk.entities().iter().enumerate() {
                    let expected = EntityLocation {
                        archetype: archetype.id(),
                        chunk: chunk_idx as u32,
                        slot: slot as u32,
                    };
                    match self.entities.location(*entity) {
                        Ok(location) if location == expected => {}
                        Ok(location) => {
                            return Err(violation(format!(
                                "entity {entity:?} in slot {slot} is recorded at {location:?}"
                            )))
                        }
                        Err(_) => {
                            return Err(violation(format!(
                                "slot {slot} holds dead entity {entity:?}"
                            )))
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Runs the consistency check if the world is configured to validate mutations.
    ///
    /// # Panics
    /// Panics if validation is enabled and the check fails.
    #[inline]
    pub(crate) fn after_mutation(&self) {
        if cfg!(debug_assertions) && self.config.validate_on_mutation {
            if let Err(err) = self.check_consistency() {
                panic!("world failed consistency check after mutation: {err}");
            }
        }
    }

    fn locate_column<C: Component>(&self, entity: Entity) -> EcsResult<(EntityLocation, usize)> {
        let location = self.entities.location(entity)?;
        let column = self
            .components
            .id_of::<C>()
            .and_then(|id| self.archetypes.get(location.archetype).layout().column_of(id))
            .ok_or(EcsError::MissingComponent(entity, C::NAME))?;
        Ok((location, column))
    }

    #[inline]
    pub(crate) fn chunk(&self, location: EntityLocation) -> &Chunk {
        &self.archetypes.get(location.archetype).chunks()[location.chunk as usize]
    }

    #[inline]
    pub(crate) fn chunk_mut(&mut self, location: EntityLocation) -> &mut Chunk {
        &mut self.archetypes.get_mut(location.archetype).chunks_mut()[location.chunk as usize]
    }
}

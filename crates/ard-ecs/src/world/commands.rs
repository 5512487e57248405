use std::any::TypeId;

use ard_log::warn;
use crossbeam_channel::Sender;
use rustc_hash::FxHashSet;

use crate::{
    archetype::chunk::ChunkGroup,
    component::{Component, ComponentExt},
    entity::Entity,
    error::{EcsError, EcsResult},
    world::World,
};

/// Used to request structural changes from places that can't borrow the world mutably, such as
/// parallel iteration. Commands are applied in submission order by
/// [`World::process_commands`].
#[derive(Clone)]
pub struct EntityCommands {
    sender: Sender<EntityCommand>,
}

pub(crate) enum EntityCommand {
    Destroy {
        entities: Vec<Entity>,
    },
    AddComponent {
        entity: Entity,
        component: Box<dyn ComponentExt>,
    },
    RemoveComponent {
        entity: Entity,
        id: TypeId,
        name: &'static str,
    },
    SetEnabled {
        entity: Entity,
        id: TypeId,
        name: &'static str,
        enableable: bool,
        value: bool,
    },
    SetGroup {
        entity: Entity,
        group: ChunkGroup,
    },
}

impl EntityCommands {
    pub(crate) fn new(sender: Sender<EntityCommand>) -> Self {
        Self { sender }
    }

    #[inline]
    fn send(&self, command: EntityCommand) {
        // Fails only once the world is gone, at which point there is nothing left to modify.
        let _ = self.sender.send(command);
    }

    /// Requests that a list of entities be destroyed.
    #[inline]
    pub fn destroy(&self, entities: &[Entity]) {
        self.send(EntityCommand::Destroy {
            entities: Vec::from(entities),
        });
    }

    /// Requests that a component be added to an entity, replacing the existing value if the
    /// entity already has one.
    #[inline]
    pub fn add_component(&self, entity: Entity, component: impl Component) {
        self.send(EntityCommand::AddComponent {
            entity,
            component: Box::new(component),
        });
    }

    #[inline]
    pub fn remove_component<C: Component>(&self, entity: Entity) {
        self.send(EntityCommand::RemoveComponent {
            entity,
            id: TypeId::of::<C>(),
            name: C::NAME,
        });
    }

    #[inline]
    pub fn set_enabled<C: Component>(&self, entity: Entity, value: bool) {
        self.send(EntityCommand::SetEnabled {
            entity,
            id: TypeId::of::<C>(),
            name: C::NAME,
            enableable: C::ENABLEABLE,
            value,
        });
    }

    #[inline]
    pub fn set_group(&self, entity: Entity, group: ChunkGroup) {
        self.send(EntityCommand::SetGroup { entity, group });
    }
}

impl World {
    /// Applies every pending entity command in submission order.
    ///
    /// A failing command is skipped without affecting the others. Commands targeting an entity
    /// destroyed by an earlier command of the same batch fail with
    /// [`EcsError::AccessViolation`]. Returns the failures in order.
    pub fn process_commands(&mut self) -> Vec<EcsError> {
        let mut errors = Vec::default();
        let mut destroyed = FxHashSet::default();

        for command in self.commands_receiver.clone().try_iter() {
            let result = match command {
                EntityCommand::Destroy { entities } => {
                    for entity in entities {
                        let result = Self::check_not_destroyed(&destroyed, entity)
                            .and_then(|_| self.destroy(entity));
                        match result {
                            Ok(()) => {
                                destroyed.insert(entity);
                            }
                            Err(err) => errors.push(err),
                        }
                    }
                    Ok(())
                }
                EntityCommand::AddComponent { entity, component } => {
                    Self::check_not_destroyed(&destroyed, entity)
                        .and_then(|_| self.add_component_boxed(entity, component))
                }
                EntityCommand::RemoveComponent { entity, id, name } => {
                    Self::check_not_destroyed(&destroyed, entity).and_then(|_| {
                        self.entities.location(entity)?;
                        let id = self
                            .components
                            .id_of_type(id)
                            .ok_or(EcsError::MissingComponent(entity, name))?;
                        self.remove_component_by_id(entity, id)
                    })
                }
                EntityCommand::SetEnabled {
                    entity,
                    id,
                    name,
                    enableable,
                    value,
                } => Self::check_not_destroyed(&destroyed, entity).and_then(|_| {
                    if !enableable {
                        return Err(EcsError::NotEnableable(name));
                    }
                    self.entities.location(entity)?;
                    let id = self
                        .components
                        .id_of_type(id)
                        .ok_or(EcsError::MissingComponent(entity, name))?;
                    self.set_enabled_by_id(entity, id, value).map(|_| ())
                }),
                EntityCommand::SetGroup { entity, group } => {
                    Self::check_not_destroyed(&destroyed, entity)
                        .and_then(|_| self.set_group(entity, group))
                }
            };

            if let Err(err) = result {
                errors.push(err);
            }
        }

        for err in &errors {
            warn!("skipped entity command: {err}");
        }
        errors
    }

    #[inline]
    fn check_not_destroyed(destroyed: &FxHashSet<Entity>, entity: Entity) -> EcsResult<()> {
        if destroyed.contains(&entity) {
            Err(EcsError::AccessViolation(format!(
                "{entity:?} was destroyed by an earlier command"
            )))
        } else {
            Ok(())
        }
    }
}

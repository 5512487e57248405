use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{
    archetype::enable::{EnableBits, EnableWordWriter},
    bits::{Mask128, MASK_BITS},
    component::{column::AnyColumn, column::Column, Component, ComponentId, ComponentInfo},
    entity::Entity,
    error::EcsResult,
    key::TypeKey,
};

/// Shared value partitioning the chunks of an archetype. Entities with different groups never
/// share a chunk.
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ChunkGroup(pub u64);

/// Column layout shared by every chunk of an archetype.
#[derive(Debug)]
pub struct ChunkLayout {
    key: TypeKey,
    infos: Vec<ComponentInfo>,
    /// Column index of each enableable type.
    enable_columns: SmallVec<[usize; 4]>,
    /// Enableable type index of each column, if the column is enableable.
    column_to_enable: SmallVec<[Option<usize>; 8]>,
    capacity: usize,
}

/// A fixed capacity block of entities belonging to one archetype.
///
/// Occupied slots are always `[0, len)`. Removing an entity swaps the last entity into its slot.
#[derive(Debug)]
pub struct Chunk {
    layout: Arc<ChunkLayout>,
    group: ChunkGroup,
    entities: Vec<Entity>,
    columns: Vec<Box<dyn AnyColumn>>,
    enable: EnableBits,
    /// Change version of each column.
    versions: Vec<u32>,
}

/// Describes how a row travels from a chunk of one layout into a chunk of another.
#[derive(Debug, Default)]
pub(crate) struct TransferPlan {
    /// `(src column, dst column)` pairs.
    columns: SmallVec<[(usize, usize); 8]>,
    /// Source columns with no counterpart in the destination.
    dropped: SmallVec<[usize; 4]>,
    /// Destination columns with no counterpart in the source. The caller fills these.
    added: SmallVec<[usize; 4]>,
    /// For every destination enableable type, the matching source enableable type.
    enable: SmallVec<[Option<usize>; 4]>,
}

impl ChunkLayout {
    /// Builds the layout for a key. `infos` must be in key order.
    pub(crate) fn new(key: TypeKey, infos: Vec<ComponentInfo>, chunk_bytes: usize) -> Self {
        debug_assert_eq!(key.len(), infos.len());

        let mut enable_columns = SmallVec::new();
        let mut column_to_enable = SmallVec::new();
        for (column, info) in infos.iter().enumerate() {
            if info.is_enableable() {
                column_to_enable.push(Some(enable_columns.len()));
                enable_columns.push(column);
            } else {
                column_to_enable.push(None);
            }
        }

        let row_bytes = std::mem::size_of::<Entity>()
            + infos.iter().map(|info| info.size()).sum::<usize>();
        let capacity = (chunk_bytes / row_bytes).clamp(1, MASK_BITS);

        Self {
            key,
            infos,
            enable_columns,
            column_to_enable,
            capacity,
        }
    }

    #[inline]
    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    #[inline]
    pub fn infos(&self) -> &[ComponentInfo] {
        &self.infos
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn column_of(&self, id: ComponentId) -> Option<usize> {
        self.key.position(id)
    }

    #[inline]
    pub fn enableable_count(&self) -> usize {
        self.enable_columns.len()
    }

    /// Component IDs of the enableable types, in enableable type index order.
    pub fn enableable(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.enable_columns.iter().map(|c| self.infos[*c].id())
    }

    #[inline]
    pub fn enableable_index_of(&self, id: ComponentId) -> Option<usize> {
        self.column_to_enable[self.column_of(id)?]
    }

    #[inline]
    pub fn enable_index_of_column(&self, column: usize) -> Option<usize> {
        self.column_to_enable[column]
    }

    #[inline]
    pub fn column_of_enable_index(&self, enable_idx: usize) -> usize {
        self.enable_columns[enable_idx]
    }
}

impl TransferPlan {
    /// Plans a transfer. `map` translates source component IDs into destination component IDs
    /// (the identity within one world).
    pub fn new(
        src: &ChunkLayout,
        dst: &ChunkLayout,
        map: impl Fn(ComponentId) -> Option<ComponentId>,
    ) -> Self {
        let mut plan = TransferPlan {
            enable: SmallVec::from_elem(None, dst.enableable_count()),
            ..Default::default()
        };

        let mut filled: SmallVec<[bool; 8]> = SmallVec::from_elem(false, dst.infos.len());
        for (src_col, info) in src.infos.iter().enumerate() {
            let dst_col = match map(info.id()).and_then(|id| dst.column_of(id)) {
                Some(dst_col) => dst_col,
                None => {
                    plan.dropped.push(src_col);
                    continue;
                }
            };

            filled[dst_col] = true;
            plan.columns.push((src_col, dst_col));
            if let (Some(s), Some(d)) = (
                src.enable_index_of_column(src_col),
                dst.enable_index_of_column(dst_col),
            ) {
                plan.enable[d] = Some(s);
            }
        }

        plan.added = filled
            .iter()
            .enumerate()
            .filter(|(_, filled)| !**filled)
            .map(|(col, _)| col)
            .collect();

        plan
    }

    /// Plan between two chunks sharing a layout.
    pub fn identity(layout: &ChunkLayout) -> Self {
        Self::new(layout, layout, Some)
    }

    #[inline]
    pub fn added(&self) -> &[usize] {
        &self.added
    }
}

impl Chunk {
    pub(crate) fn new(layout: Arc<ChunkLayout>, group: ChunkGroup) -> Self {
        let columns: Vec<_> = layout.infos.iter().map(|info| info.new_column()).collect();
        let versions = vec![0; columns.len()];
        let enable = EnableBits::new(layout.enableable_count());

        Self {
            entities: Vec::with_capacity(layout.capacity),
            layout,
            group,
            columns,
            enable,
            versions,
        }
    }

    #[inline]
    pub fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    #[inline]
    pub(crate) fn shares_layout(&self, layout: &Arc<ChunkLayout>) -> bool {
        Arc::ptr_eq(&self.layout, layout)
    }

    #[inline]
    pub fn group(&self) -> ChunkGroup {
        self.group
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.layout.capacity
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.entities.len() >= self.layout.capacity
    }

    /// Number of unoccupied slots.
    #[inline]
    pub fn free(&self) -> usize {
        self.layout.capacity - self.entities.len()
    }

    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    #[inline]
    pub fn enable_bits(&self) -> &EnableBits {
        &self.enable
    }

    /// Mask of occupied slots.
    #[inline]
    pub fn occupancy(&self) -> Mask128 {
        Mask128::occupancy(self.entities.len())
    }

    #[inline]
    pub fn change_version(&self, column: usize) -> u32 {
        self.versions[column]
    }

    #[inline]
    pub fn any_column(&self, column: usize) -> &dyn AnyColumn {
        self.columns[column].as_ref()
    }

    /// Typed view of a column.
    ///
    /// # Panics
    /// Panics if the column holds a different component type.
    #[inline]
    pub fn column<T: Component>(&self, column: usize) -> &[T] {
        self.columns[column]
            .as_any()
            .downcast_ref::<Column<T>>()
            .expect("mismatched column type")
            .as_slice()
    }

    /// Mutable typed view of a column. Marks the column as changed at `version`.
    ///
    /// # Panics
    /// Panics if the column holds a different component type.
    #[inline]
    pub fn column_mut<T: Component>(&mut self, column: usize, version: u32) -> &mut [T] {
        self.versions[column] = version;
        self.columns[column]
            .as_any_mut()
            .downcast_mut::<Column<T>>()
            .expect("mismatched column type")
            .as_mut_slice()
    }

    /// Sets the enable bit of a slot and marks the component's column as changed when the bit
    /// flips. Returns `true` if the bit flipped.
    pub fn set_enabled(
        &mut self,
        enable_idx: usize,
        slot: usize,
        value: bool,
        version: u32,
    ) -> EcsResult<bool> {
        let changed = self.enable.set_enabled(enable_idx, slot, value)?;
        if changed {
            self.versions[self.layout.column_of_enable_index(enable_idx)] = version;
        }
        Ok(changed)
    }

    /// Writes the enable bits of one type for the occupied slots.
    #[inline]
    pub fn write_enable_words(
        &self,
        enable_idx: usize,
        writer: &mut dyn EnableWordWriter,
    ) -> EcsResult<()> {
        self.enable.write_words(enable_idx, writer)
    }

    /// Overwrites the enable bits of one type with a deserialized run.
    #[inline]
    pub(crate) fn load_enable_mask(&mut self, enable_idx: usize, mask: Mask128) -> EcsResult<()> {
        self.enable.load_mask(enable_idx, mask)
    }

    #[inline]
    fn touch_all(&mut self, version: u32) {
        self.versions.iter_mut().for_each(|v| *v = version);
    }

    /// Appends entities, taking their components from the front of `sources`. `sources` holds one
    /// column per column of this chunk, in layout order. Every new slot starts enabled.
    pub(crate) fn push_front_of(
        &mut self,
        entities: &[Entity],
        sources: &mut [Box<dyn AnyColumn>],
        version: u32,
    ) {
        debug_assert!(entities.len() <= self.free());
        debug_assert_eq!(sources.len(), self.columns.len());

        for (src, dst) in sources.iter_mut().zip(self.columns.iter_mut()) {
            src.drain_front(dst.as_mut(), entities.len());
        }
        self.entities.extend_from_slice(entities);
        self.enable.push_enabled(entities.len());
        self.touch_all(version);
    }

    /// Pushes a component into a column. Used to fill the columns a transfer plan reports as
    /// added.
    #[inline]
    pub(crate) fn push_component(&mut self, column: usize, object: Box<dyn std::any::Any>) {
        self.columns[column].push(object);
    }

    /// Replaces a component in place.
    #[inline]
    pub(crate) fn replace_component(
        &mut self,
        column: usize,
        slot: usize,
        object: Box<dyn std::any::Any>,
        version: u32,
    ) {
        self.columns[column].replace(object, slot);
        self.versions[column] = version;
    }

    /// Overwrites the handle stored for a slot. Used when rows change worlds.
    #[inline]
    pub(crate) fn rename_entity(&mut self, slot: usize, entity: Entity) {
        self.entities[slot] = entity;
    }

    /// Removes the entity at `slot`, moving the last entity into its place. Returns the moved
    /// entity, if one had to move.
    pub(crate) fn swap_remove(&mut self, slot: usize) -> EcsResult<Option<Entity>> {
        self.enable.swap_remove(slot)?;
        for column in &mut self.columns {
            column.swap_remove(slot);
        }
        self.entities.swap_remove(slot);
        Ok(self.entities.get(slot).copied())
    }

    /// Moves the entity at `slot` into `dst` according to `plan`. Enable bits of types present in
    /// both layouts travel with the entity; types new to `dst` start enabled. Columns listed in
    /// `plan.added()` must be filled by the caller afterwards.
    ///
    /// Returns the entity that was swapped into `slot`, if any.
    pub(crate) fn move_row_to(
        &mut self,
        slot: usize,
        dst: &mut Chunk,
        plan: &TransferPlan,
        version: u32,
    ) -> EcsResult<Option<Entity>> {
        debug_assert!(!dst.is_full());
        let entity = self.entities[slot];

        // Read the bits before the source slot is overwritten.
        let src_enable = &self.enable;
        let mut bits: SmallVec<[bool; 8]> = SmallVec::with_capacity(plan.enable.len());
        for src_idx in &plan.enable {
            bits.push(match src_idx {
                Some(src_idx) => src_enable.is_enabled(*src_idx, slot)?,
                None => true,
            });
        }

        for (src_col, dst_col) in &plan.columns {
            self.columns[*src_col].swap_move(dst.columns[*dst_col].as_mut(), slot);
        }
        for src_col in &plan.dropped {
            self.columns[*src_col].swap_remove(slot);
        }

        self.enable.swap_remove(slot)?;
        self.entities.swap_remove(slot);

        dst.enable.push(|idx| bits[idx]);
        dst.entities.push(entity);
        dst.touch_all(version);
        self.touch_all(version);

        Ok(self.entities.get(slot).copied())
    }

    /// Appends clones of the entity at `slot` to `dst`, one per handle in `entities`. Enable bits
    /// are copied from the source entity.
    pub(crate) fn clone_row_to(
        &self,
        slot: usize,
        dst: &mut Chunk,
        plan: &TransferPlan,
        entities: &[Entity],
        version: u32,
    ) -> EcsResult<()> {
        debug_assert!(entities.len() <= dst.free());
        debug_assert!(plan.added.is_empty());

        let mut bits: SmallVec<[bool; 8]> = SmallVec::with_capacity(plan.enable.len());
        for src_idx in &plan.enable {
            bits.push(match src_idx {
                Some(src_idx) => self.enable.is_enabled(*src_idx, slot)?,
                None => true,
            });
        }

        for (src_col, dst_col) in &plan.columns {
            self.columns[*src_col].push_clones(dst.columns[*dst_col].as_mut(), slot, entities.len());
        }
        for entity in entities {
            dst.enable.push(|idx| bits[idx]);
            dst.entities.push(*entity);
        }
        dst.touch_all(version);
        Ok(())
    }

    /// Appends clones of the entity at `slot` to this same chunk.
    pub(crate) fn clone_row_within(
        &mut self,
        slot: usize,
        entities: &[Entity],
        version: u32,
    ) -> EcsResult<()> {
        debug_assert!(entities.len() <= self.free());

        let mut bits: SmallVec<[bool; 8]> = SmallVec::with_capacity(self.enable.type_count());
        for idx in 0..self.enable.type_count() {
            bits.push(self.enable.is_enabled(idx, slot)?);
        }

        for column in &mut self.columns {
            let mut staged = column.new_empty();
            column.push_clones(staged.as_mut(), slot, entities.len());
            staged.drain_front(column.as_mut(), entities.len());
        }
        for entity in entities {
            self.enable.push(|idx| bits[idx]);
            self.entities.push(*entity);
        }
        self.touch_all(version);
        Ok(())
    }

    /// Converts this chunk in place to a new layout without moving entities between slots.
    ///
    /// Columns kept by `plan` move over, dropped columns are discarded, and `added` supplies one
    /// full column for each column in `plan.added()`. Enable masks of kept types are carried
    /// as-is; types new to the layout start enabled for every entity.
    pub(crate) fn relayout(
        self,
        layout: Arc<ChunkLayout>,
        plan: &TransferPlan,
        added: Vec<Box<dyn AnyColumn>>,
        version: u32,
    ) -> EcsResult<Chunk> {
        debug_assert_eq!(plan.added.len(), added.len());

        let count = self.entities.len();
        let mut slots: Vec<Option<Box<dyn AnyColumn>>> =
            (0..layout.infos.len()).map(|_| None).collect();

        let mut old_columns: Vec<Option<Box<dyn AnyColumn>>> =
            self.columns.into_iter().map(Some).collect();
        for (src_col, dst_col) in &plan.columns {
            slots[*dst_col] = old_columns[*src_col].take();
        }
        for (dst_col, column) in plan.added.iter().zip(added) {
            debug_assert_eq!(column.len(), count);
            slots[*dst_col] = Some(column);
        }

        let mut enable = EnableBits::new(layout.enableable_count());
        enable.push_enabled(count);
        for (dst_idx, src_idx) in plan.enable.iter().enumerate() {
            match src_idx {
                Some(src_idx) => enable.load_mask(dst_idx, self.enable.mask(*src_idx)?)?,
                None => enable.initialize_for_new_component(dst_idx, count)?,
            }
        }

        let columns: Vec<_> = slots
            .into_iter()
            .map(|c| c.expect("transfer plan left a column unfilled"))
            .collect();
        let versions = vec![version; columns.len()];

        Ok(Chunk {
            layout,
            group: self.group,
            entities: self.entities,
            columns,
            enable,
            versions,
        })
    }

    /// Verifies that the chunk's parts agree with each other.
    pub fn check(&self) -> Result<(), String> {
        let count = self.entities.len();
        if count > self.layout.capacity {
            return Err(format!(
                "holds {count} entities but capacity is {}",
                self.layout.capacity
            ));
        }

        if self.enable.count() != count {
            return Err(format!(
                "enable bits track {} slots but chunk holds {count} entities",
                self.enable.count()
            ));
        }

        for (column, info) in self.columns.iter().zip(&self.layout.infos) {
            if column.len() != count {
                return Err(format!(
                    "column `{}` holds {} values but chunk holds {count} entities",
                    info.name(),
                    column.len()
                ));
            }
        }

        self.enable.check()
    }
}

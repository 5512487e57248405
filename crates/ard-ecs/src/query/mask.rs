use crate::{archetype::enable::EnableBits, bits::Mask128, query::MatchingArchetype};

/// Combines the enable state of a chunk with a query's enableable constraints.
///
/// Bit `i` of the result is set when slot `i` is occupied, every `all` type is enabled, no `none`
/// type is enabled, and at least one `any` type is enabled (an empty `any` list is no
/// constraint).
pub fn compose_mask(matching: &MatchingArchetype, bits: &EnableBits) -> Mask128 {
    let occupancy = bits.occupancy();
    let masks = bits.masks();
    let disabled = bits.disabled_counts();

    if matching.none.is_empty()
        && matching.any.is_empty()
        && matching.all.iter().all(|idx| disabled[*idx] == 0)
    {
        return occupancy;
    }

    let mut mask = occupancy;
    for idx in &matching.all {
        mask &= masks[*idx];
    }

    for idx in &matching.none {
        mask &= !masks[*idx];
    }

    if !matching.any.is_empty() {
        let mut any = Mask128::ZERO;
        for idx in &matching.any {
            any |= masks[*idx];
        }
        mask &= any;
    }

    mask
}

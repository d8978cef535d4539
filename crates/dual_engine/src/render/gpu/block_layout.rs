//! Parameter block memory layout
//!
//! Computes where each data parameter lives inside a constant/uniform buffer.
//! The backends consume the produced offsets verbatim.
//!
//! Packing rules, in 32-bit units:
//! - a non-array member packs right after the previous one unless it would
//!   straddle a 4-unit (16-byte) row, in which case it starts on the next row
//! - an array starts on a row boundary and every element is padded to a full
//!   row; the last element is not padded
//! - the final block size is rounded up to a whole row

use super::param_desc::{GpuParamBlockDesc, GpuParamDataDesc};

/// Units per 16-byte row
const ROW_UNITS: u32 = 4;

const fn align_up(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

/// Place `params` into a block named `name` bound at `slot`.
///
/// Fills in `element_size` (structs keep the size they were given),
/// `array_element_stride`, CPU/GPU offsets and the block slot of every
/// parameter, and returns the block descriptor. The returned block is marked
/// shareable; callers override that when needed.
pub fn generate_param_block_desc(
    name: impl Into<String>,
    slot: u32,
    params: &mut [GpuParamDataDesc],
) -> GpuParamBlockDesc {
    let mut block_size = 0u32;

    for param in params.iter_mut() {
        let size = match param.ty.size_units() {
            0 => param.element_size,
            units => units,
        };

        let (offset, stride) = if param.array_size > 1 {
            let offset = align_up(block_size, ROW_UNITS);
            let stride = align_up(size, ROW_UNITS);
            block_size = offset + stride * (param.array_size - 1) + size;
            (offset, stride)
        } else {
            let used_in_row = block_size % ROW_UNITS;
            let offset = if used_in_row != 0 && used_in_row + size > ROW_UNITS {
                align_up(block_size, ROW_UNITS)
            } else {
                block_size
            };
            block_size = offset + size;
            (offset, size)
        };

        param.element_size = size;
        param.array_element_stride = stride;
        param.cpu_mem_offset = offset;
        param.gpu_mem_offset = offset;
        param.param_block_slot = slot;
    }

    let block = GpuParamBlockDesc {
        name: name.into(),
        slot,
        set: 0,
        block_size: align_up(block_size, ROW_UNITS),
        is_shareable: true,
    };
    log::debug!(
        "Generated param block '{}' (slot {}): {} units for {} parameter(s)",
        block.name,
        slot,
        block.block_size,
        params.len()
    );
    block
}

use bytemuck::Pod;
use gfx_hal::{adapter::MemoryType, memory as m, prelude::*, Backend, MemoryTypeId};
use std::iter;
use std::mem::ManuallyDrop;
use std::ptr;

use super::buffer::Buffer;
use crate::error::{Error, Result};

/// A buffer bound to CPU-visible memory that holds a copy of its content.
pub struct Memory<'a, B: Backend, T> {
    pub buffer: ManuallyDrop<Buffer<'a, B, T>>,
    memory: ManuallyDrop<B::Memory>,
}

impl<'a, B: Backend, T: Pod> Memory<'a, B, T> {
    pub fn new(mut buffer: Buffer<'a, B, T>, memory_types: &[MemoryType]) -> Result<Self> {
        let memory = Self::allocate_gpu_memory(&mut buffer, memory_types)?;
        Ok(Memory {
            buffer: ManuallyDrop::new(buffer),
            memory,
        })
    }

    pub fn allocate_gpu_memory(
        buffer: &mut Buffer<'a, B, T>,
        memory_types: &[MemoryType],
    ) -> Result<ManuallyDrop<B::Memory>> {
        let device = buffer.device;
        unsafe {
            let buffer_req = device.get_buffer_requirements(&buffer.buf);
            let upload_type = memory_type(
                memory_types,
                buffer_req.type_mask,
                m::Properties::CPU_VISIBLE,
            )
            .ok_or(Error::NoMemoryType("vertex buffer"))?;
            let memory = device
                .allocate_memory(upload_type, buffer_req.size)
                .map_err(Error::gpu("allocate_memory"))?;
            let bytes = buffer.bytes();
            if let Err(err) = write_mapped::<B>(device, &memory, &mut *buffer.buf, bytes) {
                device.free_memory(memory);
                return Err(err);
            }
            Ok(ManuallyDrop::new(memory))
        }
    }
}

/// Binds `buf` to `memory` and copies `bytes` into the start of it.
pub(super) unsafe fn write_mapped<B: Backend>(
    device: &B::Device,
    memory: &B::Memory,
    buf: &mut B::Buffer,
    bytes: &[u8],
) -> Result<()> {
    device
        .bind_buffer_memory(memory, 0, buf)
        .map_err(Error::gpu("bind_buffer_memory"))?;
    let mapping = device
        .map_memory(memory, m::Segment::ALL)
        .map_err(Error::gpu("map_memory"))?;
    ptr::copy_nonoverlapping(bytes.as_ptr(), mapping, bytes.len());
    let flushed = device
        .flush_mapped_memory_ranges(iter::once((memory, m::Segment::ALL)))
        .map_err(Error::gpu("flush_mapped_memory_ranges"));
    device.unmap_memory(memory);
    flushed
}

/// First memory type allowed by `type_mask` that has all of `properties`.
pub fn memory_type(
    memory_types: &[MemoryType],
    type_mask: u64,
    properties: m::Properties,
) -> Option<MemoryTypeId> {
    memory_types
        .iter()
        .enumerate()
        .position(|(id, mem_type)| {
            type_mask & (1 << id) != 0 && mem_type.properties.contains(properties)
        })
        .map(MemoryTypeId::from)
}

impl<'a, B: Backend, T> Drop for Memory<'a, B, T> {
    fn drop(&mut self) {
        let device = self.buffer.device;
        unsafe {
            ManuallyDrop::drop(&mut self.buffer);
            device.free_memory(ManuallyDrop::into_inner(ptr::read(&self.memory)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types() -> Vec<MemoryType> {
        vec![
            MemoryType {
                properties: m::Properties::DEVICE_LOCAL,
                heap_index: 0,
            },
            MemoryType {
                properties: m::Properties::CPU_VISIBLE | m::Properties::COHERENT,
                heap_index: 1,
            },
            MemoryType {
                properties: m::Properties::DEVICE_LOCAL | m::Properties::CPU_VISIBLE,
                heap_index: 0,
            },
        ]
    }

    #[test]
    fn picks_first_allowed_type_with_properties() {
        let types = types();
        assert_eq!(
            memory_type(&types, 0b111, m::Properties::CPU_VISIBLE),
            Some(MemoryTypeId(1))
        );
        assert_eq!(
            memory_type(&types, 0b111, m::Properties::DEVICE_LOCAL),
            Some(MemoryTypeId(0))
        );
    }

    #[test]
    fn respects_type_mask() {
        let types = types();
        assert_eq!(
            memory_type(&types, 0b100, m::Properties::CPU_VISIBLE),
            Some(MemoryTypeId(2))
        );
        assert_eq!(memory_type(&types, 0b001, m::Properties::CPU_VISIBLE), None);
    }
}

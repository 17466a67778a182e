use bytemuck::Pod;
use gfx_hal::{buffer, prelude::*, Backend, Limits};
use std::mem::{self, ManuallyDrop};
use std::ptr;

use crate::error::{Error, Result};

/// Rounds `len` up to a multiple of `atom`.
pub fn align_up(len: u64, atom: u64) -> u64 {
    let atom = atom.max(1);
    ((len + atom - 1) / atom) * atom
}

pub struct Buffer<'a, B: Backend, T> {
    pub device: &'a B::Device,
    pub buf: ManuallyDrop<B::Buffer>,
    pub content: &'a [T],
}

impl<'a, B: Backend, T: Pod> Buffer<'a, B, T> {
    pub fn new(
        device: &'a B::Device,
        content: &'a [T],
        limits: &Limits,
        usage: buffer::Usage,
    ) -> Result<Self> {
        let non_coherent_alignment = limits.non_coherent_atom_size as u64;

        let buffer_stride = mem::size_of::<T>() as u64;
        let buffer_len = content.len() as u64 * buffer_stride;
        assert_ne!(buffer_len, 0);
        let memory_size = align_up(buffer_len, non_coherent_alignment);

        let buf = unsafe { device.create_buffer(memory_size, usage) }
            .map_err(Error::gpu("create_buffer"))?;
        log::debug!("created {:?} buffer of {} bytes", usage, memory_size);

        Ok(Buffer {
            device,
            buf: ManuallyDrop::new(buf),
            content,
        })
    }

    pub fn bytes(&self) -> &'a [u8] {
        bytemuck::cast_slice(self.content)
    }
}

impl<'a, B: Backend, T> Drop for Buffer<'a, B, T> {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_buffer(ManuallyDrop::into_inner(ptr::read(&self.buf)))
        }
    }
}

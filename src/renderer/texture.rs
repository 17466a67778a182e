use gfx_hal::{
    adapter::{Adapter, MemoryType},
    buffer, command,
    format::{self as f, AsFormat, Rgba8Srgb as ColorFormat, Swizzle},
    image as i, memory as m,
    prelude::*,
    pso::PipelineStage,
    Backend, Limits,
};
use std::iter;
use std::mem::ManuallyDrop;
use std::ops::Range;
use std::ptr;

use super::buffer::align_up;
use super::memory::memory_type;
use crate::error::{Error, Result};
use crate::image_loader::{RgbaPixels, BYTES_PER_PIXEL};

/// Number of levels in a full mip chain down to 1x1.
pub fn mip_levels(width: u32, height: u32) -> i::Level {
    let largest = width.max(height).max(1);
    (32 - largest.leading_zeros()) as i::Level
}

/// Bytes per staging row, padded to the copy pitch alignment.
pub fn row_pitch(width: u32, pitch_alignment: u32) -> u32 {
    align_up(
        width as u64 * BYTES_PER_PIXEL as u64,
        pitch_alignment as u64,
    ) as u32
}

/// Nearest filtering with repeat wrapping, sampling level 0 only. The mip
/// chain stays in the image but the LOD is clamped to the base level.
pub fn sampler_desc() -> i::SamplerDesc {
    let mut desc = i::SamplerDesc::new(i::Filter::Nearest, i::WrapMode::Tile);
    desc.lod_range = i::Lod(0.0)..i::Lod(0.0);
    desc
}

fn level_extent(width: u32, height: u32, level: i::Level) -> i::Offset {
    i::Offset {
        x: (width >> level).max(1) as i32,
        y: (height >> level).max(1) as i32,
        z: 1,
    }
}

fn color_range(levels: Range<i::Level>) -> i::SubresourceRange {
    i::SubresourceRange {
        aspects: f::Aspects::COLOR,
        levels,
        layers: 0..1,
    }
}

fn color_layers(level: i::Level) -> i::SubresourceLayers {
    i::SubresourceLayers {
        aspects: f::Aspects::COLOR,
        level,
        layers: 0..1,
    }
}

const ORIGIN: i::Offset = i::Offset { x: 0, y: 0, z: 0 };

/// CPU-visible copy of the pixel rows, laid out at `row_pitch`.
struct Staging<'a, B: Backend> {
    device: &'a B::Device,
    buffer: ManuallyDrop<B::Buffer>,
    memory: ManuallyDrop<B::Memory>,
    row_pitch: u32,
}

impl<'a, B: Backend> Staging<'a, B> {
    fn new(
        device: &'a B::Device,
        pixels: &RgbaPixels,
        limits: &Limits,
        memory_types: &[MemoryType],
    ) -> Result<Self> {
        let row_pitch = row_pitch(
            pixels.width,
            limits.optimal_buffer_copy_pitch_alignment as u32,
        );
        let upload_size = align_up(
            pixels.height as u64 * row_pitch as u64,
            limits.non_coherent_atom_size as u64,
        );

        let buffer = unsafe { device.create_buffer(upload_size, buffer::Usage::TRANSFER_SRC) }
            .map_err(Error::gpu("create_buffer"))?;
        let req = unsafe { device.get_buffer_requirements(&buffer) };
        let memory = memory_type(memory_types, req.type_mask, m::Properties::CPU_VISIBLE)
            .ok_or(Error::NoMemoryType("texture staging buffer"))
            .and_then(|ty| {
                unsafe { device.allocate_memory(ty, req.size) }
                    .map_err(Error::gpu("allocate_memory"))
            });
        let memory = match memory {
            Ok(memory) => memory,
            Err(err) => {
                unsafe { device.destroy_buffer(buffer) };
                return Err(err);
            }
        };

        let mut staging = Staging {
            device,
            buffer: ManuallyDrop::new(buffer),
            memory: ManuallyDrop::new(memory),
            row_pitch,
        };
        unsafe { staging.fill(pixels)? };
        Ok(staging)
    }

    unsafe fn fill(&mut self, pixels: &RgbaPixels) -> Result<()> {
        let device = self.device;
        device
            .bind_buffer_memory(&self.memory, 0, &mut self.buffer)
            .map_err(Error::gpu("bind_buffer_memory"))?;
        let mapping = device
            .map_memory(&self.memory, m::Segment::ALL)
            .map_err(Error::gpu("map_memory"))?;
        for y in 0..pixels.height as usize {
            let row = pixels.row(y);
            ptr::copy_nonoverlapping(
                row.as_ptr(),
                mapping.offset(y as isize * self.row_pitch as isize),
                row.len(),
            );
        }
        let flushed = device
            .flush_mapped_memory_ranges(iter::once((&*self.memory, m::Segment::ALL)))
            .map_err(Error::gpu("flush_mapped_memory_ranges"));
        device.unmap_memory(&self.memory);
        flushed
    }
}

impl<'a, B: Backend> Drop for Staging<'a, B> {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_buffer(ManuallyDrop::into_inner(ptr::read(&self.buffer)));
            self.device
                .free_memory(ManuallyDrop::into_inner(ptr::read(&self.memory)));
        }
    }
}

/// Device-local image and the memory backing it.
struct ImageAllocation<'a, B: Backend> {
    device: &'a B::Device,
    image: ManuallyDrop<B::Image>,
    memory: ManuallyDrop<B::Memory>,
}

impl<'a, B: Backend> ImageAllocation<'a, B> {
    fn new(
        device: &'a B::Device,
        width: u32,
        height: u32,
        levels: i::Level,
        memory_types: &[MemoryType],
    ) -> Result<Self> {
        let kind = i::Kind::D2(width as i::Size, height as i::Size, 1, 1);
        let mut image = unsafe {
            device.create_image(
                kind,
                levels,
                ColorFormat::SELF,
                i::Tiling::Optimal,
                i::Usage::TRANSFER_SRC | i::Usage::TRANSFER_DST | i::Usage::SAMPLED,
                i::ViewCapabilities::empty(),
            )
        }
        .map_err(Error::gpu("create_image"))?;
        let req = unsafe { device.get_image_requirements(&image) };

        let memory = memory_type(memory_types, req.type_mask, m::Properties::DEVICE_LOCAL)
            .ok_or(Error::NoMemoryType("texture image"))
            .and_then(|ty| {
                unsafe { device.allocate_memory(ty, req.size) }
                    .map_err(Error::gpu("allocate_memory"))
            });
        let memory = match memory {
            Ok(memory) => memory,
            Err(err) => {
                unsafe { device.destroy_image(image) };
                return Err(err);
            }
        };
        if let Err(err) = unsafe { device.bind_image_memory(&memory, 0, &mut image) } {
            unsafe {
                device.destroy_image(image);
                device.free_memory(memory);
            }
            return Err(Error::gpu("bind_image_memory")(err));
        }

        Ok(ImageAllocation {
            device,
            image: ManuallyDrop::new(image),
            memory: ManuallyDrop::new(memory),
        })
    }
}

impl<'a, B: Backend> Drop for ImageAllocation<'a, B> {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_image(ManuallyDrop::into_inner(ptr::read(&self.image)));
            self.device
                .free_memory(ManuallyDrop::into_inner(ptr::read(&self.memory)));
        }
    }
}

/// A sampled RGBA texture with a full mip chain, repeat wrapping and
/// nearest filtering.
pub struct Texture<'a, B: Backend> {
    pub view: ManuallyDrop<B::ImageView>,
    pub sampler: ManuallyDrop<B::Sampler>,
    pub levels: i::Level,
    allocation: ImageAllocation<'a, B>,
}

impl<'a, B: Backend> Texture<'a, B> {
    pub fn new(
        device: &'a B::Device,
        adapter: &Adapter<B>,
        queue: &mut B::CommandQueue,
        command_pool: &mut B::CommandPool,
        pixels: &RgbaPixels,
    ) -> Result<Self> {
        let memory_types = adapter.physical_device.memory_properties().memory_types;
        let limits = adapter.physical_device.limits();
        let (width, height) = (pixels.width, pixels.height);

        let levels = if Self::can_generate_mipmaps(adapter) {
            mip_levels(width, height)
        } else {
            log::warn!("{:?} cannot be blitted, texture keeps a single level", ColorFormat::SELF);
            1
        };

        let staging = Staging::new(device, pixels, &limits, &memory_types)?;
        let allocation = ImageAllocation::new(device, width, height, levels, &memory_types)?;
        unsafe {
            Self::record_upload(
                device,
                queue,
                command_pool,
                &staging,
                &allocation.image,
                width,
                height,
                levels,
            )?
        };
        drop(staging);

        let view = unsafe {
            device.create_image_view(
                &allocation.image,
                i::ViewKind::D2,
                ColorFormat::SELF,
                Swizzle::NO,
                color_range(0..levels),
            )
        }
        .map_err(Error::gpu("create_image_view"))?;

        let sampler = match unsafe {
            device.create_sampler(&sampler_desc())
        } {
            Ok(sampler) => sampler,
            Err(err) => {
                unsafe { device.destroy_image_view(view) };
                return Err(Error::gpu("create_sampler")(err));
            }
        };
        log::debug!("texture {}x{} uploaded with {} mip levels", width, height, levels);

        Ok(Texture {
            view: ManuallyDrop::new(view),
            sampler: ManuallyDrop::new(sampler),
            levels,
            allocation,
        })
    }

    fn can_generate_mipmaps(adapter: &Adapter<B>) -> bool {
        adapter
            .physical_device
            .format_properties(Some(ColorFormat::SELF))
            .optimal_tiling
            .contains(
                f::ImageFeature::BLIT_SRC
                    | f::ImageFeature::BLIT_DST
                    | f::ImageFeature::SAMPLED_LINEAR,
            )
    }

    /// Copies the staging rows into level 0, derives every further level by
    /// blitting the one above it and leaves the whole chain shader-readable.
    #[allow(clippy::too_many_arguments)]
    unsafe fn record_upload(
        device: &B::Device,
        queue: &mut B::CommandQueue,
        command_pool: &mut B::CommandPool,
        staging: &Staging<'_, B>,
        image: &B::Image,
        width: u32,
        height: u32,
        levels: i::Level,
    ) -> Result<()> {
        let mut cmd_buffer = command_pool.allocate_one(command::Level::Primary);
        cmd_buffer.begin_primary(command::CommandBufferFlags::ONE_TIME_SUBMIT);

        cmd_buffer.pipeline_barrier(
            PipelineStage::TOP_OF_PIPE..PipelineStage::TRANSFER,
            m::Dependencies::empty(),
            &[m::Barrier::Image {
                states: (i::Access::empty(), i::Layout::Undefined)
                    ..(i::Access::TRANSFER_WRITE, i::Layout::TransferDstOptimal),
                target: image,
                families: None,
                range: color_range(0..levels),
            }],
        );

        cmd_buffer.copy_buffer_to_image(
            &staging.buffer,
            image,
            i::Layout::TransferDstOptimal,
            &[command::BufferImageCopy {
                buffer_offset: 0,
                buffer_width: staging.row_pitch / BYTES_PER_PIXEL as u32,
                buffer_height: height,
                image_layers: color_layers(0),
                image_offset: ORIGIN,
                image_extent: i::Extent {
                    width,
                    height,
                    depth: 1,
                },
            }],
        );

        for level in 1..levels {
            let src = level - 1;
            cmd_buffer.pipeline_barrier(
                PipelineStage::TRANSFER..PipelineStage::TRANSFER,
                m::Dependencies::empty(),
                &[m::Barrier::Image {
                    states: (i::Access::TRANSFER_WRITE, i::Layout::TransferDstOptimal)
                        ..(i::Access::TRANSFER_READ, i::Layout::TransferSrcOptimal),
                    target: image,
                    families: None,
                    range: color_range(src..level),
                }],
            );
            cmd_buffer.blit_image(
                image,
                i::Layout::TransferSrcOptimal,
                image,
                i::Layout::TransferDstOptimal,
                i::Filter::Linear,
                &[command::ImageBlit {
                    src_subresource: color_layers(src),
                    src_bounds: ORIGIN..level_extent(width, height, src),
                    dst_subresource: color_layers(level),
                    dst_bounds: ORIGIN..level_extent(width, height, level),
                }],
            );
            cmd_buffer.pipeline_barrier(
                PipelineStage::TRANSFER..PipelineStage::FRAGMENT_SHADER,
                m::Dependencies::empty(),
                &[m::Barrier::Image {
                    states: (i::Access::TRANSFER_READ, i::Layout::TransferSrcOptimal)
                        ..(i::Access::SHADER_READ, i::Layout::ShaderReadOnlyOptimal),
                    target: image,
                    families: None,
                    range: color_range(src..level),
                }],
            );
        }

        cmd_buffer.pipeline_barrier(
            PipelineStage::TRANSFER..PipelineStage::FRAGMENT_SHADER,
            m::Dependencies::empty(),
            &[m::Barrier::Image {
                states: (i::Access::TRANSFER_WRITE, i::Layout::TransferDstOptimal)
                    ..(i::Access::SHADER_READ, i::Layout::ShaderReadOnlyOptimal),
                target: image,
                families: None,
                range: color_range(levels - 1..levels),
            }],
        );
        cmd_buffer.finish();

        let fence = device
            .create_fence(false)
            .map_err(Error::gpu("create_fence"))?;
        queue.submit_without_semaphores(Some(&cmd_buffer), Some(&fence));
        let waited = device
            .wait_for_fence(&fence, !0)
            .map_err(Error::gpu("wait_for_fence"));
        device.destroy_fence(fence);
        command_pool.free(iter::once(cmd_buffer));
        waited.map(|_| ())
    }
}

impl<'a, B: Backend> Drop for Texture<'a, B> {
    fn drop(&mut self) {
        let device = self.allocation.device;
        unsafe {
            device.destroy_sampler(ManuallyDrop::into_inner(ptr::read(&self.sampler)));
            device.destroy_image_view(ManuallyDrop::into_inner(ptr::read(&self.view)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_chain_reaches_one_pixel() {
        assert_eq!(mip_levels(1, 1), 1);
        assert_eq!(mip_levels(2, 1), 2);
        assert_eq!(mip_levels(256, 128), 9);
        assert_eq!(mip_levels(640, 480), 10);
        assert_eq!(mip_levels(3, 5), 3);
    }

    #[test]
    fn smallest_level_is_one_by_one() {
        let levels = mip_levels(640, 480);
        let last = level_extent(640, 480, levels - 1);
        assert_eq!((last.x, last.y), (1, 1));
        let second = level_extent(640, 480, 1);
        assert_eq!((second.x, second.y), (320, 240));
        let clamped = level_extent(640, 2, 5);
        assert_eq!((clamped.x, clamped.y), (20, 1));
    }

    #[test]
    fn row_pitch_is_aligned() {
        assert_eq!(row_pitch(3, 1), 12);
        assert_eq!(row_pitch(3, 256), 256);
        assert_eq!(row_pitch(64, 256), 256);
        assert_eq!(row_pitch(65, 256), 512);
        assert_eq!(row_pitch(5, 0), 20);
    }

    #[test]
    fn row_pitch_handles_non_power_of_two_alignment() {
        assert_eq!(row_pitch(3, 24), 24);
        assert_eq!(row_pitch(7, 24), 48);
        assert_eq!(row_pitch(6, 24), 24);
        assert_eq!(row_pitch(5, 12), 24);
    }

    #[test]
    fn sampler_reads_base_level_with_nearest_repeat() {
        let desc = sampler_desc();
        assert_eq!(desc.min_filter, i::Filter::Nearest);
        assert_eq!(desc.mag_filter, i::Filter::Nearest);
        assert_eq!(
            desc.wrap_mode,
            (i::WrapMode::Tile, i::WrapMode::Tile, i::WrapMode::Tile)
        );
        assert_eq!(desc.lod_range, i::Lod(0.0)..i::Lod(0.0));
    }
}

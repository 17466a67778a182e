use gfx_hal::{
    adapter, buffer as b, command, format as f, image as i, pass, pool,
    prelude::*,
    pso,
    queue::{family::QueueFamilyId, Submission},
    window, Backend,
};
use glam::Mat4;

use std::borrow::Borrow;
use std::iter;
use std::mem::ManuallyDrop;
use std::ptr;

mod buffer;
mod descriptor_set;
mod memory;
mod pipeline;
pub(crate) mod reflect;
mod shader;
mod swapchain;
mod texture;
mod vertex;

use crate::error::{Error, Result};
use crate::image_loader::RgbaPixels;
use buffer::Buffer;
use descriptor_set::DescriptorSet;
use memory::Memory;
use pipeline::Pipeline;
use shader::{Bindings, ShaderSet};
use swapchain::Swapchain;
use texture::Texture;
use vertex::{TexCoord, Vertex, TEX_COORDS, TRIANGLE};

const FRAMES_IN_FLIGHT: usize = 2;
const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Per-frame command buffers, sync objects and framebuffers, plus the pool
/// the command buffers come from.
struct Frames<'a, B: Backend> {
    device: &'a B::Device,
    command_pool: ManuallyDrop<B::CommandPool>,
    command_buffers: Vec<B::CommandBuffer>,
    submission_complete_semaphores: Vec<B::Semaphore>,
    submission_complete_fences: Vec<B::Fence>,
    framebuffers: Vec<Option<B::Framebuffer>>,
}

impl<'a, B: Backend> Frames<'a, B> {
    fn new(device: &'a B::Device, family: QueueFamilyId, count: usize) -> Result<Self> {
        let command_pool = unsafe {
            device.create_command_pool(family, pool::CommandPoolCreateFlags::RESET_INDIVIDUAL)
        }
        .map_err(Error::gpu("create_command_pool"))?;

        let mut frames: Frames<'a, B> = Frames {
            device,
            command_pool: ManuallyDrop::new(command_pool),
            command_buffers: Vec::with_capacity(count),
            submission_complete_semaphores: Vec::with_capacity(count),
            submission_complete_fences: Vec::with_capacity(count),
            framebuffers: (0..count).map(|_| None).collect(),
        };
        for _ in 0..count {
            frames
                .command_buffers
                .push(unsafe { frames.command_pool.allocate_one(command::Level::Primary) });
            frames.submission_complete_semaphores.push(
                device
                    .create_semaphore()
                    .map_err(Error::gpu("create_semaphore"))?,
            );
            frames.submission_complete_fences.push(
                device
                    .create_fence(true)
                    .map_err(Error::gpu("create_fence"))?,
            );
        }
        Ok(frames)
    }

    fn len(&self) -> usize {
        self.command_buffers.len()
    }

    /// Waits until slot `idx` is no longer in use by the GPU and releases the
    /// framebuffer it last rendered into.
    fn wait(&mut self, idx: usize) -> Result<()> {
        let fence = &self.submission_complete_fences[idx];
        unsafe {
            self.device
                .wait_for_fence(fence, !0)
                .map_err(Error::gpu("wait_for_fence"))?;
            self.device
                .reset_fence(fence)
                .map_err(Error::gpu("reset_fence"))?;
            if let Some(framebuffer) = self.framebuffers[idx].take() {
                self.device.destroy_framebuffer(framebuffer);
            }
        }
        Ok(())
    }
}

impl<'a, B: Backend> Drop for Frames<'a, B> {
    fn drop(&mut self) {
        let device = self.device;
        unsafe {
            for framebuffer in self.framebuffers.drain(..).flatten() {
                device.destroy_framebuffer(framebuffer);
            }
            for s in self.submission_complete_semaphores.drain(..) {
                device.destroy_semaphore(s);
            }
            for f in self.submission_complete_fences.drain(..) {
                device.destroy_fence(f);
            }
            self.command_pool.free(self.command_buffers.drain(..));
            device.destroy_command_pool(ManuallyDrop::into_inner(ptr::read(&self.command_pool)));
        }
    }
}

struct RenderPass<'a, B: Backend> {
    device: &'a B::Device,
    raw: ManuallyDrop<B::RenderPass>,
}

impl<'a, B: Backend> RenderPass<'a, B> {
    fn new(device: &'a B::Device, format: f::Format) -> Result<Self> {
        let attachment = pass::Attachment {
            format: Some(format),
            samples: 1,
            ops: pass::AttachmentOps::new(
                pass::AttachmentLoadOp::Clear,
                pass::AttachmentStoreOp::Store,
            ),
            stencil_ops: pass::AttachmentOps::DONT_CARE,
            layouts: i::Layout::Undefined..i::Layout::Present,
        };

        let subpass = pass::SubpassDesc {
            colors: &[(0, i::Layout::ColorAttachmentOptimal)],
            depth_stencil: None,
            inputs: &[],
            resolves: &[],
            preserves: &[],
        };

        let raw = unsafe { device.create_render_pass(&[attachment], &[subpass], &[]) }
            .map_err(Error::gpu("create_render_pass"))?;
        Ok(RenderPass {
            device,
            raw: ManuallyDrop::new(raw),
        })
    }
}

impl<'a, B: Backend> Drop for RenderPass<'a, B> {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_render_pass(ManuallyDrop::into_inner(ptr::read(&self.raw)));
        }
    }
}

/// Owns every GPU object the demo creates. Fields are released in
/// declaration order once the device is idle.
pub struct Renderer<'a, B: Backend> {
    frame: usize,
    device: &'a B::Device,
    bindings: Bindings,
    frames: Frames<'a, B>,
    pipeline: Pipeline<'a, B>,
    render_pass: RenderPass<'a, B>,
    descriptor_set: DescriptorSet<'a, B>,
    texture: Texture<'a, B>,
    tex_coords: Memory<'a, B, TexCoord>,
    vertices: Memory<'a, B, Vertex>,
    swapchain: Swapchain<'a, B>,
}

impl<'a, B> Renderer<'a, B>
where
    B: Backend,
{
    pub fn new(
        surface: &'a mut B::Surface,
        adapter: &'a adapter::Adapter<B>,
        device: &'a B::Device,
        queue: &mut B::CommandQueue,
        family: QueueFamilyId,
        init_dims: window::Extent2D,
        pixels: &RgbaPixels,
    ) -> Result<Self> {
        let memory_types = adapter.physical_device.memory_properties().memory_types;
        let limits = adapter.physical_device.limits();

        let shaders = ShaderSet::build()?;

        let vertex_buffer = Buffer::new(device, &TRIANGLE, &limits, b::Usage::VERTEX)?;
        let vertices = Memory::new(vertex_buffer, &memory_types)?;
        let tex_coord_buffer = Buffer::new(device, &TEX_COORDS, &limits, b::Usage::VERTEX)?;
        let tex_coords = Memory::new(tex_coord_buffer, &memory_types)?;

        let mut frames = Frames::new(device, family, FRAMES_IN_FLIGHT)?;
        let texture = Texture::new(device, adapter, queue, &mut frames.command_pool, pixels)?;
        let mut descriptor_set = DescriptorSet::new(device)?;
        descriptor_set.write_texture(&texture);

        let swapchain = Swapchain::new(device, surface, adapter, init_dims)?;
        let render_pass = RenderPass::new(device, swapchain.format)?;
        let pipeline = Pipeline::new(
            device,
            &shaders,
            &*render_pass.raw,
            &*descriptor_set.set_layout,
        )?;

        Ok(Renderer {
            frame: 0,
            device,
            bindings: shaders.bindings,
            frames,
            pipeline,
            render_pass,
            descriptor_set,
            texture,
            tex_coords,
            vertices,
            swapchain,
        })
    }

    /// Draws one frame into a framebuffer of `dims` with `mvp` as the
    /// vertex transform. Out-of-date swapchains are rebuilt and the frame is
    /// skipped.
    pub fn render(
        &mut self,
        queue: &mut B::CommandQueue,
        dims: window::Extent2D,
        mvp: &Mat4,
    ) -> Result<()> {
        self.swapchain.resize(dims)?;

        let surface_image = unsafe {
            match self.swapchain.surface.acquire_image(!0) {
                Ok((image, _)) => image,
                Err(err) => {
                    log::debug!("acquire_image failed ({:?}), recreating swapchain", err);
                    self.swapchain.recreate()?;
                    return Ok(());
                }
            }
        };

        let frame_idx = self.frame % self.frames.len();
        self.frames.wait(frame_idx)?;

        let frame_buffer = unsafe {
            self.device.create_framebuffer(
                &self.render_pass.raw,
                iter::once(surface_image.borrow()),
                i::Extent {
                    width: self.swapchain.dims.width,
                    height: self.swapchain.dims.height,
                    depth: 1,
                },
            )
        }
        .map_err(Error::gpu("create_framebuffer"))?;

        let cols = mvp.to_cols_array();
        let mvp_words: &[u32] = bytemuck::cast_slice(&cols[..]);

        let cmd_buffer = &mut self.frames.command_buffers[frame_idx];
        unsafe {
            cmd_buffer.reset(false);
            cmd_buffer.begin_primary(command::CommandBufferFlags::ONE_TIME_SUBMIT);
            cmd_buffer.set_viewports(0, &[self.swapchain.viewport.clone()]);
            cmd_buffer.set_scissors(0, &[self.swapchain.viewport.rect]);
            cmd_buffer.bind_graphics_pipeline(&self.pipeline.pipeline);
            cmd_buffer.bind_vertex_buffers(
                vertex::VERTEX_BINDING,
                vec![
                    (&*self.vertices.buffer.buf, b::SubRange::WHOLE),
                    (&*self.tex_coords.buffer.buf, b::SubRange::WHOLE),
                ],
            );
            cmd_buffer.bind_graphics_descriptor_sets(
                &self.pipeline.pipeline_layout,
                0,
                iter::once(&self.descriptor_set.set),
                &[],
            );
            cmd_buffer.push_graphics_constants(
                &self.pipeline.pipeline_layout,
                pso::ShaderStageFlags::VERTEX,
                self.bindings.mvp_offset,
                mvp_words,
            );
            cmd_buffer.begin_render_pass(
                &self.render_pass.raw,
                &frame_buffer,
                self.swapchain.viewport.rect,
                &[command::ClearValue {
                    color: command::ClearColor {
                        float32: CLEAR_COLOR,
                    },
                }],
                command::SubpassContents::Inline,
            );
            cmd_buffer.draw(0..TRIANGLE.len() as u32, 0..1);
            cmd_buffer.end_render_pass();
            cmd_buffer.finish();

            let submission = Submission {
                command_buffers: iter::once(&*cmd_buffer),
                wait_semaphores: None,
                signal_semaphores: iter::once(&self.frames.submission_complete_semaphores[frame_idx]),
            };

            queue.submit(
                submission,
                Some(&self.frames.submission_complete_fences[frame_idx]),
            );

            let result = queue.present_surface(
                &mut self.swapchain.surface,
                surface_image,
                Some(&self.frames.submission_complete_semaphores[frame_idx]),
            );

            if let Err(err) = result {
                log::debug!("present failed ({:?}), recreating swapchain", err);
                self.swapchain.recreate()?;
            }
        }
        self.frames.framebuffers[frame_idx] = Some(frame_buffer);

        self.frame += 1;
        Ok(())
    }

    pub fn texture_levels(&self) -> i::Level {
        self.texture.levels
    }
}

impl<'a, B: Backend> Drop for Renderer<'a, B> {
    fn drop(&mut self) {
        if let Err(err) = self.device.wait_idle() {
            log::error!("failed to wait for device idle: {:?}", err);
        }
    }
}

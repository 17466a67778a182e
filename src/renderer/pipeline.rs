use gfx_hal::{pass::Subpass, prelude::*, pso, Backend};
use std::iter;
use std::mem::ManuallyDrop;
use std::ptr;

use super::shader::ShaderSet;
use super::vertex;
use crate::error::{truncate_diagnostic, Error, Result};

const ENTRY_NAME: &str = "main";

/// Texels overwrite the framebuffer; alpha is written but never blended.
pub fn color_blend_desc() -> pso::ColorBlendDesc {
    pso::ColorBlendDesc {
        mask: pso::ColorMask::ALL,
        blend: None,
    }
}

pub struct Pipeline<'a, B: Backend> {
    device: &'a B::Device,
    pub pipeline: ManuallyDrop<B::GraphicsPipeline>,
    pub pipeline_layout: ManuallyDrop<B::PipelineLayout>,
}

impl<'a, B: Backend> Pipeline<'a, B> {
    pub fn new(
        device: &'a B::Device,
        shaders: &ShaderSet,
        render_pass: &B::RenderPass,
        set_layout: &B::DescriptorSetLayout,
    ) -> Result<Self> {
        let push_constants = (pso::ShaderStageFlags::VERTEX, shaders.bindings.mvp_range());
        let pipeline_layout =
            unsafe { device.create_pipeline_layout(iter::once(set_layout), &[push_constants]) }
                .map_err(Error::gpu("create_pipeline_layout"))?;

        match Self::create_pipeline(device, shaders, render_pass, &pipeline_layout) {
            Ok(pipeline) => Ok(Pipeline {
                device,
                pipeline: ManuallyDrop::new(pipeline),
                pipeline_layout: ManuallyDrop::new(pipeline_layout),
            }),
            Err(err) => {
                unsafe { device.destroy_pipeline_layout(pipeline_layout) };
                Err(err)
            }
        }
    }

    fn create_pipeline(
        device: &B::Device,
        shaders: &ShaderSet,
        render_pass: &B::RenderPass,
        pipeline_layout: &B::PipelineLayout,
    ) -> Result<B::GraphicsPipeline> {
        let vs_module = Self::load_spirv(device, &shaders.vertex)?;
        let fs_module = match Self::load_spirv(device, &shaders.fragment) {
            Ok(module) => module,
            Err(err) => {
                unsafe { device.destroy_shader_module(vs_module) };
                return Err(err);
            }
        };

        let graphic_pipeline = {
            let (vs_entry, fs_entry) = (
                pso::EntryPoint {
                    entry: ENTRY_NAME,
                    module: &vs_module,
                    specialization: pso::Specialization::default(),
                },
                pso::EntryPoint {
                    entry: ENTRY_NAME,
                    module: &fs_module,
                    specialization: pso::Specialization::default(),
                },
            );

            let shader_entries = pso::GraphicsShaderSet {
                vertex: vs_entry,
                hull: None,
                domain: None,
                geometry: None,
                fragment: Some(fs_entry),
            };

            let subpass = Subpass {
                index: 0,
                main_pass: render_pass,
            };

            let mut pipeline_desc = pso::GraphicsPipelineDesc::new(
                shader_entries,
                pso::Primitive::TriangleList,
                pso::Rasterizer::FILL,
                pipeline_layout,
                subpass,
            );
            pipeline_desc.blender.targets.push(color_blend_desc());
            pipeline_desc.vertex_buffers = vertex::vertex_buffer_descs();
            pipeline_desc.attributes = vertex::attribute_descs(&shaders.bindings);

            unsafe { device.create_graphics_pipeline(&pipeline_desc, None) }
                .map_err(|err| Error::PipelineCreation(truncate_diagnostic(&format!("{:?}", err))))
        };

        unsafe {
            device.destroy_shader_module(vs_module);
            device.destroy_shader_module(fs_module);
        }

        let graphic_pipeline = graphic_pipeline?;
        log::debug!("graphics pipeline created");
        Ok(graphic_pipeline)
    }

    fn load_spirv(device: &B::Device, spirv: &[u32]) -> Result<B::ShaderModule> {
        unsafe { device.create_shader_module(spirv) }
            .map_err(|err| Error::PipelineCreation(truncate_diagnostic(&format!("{:?}", err))))
    }
}

impl<'a, B: Backend> Drop for Pipeline<'a, B> {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_graphics_pipeline(ManuallyDrop::into_inner(ptr::read(&self.pipeline)));
            self.device
                .destroy_pipeline_layout(ManuallyDrop::into_inner(ptr::read(
                    &self.pipeline_layout,
                )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_target_writes_without_blending() {
        let desc = color_blend_desc();
        assert!(desc.blend.is_none());
        assert_eq!(desc.mask, pso::ColorMask::ALL);
    }
}

use gfx_hal::{image as i, prelude::*, pso, Backend};
use std::mem::ManuallyDrop;
use std::ptr;

use super::texture::Texture;
use crate::error::{Error, Result};

pub const IMAGE_BINDING: pso::DescriptorBinding = 0;
pub const SAMPLER_BINDING: pso::DescriptorBinding = 1;

/// Sampled image + sampler pair read by the fragment stage.
pub struct DescriptorSet<'a, B: Backend> {
    device: &'a B::Device,
    pub set_layout: ManuallyDrop<B::DescriptorSetLayout>,
    pool: ManuallyDrop<B::DescriptorPool>,
    pub set: B::DescriptorSet,
}

fn image_descriptor() -> pso::DescriptorType {
    pso::DescriptorType::Image {
        ty: pso::ImageDescriptorType::Sampled {
            with_sampler: false,
        },
    }
}

impl<'a, B: Backend> DescriptorSet<'a, B> {
    pub fn new(device: &'a B::Device) -> Result<Self> {
        let set_layout = Self::create_descriptor_set_layout(device)?;
        let mut pool = match Self::create_descriptor_pool(device) {
            Ok(pool) => pool,
            Err(err) => {
                unsafe {
                    device.destroy_descriptor_set_layout(ManuallyDrop::into_inner(set_layout))
                };
                return Err(err);
            }
        };
        let set = match Self::create_descriptor_set(&mut pool, &set_layout) {
            Ok(set) => set,
            Err(err) => {
                unsafe {
                    device.destroy_descriptor_pool(ManuallyDrop::into_inner(pool));
                    device.destroy_descriptor_set_layout(ManuallyDrop::into_inner(set_layout));
                }
                return Err(err);
            }
        };

        Ok(DescriptorSet {
            set_layout,
            pool,
            set,
            device,
        })
    }

    /// Points both bindings at `texture`.
    pub fn write_texture(&mut self, texture: &Texture<'_, B>) {
        unsafe {
            self.device.write_descriptor_sets(vec![
                pso::DescriptorSetWrite {
                    set: &self.set,
                    binding: IMAGE_BINDING,
                    array_offset: 0,
                    descriptors: Some(pso::Descriptor::Image(
                        &*texture.view,
                        i::Layout::ShaderReadOnlyOptimal,
                    )),
                },
                pso::DescriptorSetWrite {
                    set: &self.set,
                    binding: SAMPLER_BINDING,
                    array_offset: 0,
                    descriptors: Some(pso::Descriptor::Sampler(&*texture.sampler)),
                },
            ]);
        }
    }

    pub(super) fn create_descriptor_set_layout(
        device: &B::Device,
    ) -> Result<ManuallyDrop<B::DescriptorSetLayout>> {
        let layout = unsafe {
            device.create_descriptor_set_layout(
                &[
                    pso::DescriptorSetLayoutBinding {
                        binding: IMAGE_BINDING,
                        ty: image_descriptor(),
                        count: 1,
                        stage_flags: pso::ShaderStageFlags::FRAGMENT,
                        immutable_samplers: false,
                    },
                    pso::DescriptorSetLayoutBinding {
                        binding: SAMPLER_BINDING,
                        ty: pso::DescriptorType::Sampler,
                        count: 1,
                        stage_flags: pso::ShaderStageFlags::FRAGMENT,
                        immutable_samplers: false,
                    },
                ],
                &[],
            )
        }
        .map_err(Error::gpu("create_descriptor_set_layout"))?;
        Ok(ManuallyDrop::new(layout))
    }

    pub(super) fn create_descriptor_pool(
        device: &B::Device,
    ) -> Result<ManuallyDrop<B::DescriptorPool>> {
        let pool = unsafe {
            device.create_descriptor_pool(
                1,
                &[
                    pso::DescriptorRangeDesc {
                        ty: image_descriptor(),
                        count: 1,
                    },
                    pso::DescriptorRangeDesc {
                        ty: pso::DescriptorType::Sampler,
                        count: 1,
                    },
                ],
                pso::DescriptorPoolCreateFlags::empty(),
            )
        }
        .map_err(Error::gpu("create_descriptor_pool"))?;
        Ok(ManuallyDrop::new(pool))
    }

    pub(super) fn create_descriptor_set(
        desc_pool: &mut ManuallyDrop<B::DescriptorPool>,
        layout: &ManuallyDrop<B::DescriptorSetLayout>,
    ) -> Result<B::DescriptorSet> {
        unsafe { desc_pool.allocate_set(&**layout) }.map_err(Error::gpu("allocate_set"))
    }
}

impl<'a, B: Backend> Drop for DescriptorSet<'a, B> {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_descriptor_set_layout(ManuallyDrop::into_inner(ptr::read(
                    &self.set_layout,
                )));
            self.device
                .destroy_descriptor_pool(ManuallyDrop::into_inner(ptr::read(&self.pool)));
        }
    }
}

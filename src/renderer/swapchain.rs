use gfx_hal::{adapter::Adapter, format as f, prelude::*, pso, window, Backend};

use crate::error::{Error, Result};

/// Prefers an sRGB format, then the first one the surface reports, then
/// `Rgba8Srgb` when the surface has no preference or an empty list.
pub fn pick_format(formats: Option<Vec<f::Format>>) -> f::Format {
    let formats = formats.unwrap_or_default();
    formats
        .iter()
        .find(|format| format.base_format().1 == f::ChannelType::Srgb)
        .or_else(|| formats.first())
        .copied()
        .unwrap_or(f::Format::Rgba8Srgb)
}

pub struct Swapchain<'a, B: Backend> {
    device: &'a B::Device,
    adapter: &'a Adapter<B>,
    pub viewport: pso::Viewport,
    pub dims: window::Extent2D,
    pub surface: &'a mut B::Surface,
    pub format: f::Format,
}

impl<'a, B: Backend> Swapchain<'a, B> {
    pub fn new(
        device: &'a B::Device,
        surface: &'a mut B::Surface,
        adapter: &'a Adapter<B>,
        dims: window::Extent2D,
    ) -> Result<Self> {
        let format = pick_format(surface.supported_formats(&adapter.physical_device));
        log::debug!("swapchain format: {:?}", format);

        let viewport = pso::Viewport {
            rect: pso::Rect {
                x: 0,
                y: 0,
                w: dims.width as _,
                h: dims.height as _,
            },
            depth: 0.0..1.0,
        };

        let mut swapchain = Swapchain {
            device,
            surface,
            adapter,
            viewport,
            format,
            dims,
        };

        swapchain.recreate()?;
        Ok(swapchain)
    }

    /// Reconfigures for `dims` if they differ from the current size.
    pub fn resize(&mut self, dims: window::Extent2D) -> Result<()> {
        if dims == self.dims {
            return Ok(());
        }
        log::debug!(
            "framebuffer resized to {}x{}",
            dims.width,
            dims.height
        );
        self.dims = dims;
        self.recreate()
    }

    pub fn recreate(&mut self) -> Result<()> {
        let caps = self.surface.capabilities(&self.adapter.physical_device);

        let mut swap_config = window::SwapchainConfig::from_caps(&caps, self.format, self.dims);
        swap_config.present_mode = window::PresentMode::FIFO;
        let extent = swap_config.extent;
        unsafe {
            self.surface
                .configure_swapchain(&self.device, swap_config)
                .map_err(Error::gpu("configure_swapchain"))?;
        }

        self.viewport.rect.w = extent.width as _;
        self.viewport.rect.h = extent.height as _;
        Ok(())
    }
}

impl<'a, B: Backend> Drop for Swapchain<'a, B> {
    fn drop(&mut self) {
        unsafe { self.surface.unconfigure_swapchain(&self.device) }
    }
}

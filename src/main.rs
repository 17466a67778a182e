#[cfg(feature = "metal")]
use gfx_backend_metal as back;

#[cfg(feature = "vulkan")]
use gfx_backend_vulkan as back;

mod control;
mod error;
mod image_loader;
mod renderer;
mod transform;

use control::{Input, LoopState};
use error::{Error, Result};
use renderer::Renderer;

use gfx_hal::{adapter::Adapter, prelude::*, window, Backend, Features};
use std::time::Instant;
use winit::{
    event::Event,
    event_loop::{ControlFlow, EventLoop},
    platform::desktop::EventLoopExtDesktop,
    window::{Window, WindowBuilder},
};

const DIMS: window::Extent2D = window::Extent2D {
    width: 640,
    height: 480,
};
const TITLE: &str = "My Title";
const TEXTURE_PATH: &str = "rainbow.png";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match run() {
        Ok(()) => log::info!("closed"),
        Err(err) => log::error!("{}", err),
    }
}

fn run() -> Result<()> {
    let mut event_loop = EventLoop::new();
    let window = WindowBuilder::new()
        .with_title(TITLE)
        .with_inner_size(winit::dpi::Size::Physical(winit::dpi::PhysicalSize::new(
            DIMS.width,
            DIMS.height,
        )))
        .with_resizable(false)
        .with_always_on_top(true)
        .build(&event_loop)?;

    let instance = back::Instance::create("gfx-rs textured triangle", 1)
        .map_err(|_| Error::UnsupportedBackend)?;
    let mut surface = unsafe { instance.create_surface(&window) }
        .map_err(|err| Error::Surface(format!("{:?}", err)))?;

    let adapters = instance.enumerate_adapters();
    let result = render_until_closed::<back::Backend>(&mut event_loop, &window, adapters, &mut surface);

    unsafe {
        instance.destroy_surface(surface);
    }
    result
}

fn render_until_closed<B: Backend>(
    event_loop: &mut EventLoop<()>,
    window: &Window,
    adapters: Vec<Adapter<B>>,
    surface: &mut B::Surface,
) -> Result<()> {
    let (adapter, family_id) = adapters
        .into_iter()
        .find_map(|adapter| {
            let family = adapter
                .queue_families
                .iter()
                .find(|family| {
                    surface.supports_queue_family(family)
                        && family.queue_type().supports_graphics()
                })?
                .id();
            Some((adapter, family))
        })
        .ok_or(Error::NoSuitableAdapter)?;
    log::info!("using adapter: {}", adapter.info.name);

    let family = adapter
        .queue_families
        .iter()
        .find(|family| family.id() == family_id)
        .ok_or(Error::NoSuitableAdapter)?;
    let mut gpu = unsafe {
        adapter
            .physical_device
            .open(&[(family, &[1.0])], Features::empty())
    }
    .map_err(|err| Error::DeviceOpen(format!("{:?}", err)))?;

    let mut queue_group = gpu.queue_groups.pop().ok_or(Error::NoSuitableAdapter)?;
    let device = gpu.device;

    let pixels = image_loader::load_rgba(TEXTURE_PATH)?;
    let queue = &mut queue_group.queues[0];
    let mut renderer = Renderer::new(
        surface,
        &adapter,
        &device,
        queue,
        queue_group.family,
        DIMS,
        &pixels,
    )?;
    drop(pixels);
    log::info!(
        "ready: texture has {} mip levels",
        renderer.texture_levels()
    );

    let start = Instant::now();
    let mut fps_counter = fps_counter::FPSCounter::new();
    let mut state = LoopState::Running;
    let mut pending = Vec::new();
    let mut failure = None;

    event_loop.run_return(|event, _, control_flow| {
        *control_flow = ControlFlow::Poll;
        match event {
            Event::WindowEvent { event, .. } => {
                pending.extend(Input::from_window_event(&event));
            }
            Event::MainEventsCleared => {
                state = state.process(pending.drain(..));
                if !state.is_running() {
                    *control_flow = ControlFlow::Exit;
                    return;
                }

                let size = window.inner_size();
                let aspect = match transform::aspect_ratio(size.width, size.height) {
                    Some(aspect) => aspect,
                    None => return,
                };
                let mvp = transform::mvp(aspect, start.elapsed().as_secs_f32());
                let dims = window::Extent2D {
                    width: size.width,
                    height: size.height,
                };
                if let Err(err) = renderer.render(queue, dims, &mvp) {
                    failure = Some(err);
                    *control_flow = ControlFlow::Exit;
                    return;
                }
                log::trace!("fps: {}", fps_counter.tick());
            }
            _ => {}
        }
    });

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

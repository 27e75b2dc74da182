use std::sync::Arc;
use std::time::{Duration, Instant};

use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes, WindowId},
};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::gfx::{context::GpuContext, render_engine::GpuBackend, resources::target::RenderTarget};
use crate::performance::PerformanceMonitor;
use crate::simulation::scheduler::FrameScheduler;

pub struct App {
    event_loop: EventLoop<()>,
    app_state: AppState,
}

struct AppState {
    config: EngineConfig,
    window: Option<Arc<Window>>,
    scheduler: Option<FrameScheduler<GpuBackend>>,
    monitor: PerformanceMonitor,
    next_tick: Instant,
    ticks: u64,
    error: Option<EngineError>,
}

impl App {
    /// Validate `config` and open the event loop; no window exists yet
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let event_loop = EventLoop::new()?;

        Ok(Self {
            event_loop,
            app_state: AppState {
                config,
                window: None,
                scheduler: None,
                monitor: PerformanceMonitor::new(),
                next_tick: Instant::now(),
                ticks: 0,
                error: None,
            },
        })
    }

    /// Run until the window closes or a fatal error stops the loop
    pub fn run(self) -> EngineResult<()> {
        let App {
            event_loop,
            mut app_state,
        } = self;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop.run_app(&mut app_state)?;

        match app_state.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Deadline after the tick due at `due`, re-anchored to `now` when the loop
/// has fallen more than one interval behind
fn next_deadline(due: Instant, now: Instant, interval: Duration) -> Instant {
    let next = due + interval;
    if next <= now {
        now + interval
    } else {
        next
    }
}

impl AppState {
    fn start(&mut self, event_loop: &ActiveEventLoop) -> EngineResult<()> {
        let grid = self.config.grid;
        let window = Arc::new(
            event_loop.create_window(
                WindowAttributes::default()
                    .with_title(format!("gridlife {}x{}", grid.width(), grid.height()))
                    .with_inner_size(winit::dpi::LogicalSize::new(768, 768)),
            )?,
        );
        let (width, height) = window.inner_size().into();

        let (context, surface) = GpuContext::new(window.clone())?;
        let target = RenderTarget::for_surface(
            surface,
            context.adapter(),
            context.device(),
            width,
            height,
        );
        let backend = GpuBackend::new(context, target, &self.config)?;

        self.scheduler = Some(FrameScheduler::new(backend, &self.config));
        self.window = Some(window);
        self.next_tick = Instant::now();
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: EngineError) {
        log::error!("{err}");
        self.error = Some(err);
        event_loop.exit();
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(scheduler) = self.scheduler.as_mut() {
            if let Err(err) = scheduler.drain() {
                log::warn!("Failed to drain GPU work on shutdown: {err}");
            }
            log::info!(
                "Stopped at step {} ({:?})",
                scheduler.step(),
                scheduler.stats()
            );
        }
        event_loop.exit();
    }

    fn tick(&mut self, event_loop: &ActiveEventLoop) {
        let Some(scheduler) = self.scheduler.as_mut() else {
            return;
        };

        self.monitor.begin_tick();
        let outcome = scheduler.tick();
        let step = scheduler.step();
        match outcome {
            Ok(outcome) => self.monitor.end_tick(&outcome),
            Err(err) => {
                self.fail(event_loop, err);
                return;
            }
        }

        self.ticks += 1;
        let report_every = self.config.report_every;
        if report_every > 0 && self.ticks % report_every == 0 {
            self.monitor.log_summary(step);
        }
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.start(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        ..
                    },
                ..
            }
            | WindowEvent::CloseRequested => self.shutdown(event_loop),
            WindowEvent::Resized(PhysicalSize { width, height }) => {
                if let Some(scheduler) = self.scheduler.as_mut() {
                    scheduler.backend_mut().resize(width, height);
                }
            }
            _ => (),
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.scheduler.is_none() || event_loop.exiting() {
            return;
        }

        let now = Instant::now();
        if now >= self.next_tick {
            self.tick(event_loop);
            self.next_tick = next_deadline(self.next_tick, now, self.config.tick_interval);
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_tick));
    }
}

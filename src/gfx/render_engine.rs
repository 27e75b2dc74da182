//! GPU frame backend
//!
//! Binds the state store, the generation kernel, the cell renderer and a
//! drawable target into one [`FrameBackend`]. Both passes of a tick are
//! recorded into a single command encoder and submitted together, so queue
//! order alone guarantees the draw sees the finished generation.

use std::iter;

use super::context::GpuContext;
use super::rendering::cell_renderer::{CellRenderer, UnitQuad};
use super::resources::target::{Drawable, RenderTarget};
use crate::config::{EngineConfig, Workload};
use crate::error::EngineResult;
use crate::simulation::{
    gpu::{check_limits, CellStateStore, LifeKernel},
    grid::{GridSize, KernelPass},
    pattern::SweepPattern,
    rule::population,
    scheduler::{FrameBackend, Stepped, SubmissionTicket},
};

/// Commands recorded for one tick plus the drawable they target
pub struct GpuFrame {
    encoder: wgpu::CommandEncoder,
    drawable: Drawable,
}

pub struct GpuBackend {
    context: GpuContext,
    target: RenderTarget,
    store: CellStateStore,
    kernel: LifeKernel,
    renderer: CellRenderer,
    workload: Workload,
    sweep: SweepPattern,
}

impl GpuBackend {
    /// Validate `config` against the device, seed the store and build both
    /// pipelines
    pub fn new(context: GpuContext, target: RenderTarget, config: &EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        check_limits(&context.limits(), config)?;

        let grid = config.grid;
        let seed = config.seed.seed(grid);
        log::info!(
            "Seeded {}x{} grid: {} of {} cells alive (p = {})",
            grid.width(),
            grid.height(),
            population(&seed),
            grid.cell_count(),
            config.seed.alive_probability()
        );

        let device = context.device();
        let store = CellStateStore::new(device, grid, &seed)?;
        let kernel = LifeKernel::new(device, &store, config.tile);
        let (groups_x, groups_y) = kernel.workgroups();
        log::info!(
            "Kernel dispatch: {}x{} tiles of {}x{}{}",
            groups_x,
            groups_y,
            config.tile.width(),
            config.tile.height(),
            if config.tile.is_aligned(grid) {
                ""
            } else {
                ", edge tiles bounds-checked"
            }
        );

        let renderer = CellRenderer::new(
            device,
            &store,
            target.format(),
            &UnitQuad::new(config.quad_extent),
            config.clear_color,
        );

        Ok(Self {
            context,
            target,
            store,
            kernel,
            renderer,
            workload: config.workload,
            sweep: SweepPattern::new(config.seed.rng()),
        })
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    pub fn store(&self) -> &CellStateStore {
        &self.store
    }

    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.target.resize(self.context.device(), width, height);
    }
}

impl FrameBackend for GpuBackend {
    type Frame = GpuFrame;

    fn grid(&self) -> GridSize {
        self.store.grid()
    }

    fn begin_frame(&mut self) -> EngineResult<Option<GpuFrame>> {
        let Some(drawable) = self.target.acquire(self.context.device())? else {
            return Ok(None);
        };
        let encoder = self
            .context
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Tick Encoder"),
            });
        Ok(Some(GpuFrame { encoder, drawable }))
    }

    fn encode_generation(
        &mut self,
        frame: &mut GpuFrame,
        pass: KernelPass,
        step: u64,
    ) -> EngineResult<()> {
        match self.workload {
            Workload::Life => {
                self.kernel.encode(&mut frame.encoder, pass);
                Ok(())
            }
            Workload::Sweep => {
                // Queue writes land before the next submission's commands
                let markers = self.sweep.frame(step + 1, self.store.grid());
                self.store.upload(self.context.queue(), pass.write, &markers)
            }
        }
    }

    fn encode_draw(&mut self, frame: &mut GpuFrame, stepped: &Stepped) {
        self.renderer.encode(
            &mut frame.encoder,
            frame.drawable.view(),
            &self.store,
            stepped,
        );
    }

    fn submit(&mut self, frame: GpuFrame, ticket: SubmissionTicket) -> EngineResult<()> {
        let queue = self.context.queue();
        queue.submit(iter::once(frame.encoder.finish()));
        queue.on_submitted_work_done(move || ticket.complete());
        frame.drawable.present();
        Ok(())
    }

    fn poll(&mut self) {
        if let Err(err) = self.context.device().poll(wgpu::PollType::Poll) {
            log::warn!("Device poll failed: {err}");
        }
    }

    fn wait_idle(&mut self) -> EngineResult<()> {
        self.context.device().poll(wgpu::PollType::Wait)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::{
        grid::{BufferRole, HostCells},
        pattern::SeedPolicy,
        rule::{step_generation, ALIVE},
        scheduler::{FrameScheduler, TickOutcome},
    };
    use crate::config::OverloadPolicy;

    const TARGET_SIZE: u32 = 64;

    /// Multi-tick tests must never coalesce, whatever the device's pace
    fn blocking(config: EngineConfig) -> EngineConfig {
        config.with_overload(2, OverloadPolicy::Block)
    }

    fn headless_backend(config: &EngineConfig) -> Option<GpuBackend> {
        let context = match GpuContext::new_headless() {
            Ok(context) => context,
            Err(err) => {
                eprintln!("skipping GPU test: {err}");
                return None;
            }
        };
        let target = RenderTarget::offscreen(
            context.device(),
            TARGET_SIZE,
            TARGET_SIZE,
            wgpu::TextureFormat::Rgba8Unorm,
        );
        Some(GpuBackend::new(context, target, config).unwrap())
    }

    fn current_cells(scheduler: &FrameScheduler<GpuBackend>) -> Vec<u32> {
        let backend = scheduler.backend();
        let context = backend.context();
        backend
            .store()
            .buffer(BufferRole::for_step(scheduler.step()))
            .read_back(context.device(), context.queue())
    }

    /// Same grid, same seed, same step: device and host must agree exactly
    fn assert_matches_reference(config: &EngineConfig, ticks: u64) {
        let Some(backend) = headless_backend(config) else {
            return;
        };
        let mut scheduler = FrameScheduler::new(backend, config);

        let grid = config.grid;
        let mut reference = HostCells::from_seed(grid, config.seed.seed(grid)).unwrap();
        for step in 0..ticks {
            assert_eq!(
                scheduler.tick().unwrap(),
                TickOutcome::Submitted { step: step + 1 }
            );
            let (read, write) = reference.select_mut(step);
            step_generation(read, write, grid);
        }
        scheduler.drain().unwrap();

        assert_eq!(&current_cells(&scheduler), reference.current(ticks));
    }

    #[test]
    fn test_kernel_matches_reference_on_aligned_grid() {
        let config = blocking(
            EngineConfig::with_grid(64, 32)
                .unwrap()
                .with_seed(SeedPolicy::default().with_rng_seed(3)),
        );
        assert_matches_reference(&config, 17);
    }

    #[test]
    fn test_kernel_matches_reference_on_ragged_grid() {
        let config = blocking(
            EngineConfig::with_grid(37, 21)
                .unwrap()
                .with_seed(SeedPolicy::default().with_rng_seed(5)),
        );
        assert!(!config.tile.is_aligned(config.grid));
        assert_matches_reference(&config, 12);
    }

    #[test]
    fn test_kernel_wraps_across_the_seam() {
        // Horizontal blinker straddling the left/right edge
        let config = EngineConfig::with_grid(8, 8)
            .unwrap()
            .with_seed(SeedPolicy::new(0.0).unwrap());
        let Some(backend) = headless_backend(&config) else {
            return;
        };
        let grid = config.grid;
        let mut seed = vec![0; grid.cell_count()];
        for x in [7, 0, 1] {
            seed[grid.index(x, 4)] = ALIVE;
        }
        backend
            .store()
            .upload(backend.context().queue(), BufferRole::A, &seed)
            .unwrap();

        let mut scheduler = FrameScheduler::new(backend, &config);
        scheduler.tick().unwrap();
        scheduler.drain().unwrap();

        let cells = current_cells(&scheduler);
        let alive: Vec<(u32, u32)> = (0..cells.len())
            .filter(|&i| cells[i] == ALIVE)
            .map(|i| grid.coords(i))
            .collect();
        assert_eq!(alive, vec![(0, 3), (0, 4), (0, 5)]);
    }

    #[test]
    fn test_draw_shows_live_cells_over_clear_colour() {
        // 2x2 block in a 4x4 torus is a still life
        let config = EngineConfig::with_grid(4, 4)
            .unwrap()
            .with_seed(SeedPolicy::new(0.0).unwrap());
        let Some(backend) = headless_backend(&config) else {
            return;
        };
        let grid = config.grid;
        let mut seed = vec![0; grid.cell_count()];
        for (x, y) in [(1, 1), (2, 1), (1, 2), (2, 2)] {
            seed[grid.index(x, y)] = ALIVE;
        }
        backend
            .store()
            .upload(backend.context().queue(), BufferRole::A, &seed)
            .unwrap();

        let mut scheduler = FrameScheduler::new(backend, &config);
        scheduler.tick().unwrap();
        scheduler.drain().unwrap();

        let backend = scheduler.backend();
        let pixels = backend
            .target()
            .read_pixels(backend.context().device(), backend.context().queue())
            .unwrap();
        // Cell (x, y) is centred at pixel (16x + 8, 64 - 16y - 8)
        let pixel = |x: u32, y: u32| {
            let offset = ((y * TARGET_SIZE + x) * 4) as usize;
            [
                pixels[offset],
                pixels[offset + 1],
                pixels[offset + 2],
                pixels[offset + 3],
            ]
        };
        let close = |actual: [u8; 4], expected: [u8; 4]| {
            actual
                .iter()
                .zip(expected)
                .all(|(&a, e)| (a as i32 - e as i32).abs() <= 2)
        };

        // Live cell (1, 1): gradient (0.25, 0.25, 0.75)
        assert!(close(pixel(24, 40), [64, 64, 191, 255]), "{:?}", pixel(24, 40));
        // Dead cell (0, 0): clear colour (0, 0, 0.4)
        assert!(close(pixel(8, 56), [0, 0, 102, 255]), "{:?}", pixel(8, 56));
    }

    #[test]
    fn test_sweep_workload_writes_markers() {
        let config = blocking(
            EngineConfig::with_grid(6, 5)
                .unwrap()
                .with_workload(Workload::Sweep)
                .with_seed(SeedPolicy::default().with_rng_seed(9)),
        );
        let Some(backend) = headless_backend(&config) else {
            return;
        };
        let mut scheduler = FrameScheduler::new(backend, &config);
        for _ in 0..4 {
            scheduler.tick().unwrap();
        }
        scheduler.drain().unwrap();

        let cells = current_cells(&scheduler);
        let live = population(&cells);
        assert!((1..=3).contains(&live));
        // Horizontal marker for step 4
        assert_eq!(cells[4], ALIVE);
    }
}

//! Frame Scheduler
//!
//! Drives one tick at a time: select the buffer orientation from the
//! pre-increment step, record the generation pass, advance the step, record
//! the draw of the now-current buffer, and submit both passes as one unit.
//!
//! The step counter is private; [`FrameScheduler::step`] is the only view of
//! it. The renderer can only be reached through a [`Stepped`] token, which is
//! minted here after a generation pass, so a draw can never read the unwritten
//! buffer B.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use super::grid::{BufferRole, GridSize, KernelPass};
use crate::config::{EngineConfig, OverloadPolicy};
use crate::error::EngineResult;

/// Proof that a generation pass has been recorded for `step`
#[derive(Debug)]
pub struct Stepped {
    step: u64,
    current: BufferRole,
}

impl Stepped {
    /// Post-increment step value
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Buffer holding the generation just written
    pub fn current(&self) -> BufferRole {
        self.current
    }
}

/// Counter of submitted ticks whose GPU work has not completed
#[derive(Clone, Debug, Default)]
pub struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    fn acquire(&self) -> SubmissionTicket {
        self.0.fetch_add(1, Ordering::AcqRel);
        SubmissionTicket {
            counter: Arc::clone(&self.0),
        }
    }
}

/// Held by a submission until its work completes; dropping it retires the tick
#[derive(Debug)]
pub struct SubmissionTicket {
    counter: Arc<AtomicUsize>,
}

impl SubmissionTicket {
    pub fn complete(self) {}
}

impl Drop for SubmissionTicket {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

/// The device side of a tick
pub trait FrameBackend {
    /// Commands recorded for one tick
    type Frame;

    fn grid(&self) -> GridSize;

    /// Acquire a drawable and start recording; `None` when the target is
    /// temporarily unavailable and the tick should be skipped
    fn begin_frame(&mut self) -> EngineResult<Option<Self::Frame>>;

    /// Record the pass that produces generation `step + 1` into `pass.write`
    fn encode_generation(
        &mut self,
        frame: &mut Self::Frame,
        pass: KernelPass,
        step: u64,
    ) -> EngineResult<()>;

    /// Record the instanced draw of `stepped.current()`
    fn encode_draw(&mut self, frame: &mut Self::Frame, stepped: &Stepped);

    /// Submit both passes as one unit; `ticket` must be dropped once the
    /// device has finished the work
    fn submit(&mut self, frame: Self::Frame, ticket: SubmissionTicket) -> EngineResult<()>;

    /// Drive completion callbacks without blocking
    fn poll(&mut self) {}

    /// Block until every submission has completed
    fn wait_idle(&mut self) -> EngineResult<()>;
}

/// Which pass a dispatched frame is in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassKind {
    Generation,
    Render,
}

/// Per-tick state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Dispatched(PassKind),
    Stepped,
    Submitted,
}

/// Result of one call to [`FrameScheduler::tick`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Submitted { step: u64 },
    /// Skipped because too many ticks were already in flight
    Coalesced { in_flight: usize },
    /// Skipped because no drawable was available
    TargetUnavailable,
}

/// Running tick counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    pub submitted: u64,
    pub coalesced: u64,
    pub blocked: u64,
    pub unavailable: u64,
}

pub struct FrameScheduler<B: FrameBackend> {
    backend: B,
    step: u64,
    state: FrameState,
    in_flight: InFlight,
    max_in_flight: usize,
    overload: OverloadPolicy,
    stats: TickStats,
    coalesce_streak: u64,
}

impl<B: FrameBackend> FrameScheduler<B> {
    pub fn new(backend: B, config: &EngineConfig) -> Self {
        log::info!(
            "Scheduler ready: {}x{} grid, {} ticks in flight max, {:?} on overload",
            backend.grid().width(),
            backend.grid().height(),
            config.max_in_flight,
            config.overload,
        );
        Self {
            backend,
            step: 0,
            state: FrameState::Idle,
            in_flight: InFlight::default(),
            max_in_flight: config.max_in_flight.max(1),
            overload: config.overload,
            stats: TickStats::default(),
            coalesce_streak: 0,
        }
    }

    /// Completed generation passes since start
    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.count()
    }

    pub fn stats(&self) -> TickStats {
        self.stats
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Run one tick
    pub fn tick(&mut self) -> EngineResult<TickOutcome> {
        self.backend.poll();

        let in_flight = self.in_flight.count();
        if in_flight >= self.max_in_flight {
            match self.overload {
                OverloadPolicy::Coalesce => {
                    if self.coalesce_streak == 0 {
                        log::warn!(
                            "GPU behind cadence at step {}: {} ticks in flight, coalescing",
                            self.step,
                            in_flight
                        );
                    }
                    self.coalesce_streak += 1;
                    self.stats.coalesced += 1;
                    return Ok(TickOutcome::Coalesced { in_flight });
                }
                OverloadPolicy::Block => {
                    log::debug!("Waiting for {in_flight} ticks to drain");
                    self.backend.wait_idle()?;
                    self.stats.blocked += 1;
                }
            }
        }
        if self.coalesce_streak > 0 {
            log::info!("GPU caught up after {} coalesced ticks", self.coalesce_streak);
            self.coalesce_streak = 0;
        }

        let Some(mut frame) = self.backend.begin_frame()? else {
            self.stats.unavailable += 1;
            return Ok(TickOutcome::TargetUnavailable);
        };

        let pass = KernelPass::for_step(self.step);
        self.transition(FrameState::Dispatched(PassKind::Generation));
        if let Err(err) = self.backend.encode_generation(&mut frame, pass, self.step) {
            self.transition(FrameState::Idle);
            return Err(err);
        }

        self.step += 1;
        let stepped = Stepped {
            step: self.step,
            current: BufferRole::for_step(self.step),
        };
        debug_assert_eq!(stepped.current, pass.write);
        self.transition(FrameState::Stepped);

        self.transition(FrameState::Dispatched(PassKind::Render));
        self.backend.encode_draw(&mut frame, &stepped);

        let ticket = self.in_flight.acquire();
        let submitted = self.backend.submit(frame, ticket);
        if submitted.is_ok() {
            self.transition(FrameState::Submitted);
            self.stats.submitted += 1;
        }
        self.transition(FrameState::Idle);
        submitted?;
        Ok(TickOutcome::Submitted { step: self.step })
    }

    /// Block until every submitted tick has completed
    pub fn drain(&mut self) -> EngineResult<()> {
        self.backend.wait_idle()
    }

    fn transition(&mut self, next: FrameState) {
        log::trace!("step {}: {:?} -> {:?}", self.step, self.state, next);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Workload;
    use crate::simulation::cpu::CpuBackend;
    use crate::simulation::pattern::SeedPolicy;
    use crate::simulation::rule::{population, step_generation, ALIVE, DEAD};

    fn config(width: u32, height: u32) -> EngineConfig {
        EngineConfig::with_grid(width, height)
            .unwrap()
            .with_seed(SeedPolicy::default().with_rng_seed(11))
    }

    fn scheduler(config: &EngineConfig) -> FrameScheduler<CpuBackend> {
        FrameScheduler::new(CpuBackend::new(config).unwrap(), config)
    }

    #[test]
    fn test_step_starts_at_zero_and_counts_ticks() {
        let config = config(16, 16);
        let mut scheduler = scheduler(&config);
        assert_eq!(scheduler.step(), 0);
        assert_eq!(scheduler.state(), FrameState::Idle);

        for expected in 1..=5 {
            let outcome = scheduler.tick().unwrap();
            assert_eq!(outcome, TickOutcome::Submitted { step: expected });
            assert_eq!(scheduler.step(), expected);
            assert_eq!(scheduler.state(), FrameState::Idle);
        }
        assert_eq!(scheduler.stats().submitted, 5);
    }

    #[test]
    fn test_generation_always_precedes_draw() {
        let config = config(8, 8);
        let mut scheduler = scheduler(&config);
        for _ in 0..3 {
            scheduler.tick().unwrap();
        }
        let frames = scheduler.backend().frames();
        assert_eq!(frames.len(), 3);
        for (i, frame) in frames.iter().enumerate() {
            let generation = frame.generation.expect("generation recorded");
            let draw = frame.draw.expect("draw recorded");
            assert!(generation.order < draw.order);
            assert_eq!(draw.step, i as u64 + 1);
        }
    }

    #[test]
    fn test_draw_reads_the_buffer_just_written() {
        let config = config(24, 18);
        let mut scheduler = scheduler(&config);
        for _ in 0..20 {
            scheduler.tick().unwrap();
            let frame = scheduler.backend().last_frame().unwrap();
            let generation = frame.generation.unwrap();
            let draw = frame.draw.unwrap();
            assert_eq!(draw.source, generation.pass.write);
            assert_eq!(draw.visible_instances, generation.population);
        }
    }

    #[test]
    fn test_roles_alternate_every_tick() {
        let config = config(8, 8);
        let mut scheduler = scheduler(&config);
        let mut previous_write = None;
        for _ in 0..6 {
            scheduler.tick().unwrap();
            let pass = scheduler.backend().last_frame().unwrap().generation.unwrap().pass;
            if let Some(write) = previous_write {
                assert_eq!(pass.read, write);
            }
            assert_ne!(pass.read, pass.write);
            previous_write = Some(pass.write);
        }
    }

    #[test]
    fn test_matches_reference_after_n_ticks() {
        let config = config(37, 21);
        let grid = config.grid;
        let mut scheduler = scheduler(&config);

        let mut expected = config.seed.seed(grid);
        let mut scratch = vec![DEAD; grid.cell_count()];
        for _ in 0..12 {
            scheduler.tick().unwrap();
            step_generation(&expected, &mut scratch, grid);
            std::mem::swap(&mut expected, &mut scratch);
        }
        assert_eq!(scheduler.backend().current_cells(scheduler.step()), &expected[..]);
    }

    #[test]
    fn test_coalesces_when_gpu_falls_behind() {
        let config = config(8, 8).with_overload(2, OverloadPolicy::Coalesce);
        let mut scheduler = scheduler(&config);
        scheduler.backend_mut().hold_completions(true);

        assert!(matches!(scheduler.tick().unwrap(), TickOutcome::Submitted { .. }));
        assert!(matches!(scheduler.tick().unwrap(), TickOutcome::Submitted { .. }));
        assert_eq!(scheduler.in_flight(), 2);

        for _ in 0..5 {
            assert_eq!(
                scheduler.tick().unwrap(),
                TickOutcome::Coalesced { in_flight: 2 }
            );
        }
        // Skipped ticks neither advance the step nor enqueue work
        assert_eq!(scheduler.step(), 2);
        assert_eq!(scheduler.backend().frames().len(), 2);
        assert_eq!(scheduler.stats().coalesced, 5);

        scheduler.backend_mut().release_completions();
        assert_eq!(scheduler.in_flight(), 0);
        assert_eq!(
            scheduler.tick().unwrap(),
            TickOutcome::Submitted { step: 3 }
        );
    }

    #[test]
    fn test_block_policy_drains_before_ticking() {
        let config = config(8, 8).with_overload(1, OverloadPolicy::Block);
        let mut scheduler = scheduler(&config);
        scheduler.backend_mut().hold_completions(true);

        for step in 1..=4 {
            assert_eq!(scheduler.tick().unwrap(), TickOutcome::Submitted { step });
            assert_eq!(scheduler.in_flight(), 1);
        }
        assert_eq!(scheduler.stats().blocked, 3);
        assert_eq!(scheduler.stats().coalesced, 0);

        scheduler.drain().unwrap();
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[test]
    fn test_unavailable_target_skips_without_stepping() {
        let config = config(8, 8);
        let mut scheduler = scheduler(&config);
        scheduler.backend_mut().set_target_available(false);
        assert_eq!(scheduler.tick().unwrap(), TickOutcome::TargetUnavailable);
        assert_eq!(scheduler.step(), 0);

        scheduler.backend_mut().set_target_available(true);
        assert_eq!(
            scheduler.tick().unwrap(),
            TickOutcome::Submitted { step: 1 }
        );
        assert_eq!(scheduler.stats().unavailable, 1);
    }

    #[test]
    fn test_sweep_workload_draws_markers() {
        let config = config(10, 6).with_workload(Workload::Sweep);
        let mut scheduler = scheduler(&config);
        for _ in 0..30 {
            scheduler.tick().unwrap();
            let frame = scheduler.backend().last_frame().unwrap();
            let draw = frame.draw.unwrap();
            assert_eq!(draw.source, frame.generation.unwrap().pass.write);
            assert!((1..=3).contains(&draw.visible_instances));

            let cells = scheduler.backend().current_cells(scheduler.step());
            let horizontal = (scheduler.step() % 60) as usize;
            assert_eq!(cells[horizontal], ALIVE);
            assert_eq!(population(cells), draw.visible_instances);
        }
    }

    #[test]
    fn test_ticket_drop_retires_submission() {
        let in_flight = InFlight::default();
        let first = in_flight.acquire();
        let second = in_flight.acquire();
        assert_eq!(in_flight.count(), 2);
        first.complete();
        assert_eq!(in_flight.count(), 1);
        drop(second);
        assert_eq!(in_flight.count(), 0);
    }
}

use std::io;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use engine::{ActionScheduler, Frame, GridQuery, IntentQueue, SchedulerConfig};
use thiserror::Error;
use tracing::{error, info, warn};

use super::bootstrap::HostWiring;
use super::config::HostConfig;
use super::metrics::TickMetrics;
use super::thruport::Thruport;
use super::world::{DemoWorld, WorldError, WorldInput};

#[derive(Debug, Error)]
pub(crate) enum HostError {
    #[error("failed to bind thruport on 127.0.0.1:{port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn thruport thread: {0}")]
    Spawn(#[source] io::Error),
    #[error("failed to build demo world: {0}")]
    World(#[from] WorldError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LoopConfig {
    pub(crate) target_tps: u32,
    pub(crate) max_frame_delta: Duration,
    pub(crate) max_ticks_per_frame: u32,
    pub(crate) metrics_log_interval: Duration,
    pub(crate) telemetry_every: u32,
    pub(crate) run_ticks: Option<u64>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: engine::DEFAULT_TICKS_PER_SECOND,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            telemetry_every: 30,
            run_ticks: None,
        }
    }
}

impl LoopConfig {
    pub(crate) fn from_host(config: &HostConfig) -> Self {
        Self {
            target_tps: config.ticks_per_second,
            telemetry_every: config.telemetry_every,
            run_ticks: config.run_ticks,
            ..Self::default()
        }
    }
}

pub(crate) fn run(wiring: HostWiring) -> ExitCode {
    if let Err(err) = run_host(wiring) {
        error!(error = %err, "startup_failed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run_host(wiring: HostWiring) -> Result<(), HostError> {
    let config = wiring.config;
    let world = DemoWorld::demo_farm()?;
    let (intents, queue) = IntentQueue::new();
    let thruport = Thruport::start(config.thruport_port, config.thruport_diag, intents)?;
    info!(port = thruport.bound_port(), "thruport_listening");

    let scheduler = ActionScheduler::new(
        SchedulerConfig::for_tick_rate(config.ticks_per_second),
        queue,
    );
    let mut host = HostLoop::new(LoopConfig::from_host(&config), scheduler, world, Some(thruport));
    host.run();
    Ok(())
}

/// Owns the scheduler and the world; only the thread running [`HostLoop::run`] touches them.
pub(crate) struct HostLoop {
    config: LoopConfig,
    scheduler: ActionScheduler,
    world: DemoWorld,
    thruport: Option<Thruport>,
    metrics: TickMetrics,
}

impl HostLoop {
    pub(crate) fn new(
        config: LoopConfig,
        scheduler: ActionScheduler,
        world: DemoWorld,
        thruport: Option<Thruport>,
    ) -> Self {
        Self {
            metrics: TickMetrics::new(config.metrics_log_interval, Instant::now()),
            config,
            scheduler,
            world,
            thruport,
        }
    }

    pub(crate) fn run(&mut self) {
        let target_tps = self.config.target_tps.max(1);
        let fixed_dt = Duration::from_secs_f64(1.0 / f64::from(target_tps));
        let max_ticks_per_frame = self.config.max_ticks_per_frame.max(1);
        info!(
            target_tps,
            max_ticks_per_frame,
            max_frame_delta_ms = self.config.max_frame_delta.as_millis() as u64,
            "loop_config"
        );

        let mut accumulator = Duration::ZERO;
        let mut last_frame_instant = Instant::now();
        loop {
            let now = Instant::now();
            let raw_frame_dt = now.saturating_duration_since(last_frame_instant);
            last_frame_instant = now;
            accumulator =
                accumulator.saturating_add(clamp_frame_delta(raw_frame_dt, self.config.max_frame_delta));

            let step_plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
            for _ in 0..step_plan.ticks_to_run {
                self.tick_once();
                if self.finished() {
                    info!(
                        ticks = self.scheduler.stats().ticks,
                        tool_uses = self.world.tool_uses(),
                        "host_run_ticks_reached"
                    );
                    return;
                }
            }
            accumulator = step_plan.remaining_accumulator;

            if step_plan.dropped_backlog > Duration::ZERO {
                warn!(
                    dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                    max_ticks_per_frame, "sim_clamp_triggered"
                );
            }

            if let Some(snapshot) = self.metrics.maybe_snapshot(now, self.scheduler.stats()) {
                info!(
                    tps = snapshot.tps,
                    dispatched = snapshot.dispatched,
                    resolved = snapshot.resolved,
                    rejected = snapshot.rejected,
                    peak_queue_depth = snapshot.peak_queue_depth,
                    clients = self.thruport.as_ref().map_or(0, Thruport::connected_clients),
                    active = ?self.scheduler.active_kind(),
                    "tick_metrics"
                );
            }

            thread::sleep(fixed_dt.saturating_sub(accumulator));
        }
    }

    /// One simulation step: scheduler first, then the world consumes what it pressed.
    pub(crate) fn tick_once(&mut self) {
        let mut input = WorldInput::default();
        self.scheduler.tick(&self.world, &mut input);
        self.world.apply(&input);
        self.metrics.record_tick(self.scheduler.queued_intents());

        let tick = self.scheduler.stats().ticks;
        let every = u64::from(self.config.telemetry_every);
        if every > 0 && tick % every == 0 {
            if let Some(thruport) = &self.thruport {
                thruport.broadcast_frame(self.frame());
            }
        }
    }

    pub(crate) fn frame(&self) -> Frame {
        let tile = self.world.current_tile();
        Frame {
            tick: self.scheduler.stats().ticks,
            x: tile.x,
            y: tile.y,
            can_act: self.world.can_act(),
            active: self.scheduler.active_kind(),
            queued: self.scheduler.queued_intents(),
            next_waypoint: self.scheduler.next_waypoint(),
        }
    }

    fn finished(&self) -> bool {
        self.config
            .run_ticks
            .is_some_and(|limit| self.scheduler.stats().ticks >= limit)
    }
}

#[derive(Debug, Clone, Copy)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

#[cfg(test)]
mod tests {
    use engine::{ActiveKind, CorrelationId, IntentKind, Tile};

    use super::*;

    fn headless_loop(config: LoopConfig) -> (engine::IntentSender, HostLoop) {
        let (intents, queue) = IntentQueue::new();
        let scheduler = ActionScheduler::new(SchedulerConfig::default(), queue);
        let world = DemoWorld::demo_farm().expect("farm");
        (intents, HostLoop::new(config, scheduler, world, None))
    }

    #[test]
    fn clamp_frame_delta_caps_large_frame() {
        let max_frame_delta = Duration::from_millis(250);
        assert_eq!(
            clamp_frame_delta(Duration::from_millis(600), max_frame_delta),
            max_frame_delta
        );
    }

    #[test]
    fn plan_sim_steps_runs_expected_ticks_without_drop() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(48), fixed_dt, 5);
        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::ZERO);
    }

    #[test]
    fn plan_sim_steps_drops_backlog_when_tick_cap_hit() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(120), fixed_dt, 3);
        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::from_millis(72));
    }

    #[test]
    fn loop_config_takes_rate_and_telemetry_from_host_config() {
        let host = HostConfig {
            ticks_per_second: 30,
            telemetry_every: 0,
            run_ticks: Some(10),
            ..HostConfig::default()
        };
        let config = LoopConfig::from_host(&host);
        assert_eq!(config.target_tps, 30);
        assert_eq!(config.telemetry_every, 0);
        assert_eq!(config.run_ticks, Some(10));
        assert_eq!(config.max_ticks_per_frame, 5);
    }

    #[test]
    fn tick_once_feeds_scheduler_presses_into_the_world() {
        let (intents, mut host) = headless_loop(LoopConfig::default());
        intents
            .submit(
                CorrelationId::new("east"),
                IntentKind::MoveTo {
                    goal: Tile::new(4, 2),
                },
                |_| {},
            )
            .expect("submit");

        host.tick_once();
        let frame = host.frame();
        assert_eq!(frame.active, ActiveKind::Moving);
        assert_eq!(frame.next_waypoint, Some(Tile::new(3, 2)));
        for _ in 0..40 {
            host.tick_once();
        }
        let frame = host.frame();
        assert_eq!((frame.x, frame.y), (4, 2));
        assert_eq!(frame.active, ActiveKind::Idle);
        assert_eq!(frame.next_waypoint, None);
        assert_eq!(frame.tick, 41);
    }

    #[test]
    fn run_stops_after_configured_tick_count() {
        let (_intents, mut host) = headless_loop(LoopConfig {
            target_tps: 1_000,
            run_ticks: Some(25),
            ..LoopConfig::default()
        });
        host.run();
        assert_eq!(host.frame().tick, 25);
    }
}

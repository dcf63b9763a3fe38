//! Tick scheduler
//!
//! Each tick dispatches everything that arrived since the previous one,
//! then runs the registered systems in registration order. Systems either
//! run every tick or on a fixed interval. The scheduler reports how long the
//! transport may wait for readiness before the next interval system is due.

use crate::context::ServerContext;
use crate::router::MessageRouter;
use log::trace;
use shared::Message;
use std::time::{Duration, Instant};

pub type System = Box<dyn FnMut(&mut ServerContext, Duration) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Runs with the elapsed time of every tick
    EveryTick,
    /// Runs once the interval elapsed, with the time since its previous run
    Interval(Duration),
}

struct ScheduledSystem {
    name: &'static str,
    cadence: Cadence,
    remaining: Duration,
    since_last_run: Duration,
    run: System,
}

pub struct TickScheduler {
    systems: Vec<ScheduledSystem>,
    min_update_interval: Duration,
    last_update: Option<Instant>,
}

impl TickScheduler {
    pub fn new(min_update_interval: Duration) -> Self {
        Self {
            systems: Vec::new(),
            min_update_interval,
            last_update: None,
        }
    }

    pub fn add_system<F>(&mut self, name: &'static str, cadence: Cadence, system: F)
    where
        F: FnMut(&mut ServerContext, Duration) + Send + 'static,
    {
        let remaining = match cadence {
            Cadence::EveryTick => Duration::ZERO,
            Cadence::Interval(interval) => interval,
        };
        self.systems.push(ScheduledSystem {
            name,
            cadence,
            remaining,
            since_last_run: Duration::ZERO,
            run: Box::new(system),
        });
    }

    pub fn system_names(&self) -> Vec<&'static str> {
        self.systems.iter().map(|system| system.name).collect()
    }

    /// Countdown of an interval system
    pub fn remaining(&self, name: &str) -> Option<Duration> {
        self.systems
            .iter()
            .find(|system| system.name == name)
            .map(|system| system.remaining)
    }

    /// One tick: measures the time since the previous tick, dispatches
    /// `inbound` in arrival order, then runs the systems. Returns the next
    /// readiness wait.
    pub fn update(
        &mut self,
        now: Instant,
        router: &MessageRouter,
        inbound: Vec<Message>,
        ctx: &mut ServerContext,
    ) -> Duration {
        let elapsed = match self.last_update {
            Some(previous) => now.saturating_duration_since(previous),
            None => Duration::ZERO,
        };
        self.last_update = Some(now);

        for message in inbound {
            router.dispatch(message, ctx);
        }
        self.run_systems(elapsed, ctx)
    }

    /// Advances every system by `elapsed` and returns the next readiness wait
    pub fn run_systems(&mut self, elapsed: Duration, ctx: &mut ServerContext) -> Duration {
        let mut nearest: Option<Duration> = None;

        for system in &mut self.systems {
            match system.cadence {
                Cadence::EveryTick => (system.run)(ctx, elapsed),
                Cadence::Interval(interval) => {
                    system.since_last_run += elapsed;
                    if elapsed >= system.remaining {
                        trace!("Running {} after {:?}", system.name, system.since_last_run);
                        (system.run)(ctx, system.since_last_run);
                        system.since_last_run = Duration::ZERO;
                        system.remaining = interval;
                    } else {
                        system.remaining -= elapsed;
                    }
                    nearest = Some(match nearest {
                        Some(current) => current.min(system.remaining),
                        None => system.remaining,
                    });
                }
            }
        }

        match nearest {
            Some(remaining) => remaining.max(self.min_update_interval),
            None => self.min_update_interval,
        }
    }
}

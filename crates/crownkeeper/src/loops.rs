use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::crown::RECLAIM_PERIOD;
use crate::cursor::CURSOR_PERIOD;
use crate::keeper::Event;

pub const BAN_SWEEP_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopKind {
    CrownReclaim,
    Cursor,
    BanSweep,
}

impl LoopKind {
    pub const ALL: [LoopKind; 3] = [LoopKind::CrownReclaim, LoopKind::Cursor, LoopKind::BanSweep];

    pub fn name(self) -> &'static str {
        match self {
            LoopKind::CrownReclaim => "crown_reclaim",
            LoopKind::Cursor => "cursor",
            LoopKind::BanSweep => "ban_sweep",
        }
    }

    pub fn period(self) -> Duration {
        match self {
            LoopKind::CrownReclaim => RECLAIM_PERIOD,
            LoopKind::Cursor => CURSOR_PERIOD,
            LoopKind::BanSweep => BAN_SWEEP_PERIOD,
        }
    }
}

/// Periodic tasks that feed `Event::Tick` into the event loop.
///
/// Each running loop is a spawned interval task; stopping aborts it. Ticks are dropped,
/// not queued, when the event loop is backed up.
#[derive(Debug)]
pub struct Loops {
    events: mpsc::Sender<Event>,
    running: HashMap<LoopKind, JoinHandle<()>>,
}

impl Loops {
    pub fn new(events: mpsc::Sender<Event>) -> Self {
        Self {
            events,
            running: HashMap::new(),
        }
    }

    pub fn is_running(&self, kind: LoopKind) -> bool {
        self.running.contains_key(&kind)
    }

    /// No-op (returns false) when already running.
    pub fn start(&mut self, kind: LoopKind) -> bool {
        if self.running.contains_key(&kind) {
            return false;
        }
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            let mut iv = tokio::time::interval(kind.period());
            iv.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately.
            iv.tick().await;
            loop {
                iv.tick().await;
                match events.try_send(Event::Tick(kind)) {
                    Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        });
        self.running.insert(kind, handle);
        debug!(task = kind.name(), "loop started");
        true
    }

    /// No-op (returns false) when not running.
    pub fn stop(&mut self, kind: LoopKind) -> bool {
        let Some(handle) = self.running.remove(&kind) else {
            return false;
        };
        handle.abort();
        debug!(task = kind.name(), "loop stopped");
        true
    }

    pub fn start_all(&mut self) {
        for kind in LoopKind::ALL {
            self.start(kind);
        }
    }

    pub fn stop_all(&mut self) {
        for kind in LoopKind::ALL {
            self.stop(kind);
        }
    }
}

impl Drop for Loops {
    fn drop(&mut self) {
        for (_, h) in self.running.drain() {
            h.abort();
        }
    }
}

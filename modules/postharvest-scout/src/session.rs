//! The session loop: initial scan, debounced mutation scans, the periodic
//! fallback scan, follow-up re-expansion and auto-scroll, multiplexed on one
//! task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Notify};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::autoscroll::{is_jump, AutoScroll, ScrollDecision};
use crate::events::HarvestEvent;
use crate::host::HostPage;
use crate::scan::Scanner;
use crate::settings::HarvestSettings;

/// Shared start/stop state. Loops check `is_active` at the top of every
/// iteration; `stop` also wakes a loop parked in `select!`.
#[derive(Default)]
pub struct SessionControl {
    active: AtomicBool,
    stop: Notify,
}

impl SessionControl {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Returns false when already active.
    pub fn start(&self) -> bool {
        !self.active.swap(true, Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.stop.notify_waiters();
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Stopped,
    Complete,
}

pub async fn run_session<H: HostPage>(
    host: Arc<H>,
    scanner: Arc<Scanner<H::Node>>,
    settings: HarvestSettings,
    control: Arc<SessionControl>,
    events: broadcast::Sender<HarvestEvent>,
) -> SessionEnd {
    let session_id = Uuid::new_v4();
    let span = info_span!("harvest_session", session_id = %session_id);
    session_loop(host, scanner, settings, control, events)
        .instrument(span)
        .await
}

async fn session_loop<H: HostPage>(
    host: Arc<H>,
    scanner: Arc<Scanner<H::Node>>,
    settings: HarvestSettings,
    control: Arc<SessionControl>,
    events: broadcast::Sender<HarvestEvent>,
) -> SessionEnd {
    info!(auto_scroll = settings.auto_scroll, "Session started");
    let records = scanner.capture().archive().records.clone();

    let mut mutations = host.mutations();
    let mut mutations_open = true;
    let mut debounce_at: Option<Instant> = None;

    let mut periodic = time::interval_at(Instant::now() + settings.periodic_scan, settings.periodic_scan);
    periodic.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut scroll_tick = time::interval_at(Instant::now() + settings.scroll_tick, settings.scroll_tick);
    scroll_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut auto = AutoScroll::new(&settings, records.len(), host.scroll_height());

    if control.is_active() {
        scanner.scan(host.as_ref()).await;
    }

    loop {
        // Registered before the flag check so a stop in between still wakes us.
        let stopped = control.stop.notified();
        tokio::pin!(stopped);
        stopped.as_mut().enable();

        if !control.is_active() {
            info!("Session stopped");
            return SessionEnd::Stopped;
        }

        tokio::select! {
            _ = stopped => continue,

            batch = mutations.recv(), if mutations_open => match batch {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                    // Latest wins: each batch pushes the pending scan out.
                    debounce_at = Some(Instant::now() + settings.debounce);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Mutation channel closed");
                    mutations_open = false;
                }
            },

            _ = time::sleep_until(debounce_at.unwrap_or_else(Instant::now)), if debounce_at.is_some() => {
                debounce_at = None;
                scanner.scan(host.as_ref()).await;
            }

            _ = periodic.tick() => {
                scanner.scan(host.as_ref()).await;
                scanner.capture().run_due_followups(host.as_ref()).await;
            }

            _ = scroll_tick.tick(), if settings.auto_scroll => {
                match auto.tick(records.len(), host.scroll_height(), Instant::now()) {
                    ScrollDecision::Scroll => scroll_step(host.as_ref(), &scanner, &settings).await,
                    ScrollDecision::Wait => {}
                    ScrollDecision::Retry { attempt } => {
                        info!(attempt, "Scrolling stalled, retrying after delay");
                    }
                    ScrollDecision::Complete => {
                        info!(records = records.len(), "Scan complete");
                        control.active.store(false, Ordering::SeqCst);
                        let _ = events.send(HarvestEvent::ScanComplete);
                        return SessionEnd::Complete;
                    }
                }
            }
        }
    }
}

/// Scroll one step. A jump past the threshold means the host skipped content:
/// scan what is visible now, then go back so the normal cadence covers the gap.
async fn scroll_step<H: HostPage>(host: &H, scanner: &Scanner<H::Node>, settings: &HarvestSettings) {
    let viewport = host.viewport_height();
    let before = host.scroll_offset();
    host.scroll_by(viewport * settings.scroll_step).await;
    let after = host.scroll_offset();

    if is_jump(before, after, viewport, settings.jump_threshold) {
        info!(before, after, "Scroll jumped, scanning and scrolling back");
        scanner.scan(host).await;
        host.scroll_to(before).await;
    }
}

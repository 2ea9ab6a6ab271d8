//! Reconciliation tick - core business logic

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use servertide_common::{Clock, SystemClock};
use servertide_domain::{ActualState, DesiredState, ResourcePhase, Result, TimeGrid};
use tracing::{debug, error, info, instrument, warn};

use super::ports::{CalendarSource, ResourceDriver};
use crate::schedule::{compile, evaluate, GridSettings};

/// Transition chosen for one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    NoOp,
    Activate { variant: String },
    Deactivate,
    /// The provider reports an in-between state; look again next tick.
    Wait,
}

impl Action {
    pub fn is_transition(&self) -> bool {
        matches!(self, Self::Activate { .. } | Self::Deactivate)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoOp => write!(f, "no-op"),
            Self::Activate { variant } if variant.is_empty() => write!(f, "activate"),
            Self::Activate { variant } => write!(f, "activate({variant})"),
            Self::Deactivate => write!(f, "deactivate"),
            Self::Wait => write!(f, "wait"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "error", rename_all = "snake_case")]
pub enum ActionOutcome {
    Skipped,
    Succeeded,
    Failed(String),
}

/// Everything one tick saw and did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub at: DateTime<Utc>,
    pub desired: DesiredState,
    pub observed: ActualState,
    pub action: Action,
    pub outcome: ActionOutcome,
    /// State re-queried after a transition attempt.
    pub after: Option<ActualState>,
}

/// State carried by the loop from one tick to the next.
///
/// Only informational: every decision is made on freshly observed state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopState {
    pub ticks: u64,
    pub consecutive_failures: u32,
    pub last_observed: Option<ActualState>,
    pub last_action: Option<Action>,
}

impl LoopState {
    fn record(&mut self, report: &TickReport) {
        self.ticks += 1;
        self.last_observed = Some(report.after.clone().unwrap_or_else(|| report.observed.clone()));
        self.last_action = Some(report.action.clone());
        if matches!(report.outcome, ActionOutcome::Failed(_)) {
            self.consecutive_failures += 1;
        } else {
            self.consecutive_failures = 0;
        }
    }

    fn record_error(&mut self) {
        self.ticks += 1;
        self.consecutive_failures += 1;
    }
}

/// Compiled grid and its verdict for one instant.
#[derive(Debug, Clone)]
pub struct Plan {
    pub at: DateTime<Utc>,
    pub grid: TimeGrid,
    pub desired: DesiredState,
}

/// Pick the single transition that moves `observed` towards `desired`.
///
/// A running server with a different variant is left running; the variant
/// only applies to the next activation.
pub fn decide(desired: &DesiredState, observed: &ActualState) -> Action {
    match (desired.active, observed.phase) {
        (_, ResourcePhase::Transitioning) => Action::Wait,
        (true, ResourcePhase::Active) => {
            if !desired.variant.is_empty() && desired.variant != observed.variant {
                info!(
                    desired = %desired.variant,
                    running = %observed.variant,
                    "variant differs from running server, applies on next activation"
                );
            }
            Action::NoOp
        }
        (true, ResourcePhase::Absent | ResourcePhase::Stopped) => {
            Action::Activate { variant: desired.variant.clone() }
        }
        (false, ResourcePhase::Active | ResourcePhase::Stopped) => Action::Deactivate,
        (false, ResourcePhase::Absent) => Action::NoOp,
    }
}

/// Reconciliation service
pub struct ReconcileService {
    calendar: Arc<dyn CalendarSource>,
    driver: Arc<dyn ResourceDriver>,
    clock: Arc<dyn Clock>,
    settings: GridSettings,
    identity: String,
}

impl ReconcileService {
    /// Create a new reconciliation service
    pub fn new(
        calendar: Arc<dyn CalendarSource>,
        driver: Arc<dyn ResourceDriver>,
        settings: GridSettings,
        identity: impl Into<String>,
    ) -> Self {
        Self { calendar, driver, clock: Arc::new(SystemClock), settings, identity: identity.into() }
    }

    /// Replace the wall clock, mostly for tests
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn settings(&self) -> &GridSettings {
        &self.settings
    }

    pub fn driver(&self) -> &Arc<dyn ResourceDriver> {
        &self.driver
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Fetch the calendar, compile today's grid and evaluate it at `at`.
    pub async fn plan(&self, at: DateTime<Utc>) -> Result<Plan> {
        let document = self.calendar.fetch_calendar().await?;
        let grid = compile(&document, at, &self.settings)?;
        let local = at.with_timezone(&self.settings.timezone);
        let desired = evaluate(&grid, &local, self.settings.interval_minutes)?;
        Ok(Plan { at, grid, desired })
    }

    /// Run one tick at the current clock time.
    pub async fn tick(&self, state: &mut LoopState) -> Result<TickReport> {
        let now = self.clock.now();
        self.tick_at(state, now).await
    }

    /// Run one tick as of `now`.
    ///
    /// Calendar, parse and state-query errors are returned; a failed
    /// transition is reported in [`TickReport::outcome`] instead.
    #[instrument(skip(self, state), fields(identity = %self.identity, tick = state.ticks + 1))]
    pub async fn tick_at(&self, state: &mut LoopState, now: DateTime<Utc>) -> Result<TickReport> {
        let result = self.reconcile(now).await;
        match &result {
            Ok(report) => state.record(report),
            Err(_) => state.record_error(),
        }
        result
    }

    async fn reconcile(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let Plan { desired, .. } = self.plan(now).await?;
        let observed = self.driver.query_actual_state(&self.identity).await?;
        let action = decide(&desired, &observed);

        info!(
            desired_active = desired.active,
            desired_variant = %desired.variant,
            observed = %observed.phase,
            observed_variant = %observed.variant,
            %action,
            "reconciling"
        );

        let outcome = self.execute(&action).await;

        let after = if action.is_transition() {
            match self.driver.query_actual_state(&self.identity).await {
                Ok(after) => {
                    debug!(phase = %after.phase, "state after transition");
                    Some(after)
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        kind = e.label(),
                        "could not re-query state after transition"
                    );
                    None
                }
            }
        } else {
            None
        };

        Ok(TickReport { at: now, desired, observed, action, outcome, after })
    }

    async fn execute(&self, action: &Action) -> ActionOutcome {
        let result = match action {
            Action::NoOp | Action::Wait => return ActionOutcome::Skipped,
            Action::Activate { variant } => {
                self.driver.activate(&self.identity, variant).await.map(|id| {
                    info!(%id, "server active");
                })
            }
            Action::Deactivate => self.driver.deactivate(&self.identity).await.map(|()| {
                info!("server deactivated");
            }),
        };

        match result {
            Ok(()) => ActionOutcome::Succeeded,
            Err(e) => {
                error!(
                    %action,
                    error = %e,
                    kind = e.label(),
                    "transition failed, retrying next tick"
                );
                ActionOutcome::Failed(e.to_string())
            }
        }
    }
}

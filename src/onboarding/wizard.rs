//! OnboardingWizard — drives organization creation and plan purchase, and
//! exposes the dialog contract hosts and the access gate use.

use std::sync::{Arc, RwLock as SyncRwLock};

use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

use crate::error::{Error, ServiceError, WizardError};
use crate::org::model::Organization;
use crate::org::service::{OrganizationService, PaymentService};
use crate::org::store::OrganizationStore;

use super::state::{
    PLAN_SELECTION_INDEX, WizardData, WizardFlow, WizardState, WizardStep, is_step_valid,
};
use super::validation::validate_organization_name;

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 64;

/// Something observable happened to the dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WizardEvent {
    Opened { step: usize, forced: bool },
    StepChanged { step: usize },
    Closed { reset: bool },
    Completed { organization_id: Option<String> },
}

/// What `close()` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseOutcome {
    /// Closed; form data kept so reopening resumes.
    Closed,
    /// Closed from the first step; form data cleared.
    ClosedAndReset,
    /// Was not open.
    AlreadyClosed,
    /// Refused: a payment is in progress.
    PaymentInFlight,
    /// Refused: the access gate holds the dialog open.
    Gated,
}

impl CloseOutcome {
    pub fn closed(&self) -> bool {
        matches!(self, Self::Closed | Self::ClosedAndReset)
    }
}

/// Passed to completion callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionInfo {
    pub organization_id: Option<String>,
    pub organization_name: String,
    pub plan_id: Option<String>,
}

type CompletionCallback = Arc<dyn Fn(&CompletionInfo) + Send + Sync>;

/// Read-only view of the dialog for hosts.
#[derive(Debug, Clone, Serialize)]
pub struct WizardSnapshot {
    pub open: bool,
    /// Held open by the access gate.
    pub forced: bool,
    pub step: usize,
    pub current_step: WizardStep,
    pub total_steps: usize,
    pub data: WizardData,
    pub creating: bool,
    pub payment_in_flight: bool,
    pub can_advance: bool,
    pub can_go_back: bool,
    pub can_close: bool,
    pub can_complete: bool,
}

struct WizardInner {
    state: WizardState,
    open: bool,
    forced: bool,
    /// Bumped whenever the run is reset; async results from an older
    /// generation are dropped.
    generation: u64,
    /// Latch for the name step's create call.
    creating: bool,
    /// Latch for a payment step's purchase call.
    paying: Option<WizardStep>,
}

impl WizardInner {
    fn snapshot(&self) -> WizardSnapshot {
        let current = self.state.current_step();
        let busy = self.creating || self.paying.is_some();
        WizardSnapshot {
            open: self.open,
            forced: self.forced,
            step: self.state.step,
            current_step: current,
            total_steps: self.state.flow.total_steps(),
            data: self.state.data.clone(),
            creating: self.creating,
            payment_in_flight: self.paying.is_some(),
            can_advance: self.open
                && !busy
                && !current.is_terminal()
                && is_step_valid(current, &self.state.data),
            can_go_back: self.open && self.state.step > self.min_step() && self.paying.is_none(),
            can_close: self.open && self.paying.is_none() && !self.forced,
            can_complete: self.open
                && current.is_terminal()
                && is_step_valid(current, &self.state.data),
        }
    }

    /// Lowest step the dialog may show. The gate's hold keeps it on the
    /// plan step or later.
    fn min_step(&self) -> usize {
        if self.forced { PLAN_SELECTION_INDEX } else { 1 }
    }

    /// Plan already recorded for a payment step.
    fn paid_plan(&self, step: WizardStep) -> Option<&str> {
        match step {
            WizardStep::PlanSelection => self.state.data.plan_id.as_deref(),
            WizardStep::SupportPlan => self.state.data.support_plan_id.as_deref(),
            _ => None,
        }
    }

    fn ensure_open(&self) -> Result<(), WizardError> {
        if self.open { Ok(()) } else { Err(WizardError::NotOpen) }
    }

    /// Whether a result captured at `(generation, step)` may still be applied.
    fn is_current(&self, generation: u64, step: usize) -> bool {
        self.open && self.generation == generation && self.state.step == step
    }

    /// Tear down the run after completion. Returns what callbacks receive.
    fn finish(&mut self) -> CompletionInfo {
        let info = CompletionInfo {
            organization_id: self.state.data.organization_id.clone(),
            organization_name: self.state.data.organization_name.clone(),
            plan_id: self.state.data.plan_id.clone(),
        };
        self.open = false;
        self.forced = false;
        self.creating = false;
        self.paying = None;
        self.generation += 1;
        self.state.reset();
        info
    }
}

/// Multi-step organization onboarding dialog.
pub struct OnboardingWizard {
    store: Arc<dyn OrganizationStore>,
    organizations: Arc<dyn OrganizationService>,
    payments: Arc<dyn PaymentService>,
    inner: RwLock<WizardInner>,
    callbacks: SyncRwLock<Vec<CompletionCallback>>,
    tx: broadcast::Sender<WizardEvent>,
}

impl OnboardingWizard {
    pub fn new(
        flow: WizardFlow,
        store: Arc<dyn OrganizationStore>,
        organizations: Arc<dyn OrganizationService>,
        payments: Arc<dyn PaymentService>,
    ) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Arc::new(Self {
            store,
            organizations,
            payments,
            inner: RwLock::new(WizardInner {
                state: WizardState::new(flow),
                open: false,
                forced: false,
                generation: 0,
                creating: false,
                paying: None,
            }),
            callbacks: SyncRwLock::new(Vec::new()),
            tx,
        })
    }

    /// Subscribe to dialog events.
    pub fn subscribe(&self) -> broadcast::Receiver<WizardEvent> {
        self.tx.subscribe()
    }

    /// Register a callback fired once per completed onboarding.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: Fn(&CompletionInfo) + Send + Sync + 'static,
    {
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(callback));
    }

    pub async fn snapshot(&self) -> WizardSnapshot {
        self.inner.read().await.snapshot()
    }

    pub async fn is_open(&self) -> bool {
        self.inner.read().await.open
    }

    pub async fn is_open_and_at_step(&self, step: usize) -> bool {
        let inner = self.inner.read().await;
        inner.open && inner.state.step == step
    }

    /// Open the dialog voluntarily, at `at_step` or wherever it was left.
    ///
    /// While the gate holds the dialog, steps before the plan step are
    /// refused.
    pub async fn open(&self, at_step: Option<usize>) -> Result<usize, WizardError> {
        let mut inner = self.inner.write().await;
        if let Some(step) = at_step {
            let min_step = inner.min_step();
            if step < min_step {
                return Err(WizardError::HeldByGate { min_step });
            }
            inner.state.jump_to(step)?;
        }
        let step = inner.state.step;
        let was_open = inner.open;
        inner.open = true;
        let forced = inner.forced;
        drop(inner);

        if was_open {
            debug!(step, "Onboarding dialog already open");
            let _ = self.tx.send(WizardEvent::StepChanged { step });
        } else {
            info!(step, "Onboarding dialog opened");
            let _ = self.tx.send(WizardEvent::Opened { step, forced });
        }
        Ok(step)
    }

    /// Close the dialog.
    ///
    /// Refused while a payment is in progress or while the gate holds the
    /// dialog. Closing from the first step clears form data.
    pub async fn close(&self) -> CloseOutcome {
        let mut inner = self.inner.write().await;
        if !inner.open {
            return CloseOutcome::AlreadyClosed;
        }
        if inner.paying.is_some() {
            debug!("Close suppressed while payment is in progress");
            return CloseOutcome::PaymentInFlight;
        }
        if inner.forced {
            debug!("Close refused, dialog is held by the access gate");
            return CloseOutcome::Gated;
        }

        inner.open = false;
        let outcome = if inner.state.step == 1 {
            inner.state.reset();
            inner.creating = false;
            inner.generation += 1;
            CloseOutcome::ClosedAndReset
        } else {
            CloseOutcome::Closed
        };
        drop(inner);

        info!(outcome = ?outcome, "Onboarding dialog closed");
        let _ = self.tx.send(WizardEvent::Closed {
            reset: outcome == CloseOutcome::ClosedAndReset,
        });
        outcome
    }

    /// Update the organization name field. Returns whether the name step is
    /// now valid.
    pub async fn set_organization_name(&self, name: &str) -> Result<bool, WizardError> {
        let mut inner = self.inner.write().await;
        inner.ensure_open()?;
        inner.state.data.organization_name = name.to_string();
        Ok(is_step_valid(WizardStep::Name, &inner.state.data))
    }

    /// Run the current step's forward action.
    ///
    /// On the name step this validates and creates the organization. On a
    /// payment step it only advances once the purchase has gone through.
    pub async fn next(&self) -> Result<WizardStep, Error> {
        let current = {
            let inner = self.inner.read().await;
            inner.ensure_open()?;
            inner.state.current_step()
        };

        match current {
            WizardStep::Name => self.submit_name().await,
            WizardStep::Complete => Err(WizardError::WrongStep {
                action: "next".into(),
                step: current.to_string(),
            }
            .into()),
            WizardStep::PlanSelection | WizardStep::SupportPlan => {
                let mut inner = self.inner.write().await;
                if inner.paying.is_some() {
                    return Err(WizardError::ActionInFlight {
                        step: current.to_string(),
                    }
                    .into());
                }
                let step = inner.state.advance()?;
                let index = inner.state.step;
                drop(inner);
                info!(step = %step, "Onboarding step advanced");
                let _ = self.tx.send(WizardEvent::StepChanged { step: index });
                Ok(step)
            }
        }
    }

    async fn submit_name(&self) -> Result<WizardStep, Error> {
        let (name, generation, step) = {
            let mut inner = self.inner.write().await;
            if inner.creating {
                return Err(WizardError::ActionInFlight {
                    step: WizardStep::Name.to_string(),
                }
                .into());
            }
            let name = validate_organization_name(&inner.state.data.organization_name)?;
            inner.creating = true;
            (name, inner.generation, inner.state.step)
        };

        debug!(name = %name, "Creating organization");
        let result = self.organizations.create_organization(&name).await;

        let mut inner = self.inner.write().await;
        if !inner.is_current(generation, step) {
            if inner.generation == generation {
                inner.creating = false;
            }
            warn!(name = %name, "Discarding organization creation result for a stale dialog");
            return Err(WizardError::Stale {
                step: WizardStep::Name.to_string(),
            }
            .into());
        }
        inner.creating = false;

        let created = match result {
            Ok(created) => created,
            Err(e) => {
                warn!(name = %name, error = %e, "Organization creation failed");
                return Err(e.into());
            }
        };

        inner.state.data.organization_name = name.clone();
        inner.state.data.organization_id = Some(created.organisation_id.clone());
        let next = inner.state.advance()?;
        let index = inner.state.step;
        drop(inner);

        self.store
            .set_selected_organization_meta(&created.organisation_id, &name);
        info!(
            organization_id = %created.organisation_id,
            step = %next,
            "Organization created, onboarding advanced"
        );
        let _ = self.tx.send(WizardEvent::StepChanged { step: index });
        Ok(next)
    }

    /// Purchase a plan on the current payment step and advance on success.
    ///
    /// While the call is outstanding the dialog cannot be closed and the
    /// user cannot go back.
    pub async fn purchase_plan(&self, plan_id: &str) -> Result<WizardStep, Error> {
        let (organization_id, generation, step_index, step) = {
            let mut inner = self.inner.write().await;
            inner.ensure_open()?;
            let step = inner.state.current_step();
            if !step.requires_payment() {
                return Err(WizardError::WrongStep {
                    action: "purchase".into(),
                    step: step.to_string(),
                }
                .into());
            }
            if inner.paying.is_some() {
                return Err(WizardError::ActionInFlight {
                    step: step.to_string(),
                }
                .into());
            }
            let organization_id = inner
                .state
                .data
                .organization_id
                .clone()
                .ok_or(WizardError::MissingOrganization)?;
            if inner.paid_plan(step) == Some(plan_id) {
                let next = inner.state.advance()?;
                let index = inner.state.step;
                drop(inner);
                debug!(plan_id = %plan_id, step = %next, "Plan already paid, advancing");
                let _ = self.tx.send(WizardEvent::StepChanged { step: index });
                return Ok(next);
            }
            inner.paying = Some(step);
            (organization_id, inner.generation, inner.state.step, step)
        };

        info!(organization_id = %organization_id, plan_id = %plan_id, "Payment initiated");
        let result = self
            .payments
            .initiate_payment(&organization_id, plan_id)
            .await
            .and_then(|outcome| {
                if outcome.success {
                    Ok(())
                } else {
                    Err(ServiceError::PaymentDeclined {
                        plan_id: plan_id.to_string(),
                    })
                }
            });

        let mut inner = self.inner.write().await;
        if !inner.is_current(generation, step_index) {
            if inner.generation == generation {
                inner.paying = None;
            }
            warn!(plan_id = %plan_id, "Discarding payment result for a stale dialog");
            return Err(WizardError::Stale {
                step: step.to_string(),
            }
            .into());
        }
        inner.paying = None;

        if let Err(e) = result {
            warn!(organization_id = %organization_id, plan_id = %plan_id, error = %e, "Payment failed");
            return Err(e.into());
        }

        match step {
            WizardStep::SupportPlan => inner.state.data.support_plan_id = Some(plan_id.to_string()),
            _ => inner.state.data.plan_id = Some(plan_id.to_string()),
        }
        let next = inner.state.advance()?;
        let index = inner.state.step;
        drop(inner);

        if let Err(e) = self.store.refresh(&organization_id).await {
            warn!(organization_id = %organization_id, error = %e, "Post-payment refresh failed");
        }
        info!(organization_id = %organization_id, plan_id = %plan_id, step = %next, "Payment succeeded");
        let _ = self.tx.send(WizardEvent::StepChanged { step: index });
        Ok(next)
    }

    /// Go back one step. Blocked while a payment is in progress, and below
    /// the plan step while the gate holds the dialog.
    pub async fn previous(&self) -> Result<WizardStep, WizardError> {
        let mut inner = self.inner.write().await;
        inner.ensure_open()?;
        if inner.paying.is_some() {
            return Err(WizardError::PaymentInFlight);
        }
        let min_step = inner.min_step();
        if inner.state.step <= min_step && min_step > 1 {
            return Err(WizardError::HeldByGate { min_step });
        }
        let step = inner.state.retreat()?;
        let index = inner.state.step;
        drop(inner);
        debug!(step = %step, "Onboarding step back");
        let _ = self.tx.send(WizardEvent::StepChanged { step: index });
        Ok(step)
    }

    /// Finish from the terminal step: close, reset and notify listeners.
    pub async fn complete(&self) -> Result<CompletionInfo, WizardError> {
        let mut inner = self.inner.write().await;
        inner.ensure_open()?;
        let current = inner.state.current_step();
        if !current.is_terminal() {
            return Err(WizardError::WrongStep {
                action: "complete".into(),
                step: current.to_string(),
            });
        }
        let info = inner.finish();
        drop(inner);
        self.notify_complete(&info);
        Ok(info)
    }

    // ── Access gate hooks ──────────────────────────────────────────────

    /// Hold the dialog open at `step` (or later) for `org`.
    ///
    /// Returns whether the dialog was actually opened or moved; a dialog
    /// already open at `step` or beyond is only marked as held.
    pub async fn force_open(&self, step: usize, org: &Organization) -> Result<bool, WizardError> {
        let mut inner = self.inner.write().await;
        inner.state.flow.check_index(step)?;
        inner.forced = true;
        let same_org = inner.state.data.organization_id.as_deref() == Some(org.id.as_str());
        if inner.open && inner.state.step >= step && same_org {
            return Ok(false);
        }

        if !same_org {
            // A different organization: anything in flight belongs to the old run.
            inner.state.data = WizardData {
                organization_name: org.name.clone(),
                organization_id: Some(org.id.clone()),
                ..WizardData::default()
            };
            inner.generation += 1;
            inner.creating = false;
            inner.paying = None;
            inner.state.jump_to(step)?;
        } else if inner.state.step < step {
            inner.state.jump_to(step)?;
        }
        let was_open = inner.open;
        inner.open = true;
        let index = inner.state.step;
        drop(inner);

        info!(organization_id = %org.id, step = index, "Onboarding dialog forced open");
        if was_open {
            let _ = self.tx.send(WizardEvent::StepChanged { step: index });
        } else {
            let _ = self.tx.send(WizardEvent::Opened {
                step: index,
                forced: true,
            });
        }
        Ok(true)
    }

    /// Complete a gate-held dialog because entitlement is now satisfied.
    ///
    /// No-op (returns false) unless the dialog is open and held.
    pub async fn complete_entitled(&self) -> bool {
        let mut inner = self.inner.write().await;
        if !(inner.open && inner.forced) {
            return false;
        }
        let info = inner.finish();
        drop(inner);
        info!(organization_id = ?info.organization_id, "Onboarding completed by entitlement");
        self.notify_complete(&info);
        true
    }

    /// Stop holding the dialog open without changing its open state.
    pub async fn release_gate(&self) -> bool {
        let mut inner = self.inner.write().await;
        std::mem::replace(&mut inner.forced, false)
    }

    fn notify_complete(&self, info: &CompletionInfo) {
        let _ = self.tx.send(WizardEvent::Completed {
            organization_id: info.organization_id.clone(),
        });
        let callbacks: Vec<CompletionCallback> = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for callback in callbacks {
            callback(info);
        }
    }
}

//! ConsoleSession — one signed-in user's store, gate and wizard, wired
//! together the way the console page composes them.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::ConsoleConfig;
use crate::error::Result;
use crate::gate::{AccessGate, GateConfig, GateState, ReconcileTrigger};
use crate::onboarding::{CloseOutcome, CompletionInfo, OnboardingWizard, WizardSnapshot, WizardStep};
use crate::org::model::Organization;
use crate::org::service::{OrganizationService, PaymentService};
use crate::org::store::OrganizationStore;

/// Everything the page needs to render the gate and the dialog.
#[derive(Debug, Clone, Serialize)]
pub struct ConsoleStatus {
    pub gate: GateState,
    pub wizard: WizardSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<Organization>,
}

/// Host for the access gate and the onboarding wizard.
///
/// Each operation that can change the selected organization or the dialog's
/// open state runs the matching reconciliation before returning.
pub struct ConsoleSession {
    store: Arc<dyn OrganizationStore>,
    wizard: Arc<OnboardingWizard>,
    gate: Arc<AccessGate>,
    platform_plan_id: String,
}

impl ConsoleSession {
    pub fn new(
        config: &ConsoleConfig,
        store: Arc<dyn OrganizationStore>,
        organizations: Arc<dyn OrganizationService>,
        payments: Arc<dyn PaymentService>,
    ) -> Arc<Self> {
        let wizard = OnboardingWizard::new(
            config.wizard_flow,
            Arc::clone(&store),
            organizations,
            payments,
        );
        wizard.on_complete(|info| {
            info!(
                organization_id = ?info.organization_id,
                name = %info.organization_name,
                plan_id = ?info.plan_id,
                "Organization onboarding completed"
            );
        });
        let gate = AccessGate::new(Arc::clone(&store), Arc::clone(&wizard), GateConfig::from(config));

        Arc::new(Self {
            store,
            wizard,
            gate,
            platform_plan_id: config.platform_plan_id.clone(),
        })
    }

    pub fn wizard(&self) -> &Arc<OnboardingWizard> {
        &self.wizard
    }

    pub fn gate(&self) -> &Arc<AccessGate> {
        &self.gate
    }

    pub async fn status(&self) -> ConsoleStatus {
        ConsoleStatus {
            gate: self.gate.state().await,
            wizard: self.wizard.snapshot().await,
            organization: self.store.selected_organization().await,
        }
    }

    pub async fn organizations(&self) -> Vec<Organization> {
        self.store.list_organizations().await
    }

    /// Switch organizations and re-evaluate the gate.
    pub async fn select_organization(&self, organization_id: &str) -> Result<GateState> {
        self.store.select_organization(organization_id).await?;
        self.gate.reconcile(ReconcileTrigger::SelectionChanged).await
    }

    /// Open the dialog voluntarily (e.g. "New organization"). Moving an
    /// already open dialog to another step also re-runs the gate.
    pub async fn open_wizard(&self, at_step: Option<usize>) -> Result<GateState> {
        let was_open = self.wizard.is_open().await;
        self.wizard.open(at_step).await?;
        if at_step.is_some() {
            return self.gate.reconcile(ReconcileTrigger::DialogChanged).await;
        }
        self.after_dialog_change(was_open).await
    }

    pub async fn close_wizard(&self) -> Result<CloseOutcome> {
        let outcome = self.wizard.close().await;
        if outcome.closed() {
            self.gate.reconcile(ReconcileTrigger::DialogChanged).await?;
        }
        Ok(outcome)
    }

    pub async fn set_organization_name(&self, name: &str) -> Result<bool> {
        Ok(self.wizard.set_organization_name(name).await?)
    }

    /// Advance the dialog. Creating an organization selects it, so the gate
    /// re-evaluates for the new organization.
    pub async fn next_step(&self) -> Result<WizardStep> {
        let from = self.wizard.snapshot().await.current_step;
        let step = self.wizard.next().await?;
        if from == WizardStep::Name {
            self.gate.reconcile(ReconcileTrigger::SelectionChanged).await?;
        }
        Ok(step)
    }

    pub async fn previous_step(&self) -> Result<WizardStep> {
        Ok(self.wizard.previous().await?)
    }

    /// Buy `plan_id`, or the platform plan when none is given.
    pub async fn purchase_plan(&self, plan_id: Option<&str>) -> Result<WizardStep> {
        let plan_id = plan_id.unwrap_or(&self.platform_plan_id);
        self.wizard.purchase_plan(plan_id).await
    }

    /// Complete the dialog and let the gate re-evaluate entitlement.
    pub async fn complete_wizard(&self) -> Result<CompletionInfo> {
        let info = self.wizard.complete().await?;
        self.gate.reconcile(ReconcileTrigger::DialogChanged).await?;
        Ok(info)
    }

    async fn after_dialog_change(&self, was_open: bool) -> Result<GateState> {
        if was_open == self.wizard.is_open().await {
            debug!("Dialog open state unchanged, skipping reconcile");
            return Ok(self.gate.state().await);
        }
        self.gate.reconcile(ReconcileTrigger::DialogChanged).await
    }
}

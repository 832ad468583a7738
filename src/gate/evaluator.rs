//! AccessGate — keeps `block_content` in line with the selected
//! organization's entitlement and holds the onboarding dialog accordingly.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::ConsoleConfig;
use crate::error::{Error, InconsistentStateError, StoreError};
use crate::onboarding::OnboardingWizard;
use crate::onboarding::state::PLAN_SELECTION_INDEX;
use crate::org::entitlement::has_platform;
use crate::org::model::Organization;
use crate::org::store::OrganizationStore;

use super::state::{GateState, ReconcileTrigger, check_invariants};

/// Gate tuning.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Upper bound on the one-shot refresh of an organization with no
    /// subscriptions.
    pub refresh_timeout: Duration,
    /// Return invariant violations as errors instead of re-evaluating.
    pub strict_invariants: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self::from(&ConsoleConfig::default())
    }
}

impl From<&ConsoleConfig> for GateConfig {
    fn from(config: &ConsoleConfig) -> Self {
        Self {
            refresh_timeout: config.refresh_timeout,
            strict_invariants: config.strict_invariants,
        }
    }
}

/// Entitlement evaluator for one console session.
pub struct AccessGate {
    store: Arc<dyn OrganizationStore>,
    wizard: Arc<OnboardingWizard>,
    config: GateConfig,
    state: RwLock<GateState>,
    /// One reconciliation at a time.
    reconcile_lock: Mutex<()>,
}

impl AccessGate {
    pub fn new(
        store: Arc<dyn OrganizationStore>,
        wizard: Arc<OnboardingWizard>,
        config: GateConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            wizard,
            config,
            state: RwLock::new(GateState::default()),
            reconcile_lock: Mutex::new(()),
        })
    }

    /// Result of the last reconciliation.
    pub async fn state(&self) -> GateState {
        *self.state.read().await
    }

    /// Re-evaluate entitlement and bring the dialog in line with it.
    ///
    /// Idempotent: with unchanged subscription data a repeat run opens and
    /// completes nothing.
    pub async fn reconcile(&self, trigger: ReconcileTrigger) -> Result<GateState, Error> {
        let _guard = self.reconcile_lock.lock().await;
        debug!(trigger = %trigger, "Reconciling access gate");

        let mut state = self.evaluate().await?;
        if let Err(violation) = self.verify(&state).await {
            if self.config.strict_invariants {
                error!(trigger = %trigger, error = %violation, "Access gate invariant violated");
                *self.state.write().await = state;
                return Err(violation.into());
            }

            warn!(trigger = %trigger, error = %violation, "Access gate inconsistent, re-evaluating");
            state = self.evaluate().await?;
            if let Err(violation) = self.verify(&state).await {
                error!(trigger = %trigger, error = %violation, "Access gate still inconsistent");
            }
        }

        let previous = std::mem::replace(&mut *self.state.write().await, state);
        if previous.block_content != state.block_content {
            info!(
                trigger = %trigger,
                block_content = state.block_content,
                "Access gate decision changed"
            );
        }
        Ok(state)
    }

    async fn verify(&self, state: &GateState) -> Result<(), InconsistentStateError> {
        let dialog = self.wizard.snapshot().await;
        let selected = self.store.selected_organization().await.map(|o| o.id);
        check_invariants(state, &dialog, selected.as_deref())
    }

    async fn evaluate(&self) -> Result<GateState, Error> {
        let Some(org) = self.store.selected_organization().await else {
            self.wizard.release_gate().await;
            return Ok(GateState::unblocked(self.wizard.is_open().await));
        };

        if self.entitlement(&org).await {
            if self.wizard.complete_entitled().await {
                info!(organization_id = %org.id, "Entitlement satisfied, onboarding completed");
            }
            self.wizard.release_gate().await;
            return Ok(GateState::unblocked(self.wizard.is_open().await));
        }

        if self.wizard.force_open(PLAN_SELECTION_INDEX, &org).await? {
            info!(organization_id = %org.id, "Platform subscription required, dialog opened");
        }
        Ok(GateState::blocked())
    }

    /// Whether `org` holds the platform entitlement. Fails closed.
    async fn entitlement(&self, org: &Organization) -> bool {
        if !org.subscriptions.is_empty() {
            return has_platform(&org.subscriptions);
        }

        // Exactly one refresh per evaluation; any failure counts as unmet.
        let refreshed =
            match tokio::time::timeout(self.config.refresh_timeout, self.store.refresh(&org.id))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout {
                    id: org.id.clone(),
                    timeout: self.config.refresh_timeout,
                }),
            };
        if let Err(e) = refreshed {
            warn!(organization_id = %org.id, error = %e, "Refresh failed, treating as not entitled");
            return false;
        }

        match self.store.selected_organization().await {
            Some(fresh) if fresh.id == org.id => has_platform(&fresh.subscriptions),
            _ => {
                debug!(organization_id = %org.id, "Selection changed during refresh");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as SyncMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::config::DEFAULT_PLATFORM_PLAN;
    use crate::onboarding::{WizardEvent, WizardFlow};
    use crate::org::memory::{InMemoryBackend, MemoryOrganizationStore, fixture_organizations};
    use crate::org::model::{
        BillingCycle, BillingInfo, Product, ProductType, Subscription, SubscriptionStatus,
    };
    use crate::org::service::PaymentService;

    struct Harness {
        backend: Arc<InMemoryBackend>,
        store: Arc<MemoryOrganizationStore>,
        wizard: Arc<OnboardingWizard>,
        gate: Arc<AccessGate>,
        events: tokio::sync::broadcast::Receiver<WizardEvent>,
        completions: Arc<AtomicUsize>,
    }

    fn harness() -> Harness {
        let backend = InMemoryBackend::new();
        for org in fixture_organizations() {
            backend.insert_organization(org);
        }
        let store = MemoryOrganizationStore::new(Arc::clone(&backend));
        let wizard = OnboardingWizard::new(
            WizardFlow::Standard,
            store.clone(),
            backend.clone(),
            backend.clone(),
        );
        let completions = Arc::new(AtomicUsize::new(0));
        let counter = completions.clone();
        wizard.on_complete(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let events = wizard.subscribe();
        let gate = AccessGate::new(store.clone(), wizard.clone(), GateConfig::default());
        Harness {
            backend,
            store,
            wizard,
            gate,
            events,
            completions,
        }
    }

    fn drain(events: &mut tokio::sync::broadcast::Receiver<WizardEvent>) -> Vec<WizardEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    fn platform_sub(org_id: &str, status: SubscriptionStatus, product_type: ProductType) -> Subscription {
        Subscription {
            id: format!("sub_{org_id}"),
            organization_id: org_id.into(),
            status,
            product: Product::new("prod_platform").with_type(product_type),
            billing: BillingInfo {
                price: dec!(49.00),
                currency: "USD".into(),
                cycle: BillingCycle::Monthly,
                next_payment_at: None,
            },
        }
    }

    #[tokio::test]
    async fn no_selection_does_not_block() {
        let mut h = harness();
        let state = h.gate.reconcile(ReconcileTrigger::SelectionChanged).await.unwrap();
        assert!(!state.block_content);
        assert!(!state.dialog_open);
        assert!(drain(&mut h.events).is_empty());
    }

    #[tokio::test]
    async fn no_subscriptions_blocks_and_opens_plan_step() {
        let mut h = harness();
        h.store.select_organization("org_greenfield").await.unwrap();

        let state = h.gate.reconcile(ReconcileTrigger::SelectionChanged).await.unwrap();
        assert_eq!(state, GateState::blocked());
        assert!(h.wizard.is_open_and_at_step(2).await);
        assert_eq!(
            drain(&mut h.events),
            vec![WizardEvent::Opened { step: 2, forced: true }]
        );
        let snap = h.wizard.snapshot().await;
        assert_eq!(snap.data.organization_id.as_deref(), Some("org_greenfield"));
        assert!(!snap.can_close);
    }

    #[tokio::test]
    async fn cancelled_platform_subscription_blocks() {
        let h = harness();
        h.store.select_organization("org_harbor").await.unwrap();
        let state = h.gate.reconcile(ReconcileTrigger::SelectionChanged).await.unwrap();
        assert!(state.block_content);
        assert!(h.wizard.is_open_and_at_step(2).await);
    }

    #[tokio::test]
    async fn active_platform_label_unblocks() {
        let mut h = harness();
        h.store.select_organization("org_atlas").await.unwrap();
        let state = h.gate.reconcile(ReconcileTrigger::SelectionChanged).await.unwrap();
        assert!(!state.block_content);
        assert!(!h.wizard.is_open().await);
        assert!(drain(&mut h.events).is_empty());
        assert_eq!(h.completions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn repeated_reconcile_has_no_extra_side_effects() {
        let mut h = harness();
        for org in ["org_greenfield", "org_harbor", "org_northwind", "org_legacy"] {
            h.store.select_organization(org).await.unwrap();
            let first = h.gate.reconcile(ReconcileTrigger::SelectionChanged).await.unwrap();
            drain(&mut h.events);
            let completions = h.completions.load(Ordering::SeqCst);

            let second = h.gate.reconcile(ReconcileTrigger::DialogChanged).await.unwrap();
            assert_eq!(first, second, "org={org}");
            assert!(drain(&mut h.events).is_empty(), "org={org}");
            assert_eq!(h.completions.load(Ordering::SeqCst), completions, "org={org}");
        }
    }

    #[tokio::test]
    async fn concurrent_reconciles_open_dialog_once() {
        let mut h = harness();
        h.store.select_organization("org_greenfield").await.unwrap();

        let runs = (0..8).map(|i| {
            let trigger = if i % 2 == 0 {
                ReconcileTrigger::SelectionChanged
            } else {
                ReconcileTrigger::DialogChanged
            };
            h.gate.reconcile(trigger)
        });
        let states = futures::future::join_all(runs).await;
        assert!(states.iter().all(|s| *s.as_ref().unwrap() == GateState::blocked()));
        assert_eq!(
            drain(&mut h.events),
            vec![WizardEvent::Opened { step: 2, forced: true }]
        );
    }

    #[tokio::test]
    async fn gate_decision_always_matches_dialog() {
        let h = harness();
        for org in fixture_organizations() {
            h.store.select_organization(&org.id).await.unwrap();
            for trigger in [ReconcileTrigger::SelectionChanged, ReconcileTrigger::DialogChanged] {
                let state = h.gate.reconcile(trigger).await.unwrap();
                let dialog = h.wizard.snapshot().await;
                if state.block_content {
                    assert!(dialog.open && dialog.step == 2, "org={}", org.id);
                } else {
                    assert!(!dialog.forced, "org={}", org.id);
                }
            }
        }
    }

    #[tokio::test]
    async fn entitlement_arriving_completes_held_dialog_once() {
        let mut h = harness();
        h.store.select_organization("org_greenfield").await.unwrap();
        h.gate.reconcile(ReconcileTrigger::SelectionChanged).await.unwrap();
        drain(&mut h.events);

        // Subscription activated out of band (e.g. another admin paid).
        h.backend
            .initiate_payment("org_greenfield", DEFAULT_PLATFORM_PLAN)
            .await
            .unwrap();

        let state = h.gate.reconcile(ReconcileTrigger::DialogChanged).await.unwrap();
        assert!(!state.block_content);
        assert!(!h.wizard.is_open().await);
        assert_eq!(h.completions.load(Ordering::SeqCst), 1);
        assert_eq!(
            drain(&mut h.events),
            vec![WizardEvent::Completed {
                organization_id: Some("org_greenfield".into())
            }]
        );

        h.gate.reconcile(ReconcileTrigger::DialogChanged).await.unwrap();
        assert_eq!(h.completions.load(Ordering::SeqCst), 1);
        assert!(drain(&mut h.events).is_empty());
    }

    #[tokio::test]
    async fn voluntary_dialog_for_entitled_org_is_left_open() {
        let h = harness();
        h.store.select_organization("org_northwind").await.unwrap();
        h.wizard.open(Some(1)).await.unwrap();

        let state = h.gate.reconcile(ReconcileTrigger::DialogChanged).await.unwrap();
        assert!(!state.block_content);
        assert!(state.dialog_open);
        assert!(h.wizard.is_open_and_at_step(1).await);
        assert_eq!(h.completions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn switching_to_entitled_org_releases_the_hold() {
        let h = harness();
        h.store.select_organization("org_harbor").await.unwrap();
        h.gate.reconcile(ReconcileTrigger::SelectionChanged).await.unwrap();
        assert!(h.wizard.snapshot().await.forced);

        h.store.select_organization("org_northwind").await.unwrap();
        let state = h.gate.reconcile(ReconcileTrigger::SelectionChanged).await.unwrap();
        assert!(!state.block_content);
        assert!(!h.wizard.snapshot().await.forced);
        assert!(!h.wizard.is_open().await);
    }

    #[tokio::test]
    async fn blocked_dialog_already_past_plan_step_is_not_moved() {
        let mut h = harness();
        h.store.select_organization("org_harbor").await.unwrap();
        h.wizard
            .force_open(3, &Organization::new("org_harbor", "Harbor Telemetry"))
            .await
            .unwrap();
        drain(&mut h.events);

        let state = h.gate.reconcile(ReconcileTrigger::DialogChanged).await.unwrap();
        assert!(state.block_content);
        assert!(h.wizard.is_open_and_at_step(3).await);
        assert!(drain(&mut h.events).is_empty());
    }

    // ── Scripted store for refresh behavior ─────────────────────────

    enum Refresh {
        Succeeds(Vec<Subscription>),
        Fails,
        Hangs,
    }

    struct ScriptedStore {
        selected: SyncMutex<Option<Organization>>,
        refresh: Refresh,
        refresh_calls: AtomicUsize,
        selected_calls: AtomicUsize,
        /// Selection switches to this organization once more than `.0`
        /// reads have happened.
        switch_after: Option<(usize, Organization)>,
    }

    impl ScriptedStore {
        fn new(selected: Option<Organization>, refresh: Refresh) -> Arc<Self> {
            Arc::new(Self {
                selected: SyncMutex::new(selected),
                refresh,
                refresh_calls: AtomicUsize::new(0),
                selected_calls: AtomicUsize::new(0),
                switch_after: None,
            })
        }

        fn switching(first: Organization, reads: usize, then: Organization) -> Arc<Self> {
            Arc::new(Self {
                selected: SyncMutex::new(Some(first)),
                refresh: Refresh::Fails,
                refresh_calls: AtomicUsize::new(0),
                selected_calls: AtomicUsize::new(0),
                switch_after: Some((reads, then)),
            })
        }
    }

    #[async_trait]
    impl OrganizationStore for ScriptedStore {
        async fn selected_organization(&self) -> Option<Organization> {
            let reads = self.selected_calls.fetch_add(1, Ordering::SeqCst) + 1;
            let mut selected = self.selected.lock().unwrap();
            if let Some((after, next)) = &self.switch_after {
                if reads > *after {
                    *selected = Some(next.clone());
                }
            }
            selected.clone()
        }

        async fn refresh(&self, organization_id: &str) -> Result<(), StoreError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            match &self.refresh {
                Refresh::Succeeds(subs) => {
                    if let Some(org) = self.selected.lock().unwrap().as_mut() {
                        org.subscriptions = subs.clone();
                    }
                    Ok(())
                }
                Refresh::Fails => Err(StoreError::RefreshFailed {
                    id: organization_id.into(),
                    reason: "connection reset".into(),
                }),
                Refresh::Hangs => {
                    std::future::pending::<()>().await;
                    Ok(())
                }
            }
        }

        fn set_selected_organization_meta(&self, _organization_id: &str, _name: &str) {}

        async fn select_organization(&self, organization_id: &str) -> Result<Organization, StoreError> {
            Err(StoreError::NotFound {
                id: organization_id.into(),
            })
        }

        async fn list_organizations(&self) -> Vec<Organization> {
            self.selected.lock().unwrap().clone().into_iter().collect()
        }
    }

    fn scripted_gate(store: Arc<ScriptedStore>, config: GateConfig) -> (Arc<AccessGate>, Arc<OnboardingWizard>) {
        let backend = InMemoryBackend::new();
        let wizard = OnboardingWizard::new(WizardFlow::Standard, store.clone(), backend.clone(), backend);
        let gate = AccessGate::new(store, wizard.clone(), config);
        (gate, wizard)
    }

    #[tokio::test]
    async fn refresh_runs_once_and_can_grant_entitlement() {
        let store = ScriptedStore::new(
            Some(Organization::new("org_1", "Acme IoT")),
            Refresh::Succeeds(vec![platform_sub(
                "org_1",
                SubscriptionStatus::Active,
                ProductType::Code(1),
            )]),
        );
        let (gate, wizard) = scripted_gate(store.clone(), GateConfig::default());

        let state = gate.reconcile(ReconcileTrigger::SelectionChanged).await.unwrap();
        assert!(!state.block_content);
        assert!(!wizard.is_open().await);
        assert_eq!(store.refresh_calls.load(Ordering::SeqCst), 1);

        // Subscriptions are cached now; no further refresh.
        gate.reconcile(ReconcileTrigger::DialogChanged).await.unwrap();
        assert_eq!(store.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_with_still_empty_subscriptions_blocks() {
        let store = ScriptedStore::new(
            Some(Organization::new("org_1", "Acme IoT")),
            Refresh::Succeeds(Vec::new()),
        );
        let (gate, wizard) = scripted_gate(store.clone(), GateConfig::default());

        let state = gate.reconcile(ReconcileTrigger::SelectionChanged).await.unwrap();
        assert!(state.block_content);
        assert!(wizard.is_open_and_at_step(2).await);
        assert_eq!(store.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_failure_fails_closed() {
        let store = ScriptedStore::new(Some(Organization::new("org_1", "Acme IoT")), Refresh::Fails);
        let (gate, wizard) = scripted_gate(store.clone(), GateConfig::default());

        let state = gate.reconcile(ReconcileTrigger::SelectionChanged).await.unwrap();
        assert!(state.block_content);
        assert!(wizard.is_open_and_at_step(2).await);
        assert_eq!(store.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_timeout_fails_closed() {
        let store = ScriptedStore::new(Some(Organization::new("org_1", "Acme IoT")), Refresh::Hangs);
        let config = GateConfig {
            refresh_timeout: Duration::from_millis(20),
            ..GateConfig::default()
        };
        let (gate, wizard) = scripted_gate(store, config);

        let state = gate.reconcile(ReconcileTrigger::SelectionChanged).await.unwrap();
        assert!(state.block_content);
        assert!(wizard.is_open_and_at_step(2).await);
    }

    #[tokio::test]
    async fn clearing_selection_unblocks_but_leaves_dialog_open() {
        let store = ScriptedStore::new(Some(Organization::new("org_1", "Acme IoT")), Refresh::Fails);
        let (gate, wizard) = scripted_gate(store.clone(), GateConfig::default());
        gate.reconcile(ReconcileTrigger::SelectionChanged).await.unwrap();
        assert!(wizard.snapshot().await.forced);

        *store.selected.lock().unwrap() = None;
        let state = gate.reconcile(ReconcileTrigger::SelectionChanged).await.unwrap();
        assert!(!state.block_content);
        assert!(state.dialog_open);
        let snap = wizard.snapshot().await;
        assert!(snap.open);
        assert!(!snap.forced);
        assert!(snap.can_close);
    }

    fn lapsed(id: &str, name: &str) -> Organization {
        let mut org = Organization::new(id, name);
        org.subscriptions = vec![platform_sub(
            id,
            SubscriptionStatus::Cancelled,
            ProductType::Code(1),
        )];
        org
    }

    #[tokio::test]
    async fn strict_mode_reports_hold_for_switched_organization() {
        let store = ScriptedStore::switching(
            lapsed("org_1", "Acme IoT"),
            1,
            lapsed("org_2", "Beacon Labs"),
        );
        let config = GateConfig {
            strict_invariants: true,
            ..GateConfig::default()
        };
        let (gate, wizard) = scripted_gate(store.clone(), config);

        let err = gate.reconcile(ReconcileTrigger::SelectionChanged).await.unwrap_err();
        assert!(matches!(
            err,
            Error::InconsistentState(InconsistentStateError::HeldForOtherOrganization { .. })
        ));
        // No second evaluation in strict mode.
        assert_eq!(store.selected_calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            wizard.snapshot().await.data.organization_id.as_deref(),
            Some("org_1")
        );
    }

    #[tokio::test]
    async fn lenient_mode_re_evaluates_and_settles() {
        let store = ScriptedStore::switching(
            lapsed("org_1", "Acme IoT"),
            1,
            lapsed("org_2", "Beacon Labs"),
        );
        let config = GateConfig {
            strict_invariants: false,
            ..GateConfig::default()
        };
        let (gate, wizard) = scripted_gate(store.clone(), config);

        let state = gate.reconcile(ReconcileTrigger::SelectionChanged).await.unwrap();
        assert_eq!(state, GateState::blocked());
        // Evaluate, verify, evaluate again, verify again.
        assert_eq!(store.selected_calls.load(Ordering::SeqCst), 4);

        let dialog = wizard.snapshot().await;
        assert_eq!(dialog.data.organization_id.as_deref(), Some("org_2"));
        assert!(dialog.open && dialog.step == 2 && dialog.forced);
        assert!(check_invariants(&state, &dialog, Some("org_2")).is_ok());
        assert_eq!(gate.state().await, GateState::blocked());
    }
}

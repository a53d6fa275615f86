//! The periodic tier control loop.
//!
//! One tick:
//! 1. Load every collection from the store. Any load error aborts the tick.
//! 2. Evaluate triggers against overrides plus telemetry.
//! 3. Create a `startup` record for each triggered, enabled pair without one,
//!    unless another pair's record already holds the same cache pool.
//! 4. Advance every record by at most one step.
//! 5. Write the tier table back. A write error fails the tick.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use geotier_core::GeotierConfig;
use geotier_state::{AssociationStore, CacheTierRecord, TierKey, TierState, TierStatusTable};
use geotier_trigger::{NoTelemetry, PairDecision, TrafficSource, TriggerEvaluator};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::context::ControlLoopContext;
use crate::drain::DrainStatus;
use crate::error::TierResult;
use crate::gateway::{ProvisioningGateway, RemoveOutcome};
use crate::machine::{DrainView, PlanInputs, Step, plan};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub key: TierKey,
    pub from: TierState,
    pub to: TierState,
}

/// A record whose step failed this tick. It keeps its state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub key: TierKey,
    pub state: TierState,
    pub error: String,
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub created: Vec<TierKey>,
    pub transitions: Vec<Transition>,
    pub refreshed: Vec<TierKey>,
    pub removed: Vec<TierKey>,
    pub failures: Vec<Failure>,
    /// Triggered pairs not created because their cache pool belongs to
    /// another rule's record.
    pub contended: Vec<TierKey>,
}

impl TickReport {
    /// Nothing beyond cooldown refreshes and contention happened.
    pub fn is_quiet(&self) -> bool {
        self.created.is_empty()
            && self.transitions.is_empty()
            && self.removed.is_empty()
            && self.failures.is_empty()
    }
}

pub struct TierController {
    store: AssociationStore,
    evaluator: TriggerEvaluator,
    traffic: Arc<dyn TrafficSource>,
    gateway: ProvisioningGateway,
    cooldown_secs: u64,
    suffix: String,
}

impl TierController {
    pub fn new(store: AssociationStore, gateway: ProvisioningGateway, config: &GeotierConfig) -> Self {
        Self {
            store,
            evaluator: TriggerEvaluator::new(),
            traffic: Arc::new(NoTelemetry),
            gateway,
            cooldown_secs: config.control.cooldown_secs,
            suffix: config.tier.suffix.clone(),
        }
    }

    /// Use `traffic` for telemetry-derived hot locations.
    pub fn with_traffic(mut self, traffic: Arc<dyn TrafficSource>) -> Self {
        self.traffic = traffic;
        self
    }

    pub fn store(&self) -> &AssociationStore {
        &self.store
    }

    pub fn cooldown_secs(&self) -> u64 {
        self.cooldown_secs
    }

    /// Run one control-loop tick at time `now` (unix seconds).
    ///
    /// Blocks on cluster commands issued by provisioning steps.
    pub fn tick(&self, ctx: &mut ControlLoopContext, now: u64) -> TierResult<TickReport> {
        ctx.record_tick();
        let snapshot = self.store.snapshot()?;
        let telemetry = self.traffic.hot_locations();
        let decisions = self.evaluator.evaluate(&snapshot, &telemetry);

        let triggered: HashSet<TierKey> = decisions
            .iter()
            .filter(|d| d.triggered)
            .map(PairDecision::key)
            .collect();

        let mut tiers = snapshot.tiers.clone();
        let mut report = TickReport::default();

        for decision in decisions.iter().filter(|d| d.triggered) {
            let key = decision.key();
            if tiers.contains(&key) {
                continue;
            }
            if !decision.wants_provisioning() {
                debug!(%key, "triggered but auto-provisioning disabled");
                continue;
            }
            let record = CacheTierRecord::new(&decision.rule, &decision.pool, &self.suffix, now);
            if let Some(owner) = tiers.iter().find(|r| r.cache_pool == record.cache_pool) {
                warn!(
                    %key,
                    cache_pool = %record.cache_pool,
                    owner = %owner.key(),
                    "cache pool held by another tier, not creating"
                );
                report.contended.push(key);
                continue;
            }
            info!(%key, cache_pool = %record.cache_pool, "cache tier requested");
            tiers.insert(record);
            report.created.push(key);
        }

        for key in tiers.keys() {
            let Some(record) = tiers.get(&key).cloned() else {
                continue;
            };
            let inputs = PlanInputs {
                triggered: triggered.contains(&key),
                now,
                cooldown_secs: self.cooldown_secs,
                drain: drain_view(ctx, &record.cache_pool),
            };
            let step = plan(&record, &inputs);
            self.apply(ctx, &mut tiers, &record, step, now, &mut report);
        }

        if tiers != snapshot.tiers {
            self.store.save(&tiers)?;
        }
        Ok(report)
    }

    fn apply(
        &self,
        ctx: &mut ControlLoopContext,
        tiers: &mut TierStatusTable,
        record: &CacheTierRecord,
        step: Step,
        now: u64,
        report: &mut TickReport,
    ) {
        let key = record.key();
        match step {
            Step::Hold => {}
            Step::Refresh => {
                if let Some(r) = tiers.get_mut(&key) {
                    r.last_transition_time = now;
                }
                debug!(%key, "cooldown refreshed");
                report.refreshed.push(key);
            }
            Step::Provision => match self.gateway.create(record) {
                Ok(()) => advance(tiers, &key, step, now, report),
                Err(e) => {
                    error!(%key, cache_pool = %record.cache_pool, error = %e, "cache tier provisioning failed, retrying next tick");
                    report.failures.push(Failure {
                        key,
                        state: record.state,
                        error: e.to_string(),
                    });
                }
            },
            Step::BeginTeardown => advance(tiers, &key, step, now, report),
            Step::LaunchDrain => {
                ctx.drains_mut().start(&record.cache_pool);
                advance(tiers, &key, step, now, report);
            }
            Step::DrainFinished => {
                if let Some(DrainStatus::Failed(e)) = ctx.drains().status(&record.cache_pool) {
                    warn!(%key, cache_pool = %record.cache_pool, error = %e, "drain did not complete, removal will re-check");
                }
                ctx.drains_mut().forget(&record.cache_pool);
                advance(tiers, &key, step, now, report);
            }
            Step::RestartDrain => {
                warn!(%key, cache_pool = %record.cache_pool, "no drain worker tracked, restarting drain");
                advance(tiers, &key, step, now, report);
            }
            Step::Remove => match self.gateway.remove(record) {
                Ok(RemoveOutcome::Removed) => {
                    tiers.remove(&key);
                    info!(%key, cache_pool = %record.cache_pool, "cache tier record removed");
                    report.removed.push(key);
                }
                Ok(RemoveOutcome::NotEmpty { objects }) => {
                    info!(%key, objects, "cache pool not empty, draining again");
                    ctx.drains_mut().start(&record.cache_pool);
                    transition(tiers, &key, TierState::Draining, now, report);
                }
                Err(e) => {
                    error!(%key, cache_pool = %record.cache_pool, error = %e, "cache tier removal failed, retrying next tick");
                    report.failures.push(Failure {
                        key,
                        state: record.state,
                        error: e.to_string(),
                    });
                }
            },
        }
    }

    /// Tick every `interval` until `shutdown` fires, then cancel drain
    /// workers. Needs a multi-threaded runtime.
    pub async fn run(
        &self,
        mut ctx: ControlLoopContext,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            interval_secs = interval.as_secs(),
            cooldown_secs = self.cooldown_secs,
            "tier control loop started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let now = epoch_secs();
                    match tokio::task::block_in_place(|| self.tick(&mut ctx, now)) {
                        Ok(report) if !report.is_quiet() => info!(
                            created = report.created.len(),
                            transitions = report.transitions.len(),
                            removed = report.removed.len(),
                            failures = report.failures.len(),
                            contended = report.contended.len(),
                            "tick completed"
                        ),
                        Ok(_) => debug!(tick = ctx.ticks(), "tick completed, no changes"),
                        Err(e) => error!(error = %e, "control loop tick failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("tier control loop shutting down");
                    break;
                }
            }
        }

        ctx.shutdown();
    }
}

/// Move the record to the state `step` leads to on success.
fn advance(tiers: &mut TierStatusTable, key: &TierKey, step: Step, now: u64, report: &mut TickReport) {
    if let Some(to) = step.target() {
        transition(tiers, key, to, now, report);
    }
}

fn transition(
    tiers: &mut TierStatusTable,
    key: &TierKey,
    to: TierState,
    now: u64,
    report: &mut TickReport,
) {
    let Some(record) = tiers.get_mut(key) else {
        return;
    };
    let from = record.state;
    record.state = to;
    record.last_transition_time = now;
    info!(%key, cache_pool = %record.cache_pool, %from, %to, "tier state transition");
    report.transitions.push(Transition {
        key: key.clone(),
        from,
        to,
    });
}

fn drain_view(ctx: &ControlLoopContext, cache_pool: &str) -> DrainView {
    match ctx.drains().status(cache_pool) {
        None => DrainView::Absent,
        Some(DrainStatus::Running) => DrainView::Running,
        Some(_) => DrainView::Finished,
    }
}

pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drain::DrainCoordinator;
    use crate::error::TierError;
    use crate::fakes::{FakeCluster, FlakyKv, wait_until};
    use geotier_core::GeoPoint;
    use geotier_state::{
        EnableFlags, KvStore, LocationAssociations, OverrideLocations, PoolAssociations,
        StateError,
    };
    use geotier_trigger::{SampledTraffic, TrafficSample};
    use tokio::runtime::Handle;

    const COOLDOWN: u64 = 600;

    struct Fixture {
        controller: TierController,
        ctx: ControlLoopContext,
        cluster: Arc<FakeCluster>,
        store: AssociationStore,
    }

    fn fixture_with(store: AssociationStore, cooldown_secs: u64) -> Fixture {
        let cluster = Arc::new(FakeCluster::default());
        let mut config = GeotierConfig::default();
        config.control.cooldown_secs = cooldown_secs;
        let gateway = ProvisioningGateway::new(cluster.clone(), cluster.clone(), config.tier.clone());
        let controller = TierController::new(store.clone(), gateway, &config);
        let ctx = ControlLoopContext::new(DrainCoordinator::new(
            Handle::current(),
            cluster.clone(),
            cluster.clone(),
        ));
        Fixture {
            controller,
            ctx,
            cluster,
            store,
        }
    }

    fn fixture(cooldown_secs: u64) -> Fixture {
        fixture_with(AssociationStore::open_in_memory().unwrap(), cooldown_secs)
    }

    fn key() -> TierKey {
        TierKey::new("R", "P")
    }

    /// P ↔ R, R at (40, -75) radius 50, optionally enabled and simulated hot.
    fn associate(store: &AssociationStore, enabled: bool, hot: bool) {
        store
            .update(|p: &mut PoolAssociations| p.insert("P", "R"))
            .unwrap();
        store
            .update(|l: &mut LocationAssociations| {
                l.upsert("R", GeoPoint { lat: 40.0, lon: -75.0 }, 50.0)
            })
            .unwrap();
        store
            .update(|e: &mut EnableFlags| e.set("R", enabled))
            .unwrap();
        if hot {
            store
                .update(|o: &mut OverrideLocations| o.add(GeoPoint { lat: 40.01, lon: -75.01 }))
                .unwrap();
        }
    }

    fn seed_record(store: &AssociationStore, state: TierState, last: u64) {
        let mut record = CacheTierRecord::new("R", "P", ".cache", last);
        record.state = state;
        let mut tiers = TierStatusTable::default();
        tiers.insert(record);
        store.save(&tiers).unwrap();
    }

    fn state_of(store: &AssociationStore) -> Option<TierState> {
        store.tier_status().unwrap().get(&key()).map(|r| r.state)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn trigger_creates_and_provisions_in_one_tick() {
        let mut f = fixture(COOLDOWN);
        associate(&f.store, true, true);

        let report = f.controller.tick(&mut f.ctx, 1000).unwrap();
        assert_eq!(report.created, vec![key()]);
        assert_eq!(
            report.transitions,
            vec![Transition {
                key: key(),
                from: TierState::Startup,
                to: TierState::Active,
            }]
        );
        let record = f.store.tier_status().unwrap().get(&key()).cloned().unwrap();
        assert_eq!(record.state, TierState::Active);
        assert_eq!(record.cache_pool, "P.cache");
        assert_eq!(record.last_transition_time, 1000);
        assert_eq!(f.cluster.steps()[0], "pool-create");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_provisioning_stays_in_startup_without_duplicates() {
        let mut f = fixture(COOLDOWN);
        associate(&f.store, true, true);
        f.cluster.fail_step("set-overlay", -1);

        for now in [1000, 1060, 1120] {
            let report = f.controller.tick(&mut f.ctx, now).unwrap();
            assert_eq!(report.failures.len(), 1);
            assert_eq!(report.failures[0].state, TierState::Startup);
            assert!(report.failures[0].error.contains("set-overlay"));
        }
        let tiers = f.store.tier_status().unwrap();
        assert_eq!(tiers.len(), 1);
        assert_eq!(tiers.get(&key()).unwrap().state, TierState::Startup);

        f.cluster.clear_failures();
        f.controller.tick(&mut f.ctx, 1180).unwrap();
        assert_eq!(state_of(&f.store), Some(TierState::Active));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rules_sharing_a_pool_do_not_share_a_cache_tier() {
        let mut f = fixture(COOLDOWN);
        let here = GeoPoint { lat: 40.0, lon: -75.0 };
        for rule in ["R1", "R2"] {
            f.store
                .update(|p: &mut PoolAssociations| p.insert("P", rule))
                .unwrap();
            f.store
                .update(|l: &mut LocationAssociations| l.upsert(rule, here, 50.0))
                .unwrap();
            f.store.update(|e: &mut EnableFlags| e.set(rule, true)).unwrap();
        }
        f.store
            .update(|o: &mut OverrideLocations| o.add(GeoPoint { lat: 40.01, lon: -75.01 }))
            .unwrap();

        let r1 = TierKey::new("R1", "P");
        let r2 = TierKey::new("R2", "P");
        let report = f.controller.tick(&mut f.ctx, 1000).unwrap();
        assert_eq!(report.created, vec![r1.clone()]);
        assert_eq!(report.contended, vec![r2.clone()]);
        assert_eq!(f.store.tier_status().unwrap().keys(), vec![r1.clone()]);
        let creates = f.cluster.steps().iter().filter(|s| *s == "pool-create").count();
        assert_eq!(creates, 1);

        // R2 goes quiet past the cooldown; R1 keeps the shared cache pool alive.
        f.store
            .update(|l: &mut LocationAssociations| l.remove("R2", here))
            .unwrap();
        let steps_before = f.cluster.steps().len();
        let report = f.controller.tick(&mut f.ctx, 1000 + COOLDOWN + 1).unwrap();
        assert!(report.is_quiet());
        assert!(report.contended.is_empty());
        assert_eq!(f.cluster.steps().len(), steps_before);
        let tiers = f.store.tier_status().unwrap();
        assert_eq!(tiers.keys(), vec![r1.clone()]);
        assert_eq!(tiers.get(&r1).map(|r| r.state), Some(TierState::Active));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn disabled_rule_creates_nothing() {
        let mut f = fixture(COOLDOWN);
        associate(&f.store, false, true);

        let report = f.controller.tick(&mut f.ctx, 1000).unwrap();
        assert!(report.created.is_empty());
        assert!(f.store.tier_status().unwrap().is_empty());
        assert!(f.cluster.commands().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn disabled_rule_still_refreshes_active_tier() {
        let mut f = fixture(COOLDOWN);
        associate(&f.store, false, true);
        seed_record(&f.store, TierState::Active, 0);

        let report = f.controller.tick(&mut f.ctx, 10_000).unwrap();
        assert_eq!(report.refreshed, vec![key()]);
        let record = f.store.tier_status().unwrap().get(&key()).cloned().unwrap();
        assert_eq!(record.state, TierState::Active);
        assert_eq!(record.last_transition_time, 10_000);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn disabled_rule_does_not_block_teardown() {
        let mut f = fixture(COOLDOWN);
        associate(&f.store, false, false);
        seed_record(&f.store, TierState::Active, 0);

        f.controller.tick(&mut f.ctx, COOLDOWN + 1).unwrap();
        assert_eq!(state_of(&f.store), Some(TierState::Teardown));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn zero_cooldown_keeps_tier_active() {
        let mut f = fixture(0);
        associate(&f.store, true, false);
        seed_record(&f.store, TierState::Active, 0);

        let report = f.controller.tick(&mut f.ctx, 100_000_000).unwrap();
        assert!(report.is_quiet());
        assert_eq!(state_of(&f.store), Some(TierState::Active));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn draining_without_worker_restarts_teardown() {
        let mut f = fixture(COOLDOWN);
        associate(&f.store, true, false);
        seed_record(&f.store, TierState::Draining, 0);

        f.controller.tick(&mut f.ctx, 50).unwrap();
        assert_eq!(state_of(&f.store), Some(TierState::Teardown));

        f.controller.tick(&mut f.ctx, 60).unwrap();
        assert_eq!(state_of(&f.store), Some(TierState::Draining));
        assert_eq!(f.ctx.drains().tracked(), vec!["P.cache"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn trigger_during_teardown_does_not_interrupt() {
        let mut f = fixture(COOLDOWN);
        associate(&f.store, true, true);
        seed_record(&f.store, TierState::Teardown, 0);

        let report = f.controller.tick(&mut f.ctx, 10).unwrap();
        assert!(report.created.is_empty());
        assert_eq!(state_of(&f.store), Some(TierState::Draining));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn non_empty_pool_goes_back_to_draining() {
        let mut f = fixture(COOLDOWN);
        associate(&f.store, true, false);
        seed_record(&f.store, TierState::Empty, 0);
        f.cluster.put_objects("P.cache", 4);

        let report = f.controller.tick(&mut f.ctx, 10).unwrap();
        assert_eq!(report.transitions[0].to, TierState::Draining);
        assert!(report.removed.is_empty());

        wait_until(|| f.ctx.drains().is_done("P.cache")).await;
        assert_eq!(f.cluster.object_count("P.cache"), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn removal_command_failure_stays_empty() {
        let mut f = fixture(COOLDOWN);
        associate(&f.store, true, false);
        seed_record(&f.store, TierState::Empty, 0);
        f.cluster.fail_step("tier-remove", -16);

        let report = f.controller.tick(&mut f.ctx, 10).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(state_of(&f.store), Some(TierState::Empty));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn telemetry_source_can_trigger() {
        let Fixture {
            controller,
            mut ctx,
            store,
            ..
        } = fixture(COOLDOWN);
        associate(&store, true, false);
        let traffic = SampledTraffic::new(0, 0.0);
        traffic.report(vec![TrafficSample {
            point: GeoPoint { lat: 40.2, lon: -75.1 },
            bytes_per_sec: 1 << 20,
        }]);
        let controller = controller.with_traffic(Arc::new(traffic));

        let report = controller.tick(&mut ctx, 1000).unwrap();
        assert_eq!(report.created, vec![key()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreadable_store_aborts_tick_before_any_command() {
        let kv = Arc::new(FlakyKv::new());
        kv.put("tier_status", b"garbage").unwrap();
        let store = AssociationStore::with_backend(kv);
        let mut f = fixture_with(store, COOLDOWN);
        associate(&f.store, true, true);

        let err = f.controller.tick(&mut f.ctx, 1000).unwrap_err();
        assert!(matches!(err, TierError::Persistence(ref e) if e.is_schema_fault()));
        assert!(f.cluster.commands().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_write_back_fails_the_tick() {
        let kv = Arc::new(FlakyKv::new());
        let store = AssociationStore::with_backend(kv.clone());
        let mut f = fixture_with(store, COOLDOWN);
        associate(&f.store, true, true);
        kv.fail_writes(true);

        let err = f.controller.tick(&mut f.ctx, 1000).unwrap_err();
        assert!(matches!(err, TierError::Persistence(StateError::Write(_))));

        // Nothing was persisted; the next tick starts over and the
        // provisioning retry completes.
        kv.fail_writes(false);
        assert!(f.store.tier_status().unwrap().is_empty());
        let report = f.controller.tick(&mut f.ctx, 1060).unwrap();
        assert_eq!(report.created, vec![key()]);
        assert_eq!(state_of(&f.store), Some(TierState::Active));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_stops_on_shutdown_signal() {
        let Fixture {
            controller, ctx, ..
        } = fixture(COOLDOWN);
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            controller.run(ctx, Duration::from_millis(20), rx).await;
        });
        tokio::time::sleep(Duration::from_millis(70)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}

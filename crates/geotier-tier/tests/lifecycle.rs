//! End-to-end cache tier lifecycle against an in-memory cluster.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use geotier_cluster::{ClusterCommand, ClusterControl, ClusterResult, CommandOutput, StorageContent};
use geotier_core::{GeoPoint, GeotierConfig};
use geotier_state::{
    AssociationStore, EnableFlags, LocationAssociations, OverrideLocations, PoolAssociations,
    TierKey, TierState,
};
use geotier_tier::{
    ControlLoopContext, DrainCoordinator, ProvisioningGateway, TickReport, TierController,
};
use tokio::runtime::Handle;

/// Cluster whose cache pools fill up on creation and empty on flush.
#[derive(Default)]
struct SimCluster {
    commands: Mutex<Vec<String>>,
    objects: Mutex<HashMap<String, usize>>,
}

impl SimCluster {
    fn steps(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

impl ClusterControl for SimCluster {
    fn execute(&self, command: &ClusterCommand) -> ClusterResult<CommandOutput> {
        if let ClusterCommand::PoolCreate { pool, .. } = command {
            self.objects.lock().unwrap().insert(pool.clone(), 10);
        }
        self.commands.lock().unwrap().push(command.step());
        Ok(CommandOutput::ok())
    }
}

impl StorageContent for SimCluster {
    fn list_objects(&self, pool: &str) -> ClusterResult<Vec<String>> {
        let count = self.objects.lock().unwrap().get(pool).copied().unwrap_or(0);
        Ok((0..count).map(|i| format!("rbd_data.{i}")).collect())
    }

    fn flush_evict_all(&self, pool: &str) -> ClusterResult<()> {
        self.objects.lock().unwrap().remove(pool);
        self.commands.lock().unwrap().push("flush-evict-all".to_string());
        Ok(())
    }
}

const COOLDOWN: u64 = 1800;

fn setup() -> (TierController, ControlLoopContext, Arc<SimCluster>, AssociationStore) {
    let cluster = Arc::new(SimCluster::default());
    let store = AssociationStore::open_in_memory().unwrap();
    let mut config = GeotierConfig::default();
    config.control.cooldown_secs = COOLDOWN;

    let gateway = ProvisioningGateway::new(cluster.clone(), cluster.clone(), config.tier.clone());
    let controller = TierController::new(store.clone(), gateway, &config);
    let ctx = ControlLoopContext::new(DrainCoordinator::new(
        Handle::current(),
        cluster.clone(),
        cluster.clone(),
    ));
    (controller, ctx, cluster, store)
}

fn transitions(report: &TickReport) -> Vec<(TierState, TierState)> {
    report.transitions.iter().map(|t| (t.from, t.to)).collect()
}

async fn wait_for_drain(ctx: &ControlLoopContext, pool: &str) {
    for _ in 0..500 {
        if ctx.drains().is_done(pool) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("drain of {pool} did not finish");
}

#[tokio::test(flavor = "multi_thread")]
async fn simulated_traffic_drives_full_lifecycle() {
    let (controller, mut ctx, cluster, store) = setup();
    let key = TierKey::new("R", "P");
    let registered = GeoPoint::new(40.0, -75.0).unwrap();
    let client = GeoPoint::new(40.01, -75.01).unwrap();

    store
        .update(|p: &mut PoolAssociations| p.insert("P", "R"))
        .unwrap();
    store
        .update(|l: &mut LocationAssociations| l.upsert("R", registered, 50.0))
        .unwrap();
    store
        .update(|e: &mut EnableFlags| e.set("R", true))
        .unwrap();
    store
        .update(|o: &mut OverrideLocations| o.add(client))
        .unwrap();

    // Hot client about a mile away: created and provisioned.
    let t0 = 1_000_000;
    let report = controller.tick(&mut ctx, t0).unwrap();
    assert_eq!(report.created, vec![key.clone()]);
    assert_eq!(transitions(&report), vec![(TierState::Startup, TierState::Active)]);

    // Still hot: refreshed, no transition.
    let report = controller.tick(&mut ctx, t0 + 60).unwrap();
    assert_eq!(report.refreshed, vec![key.clone()]);
    assert!(report.is_quiet());

    store
        .update(|o: &mut OverrideLocations| o.remove(client))
        .unwrap();

    // Within cooldown nothing happens.
    let report = controller.tick(&mut ctx, t0 + 60 + COOLDOWN).unwrap();
    assert!(report.is_quiet());

    let mut now = t0 + 60 + COOLDOWN + 1;
    let report = controller.tick(&mut ctx, now).unwrap();
    assert_eq!(transitions(&report), vec![(TierState::Active, TierState::Teardown)]);

    now += 60;
    let report = controller.tick(&mut ctx, now).unwrap();
    assert_eq!(transitions(&report), vec![(TierState::Teardown, TierState::Draining)]);

    wait_for_drain(&ctx, "P.cache").await;
    now += 60;
    let report = controller.tick(&mut ctx, now).unwrap();
    assert_eq!(transitions(&report), vec![(TierState::Draining, TierState::Empty)]);

    now += 60;
    let report = controller.tick(&mut ctx, now).unwrap();
    assert!(report.transitions.is_empty());
    assert_eq!(report.removed, vec![key.clone()]);
    assert!(store.tier_status().unwrap().is_empty());

    let steps = cluster.steps();
    assert_eq!(
        steps,
        vec![
            "pool-create",
            "set-min_size",
            "tier-add",
            "cache-mode-writeback",
            "set-overlay",
            "set-hit_set_type",
            "set-target_max_bytes",
            "cache-mode-forward",
            "flush-evict-all",
            "rm-overlay",
            "tier-remove",
        ]
    );

    // The key is free again: a new trigger creates a fresh record.
    store
        .update(|o: &mut OverrideLocations| o.add(client))
        .unwrap();
    let report = controller.tick(&mut ctx, now + 60).unwrap();
    assert_eq!(report.created, vec![key]);
}

#[tokio::test(flavor = "multi_thread")]
async fn restart_mid_drain_resumes_from_stored_state() {
    let (controller, mut ctx, _cluster, store) = setup();
    store
        .update(|p: &mut PoolAssociations| p.insert("P", "R"))
        .unwrap();
    store
        .update(|l: &mut LocationAssociations| {
            l.upsert("R", GeoPoint::new(40.0, -75.0).unwrap(), 50.0)
        })
        .unwrap();
    store
        .update(|e: &mut EnableFlags| e.set("R", true))
        .unwrap();
    store
        .update(|o: &mut OverrideLocations| o.add(GeoPoint::new(40.0, -75.0).unwrap()))
        .unwrap();

    controller.tick(&mut ctx, 0).unwrap();
    store
        .update(|o: &mut OverrideLocations| o.remove(GeoPoint::new(40.0, -75.0).unwrap()))
        .unwrap();
    controller.tick(&mut ctx, COOLDOWN + 1).unwrap();
    controller.tick(&mut ctx, COOLDOWN + 2).unwrap();
    assert_eq!(
        store.tier_status().unwrap().get(&TierKey::new("R", "P")).unwrap().state,
        TierState::Draining
    );

    // A new process: same store, no worker handles.
    let (_, mut fresh_ctx, _, _) = setup();
    let report = controller.tick(&mut fresh_ctx, COOLDOWN + 3).unwrap();
    assert_eq!(transitions(&report), vec![(TierState::Draining, TierState::Teardown)]);
    let report = controller.tick(&mut fresh_ctx, COOLDOWN + 4).unwrap();
    assert_eq!(transitions(&report), vec![(TierState::Teardown, TierState::Draining)]);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["transitions"][0]["to"], "draining");
    assert_eq!(json["transitions"][0]["key"]["pool"], "P");
}

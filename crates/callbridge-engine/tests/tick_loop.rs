//! Server tick loop: scheduled native tasks driving hooked entities

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use callbridge_engine::{
    create_entity_creature, BridgeConfig, CallbackRegistry, CreatureBehavior, DamageDecision,
    DamageType, Entity, EntityType, FaultPolicy, Scheduler, TickScheduler,
};
use callbridge_sdk::{BridgeResult, NativeError, Player};
use parking_lot::Mutex;

fn registry() -> &'static CallbackRegistry {
    Box::leak(Box::new(CallbackRegistry::new()))
}

struct Spectator(&'static str);

impl Player for Spectator {
    fn uuid(&self) -> String {
        format!("00000000-{}", self.0)
    }

    fn username(&self) -> String {
        self.0.to_string()
    }

    fn send_message(&self, _message: &str) {}
}

/// Boss that only takes damage once it has been ticked three times.
struct Boss {
    ticks: AtomicUsize,
    log: Arc<Mutex<Vec<String>>>,
}

impl CreatureBehavior for Boss {
    fn update_new_viewer(&self, player: &dyn Player) -> BridgeResult<()> {
        self.log.lock().push(format!("show {}", player.username()));
        Ok(())
    }

    fn tick(&self, _time: i64) -> BridgeResult<()> {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn damage(&self, damage_type: &DamageType, amount: f32) -> BridgeResult<DamageDecision> {
        let shielded = self.ticks.load(Ordering::SeqCst) < 3;
        self.log
            .lock()
            .push(format!("{} {} shielded={}", damage_type, amount, shielded));
        Ok(if shielded {
            DamageDecision::Veto
        } else {
            DamageDecision::Proceed
        })
    }

    fn remove(&self) -> BridgeResult<()> {
        self.log.lock().push("despawn".to_string());
        Ok(())
    }
}

#[test]
fn test_scheduled_task_ticks_entity() {
    let registry = registry();
    let host = Arc::new(TickScheduler::new());
    let scheduler = Scheduler::with_registry(Arc::clone(&host), registry);

    let log = Arc::new(Mutex::new(Vec::new()));
    let boss = Boss {
        ticks: AtomicUsize::new(0),
        log: Arc::clone(&log),
    };
    let entity = Arc::new(create_entity_creature(
        registry,
        EntityType::new("minecraft:wither"),
        boss,
    ));
    entity.add_viewer(Arc::new(Spectator("alice")));

    let ticking = Arc::clone(&entity);
    let clock = Arc::new(AtomicUsize::new(0));
    let time = Arc::clone(&clock);
    let task = scheduler
        .build_task(move || {
            let now = time.fetch_add(50, Ordering::SeqCst) as i64;
            ticking.tick(now);
            Ok(())
        })
        .repeat(1)
        .schedule();

    host.run_ticks(2);
    assert!(!entity.damage(&DamageType::new("magic"), 8.0));
    host.run_ticks(1);
    assert!(entity.damage(&DamageType::new("magic"), 8.0));
    assert!(task.cancel());
    entity.remove();

    assert_eq!(entity.ticks(), 3);
    assert_eq!(entity.last_tick(), Some(100));
    assert_eq!(entity.health(), 12.0);
    assert_eq!(
        *log.lock(),
        vec![
            "show alice",
            "magic 8 shielded=true",
            "magic 8 shielded=false",
            "despawn",
        ]
    );
    assert_eq!(entity.viewer_count(), 0);
}

#[test]
fn test_fault_policy_from_config() {
    let config = BridgeConfig::from_toml_str(
        "[scheduler]\nfault_policy = \"stop\"\nmax_tasks_per_tick = 0\n",
    )
    .unwrap();
    let registry = registry();
    let host = Arc::new(TickScheduler::with_config(&config.scheduler));
    let scheduler = Scheduler::with_registry(Arc::clone(&host), registry)
        .with_fault_policy(config.scheduler.fault_policy);

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let task = scheduler
        .build_task(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 1 {
                return Err(NativeError::Callback("chunk not loaded".to_string()));
            }
            Ok(())
        })
        .repeat(1)
        .schedule();

    host.run_ticks(5);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert!(!task.is_scheduled());
}

#[test]
fn test_continue_policy_survives_faults() {
    let registry = registry();
    let host = Arc::new(TickScheduler::new());
    let scheduler = Scheduler::with_registry(Arc::clone(&host), registry);
    assert_eq!(FaultPolicy::default(), FaultPolicy::Continue);

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let task = scheduler
        .build_task(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            panic!("always fails")
        })
        .repeat(2)
        .schedule();

    // Runs on ticks 1, 3, 5.
    host.run_ticks(5);
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert!(task.is_scheduled());
}

#[test]
fn test_task_can_change_its_own_repeat() {
    let registry = registry();
    let host = Arc::new(TickScheduler::new());
    let scheduler = Scheduler::with_registry(Arc::clone(&host), registry);

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let task = scheduler
        .build_task(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .delay(1)
        .schedule();

    host.tick();
    // Delay consumed without repeat; enabling repeat now keeps it alive.
    assert!(task.set_repeat(1));
    host.run_ticks(3);
    assert_eq!(runs.load(Ordering::SeqCst), 4);
    assert!(task.is_scheduled());
}

#[test]
fn test_plain_entity_without_hooks() {
    let entity = Entity::new(EntityType::new("minecraft:armor_stand"));
    let viewer: Arc<dyn Player> = Arc::new(Spectator("bob"));
    assert!(entity.add_viewer(Arc::clone(&viewer)));
    assert!(entity.remove_viewer(viewer.as_ref()));
    assert!(!entity.remove_viewer(viewer.as_ref()));
    entity.remove();
    assert!(entity.is_removed());
    assert!(!entity.damage(&DamageType::new("generic"), 1.0));
}

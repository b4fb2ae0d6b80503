//! Entity lifecycle delegation
//!
//! A host [`Entity`] optionally carries a [`LifecycleHooks`] object. Every
//! lifecycle operation calls the hook first and then runs the default host
//! behavior. Only the damage hook can suppress the default, by returning
//! [`DamageDecision::Veto`].
//!
//! Native creatures implement [`CreatureBehavior`]; registering one yields an
//! [`EntityLifecycleDelegate`] that plugs into an entity as its hooks.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use callbridge_sdk::{BridgeResult, Handle, Player};
use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::dispatch::guarded;
use crate::registry::CallbackRegistry;

/// Health of a freshly spawned entity.
pub const DEFAULT_HEALTH: f32 = 20.0;

static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(1);

/// Host name of an entity type (e.g. `minecraft:zombie`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityType(String);

impl EntityType {
    /// Create an entity type from its host name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Host name of the type
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Host name of a damage source (e.g. `fall`, `generic`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DamageType(String);

impl DamageType {
    /// Create a damage type from its host name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Host name of the damage type
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DamageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of the damage hook.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DamageDecision {
    /// Apply the damage as usual
    #[default]
    Proceed,
    /// Skip default damage processing
    Veto,
}

// ============================================================================
// Native side
// ============================================================================

/// Lifecycle behavior of a native creature.
///
/// Every method defaults to a no-op so a creature only overrides what it
/// cares about.
pub trait CreatureBehavior: Send + Sync + 'static {
    /// A player started viewing the entity
    fn update_new_viewer(&self, _player: &dyn Player) -> BridgeResult<()> {
        Ok(())
    }

    /// A player stopped viewing the entity
    fn update_old_viewer(&self, _player: &dyn Player) -> BridgeResult<()> {
        Ok(())
    }

    /// Called once per server tick with the host time in milliseconds
    fn tick(&self, _time: i64) -> BridgeResult<()> {
        Ok(())
    }

    /// The entity is about to take damage
    fn damage(&self, _damage_type: &DamageType, _amount: f32) -> BridgeResult<DamageDecision> {
        Ok(DamageDecision::Proceed)
    }

    /// The entity is being removed from the world
    fn remove(&self) -> BridgeResult<()> {
        Ok(())
    }
}

/// Forward a new viewer to the behavior under `handle`.
pub fn lifecycle_viewer_added(
    registry: &CallbackRegistry,
    handle: Handle,
    player: &dyn Player,
) -> BridgeResult<()> {
    let behavior = registry.lifecycle(handle)?;
    guarded(|| behavior.update_new_viewer(player))
}

/// Forward a departing viewer to the behavior under `handle`.
pub fn lifecycle_viewer_removed(
    registry: &CallbackRegistry,
    handle: Handle,
    player: &dyn Player,
) -> BridgeResult<()> {
    let behavior = registry.lifecycle(handle)?;
    guarded(|| behavior.update_old_viewer(player))
}

/// Forward a tick to the behavior under `handle`.
pub fn lifecycle_tick(registry: &CallbackRegistry, handle: Handle, time: i64) -> BridgeResult<()> {
    let behavior = registry.lifecycle(handle)?;
    guarded(|| behavior.tick(time))
}

/// Ask the behavior under `handle` whether damage may proceed.
pub fn lifecycle_damage(
    registry: &CallbackRegistry,
    handle: Handle,
    damage_type: &DamageType,
    amount: f32,
) -> BridgeResult<DamageDecision> {
    let behavior = registry.lifecycle(handle)?;
    guarded(|| behavior.damage(damage_type, amount))
}

/// Forward removal to the behavior under `handle`.
pub fn lifecycle_remove(registry: &CallbackRegistry, handle: Handle) -> BridgeResult<()> {
    let behavior = registry.lifecycle(handle)?;
    guarded(|| behavior.remove())
}

// ============================================================================
// Host side
// ============================================================================

/// Interception points of the host entity lifecycle.
pub trait LifecycleHooks: Send + Sync {
    /// Runs before a viewer is attached
    fn on_viewer_added(&self, player: &dyn Player) -> BridgeResult<()>;

    /// Runs before a viewer is detached
    fn on_viewer_removed(&self, player: &dyn Player) -> BridgeResult<()>;

    /// Runs before the default tick
    fn on_tick(&self, time: i64) -> BridgeResult<()>;

    /// Runs before damage is applied; may veto it
    fn on_damage(&self, damage_type: &DamageType, amount: f32) -> BridgeResult<DamageDecision>;

    /// Runs before the entity is removed
    fn on_remove(&self) -> BridgeResult<()>;
}

native_adapter!(
    /// Entity hooks backed by a native [`CreatureBehavior`].
    EntityLifecycleDelegate
);

impl LifecycleHooks for EntityLifecycleDelegate {
    fn on_viewer_added(&self, player: &dyn Player) -> BridgeResult<()> {
        lifecycle_viewer_added(self.registry, self.handle, player)
    }

    fn on_viewer_removed(&self, player: &dyn Player) -> BridgeResult<()> {
        lifecycle_viewer_removed(self.registry, self.handle, player)
    }

    fn on_tick(&self, time: i64) -> BridgeResult<()> {
        lifecycle_tick(self.registry, self.handle, time)
    }

    fn on_damage(&self, damage_type: &DamageType, amount: f32) -> BridgeResult<DamageDecision> {
        lifecycle_damage(self.registry, self.handle, damage_type, amount)
    }

    fn on_remove(&self) -> BridgeResult<()> {
        lifecycle_remove(self.registry, self.handle)
    }
}

struct EntityState {
    viewers: Vec<Arc<dyn Player>>,
    health: f32,
    ticks: u64,
    last_tick: Option<i64>,
    removed: bool,
}

/// A host entity.
///
/// Hooks run without the entity's state lock held, so a hook may read the
/// entity it is attached to.
pub struct Entity {
    id: u64,
    entity_type: EntityType,
    state: Mutex<EntityState>,
    removing: AtomicBool,
    hooks: Option<Box<dyn LifecycleHooks>>,
}

impl Entity {
    /// Create a plain entity with default behavior only
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            id: NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed),
            entity_type,
            state: Mutex::new(EntityState {
                viewers: Vec::new(),
                health: DEFAULT_HEALTH,
                ticks: 0,
                last_tick: None,
                removed: false,
            }),
            removing: AtomicBool::new(false),
            hooks: None,
        }
    }

    /// Create an entity whose lifecycle is intercepted by `hooks`
    pub fn with_hooks(entity_type: EntityType, hooks: Box<dyn LifecycleHooks>) -> Self {
        let mut entity = Self::new(entity_type);
        entity.hooks = Some(hooks);
        entity
    }

    /// Unique id of this entity
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Type of this entity
    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    /// Current health
    pub fn health(&self) -> f32 {
        self.state.lock().health
    }

    /// Number of default ticks run
    pub fn ticks(&self) -> u64 {
        self.state.lock().ticks
    }

    /// Host time of the last tick
    pub fn last_tick(&self) -> Option<i64> {
        self.state.lock().last_tick
    }

    /// Check whether the entity has been removed
    pub fn is_removed(&self) -> bool {
        self.state.lock().removed
    }

    /// Number of players currently viewing the entity
    pub fn viewer_count(&self) -> usize {
        self.state.lock().viewers.len()
    }

    fn is_viewer(&self, player: &dyn Player) -> bool {
        self.state
            .lock()
            .viewers
            .iter()
            .any(|v| same_player(v.as_ref(), player))
    }

    /// Attach a viewer.
    ///
    /// Returns `false` if the player already views the entity or the entity
    /// is removed; the hook does not run in that case.
    pub fn add_viewer(&self, player: Arc<dyn Player>) -> bool {
        let uuid = player.uuid();
        if uuid.is_empty() {
            warn!(entity = self.id, "viewer has no uuid, matching it by identity");
        }
        if self.is_removed() || self.is_viewer(player.as_ref()) {
            return false;
        }
        if let Some(hooks) = &self.hooks {
            if let Err(e) = hooks.on_viewer_added(player.as_ref()) {
                error!(entity = self.id, error = %e, "viewer-added hook failed");
            }
        }

        let mut state = self.state.lock();
        if state.removed
            || state
                .viewers
                .iter()
                .any(|v| same_player(v.as_ref(), player.as_ref()))
        {
            return false;
        }
        state.viewers.push(player);
        trace!(entity = self.id, viewer = %uuid, "viewer added");
        true
    }

    /// Detach a viewer. Returns `false` if the player was not viewing.
    pub fn remove_viewer(&self, player: &dyn Player) -> bool {
        if !self.is_viewer(player) {
            return false;
        }
        if let Some(hooks) = &self.hooks {
            if let Err(e) = hooks.on_viewer_removed(player) {
                error!(entity = self.id, error = %e, "viewer-removed hook failed");
            }
        }

        let uuid = player.uuid();
        let mut state = self.state.lock();
        let before = state.viewers.len();
        state.viewers.retain(|v| !same_player(v.as_ref(), player));
        trace!(entity = self.id, viewer = %uuid, "viewer removed");
        state.viewers.len() != before
    }

    /// Run one server tick. Removed entities do not tick.
    pub fn tick(&self, time: i64) {
        if self.is_removed() {
            return;
        }
        if let Some(hooks) = &self.hooks {
            if let Err(e) = hooks.on_tick(time) {
                error!(entity = self.id, time, error = %e, "tick hook failed");
            }
        }

        let mut state = self.state.lock();
        state.ticks += 1;
        state.last_tick = Some(time);
    }

    /// Apply damage.
    ///
    /// Returns `true` if the damage was applied, `false` if the hook vetoed
    /// it or the entity is removed. A failing hook does not veto. Negative
    /// and non-finite amounts are rejected before the hook runs.
    pub fn damage(&self, damage_type: &DamageType, amount: f32) -> bool {
        if !amount.is_finite() || amount < 0.0 {
            warn!(entity = self.id, %damage_type, amount, "invalid damage amount");
            return false;
        }
        if self.is_removed() {
            return false;
        }
        let decision = match &self.hooks {
            Some(hooks) => hooks.on_damage(damage_type, amount).unwrap_or_else(|e| {
                error!(entity = self.id, %damage_type, error = %e, "damage hook failed");
                DamageDecision::Proceed
            }),
            None => DamageDecision::Proceed,
        };
        if decision == DamageDecision::Veto {
            debug!(entity = self.id, %damage_type, amount, "damage vetoed");
            return false;
        }

        let mut state = self.state.lock();
        state.health = (state.health - amount).max(0.0);
        trace!(entity = self.id, %damage_type, amount, health = state.health, "damage applied");
        true
    }

    /// Remove the entity from the world. Only the first call has an effect.
    pub fn remove(&self) {
        if self.removing.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(hooks) = &self.hooks {
            if let Err(e) = hooks.on_remove() {
                error!(entity = self.id, error = %e, "remove hook failed");
            }
        }

        let mut state = self.state.lock();
        state.viewers.clear();
        state.removed = true;
        debug!(entity = self.id, entity_type = %self.entity_type, "entity removed");
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("entity_type", &self.entity_type)
            .field("hooked", &self.hooks.is_some())
            .finish()
    }
}

/// Players are the same viewer when their uuids match; a player without a
/// uuid only matches itself.
fn same_player(a: &dyn Player, b: &dyn Player) -> bool {
    let uuid = a.uuid();
    if uuid.is_empty() {
        return std::ptr::addr_eq(a, b);
    }
    uuid == b.uuid()
}

/// Register `behavior` and build an entity delegating to it.
pub fn create_entity_creature(
    registry: &'static CallbackRegistry,
    entity_type: EntityType,
    behavior: impl CreatureBehavior,
) -> Entity {
    let delegate = registry.register_lifecycle(Arc::new(behavior));
    Entity::with_hooks(entity_type, Box::new(delegate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::leaked;
    use callbridge_sdk::NativeError;
    use std::sync::{OnceLock, Weak};

    struct TestPlayer(&'static str);

    impl Player for TestPlayer {
        fn uuid(&self) -> String {
            format!("uuid-{}", self.0)
        }

        fn username(&self) -> String {
            self.0.to_string()
        }

        fn send_message(&self, _message: &str) {}
    }

    fn player(name: &'static str) -> Arc<dyn Player> {
        Arc::new(TestPlayer(name))
    }

    /// Records what the entity looked like whenever a hook ran.
    #[derive(Default)]
    struct Observer {
        entity: OnceLock<Weak<Entity>>,
        seen: Mutex<Vec<String>>,
    }

    impl Observer {
        fn note(&self, hook: &str) {
            let snapshot = match self.entity.get().and_then(Weak::upgrade) {
                Some(e) => format!(
                    "{hook}: viewers={} ticks={} health={} removed={}",
                    e.viewer_count(),
                    e.ticks(),
                    e.health(),
                    e.is_removed()
                ),
                None => format!("{hook}: detached"),
            };
            self.seen.lock().push(snapshot);
        }
    }

    impl CreatureBehavior for Arc<Observer> {
        fn update_new_viewer(&self, _player: &dyn Player) -> BridgeResult<()> {
            self.note("new_viewer");
            Ok(())
        }

        fn update_old_viewer(&self, _player: &dyn Player) -> BridgeResult<()> {
            self.note("old_viewer");
            Ok(())
        }

        fn tick(&self, _time: i64) -> BridgeResult<()> {
            self.note("tick");
            Ok(())
        }

        fn damage(&self, _damage_type: &DamageType, _amount: f32) -> BridgeResult<DamageDecision> {
            self.note("damage");
            Ok(DamageDecision::Proceed)
        }

        fn remove(&self) -> BridgeResult<()> {
            self.note("remove");
            Ok(())
        }
    }

    #[test]
    fn test_plain_entity_defaults() {
        let entity = Entity::new(EntityType::new("minecraft:pig"));
        assert!(entity.add_viewer(player("alice")));
        assert!(!entity.add_viewer(player("alice")));
        entity.tick(50);
        assert!(entity.damage(&DamageType::new("fall"), 25.0));

        assert_eq!(entity.viewer_count(), 1);
        assert_eq!(entity.ticks(), 1);
        assert_eq!(entity.last_tick(), Some(50));
        assert_eq!(entity.health(), 0.0);
    }

    #[test]
    fn test_hooks_run_before_defaults() {
        let registry = leaked();
        let observer = Arc::new(Observer::default());
        let entity = Arc::new(create_entity_creature(
            registry,
            EntityType::new("minecraft:zombie"),
            Arc::clone(&observer),
        ));
        observer.entity.set(Arc::downgrade(&entity)).unwrap();

        let alice = player("alice");
        entity.add_viewer(Arc::clone(&alice));
        entity.tick(1);
        entity.damage(&DamageType::new("generic"), 5.0);
        entity.remove_viewer(alice.as_ref());
        entity.remove();

        assert_eq!(
            *observer.seen.lock(),
            vec![
                "new_viewer: viewers=0 ticks=0 health=20 removed=false",
                "tick: viewers=1 ticks=0 health=20 removed=false",
                "damage: viewers=1 ticks=1 health=20 removed=false",
                "old_viewer: viewers=1 ticks=1 health=15 removed=false",
                "remove: viewers=0 ticks=1 health=15 removed=false",
            ]
        );
        assert!(entity.is_removed());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = leaked();
        let observer = Arc::new(Observer::default());
        let entity = create_entity_creature(registry, EntityType::new("minecraft:cow"), Arc::clone(&observer));

        entity.remove();
        entity.remove();
        entity.tick(1);
        assert!(!entity.add_viewer(player("bob")));

        assert_eq!(observer.seen.lock().len(), 1);
        assert_eq!(entity.ticks(), 0);
    }

    struct Invulnerable;

    impl CreatureBehavior for Invulnerable {
        fn damage(&self, damage_type: &DamageType, _amount: f32) -> BridgeResult<DamageDecision> {
            Ok(if damage_type.as_str() == "void" {
                DamageDecision::Proceed
            } else {
                DamageDecision::Veto
            })
        }
    }

    #[test]
    fn test_damage_veto() {
        let registry = leaked();
        let entity = create_entity_creature(registry, EntityType::new("minecraft:golem"), Invulnerable);

        assert!(!entity.damage(&DamageType::new("fall"), 10.0));
        assert_eq!(entity.health(), DEFAULT_HEALTH);
        assert!(entity.damage(&DamageType::new("void"), 4.0));
        assert_eq!(entity.health(), 16.0);
    }

    struct Faulty;

    impl CreatureBehavior for Faulty {
        fn tick(&self, _time: i64) -> BridgeResult<()> {
            Err(NativeError::Callback("pathfinding failed".to_string()))
        }

        fn damage(&self, _damage_type: &DamageType, _amount: f32) -> BridgeResult<DamageDecision> {
            panic!("damage hook exploded")
        }
    }

    #[test]
    fn test_hook_fault_keeps_default_behavior() {
        let registry = leaked();
        let entity = create_entity_creature(registry, EntityType::new("minecraft:skeleton"), Faulty);

        entity.tick(7);
        assert!(entity.damage(&DamageType::new("arrow"), 3.0));
        assert_eq!(entity.ticks(), 1);
        assert_eq!(entity.health(), 17.0);
    }

    #[test]
    fn test_delegate_after_release_reports_stale() {
        let registry = leaked();
        let delegate = registry.register_lifecycle(Arc::new(Invulnerable));
        let handle = delegate.handle();
        drop(delegate);

        assert!(matches!(
            lifecycle_tick(registry, handle, 0),
            Err(NativeError::StaleHandle(_))
        ));
    }

    #[test]
    fn test_invalid_damage_amounts_are_rejected() {
        let entity = Entity::new(EntityType::new("minecraft:cow"));
        let generic = DamageType::new("generic");

        assert!(!entity.damage(&generic, -5.0));
        assert!(!entity.damage(&generic, f32::NAN));
        assert!(!entity.damage(&generic, f32::INFINITY));
        assert_eq!(entity.health(), DEFAULT_HEALTH);

        assert!(entity.damage(&generic, 0.0));
        assert_eq!(entity.health(), DEFAULT_HEALTH);
    }

    struct Anonymous(&'static str);

    impl Player for Anonymous {
        fn uuid(&self) -> String {
            String::new()
        }

        fn username(&self) -> String {
            self.0.to_string()
        }

        fn send_message(&self, _message: &str) {}
    }

    #[test]
    fn test_players_without_uuid_are_distinct_viewers() {
        let entity = Entity::new(EntityType::new("minecraft:villager"));
        let first: Arc<dyn Player> = Arc::new(Anonymous("first"));
        let second: Arc<dyn Player> = Arc::new(Anonymous("second"));

        assert!(entity.add_viewer(Arc::clone(&first)));
        assert!(entity.add_viewer(Arc::clone(&second)));
        assert!(!entity.add_viewer(Arc::clone(&first)));
        assert_eq!(entity.viewer_count(), 2);

        assert!(entity.remove_viewer(first.as_ref()));
        assert!(!entity.remove_viewer(first.as_ref()));
        assert_eq!(entity.viewer_count(), 1);
        assert!(entity.add_viewer(player("alice")));
        assert_eq!(entity.viewer_count(), 2);
    }
}

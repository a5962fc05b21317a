//! Capability registry.
//!
//! Drivers attach profile instances to bus objects at composition time.
//! Capabilities are matched by [`ProfileKind`] equality; a typed view of a
//! profile is only taken after its kind matched.

use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{BusError, Result};
use crate::space::{BusObject, ObjectId};

/// Stable identifier of a capability contract, e.g. `audio.power`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileKind(Cow<'static, str>);

impl ProfileKind {
    pub const fn from_static(kind: &'static str) -> Self {
        Self(Cow::Borrowed(kind))
    }

    pub fn new(kind: impl Into<String>) -> Self {
        Self(Cow::Owned(kind.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A capability implementation attached to a bus object.
pub trait Profile: Send + Sync + 'static {
    fn kind(&self) -> ProfileKind;

    fn object_id(&self) -> &ObjectId;

    /// Current cached state, for listings.
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// A profile with a statically known kind.
pub trait ProfileType: Profile + Sized {
    const KIND: ProfileKind;
}

/// Typed view of `profile` if its kind is `P::KIND`.
pub fn downcast_profile<P: ProfileType>(profile: &Arc<dyn Profile>) -> Option<Arc<P>> {
    if profile.kind() != P::KIND {
        return None;
    }
    profile.clone().into_any().downcast::<P>().ok()
}

struct ObjectEntry {
    object: BusObject,
    profiles: Vec<Arc<dyn Profile>>,
}

#[derive(Default)]
struct RegistryInner {
    entries: HashMap<ObjectId, ObjectEntry>,
    order: Vec<ObjectId>,
}

/// Bus objects and the profiles attached to them.
///
/// Read-mostly: lookups share a read lock, teardown takes the write lock.
#[derive(Default)]
pub struct CapabilityRegistry {
    inner: RwLock<RegistryInner>,
    sealed: AtomicBool,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_object(&self, object: BusObject) -> Result<()> {
        self.ensure_open()?;
        let mut inner = self.inner.write();
        if inner.entries.contains_key(&object.id) {
            return Err(BusError::Composition(format!(
                "object '{}' already registered",
                object.id
            )));
        }
        inner.order.push(object.id.clone());
        inner.entries.insert(
            object.id.clone(),
            ObjectEntry {
                object,
                profiles: Vec::new(),
            },
        );
        Ok(())
    }

    /// Attach a profile to a registered object. Attachment order is the
    /// order [`find_profiles`](Self::find_profiles) reports.
    pub fn attach(&self, object_id: &ObjectId, profile: Arc<dyn Profile>) -> Result<()> {
        self.ensure_open()?;
        if profile.object_id() != object_id {
            return Err(BusError::Composition(format!(
                "profile '{}' belongs to '{}', not '{}'",
                profile.kind(),
                profile.object_id(),
                object_id
            )));
        }

        let mut inner = self.inner.write();
        let entry = inner
            .entries
            .get_mut(object_id)
            .ok_or_else(|| BusError::ObjectNotFound(object_id.to_string()))?;
        tracing::debug!(object = %object_id, profile = %profile.kind(), "Profile attached");
        entry.profiles.push(profile);
        Ok(())
    }

    /// Freeze composition. Further registrations fail; removal still works.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::SeqCst);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    /// Profiles of `kind` attached to `object_id`, in attachment order.
    pub fn find_profiles(&self, object_id: &ObjectId, kind: &ProfileKind) -> Vec<Arc<dyn Profile>> {
        let inner = self.inner.read();
        inner
            .entries
            .get(object_id)
            .map(|entry| {
                entry
                    .profiles
                    .iter()
                    .filter(|p| &p.kind() == kind)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn find_typed<P: ProfileType>(&self, object_id: &ObjectId) -> Vec<Arc<P>> {
        self.find_profiles(object_id, &P::KIND)
            .iter()
            .filter_map(downcast_profile::<P>)
            .collect()
    }

    pub fn profiles(&self, object_id: &ObjectId) -> Vec<Arc<dyn Profile>> {
        self.inner
            .read()
            .entries
            .get(object_id)
            .map(|entry| entry.profiles.clone())
            .unwrap_or_default()
    }

    pub fn kinds_of(&self, object_id: &ObjectId) -> Vec<ProfileKind> {
        self.profiles(object_id).iter().map(|p| p.kind()).collect()
    }

    pub fn object(&self, object_id: &ObjectId) -> Option<BusObject> {
        self.inner
            .read()
            .entries
            .get(object_id)
            .map(|entry| entry.object.clone())
    }

    /// Object plus its profiles under a single read lock.
    pub fn lookup(&self, object_id: &ObjectId) -> Option<(BusObject, Vec<Arc<dyn Profile>>)> {
        self.inner
            .read()
            .entries
            .get(object_id)
            .map(|entry| (entry.object.clone(), entry.profiles.clone()))
    }

    /// All objects in registration order.
    pub fn objects(&self) -> Vec<BusObject> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id).map(|e| e.object.clone()))
            .collect()
    }

    pub fn contains(&self, object_id: &ObjectId) -> bool {
        self.inner.read().entries.contains_key(object_id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tear down an object, releasing the registry's profile references.
    pub fn remove_object(&self, object_id: &ObjectId) -> Option<BusObject> {
        let removed = {
            let mut inner = self.inner.write();
            inner.order.retain(|id| id != object_id);
            inner.entries.remove(object_id)
        };
        // Profiles drop outside the lock; their handles cancel subscriptions.
        removed.map(|entry| {
            tracing::debug!(object = %object_id, profiles = entry.profiles.len(), "Object removed");
            entry.object
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_sealed() {
            return Err(BusError::Composition(
                "registry is sealed; composition happens at startup only".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::space::ObjectKind;

    struct Lamp {
        object: ObjectId,
        label: &'static str,
    }

    impl Profile for Lamp {
        fn kind(&self) -> ProfileKind {
            Self::KIND
        }

        fn object_id(&self) -> &ObjectId {
            &self.object
        }

        fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    impl ProfileType for Lamp {
        const KIND: ProfileKind = ProfileKind::from_static("test.lamp");
    }

    struct Dimmer {
        object: ObjectId,
    }

    impl Profile for Dimmer {
        fn kind(&self) -> ProfileKind {
            ProfileKind::from_static("test.dimmer")
        }

        fn object_id(&self) -> &ObjectId {
            &self.object
        }

        fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    fn controller(n: u8) -> BusObject {
        BusObject {
            id: ObjectId::for_controller(n),
            kind: ObjectKind::Controller,
            address: Address::controller_address(n),
            name: format!("Controller {}", n),
        }
    }

    #[test]
    fn test_find_profiles_in_attachment_order() {
        let registry = CapabilityRegistry::new();
        let id = ObjectId::for_controller(2);
        registry.register_object(controller(2)).unwrap();
        registry
            .attach(&id, Arc::new(Lamp { object: id.clone(), label: "first" }))
            .unwrap();
        registry.attach(&id, Arc::new(Dimmer { object: id.clone() })).unwrap();
        registry
            .attach(&id, Arc::new(Lamp { object: id.clone(), label: "second" }))
            .unwrap();

        let lamps = registry.find_typed::<Lamp>(&id);
        let labels: Vec<_> = lamps.iter().map(|l| l.label).collect();
        assert_eq!(labels, vec!["first", "second"]);
        assert_eq!(registry.find_profiles(&id, &ProfileKind::new("test.dimmer")).len(), 1);
        assert!(registry
            .find_profiles(&ObjectId::new("missing"), &Lamp::KIND)
            .is_empty());
    }

    #[test]
    fn test_sealed_registry_rejects_composition() {
        let registry = CapabilityRegistry::new();
        registry.register_object(controller(1)).unwrap();
        registry.seal();

        let err = registry.register_object(controller(2)).unwrap_err();
        assert!(matches!(err, BusError::Composition(_)));

        let id = ObjectId::for_controller(1);
        let err = registry
            .attach(&id, Arc::new(Dimmer { object: id.clone() }))
            .unwrap_err();
        assert!(matches!(err, BusError::Composition(_)));
    }

    #[test]
    fn test_attach_rejects_foreign_profile() {
        let registry = CapabilityRegistry::new();
        registry.register_object(controller(1)).unwrap();
        let err = registry
            .attach(
                &ObjectId::for_controller(1),
                Arc::new(Dimmer { object: ObjectId::for_controller(9) }),
            )
            .unwrap_err();
        assert!(matches!(err, BusError::Composition(_)));
    }

    #[test]
    fn test_remove_object_releases_profiles() {
        let registry = CapabilityRegistry::new();
        let id = ObjectId::for_controller(4);
        registry.register_object(controller(4)).unwrap();
        let lamp = Arc::new(Lamp { object: id.clone(), label: "only" });
        registry.attach(&id, lamp.clone()).unwrap();
        registry.seal();
        assert_eq!(Arc::strong_count(&lamp), 2);

        assert!(registry.remove_object(&id).is_some());
        assert_eq!(Arc::strong_count(&lamp), 1);
        assert!(registry.objects().is_empty());
        assert!(registry.remove_object(&id).is_none());
    }

    #[test]
    fn test_downcast_requires_matching_kind() {
        let id = ObjectId::for_controller(1);
        let dimmer: Arc<dyn Profile> = Arc::new(Dimmer { object: id });
        assert!(downcast_profile::<Lamp>(&dimmer).is_none());
    }
}

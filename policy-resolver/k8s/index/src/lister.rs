use kube::{
    runtime::{
        reflector::{store, ObjectRef, Store},
        watcher,
    },
    Resource, ResourceExt,
};
use netpol_policy_k8s_api::{Labels, Selector};
use std::{fmt, sync::Arc};

/// Read-only access to a cached set of objects of one kind.
///
/// The lister never talks to the API server; it reads whatever its store has been populated
/// with.
pub struct Lister<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    store: Store<K>,
}

/// Reads the objects of a single namespace.
pub struct NamespaceLister<'l, K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    lister: &'l Lister<K>,
    namespace: &'l str,
}

/// Indicates that no object with the requested name is cached.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{resource} {name:?} not found")]
pub struct NotFound {
    /// The qualified resource name, e.g. `secrets` or `networkpolicies.netpol.io`.
    pub resource: String,
    pub name: String,
}

// === impl Lister ===

impl<K> Lister<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    pub fn new(store: Store<K>) -> Self {
        Self { store }
    }

    /// Returns all objects whose labels are selected by `selector`.
    pub fn list(&self, selector: &Selector) -> Vec<Arc<K>> {
        self.store
            .state()
            .into_iter()
            .filter(|obj| selector.matches(&Labels::from_k8s(obj.labels())))
            .collect()
    }

    /// Returns the cluster-scoped object named `name`.
    pub fn get(&self, name: &str) -> Result<Arc<K>, NotFound> {
        self.store
            .get(&ObjectRef::new(name))
            .ok_or_else(|| NotFound::new::<K>(name))
    }

    pub fn namespaced<'l>(&'l self, namespace: &'l str) -> NamespaceLister<'l, K> {
        NamespaceLister {
            lister: self,
            namespace,
        }
    }

    pub fn len(&self) -> usize {
        self.store.state().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K> FromIterator<K> for Lister<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    fn from_iter<T: IntoIterator<Item = K>>(objs: T) -> Self {
        let mut writer = store::Writer::default();
        for obj in objs {
            writer.apply_watcher_event(&watcher::Event::Apply(obj));
        }
        Self::new(writer.as_reader())
    }
}

impl<K> fmt::Debug for Lister<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lister")
            .field("resource", &resource::<K>())
            .field("len", &self.len())
            .finish()
    }
}

// === impl NamespaceLister ===

impl<K> NamespaceLister<'_, K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    pub fn list(&self, selector: &Selector) -> Vec<Arc<K>> {
        self.lister
            .list(selector)
            .into_iter()
            .filter(|obj| obj.namespace().as_deref() == Some(self.namespace))
            .collect()
    }

    pub fn get(&self, name: &str) -> Result<Arc<K>, NotFound> {
        self.lister
            .store
            .get(&ObjectRef::new(name).within(self.namespace))
            .ok_or_else(|| NotFound::new::<K>(name))
    }
}

// === impl NotFound ===

impl NotFound {
    fn new<K: Resource<DynamicType = ()>>(name: &str) -> Self {
        Self {
            resource: resource::<K>(),
            name: name.to_string(),
        }
    }
}

/// Renders `<plural>` or `<plural>.<group>`.
fn resource<K: Resource<DynamicType = ()>>() -> String {
    let plural = K::plural(&());
    let group = K::group(&());
    if group.is_empty() {
        plural.into_owned()
    } else {
        format!("{plural}.{group}")
    }
}

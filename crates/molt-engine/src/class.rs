//! Class objects and method resolution
//!
//! A `Class` is a heap object: a name, an optional parent link, a name→slot
//! method table, a name→slot static table, declared fields, and an optional
//! constructor hook. Method and static slots are either `Concrete` (a real
//! callable) or `Forward` (a stub installed by the proxy layer that resolves
//! the same name on a proxy's current target at call time).
//!
//! Parent links come in two flavors: `Fixed` (ordinary subclassing) and
//! `Live` (an indirection cell owned by a proxy and repointed on every
//! update, so super-calls through a substitute always see the current
//! target's parent).

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::object::{Instance, MethodCtx, StaticCtx};
use crate::proxy::ProxyShared;
use crate::registry::InstanceTracker;
use crate::value::Value;
use crate::{RuntimeError, RuntimeResult};

/// Global counter for generating unique class IDs
static NEXT_CLASS_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a new unique class ID
fn generate_class_id() -> u64 {
    NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed)
}

/// Instance method callable
pub type MethodFn = Arc<dyn Fn(&MethodCtx<'_>) -> RuntimeResult<Value> + Send + Sync>;

/// Static method callable
pub type StaticFn = Arc<dyn Fn(&StaticCtx<'_>) -> RuntimeResult<Value> + Send + Sync>;

/// Constructor hook, run once per ancestry level at construction time
pub type ConstructorFn = Arc<dyn Fn(&Arc<Instance>, &[Value]) -> RuntimeResult<()> + Send + Sync>;

/// A member slot in a class's method or static table.
///
/// `Forward` is the member stub of the proxy layer: its identity never
/// changes after installation, only the class inside the shared cell does.
pub(crate) enum Slot<F> {
    /// A real implementation
    Concrete {
        /// The callable
        func: F,
        /// Sealed members may not be repointed by a proxy
        sealed: bool,
    },
    /// Forward to the same name on the cell's current class, at call time
    Forward(Arc<ClassCell>),
}

impl<F: Clone> Clone for Slot<F> {
    fn clone(&self) -> Self {
        match self {
            Slot::Concrete { func, sealed } => Slot::Concrete {
                func: func.clone(),
                sealed: *sealed,
            },
            Slot::Forward(cell) => Slot::Forward(cell.clone()),
        }
    }
}

/// Instance method slot
pub(crate) type MethodSlot = Slot<MethodFn>;

/// Static method slot
pub(crate) type StaticSlot = Slot<StaticFn>;

/// Shared mutable reference to a class: a proxy's current-target slot.
///
/// Every forward slot installed by one proxy shares one cell; an update
/// is a single `set` and is immediately observed by all of them.
pub(crate) struct ClassCell {
    current: RwLock<Arc<Class>>,
}

impl ClassCell {
    pub(crate) fn new(class: Arc<Class>) -> Arc<Self> {
        Arc::new(Self {
            current: RwLock::new(class),
        })
    }

    /// The class currently behind this cell
    pub(crate) fn get(&self) -> Arc<Class> {
        self.current.read().clone()
    }

    pub(crate) fn set(&self, class: Arc<Class>) {
        *self.current.write() = class;
    }
}

/// Live parent pointer, owned by a proxy and read by descendants.
///
/// Kept in lockstep with the proxy's current target so that super-call
/// resolution above a substitute tracks reloads of the base.
pub(crate) struct ParentCell {
    parent: RwLock<Option<Arc<Class>>>,
}

impl ParentCell {
    pub(crate) fn new(parent: Option<Arc<Class>>) -> Arc<Self> {
        Arc::new(Self {
            parent: RwLock::new(parent),
        })
    }

    pub(crate) fn get(&self) -> Option<Arc<Class>> {
        self.parent.read().clone()
    }

    pub(crate) fn set(&self, parent: Option<Arc<Class>>) {
        *self.parent.write() = parent;
    }
}

/// How a class is linked to its parent
pub(crate) enum ParentLink {
    /// No parent (root class)
    Root,
    /// Ordinary subclassing: the parent was fixed at declaration time
    Fixed(Arc<Class>),
    /// Proxy substitute: the parent is read through a live cell
    Live(Arc<ParentCell>),
}

/// Concrete class vs. proxy substitute
pub(crate) enum ClassKind {
    /// A class built by `ClassBuilder`
    Concrete,
    /// A substitute built by the proxy factory; fields and constructor
    /// are taken from the cell's current target
    Substitute(Arc<ClassCell>),
}

/// Runtime class object.
///
/// Identity is `Arc` pointer identity; a class is never mutated after
/// `build()` except for slot installation by the proxy layer, which only
/// ever adds entries.
pub struct Class {
    id: u64,
    name: String,
    kind: ClassKind,
    parent: ParentLink,
    methods: RwLock<FxHashMap<String, MethodSlot>>,
    statics: RwLock<FxHashMap<String, StaticSlot>>,
    constructor: Option<ConstructorFn>,
    fields: Vec<(String, Value)>,
    tracker: Option<Arc<InstanceTracker>>,
    proxy: OnceCell<Weak<ProxyShared>>,
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("substitute", &self.is_substitute())
            .finish()
    }
}

impl Class {
    /// Start building a concrete class
    pub fn builder(name: &str) -> ClassBuilder {
        ClassBuilder::new(name)
    }

    /// Build a proxy substitute class (proxy factory only)
    pub(crate) fn new_substitute(
        name: &str,
        cell: Arc<ClassCell>,
        parent_cell: Arc<ParentCell>,
        tracker: Arc<InstanceTracker>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: generate_class_id(),
            name: name.to_string(),
            kind: ClassKind::Substitute(cell),
            parent: ParentLink::Live(parent_cell),
            methods: RwLock::new(FxHashMap::default()),
            statics: RwLock::new(FxHashMap::default()),
            constructor: None,
            fields: Vec::new(),
            tracker: Some(tracker),
            proxy: OnceCell::new(),
        })
    }

    /// Unique class ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current parent class, read through the live cell for substitutes
    pub fn parent(&self) -> Option<Arc<Class>> {
        match &self.parent {
            ParentLink::Root => None,
            ParentLink::Fixed(parent) => Some(parent.clone()),
            ParentLink::Live(cell) => cell.get(),
        }
    }

    /// Whether this class is a proxy substitute
    pub fn is_substitute(&self) -> bool {
        matches!(self.kind, ClassKind::Substitute(_))
    }

    /// Own instance method names, sorted
    pub fn own_method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Own static method names, sorted
    pub fn own_static_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.statics.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether `name` resolves to an instance method anywhere on the chain
    pub fn responds_to(self: &Arc<Self>, name: &str) -> bool {
        self.resolve_method(name).is_some()
    }

    /// Whether `name` resolves to a static method anywhere on the chain
    pub fn has_static(self: &Arc<Self>, name: &str) -> bool {
        self.resolve_static(name).is_some()
    }

    /// Whether `ancestor` appears on this class's chain, either directly
    /// or as the current target behind a substitute
    pub fn derives_from(self: &Arc<Self>, ancestor: &Arc<Class>) -> bool {
        self.ancestry()
            .iter()
            .any(|c| Arc::ptr_eq(c, ancestor) || Arc::ptr_eq(&c.definition(), ancestor))
    }

    pub(crate) fn has_own_method(&self, name: &str) -> bool {
        self.methods.read().contains_key(name)
    }

    pub(crate) fn has_own_static(&self, name: &str) -> bool {
        self.statics.read().contains_key(name)
    }

    pub(crate) fn own_method_slots(&self) -> Vec<(String, MethodSlot)> {
        let mut slots: Vec<(String, MethodSlot)> = self
            .methods
            .read()
            .iter()
            .map(|(name, slot)| (name.clone(), slot.clone()))
            .collect();
        slots.sort_by(|a, b| a.0.cmp(&b.0));
        slots
    }

    pub(crate) fn own_static_slots(&self) -> Vec<(String, StaticSlot)> {
        let mut slots: Vec<(String, StaticSlot)> = self
            .statics
            .read()
            .iter()
            .map(|(name, slot)| (name.clone(), slot.clone()))
            .collect();
        slots.sort_by(|a, b| a.0.cmp(&b.0));
        slots
    }

    /// Install a method slot unless the name is already present.
    /// Existing slots are never replaced or removed.
    pub(crate) fn install_method_slot(&self, name: String, slot: MethodSlot) {
        self.methods.write().entry(name).or_insert(slot);
    }

    /// Install a static slot unless the name is already present.
    pub(crate) fn install_static_slot(&self, name: String, slot: StaticSlot) {
        self.statics.write().entry(name).or_insert(slot);
    }

    /// The class providing this class's fields and constructor: the current
    /// target for a substitute, the class itself otherwise.
    pub(crate) fn definition(self: &Arc<Self>) -> Arc<Class> {
        match &self.kind {
            ClassKind::Concrete => self.clone(),
            ClassKind::Substitute(cell) => cell.get(),
        }
    }

    pub(crate) fn own_fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub(crate) fn own_constructor(&self) -> Option<ConstructorFn> {
        self.constructor.clone()
    }

    pub(crate) fn tracker(&self) -> Option<&Arc<InstanceTracker>> {
        self.tracker.as_ref()
    }

    /// Backlink to the proxy handle state, if this class was proxied
    /// (as original, substitute, or update target)
    pub(crate) fn proxy_backlink(&self) -> Option<Arc<ProxyShared>> {
        self.proxy.get().and_then(Weak::upgrade)
    }

    /// Record the proxy backlink. First link wins; relinking is ignored.
    pub(crate) fn set_proxy_backlink(&self, shared: &Arc<ProxyShared>) {
        let _ = self.proxy.set(Arc::downgrade(shared));
    }

    /// Resolve an instance method, own slot first then up the parent chain.
    ///
    /// Returns the class that owns the found implementation (super-calls in
    /// the running method resolve from that owner's parent) and the callable.
    /// A forward slot resolves on the cell's current class; if an update
    /// removed the member there, resolution falls through to the live parent.
    /// Resolution carries a visited set, so a forwarding cycle between
    /// substitutes surfaces as a missing member instead of recursing.
    pub(crate) fn resolve_method(self: &Arc<Self>, name: &str) -> Option<(Arc<Class>, MethodFn)> {
        self.resolve_method_guarded(name, &mut Vec::new())
    }

    fn resolve_method_guarded(
        self: &Arc<Self>,
        name: &str,
        visited: &mut Vec<Arc<Class>>,
    ) -> Option<(Arc<Class>, MethodFn)> {
        if visited.iter().any(|c| Arc::ptr_eq(c, self)) {
            return None;
        }
        visited.push(self.clone());
        let slot = self.methods.read().get(name).cloned();
        match slot {
            Some(Slot::Concrete { func, .. }) => Some((self.clone(), func)),
            Some(Slot::Forward(cell)) => {
                let target = cell.get();
                target.resolve_method_guarded(name, visited).or_else(|| {
                    self.parent()
                        .and_then(|p| p.resolve_method_guarded(name, visited))
                })
            }
            None => self
                .parent()
                .and_then(|p| p.resolve_method_guarded(name, visited)),
        }
    }

    /// Resolve a static method, own slot first then up the parent chain.
    pub(crate) fn resolve_static(self: &Arc<Self>, name: &str) -> Option<(Arc<Class>, StaticFn)> {
        self.resolve_static_guarded(name, &mut Vec::new())
    }

    fn resolve_static_guarded(
        self: &Arc<Self>,
        name: &str,
        visited: &mut Vec<Arc<Class>>,
    ) -> Option<(Arc<Class>, StaticFn)> {
        if visited.iter().any(|c| Arc::ptr_eq(c, self)) {
            return None;
        }
        visited.push(self.clone());
        let slot = self.statics.read().get(name).cloned();
        match slot {
            Some(Slot::Concrete { func, .. }) => Some((self.clone(), func)),
            Some(Slot::Forward(cell)) => {
                let target = cell.get();
                target.resolve_static_guarded(name, visited).or_else(|| {
                    self.parent()
                        .and_then(|p| p.resolve_static_guarded(name, visited))
                })
            }
            None => self
                .parent()
                .and_then(|p| p.resolve_static_guarded(name, visited)),
        }
    }

    /// Invoke a static method through this class.
    ///
    /// `self` stays the receiver even when the implementation is found
    /// higher up the chain, so subclass static overrides win when resolution
    /// starts at the subclass.
    pub fn call_static(self: &Arc<Self>, name: &str, args: &[Value]) -> RuntimeResult<Value> {
        let (owner, func) = self.resolve_static(name).ok_or_else(|| {
            RuntimeError::StaticNotFound {
                class: self.name.clone(),
                method: name.to_string(),
            }
        })?;
        let ctx = StaticCtx::new(self, &owner, args);
        func(&ctx)
    }

    /// The class chain from this class to the root, through live parent
    /// cells. Substitutes appear as themselves; their field and constructor
    /// contributions are resolved through `definition`.
    pub(crate) fn ancestry(self: &Arc<Self>) -> Vec<Arc<Class>> {
        let mut chain: Vec<Arc<Class>> = Vec::new();
        let mut current = Some(self.clone());
        while let Some(class) = current {
            if chain.iter().any(|c| Arc::ptr_eq(c, &class)) {
                break;
            }
            current = class.parent();
            chain.push(class);
        }
        chain
    }

    /// Construct an instance of this class.
    ///
    /// Field defaults are collected root-first (leaf overrides win), the
    /// instance is registered with every tracker on the chain, then
    /// constructor hooks run root-first.
    pub fn construct(self: &Arc<Self>, args: &[Value]) -> RuntimeResult<Arc<Instance>> {
        let chain = self.ancestry();

        let mut fields: FxHashMap<String, Value> = FxHashMap::default();
        for class in chain.iter().rev() {
            let def = class.definition();
            for (name, default) in def.own_fields() {
                fields.insert(name.clone(), default.clone());
            }
        }

        let instance = Instance::new(self.clone(), fields);

        for class in &chain {
            if let Some(tracker) = class.tracker() {
                tracker.register(&instance);
            }
        }

        for class in chain.iter().rev() {
            let def = class.definition();
            if let Some(ctor) = def.own_constructor() {
                ctor(&instance, args)?;
            }
        }

        Ok(instance)
    }
}

/// Builder for concrete classes
pub struct ClassBuilder {
    name: String,
    parent: Option<Arc<Class>>,
    methods: FxHashMap<String, MethodSlot>,
    statics: FxHashMap<String, StaticSlot>,
    constructor: Option<ConstructorFn>,
    fields: Vec<(String, Value)>,
}

impl ClassBuilder {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parent: None,
            methods: FxHashMap::default(),
            statics: FxHashMap::default(),
            constructor: None,
            fields: Vec::new(),
        }
    }

    /// Set the parent class
    pub fn parent(mut self, parent: &Arc<Class>) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Declare an instance field with a default value
    pub fn field(mut self, name: &str, default: Value) -> Self {
        self.fields.push((name.to_string(), default));
        self
    }

    /// Add an instance method
    pub fn method<F>(self, name: &str, func: F) -> Self
    where
        F: Fn(&MethodCtx<'_>) -> RuntimeResult<Value> + Send + Sync + 'static,
    {
        self.method_slot(name, Arc::new(func), false)
    }

    /// Add a sealed instance method. Sealed members keep their original
    /// implementation permanently when the class is proxied.
    pub fn sealed_method<F>(self, name: &str, func: F) -> Self
    where
        F: Fn(&MethodCtx<'_>) -> RuntimeResult<Value> + Send + Sync + 'static,
    {
        self.method_slot(name, Arc::new(func), true)
    }

    /// Add a static method
    pub fn static_method<F>(self, name: &str, func: F) -> Self
    where
        F: Fn(&StaticCtx<'_>) -> RuntimeResult<Value> + Send + Sync + 'static,
    {
        self.static_slot(name, Arc::new(func), false)
    }

    /// Add a sealed static method
    pub fn sealed_static<F>(self, name: &str, func: F) -> Self
    where
        F: Fn(&StaticCtx<'_>) -> RuntimeResult<Value> + Send + Sync + 'static,
    {
        self.static_slot(name, Arc::new(func), true)
    }

    /// Set the constructor hook
    pub fn constructor<F>(mut self, func: F) -> Self
    where
        F: Fn(&Arc<Instance>, &[Value]) -> RuntimeResult<()> + Send + Sync + 'static,
    {
        self.constructor = Some(Arc::new(func));
        self
    }

    fn method_slot(mut self, name: &str, func: MethodFn, sealed: bool) -> Self {
        self.methods
            .insert(name.to_string(), Slot::Concrete { func, sealed });
        self
    }

    fn static_slot(mut self, name: &str, func: StaticFn, sealed: bool) -> Self {
        self.statics
            .insert(name.to_string(), Slot::Concrete { func, sealed });
        self
    }

    /// Finish building
    pub fn build(self) -> Arc<Class> {
        Arc::new(Class {
            id: generate_class_id(),
            name: self.name,
            kind: ClassKind::Concrete,
            parent: match self.parent {
                Some(parent) => ParentLink::Fixed(parent),
                None => ParentLink::Root,
            },
            methods: RwLock::new(self.methods),
            statics: RwLock::new(self.statics),
            constructor: self.constructor,
            fields: self.fields,
            tracker: None,
            proxy: OnceCell::new(),
        })
    }
}

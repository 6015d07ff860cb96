//! Instances and call contexts
//!
//! An `Instance` keeps a back-reference to the class it was constructed
//! from (its dynamic class). Dispatch always starts there, so an instance
//! constructed from a proxy substitute runs whatever the proxy's current
//! target defines, with the instance's own state untouched across updates.
//!
//! Methods receive a `MethodCtx` carrying the receiver, the arguments and
//! the class that owns the running implementation. Super-calls resolve
//! from that owner's parent link at call time, which is what makes a
//! reloaded base visible to subclass methods written before the reload.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::class::Class;
use crate::value::Value;
use crate::{RuntimeError, RuntimeResult};

/// Global counter for generating unique object IDs
static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a new unique object ID
fn generate_object_id() -> u64 {
    NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Host-injected refresh callback, invoked after a proxy update so the
/// instance's visible output gets recomputed
pub type RefreshFn = Box<dyn Fn() + Send + Sync>;

/// Object instance (heap-allocated)
pub struct Instance {
    /// Unique object ID (assigned on creation)
    object_id: u64,
    /// The class this instance was constructed from
    class: Arc<Class>,
    /// Field values by name
    fields: RwLock<FxHashMap<String, Value>>,
    /// Set once at teardown; refresh becomes a no-op afterwards
    torn_down: AtomicBool,
    /// Refresh callback injected by the host; stored refcounted so it can
    /// be cloned out and run without holding the lock
    refresh: RwLock<Option<Arc<dyn Fn() + Send + Sync>>>,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("object_id", &self.object_id)
            .field("class", &self.class.name())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

impl Instance {
    pub(crate) fn new(class: Arc<Class>, fields: FxHashMap<String, Value>) -> Arc<Self> {
        Arc::new(Self {
            object_id: generate_object_id(),
            class,
            fields: RwLock::new(fields),
            torn_down: AtomicBool::new(false),
            refresh: RwLock::new(None),
        })
    }

    /// Unique object ID
    pub fn object_id(&self) -> u64 {
        self.object_id
    }

    /// The dynamic class of this instance
    pub fn class(&self) -> &Arc<Class> {
        &self.class
    }

    /// Whether this instance's class chain contains `class`, directly or
    /// as the current target behind a substitute
    pub fn instance_of(&self, class: &Arc<Class>) -> bool {
        self.class.derives_from(class)
    }

    /// Read a field value
    pub fn field(&self, name: &str) -> Option<Value> {
        self.fields.read().get(name).cloned()
    }

    /// Write a field value
    pub fn set_field(&self, name: &str, value: Value) {
        self.fields.write().insert(name.to_string(), value);
    }

    /// Invoke an instance method by name, dispatching from the dynamic class
    pub fn call(self: &Arc<Self>, name: &str, args: &[Value]) -> RuntimeResult<Value> {
        let (owner, func) = self.class.resolve_method(name).ok_or_else(|| {
            RuntimeError::MethodNotFound {
                class: self.class.name().to_string(),
                method: name.to_string(),
            }
        })?;
        let ctx = MethodCtx::new(self, &owner, args);
        func(&ctx)
    }

    /// Inject the host refresh callback
    pub fn set_refresh(&self, callback: RefreshFn) {
        *self.refresh.write() = Some(Arc::from(callback));
    }

    /// Run the refresh callback. Best-effort: a no-op when the instance is
    /// torn down or no callback was injected.
    ///
    /// The callback runs with no lock held, so it may call `teardown` or
    /// `set_refresh` on its own instance.
    pub fn refresh(&self) {
        if self.is_torn_down() {
            return;
        }
        let callback = self.refresh.read().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Tear the instance down. Idempotent; the instance stops receiving
    /// refresh notifications and trackers prune it on their next sweep.
    pub fn teardown(&self) {
        self.torn_down.store(true, Ordering::Release);
        *self.refresh.write() = None;
    }

    /// Whether `teardown` was called
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }
}

/// Context handed to an instance method
pub struct MethodCtx<'a> {
    this: &'a Arc<Instance>,
    owner: &'a Arc<Class>,
    args: &'a [Value],
}

impl<'a> MethodCtx<'a> {
    pub(crate) fn new(this: &'a Arc<Instance>, owner: &'a Arc<Class>, args: &'a [Value]) -> Self {
        Self { this, owner, args }
    }

    /// The receiver
    pub fn this(&self) -> &Arc<Instance> {
        self.this
    }

    /// All arguments
    pub fn args(&self) -> &[Value] {
        self.args
    }

    /// Argument by position, null when absent
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or(Value::Null)
    }

    /// Read a field on the receiver
    pub fn field(&self, name: &str) -> RuntimeResult<Value> {
        self.this
            .field(name)
            .ok_or_else(|| RuntimeError::FieldNotFound {
                class: self.this.class().name().to_string(),
                field: name.to_string(),
            })
    }

    /// Write a field on the receiver
    pub fn set_field(&self, name: &str, value: Value) {
        self.this.set_field(name, value);
    }

    /// Invoke a method on the receiver with full dynamic dispatch
    pub fn call(&self, name: &str, args: &[Value]) -> RuntimeResult<Value> {
        self.this.call(name, args)
    }

    /// Invoke the overridden implementation one level above the class that
    /// owns the running method. Resolution reads the owner's parent link at
    /// call time, so it tracks proxy updates of the base.
    pub fn call_super(&self, name: &str, args: &[Value]) -> RuntimeResult<Value> {
        let parent = self
            .owner
            .parent()
            .ok_or_else(|| RuntimeError::NoParent(self.owner.name().to_string()))?;
        let (owner, func) = parent.resolve_method(name).ok_or_else(|| {
            RuntimeError::MethodNotFound {
                class: parent.name().to_string(),
                method: name.to_string(),
            }
        })?;
        let ctx = MethodCtx::new(self.this, &owner, args);
        func(&ctx)
    }

    /// Invoke a static method starting at the receiver's dynamic class, so
    /// subclass static overrides win
    pub fn call_static(&self, name: &str, args: &[Value]) -> RuntimeResult<Value> {
        self.this.class().call_static(name, args)
    }
}

/// Context handed to a static method
pub struct StaticCtx<'a> {
    class: &'a Arc<Class>,
    owner: &'a Arc<Class>,
    args: &'a [Value],
}

impl<'a> StaticCtx<'a> {
    pub(crate) fn new(class: &'a Arc<Class>, owner: &'a Arc<Class>, args: &'a [Value]) -> Self {
        Self { class, owner, args }
    }

    /// The class the call was made through (the receiver)
    pub fn class(&self) -> &Arc<Class> {
        self.class
    }

    /// The class that owns the running implementation
    pub fn owner(&self) -> &Arc<Class> {
        self.owner
    }

    /// All arguments
    pub fn args(&self) -> &[Value] {
        self.args
    }

    /// Argument by position, null when absent
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or(Value::Null)
    }
}

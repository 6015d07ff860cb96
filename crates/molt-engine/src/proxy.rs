//! Proxy factory and live updates
//!
//! `create_proxy` takes a class and returns a `ClassProxy` handle. The
//! handle's substitute class has stable identity for the life of the
//! handle; `update` repoints a shared current-target cell and a live
//! parent cell, installs stubs for members that exist only on the new
//! target, then sweeps the instance registry. Consumers subclass and
//! instantiate the substitute exactly like an ordinary class.
//!
//! Members that cannot be forwarded — sealed members, and names in the
//! configurable reserved set — are copied bound-to-original instead, and
//! sealed ones surface a warning diagnostic. Construction never aborts
//! over a single member.

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::sync::Arc;

use crate::class::{Class, ClassCell, ParentCell, Slot};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::registry::InstanceTracker;
use crate::value::Value;

/// Host lifecycle members that are never forwarded: the instance registry
/// owns mount/teardown behavior, and repointing these would detach it.
pub const DEFAULT_RESERVED_MEMBERS: &[&str] = &["mount", "unmount"];

/// Proxy construction errors
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The supplied value is not a class
    #[error("invalid proxy target: expected a class, got {found}")]
    InvalidTarget {
        /// Type name of the rejected value
        found: &'static str,
    },

    /// A proxy may not be retargeted at its own substitute class
    #[error("a proxy cannot target its own substitute class")]
    SelfTarget,
}

/// Options for `create_proxy_with`
pub struct ProxyOptions {
    /// Member names that are copied as-is instead of forwarded
    pub reserved_members: FxHashSet<String>,
    /// Shared diagnostic sink; each proxy gets a private one when `None`
    pub diagnostics: Option<Arc<DiagnosticSink>>,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            reserved_members: DEFAULT_RESERVED_MEMBERS
                .iter()
                .map(|name| name.to_string())
                .collect(),
            diagnostics: None,
        }
    }
}

/// Shared state behind a `ClassProxy` handle.
///
/// The substitute keeps only a weak backlink here, so dropping the last
/// handle releases the update capability while stubs keep resolving
/// through their own cell references.
pub(crate) struct ProxyShared {
    substitute: Arc<Class>,
    cell: Arc<ClassCell>,
    parent_cell: Arc<ParentCell>,
    tracker: Arc<InstanceTracker>,
    reserved: FxHashSet<String>,
    sink: Arc<DiagnosticSink>,
    /// Serializes updates; stub reads stay lock-free against each other
    update_lock: Mutex<()>,
}

/// Controller handle for one substitute class
#[derive(Clone)]
pub struct ClassProxy {
    shared: Arc<ProxyShared>,
}

/// Wrap a class with default options. See `create_proxy_with`.
pub fn create_proxy(target: &Value) -> Result<ClassProxy, ProxyError> {
    create_proxy_with(target, ProxyOptions::default())
}

/// Wrap a class behind a stable substitute.
///
/// Rejects non-class values synchronously. Calling this on a class that
/// was already proxied — as original, substitute, or a later update
/// target — returns the existing handle instead of stacking proxies
/// (`options` are ignored in that case).
pub fn create_proxy_with(target: &Value, options: ProxyOptions) -> Result<ClassProxy, ProxyError> {
    let class = match target.as_class() {
        Some(class) => class.clone(),
        None => {
            return Err(ProxyError::InvalidTarget {
                found: target.type_name(),
            })
        }
    };

    if let Some(shared) = class.proxy_backlink() {
        return Ok(ClassProxy { shared });
    }

    let cell = ClassCell::new(class.clone());
    let parent_cell = ParentCell::new(class.parent());
    let tracker = Arc::new(InstanceTracker::new());
    let sink = options
        .diagnostics
        .unwrap_or_else(|| Arc::new(DiagnosticSink::new()));

    let substitute = Class::new_substitute(class.name(), cell.clone(), parent_cell.clone(), tracker.clone());
    install_stubs(&substitute, &class, &cell, &options.reserved_members, &sink);

    let shared = Arc::new(ProxyShared {
        substitute: substitute.clone(),
        cell,
        parent_cell,
        tracker,
        reserved: options.reserved_members,
        sink,
        update_lock: Mutex::new(()),
    });
    substitute.set_proxy_backlink(&shared);
    class.set_proxy_backlink(&shared);

    Ok(ClassProxy { shared })
}

impl ClassProxy {
    /// The substitute class. Always the same object for the life of the
    /// handle, no matter how many updates happened.
    pub fn get(&self) -> Arc<Class> {
        self.shared.substitute.clone()
    }

    /// The class whose member implementations are currently authoritative
    pub fn current_target(&self) -> Arc<Class> {
        self.shared.cell.get()
    }

    /// Hot-swap the behavior behind the substitute.
    ///
    /// Repoints the current-target cell and the live parent cell in one
    /// locked section, installs stubs for members found only on `next`
    /// (stubs are never removed), then notifies tracked instances to
    /// refresh. A rejected `next` leaves the previous target in place and
    /// records an error diagnostic.
    pub fn update(&self, next: &Value) -> Result<(), ProxyError> {
        let next_class = match next.as_class() {
            Some(class) => class.clone(),
            None => {
                self.shared.sink.error(format!(
                    "update rejected: expected a class, got {}",
                    next.type_name()
                ));
                return Err(ProxyError::InvalidTarget {
                    found: next.type_name(),
                });
            }
        };
        if Arc::ptr_eq(&next_class, &self.shared.substitute) {
            self.shared
                .sink
                .error("update rejected: a proxy cannot target its own substitute class");
            return Err(ProxyError::SelfTarget);
        }

        {
            let _guard = self.shared.update_lock.lock();
            self.shared.cell.set(next_class.clone());
            self.shared.parent_cell.set(next_class.parent());
            install_stubs(
                &self.shared.substitute,
                &next_class,
                &self.shared.cell,
                &self.shared.reserved,
                &self.shared.sink,
            );
            next_class.set_proxy_backlink(&self.shared);
        }

        self.shared.tracker.sweep();
        Ok(())
    }

    /// Everything recorded on this proxy's diagnostic sink
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.shared.sink.snapshot()
    }

    /// The proxy's diagnostic sink
    pub fn diagnostic_sink(&self) -> &Arc<DiagnosticSink> {
        &self.shared.sink
    }

    /// Number of live instances currently tracked by this proxy
    pub fn live_instances(&self) -> usize {
        self.shared.tracker.live_count()
    }
}

impl std::fmt::Debug for ClassProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassProxy")
            .field("substitute", &self.shared.substitute)
            .field("current_target", &self.shared.cell.get())
            .finish()
    }
}

/// Install forwarding stubs on `substitute` for every own member of
/// `target` that does not already have a slot. Reserved and sealed members
/// are copied as-is; sealed ones get a warning.
fn install_stubs(
    substitute: &Arc<Class>,
    target: &Arc<Class>,
    cell: &Arc<ClassCell>,
    reserved: &FxHashSet<String>,
    sink: &DiagnosticSink,
) {
    for (name, slot) in target.own_method_slots() {
        if substitute.has_own_method(&name) {
            continue;
        }
        match slot {
            _ if reserved.contains(&name) => {
                substitute.install_method_slot(name, slot);
            }
            Slot::Concrete { sealed: true, .. } => {
                sink.warn(format!(
                    "method `{}.{}` is sealed and stays bound to its original implementation",
                    target.name(),
                    name
                ));
                substitute.install_method_slot(name, slot);
            }
            _ => {
                substitute.install_method_slot(name, Slot::Forward(cell.clone()));
            }
        }
    }

    for (name, slot) in target.own_static_slots() {
        if substitute.has_own_static(&name) {
            continue;
        }
        match slot {
            _ if reserved.contains(&name) => {
                substitute.install_static_slot(name, slot);
            }
            Slot::Concrete { sealed: true, .. } => {
                sink.warn(format!(
                    "static `{}.{}` is sealed and stays bound to its original implementation",
                    target.name(),
                    name
                ));
                substitute.install_static_slot(name, slot);
            }
            _ => {
                substitute.install_static_slot(name, Slot::Forward(cell.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_target_is_rejected() {
        assert!(matches!(
            create_proxy(&Value::Int(1)),
            Err(ProxyError::InvalidTarget { found: "int" })
        ));
        assert!(matches!(
            create_proxy(&Value::Null),
            Err(ProxyError::InvalidTarget { found: "null" })
        ));
    }

    #[test]
    fn test_substitute_mirrors_member_names() {
        let class = Class::builder("Widget")
            .method("render", |_ctx| Ok(Value::Null))
            .method("layout", |_ctx| Ok(Value::Null))
            .static_method("kind", |_ctx| Ok(Value::str("widget")))
            .build();

        let proxy = create_proxy(&Value::class(&class)).unwrap();
        let substitute = proxy.get();

        assert!(substitute.is_substitute());
        assert_eq!(substitute.own_method_names(), vec!["layout", "render"]);
        assert_eq!(substitute.own_static_names(), vec!["kind"]);
    }

    #[test]
    fn test_substitute_parent_is_the_targets_parent() {
        let base = Class::builder("Base").build();
        let class = Class::builder("Widget").parent(&base).build();

        let proxy = create_proxy(&Value::class(&class)).unwrap();
        let parent = proxy.get().parent().unwrap();
        assert!(Arc::ptr_eq(&parent, &base));
    }

    #[test]
    fn test_self_update_is_rejected() {
        let class = Class::builder("Widget").build();
        let proxy = create_proxy(&Value::class(&class)).unwrap();

        let substitute = proxy.get();
        let err = proxy.update(&Value::class(&substitute)).unwrap_err();
        assert!(matches!(err, ProxyError::SelfTarget));
        assert!(Arc::ptr_eq(&proxy.current_target(), &class));
    }
}

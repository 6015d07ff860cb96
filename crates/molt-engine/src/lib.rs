//! Molt Engine — live-patching class proxies
//!
//! This crate provides the runtime behind hot code replacement for a
//! class-based component model:
//! - **Object model**: runtime classes, instances, and dynamic dispatch
//!   (`class` and `object` modules)
//! - **Proxy factory**: stable substitute classes with hot-swappable
//!   behavior (`proxy` module)
//! - **Instance registry**: weak tracking and post-update refresh
//!   notification (`registry` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use molt_engine::{create_proxy, Class, Value};
//!
//! let v1 = Class::builder("View")
//!     .method("render", |_ctx| Ok(Value::str("v1")))
//!     .build();
//! let v2 = Class::builder("View")
//!     .method("render", |_ctx| Ok(Value::str("v2")))
//!     .build();
//!
//! let proxy = create_proxy(&Value::class(&v1))?;
//! let view = proxy.get().construct(&[])?;
//! assert_eq!(view.call("render", &[])?, Value::str("v1"));
//!
//! proxy.update(&Value::class(&v2))?;
//! // same instance, new behavior
//! assert_eq!(view.call("render", &[])?, Value::str("v2"));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod class;
pub mod diagnostics;
pub mod object;
pub mod proxy;
pub mod registry;
pub mod value;

pub use class::{Class, ClassBuilder, ConstructorFn, MethodFn, StaticFn};
pub use diagnostics::{Diagnostic, DiagnosticLevel, DiagnosticSink};
pub use object::{Instance, MethodCtx, RefreshFn, StaticCtx};
pub use proxy::{
    create_proxy, create_proxy_with, ClassProxy, ProxyError, ProxyOptions,
    DEFAULT_RESERVED_MEMBERS,
};
pub use registry::InstanceTracker;
pub use value::Value;

/// Dispatch errors
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// No instance method with this name anywhere on the chain
    #[error("method not found: {class}.{method}")]
    MethodNotFound {
        /// Class dispatch started from
        class: String,
        /// Requested method name
        method: String,
    },

    /// No static method with this name anywhere on the chain
    #[error("static method not found: {class}.{method}")]
    StaticNotFound {
        /// Class dispatch started from
        class: String,
        /// Requested method name
        method: String,
    },

    /// Field missing on the receiver
    #[error("field not found: {class}.{field}")]
    FieldNotFound {
        /// Class of the receiver
        class: String,
        /// Requested field name
        field: String,
    },

    /// Super-call from a class without a parent
    #[error("class {0} has no parent")]
    NoParent(String),

    /// Value of an unexpected type
    #[error("type error: {0}")]
    TypeError(String),
}

/// Dispatch result
pub type RuntimeResult<T> = Result<T, RuntimeError>;

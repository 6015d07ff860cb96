//! Shallow-render harness standing in for the host UI engine.
//!
//! Constructs an instance, injects a refresh callback that re-runs the
//! instance's `render` method into an output cell, and drives the host
//! lifecycle (`mount` on render, `unmount` plus teardown on unmount).

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;

use molt_engine::{Class, Instance, Value};

/// Minimal stand-in for the host rendering engine
#[derive(Default)]
pub struct ShallowRenderer {
    mounted: Vec<Arc<Instance>>,
}

/// One rendered instance plus its visible output
pub struct RenderHandle {
    instance: Arc<Instance>,
    output: Arc<Mutex<Value>>,
}

impl ShallowRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct an instance of `class`, wire its refresh path, run the
    /// mount lifecycle and produce the first output.
    pub fn render(&mut self, class: &Arc<Class>) -> RenderHandle {
        let instance = class.construct(&[]).expect("construct failed");
        let output = Arc::new(Mutex::new(Value::Null));

        let weak = Arc::downgrade(&instance);
        let out = output.clone();
        instance.set_refresh(Box::new(move || {
            if let Some(instance) = weak.upgrade() {
                if let Ok(value) = instance.call("render", &[]) {
                    *out.lock() = value;
                }
            }
        }));

        if class.responds_to("mount") {
            let _ = instance.call("mount", &[]);
        }
        instance.refresh();

        self.mounted.push(instance.clone());
        RenderHandle { instance, output }
    }
}

impl RenderHandle {
    /// Latest rendered output
    pub fn output(&self) -> Value {
        self.output.lock().clone()
    }

    /// The rendered instance
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    /// Re-run the render path explicitly (the host's forceUpdate)
    pub fn force_update(&self) {
        self.instance.refresh();
    }

    /// Run the unmount lifecycle and tear the instance down
    pub fn unmount(&self) {
        if self.instance.class().responds_to("unmount") {
            let _ = self.instance.call("unmount", &[]);
        }
        self.instance.teardown();
    }
}

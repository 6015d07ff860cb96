//! Hot-swap walkthrough: one proxied base class, one subclass, one live
//! instance that changes behavior across two updates without being rebuilt.

use std::error::Error;
use std::sync::Arc;

use molt_engine::{create_proxy, Class, Value};

fn status_bar_v1() -> Arc<Class> {
    Class::builder("StatusBar")
        .method("glyph", |_ctx| Ok(Value::str("=")))
        .static_method("theme", |_ctx| Ok(Value::str("plain")))
        .build()
}

fn status_bar_v2() -> Arc<Class> {
    Class::builder("StatusBar")
        .method("glyph", |_ctx| Ok(Value::str("#")))
        .static_method("theme", |_ctx| Ok(Value::str("bold")))
        .build()
}

fn main() -> Result<(), Box<dyn Error>> {
    let proxy = create_proxy(&Value::class(&status_bar_v1()))?;

    // Subclass the substitute like any ordinary class.
    let meter = Class::builder("Meter")
        .parent(&proxy.get())
        .field("level", Value::Int(3))
        .method("render", |ctx| {
            let glyph = ctx.call_super("glyph", &[])?;
            let theme = ctx.call_static("theme", &[])?;
            let level = ctx.field("level")?.as_int().unwrap_or(0) as usize;
            Ok(Value::str(format!(
                "[{}] {}",
                glyph.to_string().repeat(level),
                theme
            )))
        })
        .build();

    let instance = meter.construct(&[])?;
    println!("v1: {}", instance.call("render", &[])?);

    proxy.update(&Value::class(&status_bar_v2()))?;
    println!("v2: {}  (same instance, id {})", instance.call("render", &[])?, instance.object_id());

    proxy.update(&Value::class(&status_bar_v1()))?;
    println!("v1 again: {}", instance.call("render", &[])?);

    Ok(())
}

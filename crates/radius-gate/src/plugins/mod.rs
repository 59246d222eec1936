//! Built-in plugins and the loader that instantiates them by name

pub mod debug;
pub mod dump;
pub mod log;
pub mod usermac;

use crate::module::{Module, PluginContext, PluginError};
use std::sync::Arc;

pub use self::debug::DebugPlugin;
pub use self::log::LogPlugin;
pub use self::usermac::UserMac;

/// Names accepted by [`load_plugin`]
pub const AVAILABLE: [&str; 3] = [usermac::NAME, log::NAME, debug::NAME];

/// Instantiate the plugin called `name` and run its setup
pub fn load_plugin(name: &str, ctx: PluginContext) -> Result<Arc<dyn Module>, PluginError> {
    tracing::debug!(plugin = name, instance = %ctx.instance, "Loading plugin");
    match name {
        usermac::NAME => setup(UserMac::new(), ctx),
        log::NAME => setup(LogPlugin::new(), ctx),
        debug::NAME => setup(DebugPlugin::new(), ctx),
        _ => Err(PluginError::Unknown(name.to_string())),
    }
}

fn setup<M: Module + 'static>(mut module: M, ctx: PluginContext) -> Result<Arc<dyn Module>, PluginError> {
    module.setup(ctx)?;
    Ok(Arc::new(module))
}

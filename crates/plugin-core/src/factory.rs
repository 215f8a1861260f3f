use std::sync::Arc;

use anyhow::Result;

use crate::{Plugin, PluginSpec};

/// Entry point each plugin crate exposes to the host.
///
/// The host first collects default specs from every factory, merges them
/// with user configuration, and only then builds the plugin from its final
/// spec. Long-lived resources (HTTP clients, storage handles) are created in
/// [`build`](Self::build), once per process.
pub trait PluginFactory: Send + Sync {
    /// Plugin id this factory produces.
    fn id(&self) -> &'static str;

    /// Push the default spec unless one with the same id is already present.
    fn register_defaults(&self, specs: &mut Vec<PluginSpec>) {
        if !specs.iter().any(|s| s.id == self.id()) {
            specs.push(PluginSpec::command(self.id()));
        }
    }

    /// Build the plugin instance from its merged spec.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration cannot produce a usable plugin.
    fn build(&self, spec: &PluginSpec) -> Result<Arc<dyn Plugin>>;
}

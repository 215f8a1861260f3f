use std::{path::Path, sync::Arc};

use plugin_bin::BinPlugin;
use plugin_core::{PluginRegistry, factory::PluginFactory};
use plugin_fy::FyPlugin;
use plugin_grptime::GrptimePlugin;
use plugin_mtts::MttsPlugin;
use plugin_quote::QuotePlugin;
use tracing::{info, warn};

use crate::BotConfig;

fn factories() -> Vec<Box<dyn PluginFactory>> {
    vec![
        Box::new(BinPlugin),
        Box::new(FyPlugin),
        Box::new(GrptimePlugin),
        Box::new(MttsPlugin),
        Box::new(QuotePlugin),
    ]
}

/// Merge configured specs with plugin defaults and per-plugin config files,
/// then build every known plugin.
pub async fn build_registry(config: &BotConfig, plugins_dir: &Path) -> Arc<PluginRegistry> {
    let factories = factories();
    let mut specs = config.plugins.clone().unwrap_or_default();
    for factory in &factories {
        factory.register_defaults(&mut specs);
    }

    let registry = Arc::new(PluginRegistry::new());
    for mut spec in specs {
        let Some(factory) = factories.iter().find(|f| f.id() == spec.id) else {
            warn!("Unknown plugin ID: {}", spec.id);
            continue;
        };
        if spec.triggers.commands.is_empty() {
            spec.triggers.commands.push(spec.id.clone());
        }
        if let Some(file_cfg) = load_plugin_config(plugins_dir, &spec.id) {
            spec.config = merge_yaml(file_cfg, spec.config);
        }
        match factory.build(&spec) {
            Ok(plugin) => {
                registry.register(spec, plugin).await;
            }
            Err(e) => warn!(plugin = %spec.id, error = %e, "Failed to build plugin"),
        }
    }
    registry
}

/// Run each enabled plugin's startup hook. Failures are logged only.
pub async fn start_plugins(registry: &PluginRegistry) {
    for (id, entry) in registry.entries().await {
        if !entry.spec.enabled {
            continue;
        }
        match entry.plugin.start().await {
            Ok(()) => info!(plugin = %id, "Plugin started"),
            Err(e) => warn!(plugin = %id, error = %format!("{e:#}"), "Plugin startup check failed"),
        }
    }
}

/// Values from the file win; inline config fills in whatever the file leaves out.
fn merge_yaml(file_cfg: serde_yaml::Value, spec_cfg: serde_yaml::Value) -> serde_yaml::Value {
    use serde_yaml::Value::Mapping;
    match (file_cfg, spec_cfg) {
        (Mapping(mut a), Mapping(b)) => {
            for (k, v_b) in b {
                match a.get_mut(&k) {
                    Some(v_a) => {
                        let merged = merge_yaml(v_a.clone(), v_b);
                        *v_a = merged;
                    }
                    None => {
                        a.insert(k, v_b);
                    }
                }
            }
            Mapping(a)
        }
        (serde_yaml::Value::Null, b) => b,
        (a, _b) => a,
    }
}

fn load_plugin_config(root: &Path, id: &str) -> Option<serde_yaml::Value> {
    let path = root.join(id).join("config.yaml");
    match std::fs::read_to_string(&path) {
        Ok(s) => match serde_yaml::from_str::<serde_yaml::Value>(&s) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(plugin = %id, file = %path.display(), error = %e, "Failed to parse plugin config YAML");
                None
            }
        },
        Err(e) => {
            if path.exists() {
                warn!(plugin = %id, file = %path.display(), error = %e, "Failed to read plugin config file");
            }
            None
        }
    }
}

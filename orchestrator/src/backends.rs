//! # Backend/Patch/Workflow Registry
//!
//! Backs the `plugins list` CLI command. The original deployment
//! enumerated `importlib.metadata` entry points grouped under
//! `coral_inference.{backends,patches,workflows}`; dynamic plugin loading
//! is out of scope here; instead this is a static table built from the
//! resolved `OrchestratorConfig`'s `backend_entry_modules` and
//! `extra_patches` lists plus the built-in patch toggles, grouped the
//! same three ways.

use crate::config::OrchestratorConfig;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginGroup {
    Backends,
    Patches,
    Workflows,
}

impl PluginGroup {
    fn label(self) -> &'static str {
        match self {
            PluginGroup::Backends => "backends",
            PluginGroup::Patches => "patches",
            PluginGroup::Workflows => "workflows",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PluginEntry {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendRegistry {
    pub backends: Vec<PluginEntry>,
    pub patches: Vec<PluginEntry>,
    pub workflows: Vec<PluginEntry>,
}

impl BackendRegistry {
    /// Builds the static registry from a resolved config: one backend
    /// entry per `backend_entry_modules` item (plus the auto-discovered
    /// `rknn` backend when `auto_patch_rknn` is set), one patch entry per
    /// built-in toggle that is enabled plus every `extra_patches` item,
    /// and no workflows (the original deployment's workflow group is
    /// populated entirely by third-party entry points, none of which
    /// this static table can discover without dynamic loading).
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        let mut backends: Vec<PluginEntry> = config
            .backend_entry_modules
            .iter()
            .map(|module| PluginEntry { name: module.clone(), description: "configured backend entry module".to_string() })
            .collect();
        if config.auto_patch_rknn {
            backends.push(PluginEntry { name: "rknn".to_string(), description: "auto-discovered RKNN backend".to_string() });
        }

        let mut patches = Vec::new();
        let builtin_toggles: &[(&str, bool)] = &[
            ("stream_manager", config.enable_stream_manager_patch),
            ("camera", config.enable_camera_patch),
            ("sink", config.enable_sink_patch),
            ("webrtc", config.enable_webrtc_patch),
            ("plugins", config.enable_plugins_patch),
            ("buffer_sink", config.enable_buffer_sink_patch),
            ("metric_sink", config.enable_metric_sink_patch),
            ("video_sink", config.enable_video_sink_patch),
        ];
        for (name, enabled) in builtin_toggles {
            if *enabled {
                patches.push(PluginEntry { name: name.to_string(), description: "built-in patch".to_string() });
            }
        }
        for extra in &config.extra_patches {
            patches.push(PluginEntry { name: extra.clone(), description: "configured extra patch".to_string() });
        }

        Self { backends, patches, workflows: Vec::new() }
    }

    pub fn group(&self, group: PluginGroup) -> &[PluginEntry] {
        match group {
            PluginGroup::Backends => &self.backends,
            PluginGroup::Patches => &self.patches,
            PluginGroup::Workflows => &self.workflows,
        }
    }

    /// Enumerates either one group or all three, matching
    /// `list_all_plugins(group=None)`'s "every group" default.
    pub fn list(&self, group: Option<PluginGroup>) -> Vec<(&'static str, &[PluginEntry])> {
        match group {
            Some(g) => vec![(g.label(), self.group(g))],
            None => vec![
                (PluginGroup::Backends.label(), self.group(PluginGroup::Backends)),
                (PluginGroup::Patches.label(), self.group(PluginGroup::Patches)),
                (PluginGroup::Workflows.label(), self.group(PluginGroup::Workflows)),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_enables_every_builtin_patch() {
        let registry = BackendRegistry::from_config(&OrchestratorConfig::default());
        assert_eq!(registry.patches.len(), 8);
        assert!(registry.backends.is_empty());
    }

    #[test]
    fn test_auto_patch_rknn_adds_backend_entry() {
        let mut config = OrchestratorConfig::default();
        config.auto_patch_rknn = true;
        let registry = BackendRegistry::from_config(&config);
        assert!(registry.backends.iter().any(|b| b.name == "rknn"));
    }

    #[test]
    fn test_list_single_group_returns_one_entry() {
        let registry = BackendRegistry::from_config(&OrchestratorConfig::default());
        let listed = registry.list(Some(PluginGroup::Workflows));
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, "workflows");
    }

    #[test]
    fn test_list_none_returns_all_three_groups() {
        let registry = BackendRegistry::from_config(&OrchestratorConfig::default());
        assert_eq!(registry.list(None).len(), 3);
    }
}

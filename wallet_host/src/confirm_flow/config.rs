//! Confirmation configuration: merge precedence and runtime clamps.
//!
//! Precedence, strongest first: per-request override, persisted user
//! preference, built-in default. Clamps run after merging and never relax a
//! config (there is no path from requireClick back to autoProceed).

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_AUTO_PROCEED_DELAY_MS;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationUiMode {
    #[serde(rename = "skip")]
    Skip,
    #[serde(rename = "modal")]
    Modal,
    #[serde(rename = "drawer")]
    Drawer,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationBehavior {
    #[serde(rename = "requireClick")]
    RequireClick,
    #[serde(rename = "autoProceed")]
    AutoProceed,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationConfig {
    pub ui_mode: ConfirmationUiMode,
    pub behavior: ConfirmationBehavior,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_proceed_delay: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            ui_mode: ConfirmationUiMode::Modal,
            behavior: ConfirmationBehavior::RequireClick,
            auto_proceed_delay: None,
            theme: Some("dark".to_string()),
        }
    }
}

/// The runtime facts clamps depend on.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeEnvironment {
    /// Mobile / iOS user agents need a real user gesture per ceremony
    pub is_mobile: bool,
    /// The confirmation runs inside the wallet iframe (registration/link
    /// flows: the activating click must land in the iframe)
    pub in_wallet_iframe: bool,
}

/// Kinds of requests the flow distinguishes for clamping purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowClass {
    /// No chain calls; decrypt suppresses UI entirely
    LocalDecrypt,
    /// No chain calls; a viewer stays mounted (sticky)
    LocalExport,
    Registration,
    LinkDevice,
    Signing,
}

/// Merge override → stored preference → default.
pub fn merge_confirmation_config(
    request_override: Option<&ConfirmationConfig>,
    stored_preference: Option<&ConfirmationConfig>,
) -> ConfirmationConfig {
    request_override
        .or(stored_preference)
        .cloned()
        .unwrap_or_default()
}

/// Normalize the merged config, then apply the runtime clamps:
/// - decrypt flows force uiMode = skip (nothing to show)
/// - mobile promotes behavior to requireClick and upgrades skip to modal
/// - wallet-iframe registration/link flows always use modal + requireClick
pub fn apply_runtime_clamps(
    config: ConfirmationConfig,
    class: FlowClass,
    env: RuntimeEnvironment,
) -> ConfirmationConfig {
    let mut cfg = normalize(config);

    match class {
        FlowClass::LocalDecrypt => {
            cfg.ui_mode = ConfirmationUiMode::Skip;
            cfg.behavior = ConfirmationBehavior::AutoProceed;
            cfg.auto_proceed_delay = Some(0);
            return cfg;
        }
        FlowClass::Registration | FlowClass::LinkDevice if env.in_wallet_iframe => {
            cfg.ui_mode = ConfirmationUiMode::Modal;
            cfg.behavior = ConfirmationBehavior::RequireClick;
            cfg.auto_proceed_delay = None;
        }
        _ => {}
    }

    if env.is_mobile {
        if cfg.ui_mode == ConfirmationUiMode::Skip {
            cfg.ui_mode = ConfirmationUiMode::Modal;
        }
        cfg.behavior = ConfirmationBehavior::RequireClick;
        cfg.auto_proceed_delay = None;
    }

    cfg
}

/// Consistency rules independent of runtime:
/// - skip ignores behavior and delay
/// - requireClick ignores any delay
/// - autoProceed without a delay gets the default
fn normalize(mut cfg: ConfirmationConfig) -> ConfirmationConfig {
    match cfg.ui_mode {
        ConfirmationUiMode::Skip => {
            cfg.behavior = ConfirmationBehavior::AutoProceed;
            cfg.auto_proceed_delay = Some(0);
        }
        ConfirmationUiMode::Modal | ConfirmationUiMode::Drawer => match cfg.behavior {
            ConfirmationBehavior::RequireClick => {
                cfg.auto_proceed_delay = None;
            }
            ConfirmationBehavior::AutoProceed => {
                if cfg.auto_proceed_delay.is_none() {
                    cfg.auto_proceed_delay = Some(DEFAULT_AUTO_PROCEED_DELAY_MS);
                }
            }
        },
    }
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_AUTO_PROCEED_DELAY_MS;

    fn cfg(ui_mode: ConfirmationUiMode, behavior: ConfirmationBehavior) -> ConfirmationConfig {
        ConfirmationConfig {
            ui_mode,
            behavior,
            auto_proceed_delay: None,
            theme: None,
        }
    }

    #[test]
    fn override_beats_stored_preference() {
        let request = cfg(ConfirmationUiMode::Drawer, ConfirmationBehavior::AutoProceed);
        let stored = cfg(ConfirmationUiMode::Modal, ConfirmationBehavior::RequireClick);
        let merged = merge_confirmation_config(Some(&request), Some(&stored));
        assert_eq!(merged.ui_mode, ConfirmationUiMode::Drawer);
    }

    #[test]
    fn stored_preference_beats_default() {
        let stored = cfg(ConfirmationUiMode::Drawer, ConfirmationBehavior::AutoProceed);
        let merged = merge_confirmation_config(None, Some(&stored));
        assert_eq!(merged.ui_mode, ConfirmationUiMode::Drawer);

        let merged = merge_confirmation_config(None, None);
        assert_eq!(merged, ConfirmationConfig::default());
    }

    #[test]
    fn decrypt_forces_skip() {
        let loud = cfg(ConfirmationUiMode::Modal, ConfirmationBehavior::RequireClick);
        let clamped = apply_runtime_clamps(loud, FlowClass::LocalDecrypt, RuntimeEnvironment::default());
        assert_eq!(clamped.ui_mode, ConfirmationUiMode::Skip);
    }

    #[test]
    fn mobile_promotes_to_visible_require_click() {
        let silent = cfg(ConfirmationUiMode::Skip, ConfirmationBehavior::AutoProceed);
        let env = RuntimeEnvironment {
            is_mobile: true,
            in_wallet_iframe: false,
        };
        let clamped = apply_runtime_clamps(silent, FlowClass::Signing, env);
        assert_eq!(clamped.ui_mode, ConfirmationUiMode::Modal);
        assert_eq!(clamped.behavior, ConfirmationBehavior::RequireClick);
        assert_eq!(clamped.auto_proceed_delay, None);
    }

    #[test]
    fn iframe_registration_requires_modal_click() {
        let silent = cfg(ConfirmationUiMode::Skip, ConfirmationBehavior::AutoProceed);
        let env = RuntimeEnvironment {
            is_mobile: false,
            in_wallet_iframe: true,
        };
        let clamped = apply_runtime_clamps(silent, FlowClass::Registration, env);
        assert_eq!(clamped.ui_mode, ConfirmationUiMode::Modal);
        assert_eq!(clamped.behavior, ConfirmationBehavior::RequireClick);
    }

    #[test]
    fn auto_proceed_gets_a_default_delay() {
        let auto = cfg(ConfirmationUiMode::Drawer, ConfirmationBehavior::AutoProceed);
        let clamped = apply_runtime_clamps(auto, FlowClass::Signing, RuntimeEnvironment::default());
        assert_eq!(clamped.auto_proceed_delay, Some(DEFAULT_AUTO_PROCEED_DELAY_MS));
    }

    #[test]
    fn require_click_drops_stray_delay() {
        let mut config = cfg(ConfirmationUiMode::Modal, ConfirmationBehavior::RequireClick);
        config.auto_proceed_delay = Some(5000);
        let clamped = apply_runtime_clamps(config, FlowClass::Signing, RuntimeEnvironment::default());
        assert_eq!(clamped.auto_proceed_delay, None);
    }
}

// ── User policy settings ──
//
// Mutated only through engine commands -- there is no ambient settings
// object. The engine reads them, the presentation layer renders them.

use lifeline_bridge::ProfileReference;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// User-controlled policy flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySettings {
    /// Permit the engine to switch to backup without user action.
    pub auto_activation_enabled: bool,
    /// Master switch for the backup feature.
    pub backup_feature_enabled: bool,
    /// Whether the user holds an active subscription.
    pub is_subscribed: bool,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            auto_activation_enabled: false,
            backup_feature_enabled: true,
            is_subscribed: false,
        }
    }
}

/// What the presentation layer hands in on subscribe.
///
/// The payment token is secret material: it never appears in `Debug`
/// output or logs.
#[derive(Debug, Clone)]
pub struct SubscriberInfo {
    pub email: String,
    /// Activation address of the backup profile assigned to this account.
    pub esim_profile: ProfileReference,
    pub payment_token: SecretString,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_first_launch() {
        let settings = PolicySettings::default();
        assert!(!settings.auto_activation_enabled);
        assert!(settings.backup_feature_enabled);
        assert!(!settings.is_subscribed);
    }

    #[test]
    fn payment_token_is_redacted_in_debug_output() {
        let info = SubscriberInfo {
            email: "user@example.com".into(),
            esim_profile: "https://smdp.example.com/p/1"
                .parse()
                .expect("valid profile url"),
            payment_token: SecretString::from("tok_live_1234".to_owned()),
        };
        let rendered = format!("{info:?}");
        assert!(!rendered.contains("tok_live_1234"));
    }
}

use serde::Deserialize;

/// Switches recognised by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContractOptions {
    /// Route every fetch through the mock channel.
    pub mock_state: bool,
    /// Require a listener to settle mock calls instead of replaying the first record.
    pub mock_flow: bool,
    /// Reject unknown fields during validation.
    pub strict: bool,
    /// Bypass the response cache.
    pub no_cache: bool,
}

impl Default for ContractOptions {
    fn default() -> Self {
        Self {
            mock_state: false,
            mock_flow: false,
            strict: true,
            no_cache: false,
        }
    }
}

impl From<&crate::config::ContractSettings> for ContractOptions {
    fn from(settings: &crate::config::ContractSettings) -> Self {
        Self {
            mock_state: settings.mock_state,
            mock_flow: settings.mock_flow,
            strict: settings.strict,
            no_cache: settings.no_cache,
        }
    }
}

//! Environment variable overrides for backend credentials.

use crate::schema::PotluckConfig;
use tracing::debug;

pub const ENV_URL: &str = "POTLUCK_SUPABASE_URL";
pub const ENV_ANON_KEY: &str = "POTLUCK_SUPABASE_ANON_KEY";
pub const ENV_ACCESS_TOKEN: &str = "POTLUCK_ACCESS_TOKEN";

/// Overlay backend settings from the process environment.
pub fn apply_env_overrides(config: &mut PotluckConfig) {
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

pub(crate) fn apply_overrides_from<F>(config: &mut PotluckConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = non_empty(ENV_URL) {
        debug!("backend.url overridden from {ENV_URL}");
        config.backend.url = url.trim_end_matches('/').to_string();
    }
    if let Some(key) = non_empty(ENV_ANON_KEY) {
        debug!("backend.anon_key overridden from {ENV_ANON_KEY}");
        config.backend.anon_key = key;
    }
    if let Some(token) = non_empty(ENV_ACCESS_TOKEN) {
        debug!("backend.access_token overridden from {ENV_ACCESS_TOKEN}");
        config.backend.access_token = Some(token);
    }
}

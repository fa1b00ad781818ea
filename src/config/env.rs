use super::{parse_duration, AppConfig};
use std::str::FromStr;
use tracing::warn;

/// Override file/default settings from process environment variables.
///
/// Unparseable values are logged and ignored so a typo never takes the service down.
pub fn apply_env_overrides(config: &mut AppConfig) {
    apply_overrides(config, |key| std::env::var(key).ok());
}

/// Apply overrides using `lookup` to resolve variable names.
pub fn apply_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    override_parsed(&lookup, "APP_PORT", &mut config.server.port);
    override_parsed(&lookup, "RATE_LIMITER_ENABLED", &mut config.rate_limit.enabled);
    override_parsed(&lookup, "RATE_LIMITER_RPS", &mut config.rate_limit.rps);
    override_parsed(&lookup, "RATE_LIMITER_BURST", &mut config.rate_limit.burst);

    if let Some(raw) = lookup("RATE_LIMITER_TTL") {
        match parse_duration(&raw) {
            Ok(d) => config.rate_limit.eviction_interval = d,
            Err(e) => warn!(
                var = "RATE_LIMITER_TTL",
                value = %raw,
                error = %e,
                "Ignoring invalid environment override"
            ),
        }
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => *target = v,
        Err(_) => warn!(var = key, value = %raw, "Ignoring invalid environment override"),
    }
}

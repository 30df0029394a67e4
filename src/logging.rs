//! Environment-aware tracing subscriber.

use tracing::Level;

use crate::config::AppEnv;

/// Formatting choices for one environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogProfile {
    pub level: Level,
    pub ansi: bool,
    pub show_target: bool,
}

impl LogProfile {
    pub fn for_env(env: AppEnv) -> Self {
        match env {
            AppEnv::Development => Self {
                level: Level::DEBUG,
                ansi: true,
                show_target: true,
            },
            AppEnv::Staging => Self {
                level: Level::INFO,
                ansi: false,
                show_target: true,
            },
            AppEnv::Production => Self {
                level: Level::INFO,
                ansi: false,
                show_target: false,
            },
        }
    }
}

/// Install the global fmt subscriber for `env`.
///
/// Fails if a global subscriber is already set.
pub fn init_tracing(env: AppEnv) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let profile = LogProfile::for_env(env);
    tracing_subscriber::fmt()
        .with_max_level(profile.level)
        .with_ansi(profile.ansi)
        .with_target(profile.show_target)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles() {
        let dev = LogProfile::for_env(AppEnv::Development);
        assert_eq!(dev.level, Level::DEBUG);
        assert!(dev.ansi);

        let staging = LogProfile::for_env(AppEnv::Staging);
        assert_eq!(staging.level, Level::INFO);
        assert!(!staging.ansi);
        assert!(staging.show_target);

        let prod = LogProfile::for_env(AppEnv::Production);
        assert_eq!(prod.level, Level::INFO);
        assert!(!prod.show_target);
    }
}

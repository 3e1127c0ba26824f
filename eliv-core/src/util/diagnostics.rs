use std::env;
use std::sync::OnceLock;

/// Verbosity level from `ELIV_VERBOSE` (0 = quiet, 1 = summaries, 2 = iteration tables).
pub fn verbosity() -> u8 {
    static LEVEL: OnceLock<u8> = OnceLock::new();
    *LEVEL.get_or_init(|| {
        env::var("ELIV_VERBOSE")
            .ok()
            .and_then(|v| v.parse::<u8>().ok())
            .unwrap_or(0)
    })
}

/// Process-wide diagnostics settings, read from the environment once.
pub fn diagnostics_config() -> &'static DiagnosticsConfig {
    static CONFIG: OnceLock<DiagnosticsConfig> = OnceLock::new();
    CONFIG.get_or_init(DiagnosticsConfig::from_env)
}

#[derive(Debug, Clone)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    pub every: usize,
}

impl DiagnosticsConfig {
    pub fn from_env() -> Self {
        let enabled = match env::var("ELIV_DIAGNOSTICS") {
            Ok(v) => v != "0" && v.to_lowercase() != "false",
            Err(_) => verbosity() >= 2,
        };

        let every = env::var("ELIV_DIAGNOSTICS_EVERY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(1);

        Self { enabled, every }
    }

    #[inline]
    pub fn should_log(&self, iter: usize) -> bool {
        self.enabled && (iter % self.every == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_log_respects_stride() {
        let cfg = DiagnosticsConfig { enabled: true, every: 5 };
        assert!(cfg.should_log(0));
        assert!(!cfg.should_log(3));
        assert!(cfg.should_log(10));

        let off = DiagnosticsConfig { enabled: false, every: 1 };
        assert!(!off.should_log(0));
    }

    #[test]
    fn test_diagnostics_cached() {
        assert!(std::ptr::eq(diagnostics_config(), diagnostics_config()));
        assert!(diagnostics_config().every >= 1);
    }
}

use tracing_subscriber::{fmt, EnvFilter};

use crate::{errors::Error, Result};

/// Initialize tracing for the bridge.
///
/// `RUST_LOG` wins when set; otherwise the filter comes from the `log-level`
/// configuration key (Python-style names: `DEBUG`, `INFO`, `WARNING`, ...).
pub fn init(service_name: &str, log_level: Option<&str>) -> Result<()> {
    let level = level_directive(log_level.unwrap_or("INFO"));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,gwt={level},gwt_core={level},gwt_telegram={level},{service_name}={level}"
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init()
        .map_err(|e| Error::External(format!("logging init failed: {e}")))
}

/// Map a configured level name to a tracing directive. Unknown names fall
/// back to `info`.
pub fn level_directive(level: &str) -> &'static str {
    match level.trim().to_ascii_uppercase().as_str() {
        "TRACE" | "NOTSET" => "trace",
        "DEBUG" => "debug",
        "WARN" | "WARNING" => "warn",
        "ERROR" | "CRITICAL" | "FATAL" => "error",
        _ => "info",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_python_level_names() {
        assert_eq!(level_directive("DEBUG"), "debug");
        assert_eq!(level_directive("warning"), "warn");
        assert_eq!(level_directive("CRITICAL"), "error");
        assert_eq!(level_directive(" Info "), "info");
        assert_eq!(level_directive("verbose"), "info");
    }
}

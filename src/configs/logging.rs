use serde::{Deserialize, Serialize};

/// `[logging]` section. `RUST_LOG` overrides both fields when set.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct LoggingConfig {
    /// Base level for every target.
    pub level: Option<String>,
    /// Extra comma-separated directives, e.g. `audiohost::server=debug`.
    pub filters: Option<String>,
}

impl LoggingConfig {
    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or("info")
    }

    /// Extra directives, `None` when blank.
    pub fn filters(&self) -> Option<&str> {
        self.filters.as_deref().map(str::trim).filter(|f| !f.is_empty())
    }
}

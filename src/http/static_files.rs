//! Static single-page-app serving.
//!
//! Files come from the configured asset root. Paths that do not resolve to a
//! file get the index document instead, so client-side routes survive a
//! reload.

use tower_http::services::{ServeDir, ServeFile};

use crate::config::StaticFilesConfig;

/// Service for the router fallback, or `None` when no asset root is configured.
pub fn spa_service(config: &StaticFilesConfig) -> Option<ServeDir<ServeFile>> {
    let root = config.root.as_ref()?;
    let index = root.join(&config.index);
    Some(ServeDir::new(root).fallback(ServeFile::new(index)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_without_root() {
        assert!(spa_service(&StaticFilesConfig::default()).is_none());
    }
}

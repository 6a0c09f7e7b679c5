//! Namespaced cache key generation

/// Default namespace prefix for every generated key
pub const DEFAULT_PREFIX: &str = "persona-council";

/// Builds namespaced cache keys so independent owners never collide
#[derive(Debug, Clone)]
pub struct CacheKeys {
    prefix: String,
}

impl CacheKeys {
    /// Create a generator with a custom namespace
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn persona(&self, id: &str) -> String {
        format!("{}:persona:{}", self.prefix, id)
    }

    pub fn config(&self, id: &str) -> String {
        format!("{}:config:{}", self.prefix, id)
    }

    pub fn collaboration(&self, session_id: &str) -> String {
        format!("{}:collaboration:{}", self.prefix, session_id)
    }

    pub fn user_configs(&self, user: &str) -> String {
        format!("{}:user_configs:{}", self.prefix, user)
    }

    /// Free-form key built from arbitrary segments
    pub fn custom(&self, parts: &[&str]) -> String {
        let mut key = self.prefix.clone();
        for part in parts {
            key.push(':');
            key.push_str(part);
        }
        key
    }
}

impl Default for CacheKeys {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

//! Per-deployment namespace for remote topics

/// Prepends the configured private path to remote topics
///
/// Computed once at startup and shared read-only by every bridge. An empty
/// prefix leaves topics untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrivatePathExtractor {
    prefix: String,
}

impl PrivatePathExtractor {
    pub fn new<S: Into<String>>(prefix: S) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Fully-qualified remote topic
    pub fn extract(&self, topic: &str) -> String {
        if self.prefix.is_empty() {
            return topic.to_string();
        }
        format!("{}{}", self.prefix, topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_prefix_is_identity() {
        let extractor = PrivatePathExtractor::default();
        assert_eq!(extractor.extract("ping"), "ping");
        assert_eq!(extractor.extract("/a/b"), "/a/b");
    }

    #[test]
    fn test_prefix_is_concatenated() {
        let extractor = PrivatePathExtractor::new("device/001");
        assert_eq!(extractor.extract("/ping"), "device/001/ping");
        assert_eq!(extractor.extract("ping"), "device/001ping");
    }
}

//! Feed configuration

/// Default maximum chunk size handed out by a single read (32KB)
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 32 * 1024;

/// How much of the feed is kept for cursors that are behind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Keep everything any attached cursor has not read yet
    Unbounded,
    /// Keep at most `max_bytes`; cursors behind the window fail with `Lagged`
    Bounded { max_bytes: usize },
}

/// Configuration for a feed
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Upper bound on the bytes returned by one cursor read
    pub max_chunk_size: usize,

    /// Retention policy for unread bytes
    pub retention: Retention,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            retention: Retention::Unbounded,
        }
    }
}

impl FeedConfig {
    /// Set the maximum chunk size (at least one byte)
    pub fn max_chunk_size(mut self, size: usize) -> Self {
        self.max_chunk_size = size.max(1);
        self
    }

    /// Cap retained bytes; slow cursors past the cap are failed
    pub fn max_retained_bytes(mut self, max_bytes: usize) -> Self {
        self.retention = Retention::Bounded { max_bytes };
        self
    }

    /// Keep unread bytes for as long as a cursor needs them
    pub fn unbounded(mut self) -> Self {
        self.retention = Retention::Unbounded;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FeedConfig::default();

        assert_eq!(config.max_chunk_size, DEFAULT_MAX_CHUNK_SIZE);
        assert_eq!(config.retention, Retention::Unbounded);
    }

    #[test]
    fn test_max_chunk_size_floor() {
        let config = FeedConfig::default().max_chunk_size(0);

        assert_eq!(config.max_chunk_size, 1);
    }

    #[test]
    fn test_retention_builders() {
        let config = FeedConfig::default().max_retained_bytes(1024);
        assert_eq!(config.retention, Retention::Bounded { max_bytes: 1024 });

        let config = config.unbounded();
        assert_eq!(config.retention, Retention::Unbounded);
    }
}

use std::time::Duration;

/// How long an ordinary command may take to be acknowledged.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// Link tests wait for an acoustic round trip, which can take many seconds.
pub const DEFAULT_LINK_TEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkConfig {
    pub port: String,
    pub baud: u32,
    pub reply_timeout: Duration,
    pub link_test_timeout: Duration,
}

impl LinkConfig {
    pub fn new(port: impl Into<String>, baud: u32) -> Self {
        Self {
            port: port.into(),
            baud,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            link_test_timeout: DEFAULT_LINK_TEST_TIMEOUT,
        }
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn with_link_test_timeout(mut self, timeout: Duration) -> Self {
        self.link_test_timeout = timeout;
        self
    }
}

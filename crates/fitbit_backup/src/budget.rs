/// Fitbit allows 150 requests per user per hour.
pub const DEFAULT_REQUEST_CEILING: u32 = 150;

/// Run-scoped count of API requests issued.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestBudget {
    used: u32,
    ceiling: u32,
}

impl Default for RequestBudget {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_CEILING)
    }
}

impl RequestBudget {
    pub fn new(ceiling: u32) -> Self {
        Self { used: 0, ceiling }
    }

    pub fn record(&mut self, requests: u32) {
        self.used = self.used.saturating_add(requests);
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn remaining(&self) -> u32 {
        self.ceiling.saturating_sub(self.used)
    }

    pub fn can_afford(&self, requests: u32) -> bool {
        self.remaining() >= requests
    }
}

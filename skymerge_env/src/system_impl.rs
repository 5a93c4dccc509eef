//! Production implementation of FusionContext using the system clock.

use crate::FusionContext;
use std::sync::Arc;
use std::time::SystemTime;

/// Production context backed by the operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemContext;

impl SystemContext {
    /// Creates a new SystemContext.
    pub fn new() -> Self {
        Self
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl FusionContext for SystemContext {
    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_context_is_after_2024() {
        let ctx = SystemContext::new();
        // 2024-01-01 00:00:00 UTC
        assert!(ctx.unix_now() > 1_704_067_200.0);
    }

    #[test]
    fn test_system_context_monotone_enough() {
        let ctx = SystemContext::new();
        let t1 = ctx.unix_now();
        let t2 = ctx.unix_now();
        assert!(t2 >= t1);
    }
}

//! Pool configuration.

use crate::error::{Error, Result};
use crate::memory::defaults;
use crate::observability::TracingConfig;

/// What to do when a peer or kernel call fails in the middle of buffer
/// creation or a scroll.
///
/// Both situations leave no drawable surface behind (or a surface whose
/// content is half-migrated), so the default mirrors a single-window client:
/// log and abort. Long-lived services can opt into `Propagate`, in which case
/// the affected entry is destroyed and the error is returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failure and abort the process.
    #[default]
    Abort,
    /// Destroy the affected entry and return the error to the caller.
    Propagate,
}

/// Configuration for a [`BufferPool`](crate::pool::BufferPool).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Upper bound for `offset + size` inside any backing file.
    pub max_pool_size: usize,
    /// Debug name given to every backing memfd (visible in `/proc/self/fd/`).
    pub backing_name: String,
    /// Behaviour on allocation or mid-scroll failure.
    pub failure_policy: FailurePolicy,
    /// Operator switch; when false, scrolling is reported unsupported even if
    /// the kernel can punch holes.
    pub allow_scrolling: bool,
    /// Which operations get their own tracing span.
    pub tracing: TracingConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_pool_size: defaults::MAX_POOL_SIZE,
            backing_name: defaults::BACKING_NAME.to_string(),
            failure_policy: FailurePolicy::Abort,
            allow_scrolling: true,
            tracing: TracingConfig::default(),
        }
    }
}

impl PoolConfig {
    /// Set the maximum pool size bound.
    pub fn with_max_pool_size(mut self, max_pool_size: usize) -> Self {
        self.max_pool_size = max_pool_size;
        self
    }

    /// Set the memfd debug name.
    pub fn with_backing_name(mut self, name: impl Into<String>) -> Self {
        self.backing_name = name.into();
        self
    }

    /// Set the failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Enable or disable scrolling.
    pub fn with_scrolling(mut self, allow: bool) -> Self {
        self.allow_scrolling = allow;
        self
    }

    /// Set the tracing span selection.
    pub fn with_tracing(mut self, tracing: TracingConfig) -> Self {
        self.tracing = tracing;
        self
    }

    /// Check the configuration for values the pool cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_pool_size == 0 {
            return Err(Error::InvalidGeometry(
                "max_pool_size must be greater than 0".into(),
            ));
        }

        // Pool descriptor lengths travel as a signed 32-bit value.
        if self.max_pool_size > i32::MAX as usize {
            return Err(Error::InvalidGeometry(format!(
                "max_pool_size {} exceeds {}",
                self.max_pool_size,
                i32::MAX
            )));
        }

        if self.backing_name.as_bytes().contains(&0) {
            return Err(Error::InvalidGeometry(
                "backing_name must not contain NUL bytes".into(),
            ));
        }

        Ok(())
    }
}

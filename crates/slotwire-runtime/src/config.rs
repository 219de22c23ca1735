//! Forwarder configuration.
//!
//! # Environment
//!
//! | Variable                           | Effect                              |
//! |------------------------------------|-------------------------------------|
//! | `SLOTWIRE_MAX_BINDINGS_PER_PROXY`  | positive integer; per-proxy capacity |
//! | `SLOTWIRE_PROXY_POLICY`            | `shared` or `per-sender`            |
//!
//! Unparseable values are ignored with a warning and the default is kept.

use tracing::warn;

/// How the free `connect*` functions pick a proxy for a sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyPolicy {
    /// Route bindings to a small pool of shared proxies, opening a new pool
    /// member once the newest is at capacity.
    #[default]
    SharedPool,
    /// One proxy per sender, created on first bind and released when the
    /// sender is destroyed.
    PerSender,
}

/// Limits and policy for [`SignalForwarder`](crate::SignalForwarder)s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwarderConfig {
    /// Signal bindings one proxy accepts before `bind` fails.
    ///
    /// Only bindings made by callers count; the internal destruction
    /// subscriptions do not.
    pub max_bindings_per_proxy: usize,
    /// First slot id used for bindings. Ids below it are reserved for the
    /// proxy's own slots.
    pub binding_slot_base: u32,
    pub policy: ProxyPolicy,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            max_bindings_per_proxy: 10_000,
            binding_slot_base: 1000,
            policy: ProxyPolicy::SharedPool,
        }
    }
}

impl ForwarderConfig {
    /// Capacity per proxy; at least one.
    #[must_use]
    pub fn with_max_bindings(mut self, max: usize) -> Self {
        self.max_bindings_per_proxy = max.max(1);
        self
    }

    #[must_use]
    pub fn with_slot_base(mut self, base: u32) -> Self {
        self.binding_slot_base = base.max(crate::forwarder::RESERVED_SLOTS);
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ProxyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The same configuration with capacity and slot base pulled into
    /// their valid ranges.
    ///
    /// Forwarders and the proxy registry only ever store normalized
    /// configurations, so a struct literal cannot hand out reserved slots
    /// or a capacity of zero.
    #[must_use]
    pub fn normalized(self) -> Self {
        let normalized = Self {
            max_bindings_per_proxy: self.max_bindings_per_proxy.max(1),
            binding_slot_base: self
                .binding_slot_base
                .max(crate::forwarder::RESERVED_SLOTS),
            policy: self.policy,
        };
        if normalized != self {
            warn!(requested = ?self, using = ?normalized, "forwarder config out of range");
        }
        normalized
    }

    /// Defaults overridden from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Defaults overridden through a custom environment lookup.
    #[must_use]
    pub fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = get_env("SLOTWIRE_MAX_BINDINGS_PER_PROXY") {
            match raw.trim().parse::<usize>() {
                Ok(max) if max > 0 => config.max_bindings_per_proxy = max,
                _ => warn!(value = %raw, "ignoring invalid SLOTWIRE_MAX_BINDINGS_PER_PROXY"),
            }
        }
        if let Some(raw) = get_env("SLOTWIRE_PROXY_POLICY") {
            match raw.trim().to_ascii_lowercase().as_str() {
                "shared" | "shared-pool" | "pool" => config.policy = ProxyPolicy::SharedPool,
                "per-sender" | "sender" => config.policy = ProxyPolicy::PerSender,
                _ => warn!(value = %raw, "ignoring invalid SLOTWIRE_PROXY_POLICY"),
            }
        }
        config
    }
}

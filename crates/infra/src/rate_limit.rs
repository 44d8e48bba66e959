//! Named rate limit policies for inbound storefront traffic
//!
//! Route handlers call [`RateLimitPolicy::check`] before doing work and
//! [`RateLimitPolicy::complete`] afterwards. A limited request gets the
//! delay to report in a `Retry-After` response header.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use shopfront_common::resilience::{
    Clock, NamespacedLimiter, Sweepable, SystemClock, WindowedRateLimiter,
};
use shopfront_domain::{Environment, GatewayError, RateLimitOverrides, RateLimitSettings};
use tracing::{debug, info, warn};

/// What a key generator sees of an inbound request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub client_ip: String,
    pub path: String,
    pub user_id: Option<String>,
}

impl RequestContext {
    pub fn from_ip(client_ip: impl Into<String>) -> Self {
        Self { client_ip: client_ip.into(), ..Self::default() }
    }
}

/// Derives the rate limit key for a request
pub type KeyGenerator = Arc<dyn Fn(&RequestContext) -> String + Send + Sync>;

/// Outcome of [`RateLimitPolicy::check`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Proceed; pass `key` back to [`RateLimitPolicy::complete`]
    Allowed { key: String },
    /// Reject; the client may try again after `retry_after`
    Limited { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// One named quota with its own keyspace
#[derive(Clone)]
pub struct RateLimitPolicy<C: Clock = SystemClock> {
    settings: RateLimitSettings,
    limiter: NamespacedLimiter<C>,
    key_generator: KeyGenerator,
}

impl<C: Clock> RateLimitPolicy<C> {
    /// Policy keyed by client IP
    pub fn new(name: &str, settings: RateLimitSettings, limiter: WindowedRateLimiter<C>) -> Self {
        Self {
            settings,
            limiter: NamespacedLimiter::new(name, limiter),
            key_generator: Arc::new(|ctx: &RequestContext| ctx.client_ip.clone()),
        }
    }

    /// Replace the key generator
    #[must_use]
    pub fn with_key_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&RequestContext) -> String + Send + Sync + 'static,
    {
        self.key_generator = Arc::new(generator);
        self
    }

    pub fn name(&self) -> &str {
        self.limiter.namespace()
    }

    pub fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }

    /// Count this request against its key and decide whether it may proceed
    pub fn check(&self, ctx: &RequestContext) -> RateLimitDecision {
        let key = (self.key_generator)(ctx);
        let window = self.settings.window();

        if self.limiter.is_allowed(&key, self.settings.max_requests, window) {
            RateLimitDecision::Allowed { key }
        } else {
            let retry_after = self.limiter.time_until_reset(&key, window);
            debug!(policy = self.name(), key, ?retry_after, "Inbound request rate limited");
            RateLimitDecision::Limited { retry_after }
        }
    }

    /// Report how an allowed request ended.
    ///
    /// With `skip_successful_requests` set, a success gives its slot back.
    pub fn complete(&self, key: &str, succeeded: bool) {
        if self.settings.skip_successful_requests && succeeded {
            self.limiter.release(key);
        }
    }

    /// Requests `key` may still make in the current window
    pub fn remaining(&self, key: &str) -> u32 {
        self.limiter.remaining(key, self.settings.max_requests, self.settings.window())
    }

    fn backing(&self) -> &WindowedRateLimiter<C> {
        self.limiter.limiter()
    }
}

impl<C: Clock> fmt::Debug for RateLimitPolicy<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitPolicy")
            .field("name", &self.name())
            .field("settings", &self.settings)
            .finish()
    }
}

/// The storefront's named policies, each on its own limiter
#[derive(Debug, Clone)]
pub struct RateLimitRegistry<C: Clock = SystemClock> {
    pub auth: RateLimitPolicy<C>,
    pub search: RateLimitPolicy<C>,
    pub api: RateLimitPolicy<C>,
    pub otp: RateLimitPolicy<C>,
}

impl RateLimitRegistry<SystemClock> {
    pub fn new(overrides: &RateLimitOverrides) -> Self {
        Self::with_clock(overrides, SystemClock)
    }
}

impl<C: Clock + Clone> RateLimitRegistry<C> {
    /// Registry whose limiters all read `clock`
    pub fn with_clock(overrides: &RateLimitOverrides, clock: C) -> Self {
        let policy = |name: &str, configured: Option<RateLimitSettings>, preset| {
            RateLimitPolicy::new(
                name,
                configured.unwrap_or(preset),
                WindowedRateLimiter::with_clock(clock.clone()),
            )
        };

        Self {
            auth: policy("auth", overrides.auth, RateLimitSettings::auth()),
            search: policy("search", overrides.search, RateLimitSettings::search()),
            api: policy("api", overrides.api, RateLimitSettings::api()),
            otp: policy("otp", overrides.otp, RateLimitSettings::otp()),
        }
    }
}

impl<C: Clock> RateLimitRegistry<C> {
    /// Look a policy up by name
    pub fn get(&self, name: &str) -> Option<&RateLimitPolicy<C>> {
        match name {
            "auth" => Some(&self.auth),
            "search" => Some(&self.search),
            "api" => Some(&self.api),
            "otp" => Some(&self.otp),
            _ => None,
        }
    }

    fn policies(&self) -> [&RateLimitPolicy<C>; 4] {
        [&self.auth, &self.search, &self.api, &self.otp]
    }

    /// Sweep targets for the background task
    pub fn sweep_targets(&self) -> Vec<Arc<dyn Sweepable>> {
        self.policies()
            .into_iter()
            .map(|policy| Arc::new(policy.backing().clone()) as Arc<dyn Sweepable>)
            .collect()
    }

    /// Drop all inbound rate limit state. Refused in production.
    pub fn reset(&self, environment: Environment) -> Result<(), GatewayError> {
        if environment.is_production() {
            warn!("Refusing to reset rate limits in production");
            return Err(GatewayError::Forbidden(
                "rate limit reset is disabled in production".into(),
            ));
        }

        for policy in self.policies() {
            policy.backing().clear_all();
        }
        info!(%environment, "Rate limits reset");
        Ok(())
    }
}

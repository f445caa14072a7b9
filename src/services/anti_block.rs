use std::sync::Mutex;
use std::time::Duration;

use fake_user_agent::get_rua;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::domain::{IdentityPool, ProxyEndpoint, ProxyPool};
use crate::error::ConfigurationError;

/// Post-fetch classification of a rendered page. Derived per fetch,
/// never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSignal {
    Clean,
    CaptchaDetected,
    RateLimited,
    LayoutUnrecognized,
}

// Markers are matched against the lowercased document.
const CAPTCHA_MARKERS: &[&str] = &[
    "id=\"captcha-form\"",
    "g-recaptcha",
    "recaptcha/api",
    "unusual traffic from your computer network",
    "our systems have detected unusual traffic",
    "/sorry/index",
];

const RATE_LIMIT_MARKERS: &[&str] = &[
    "error 429",
    "too many requests",
];

// Anything we know how to read, including the legitimate empty-results page.
const KNOWN_LAYOUT_MARKERS: &[&str] = &[
    "did not match any documents",
    "id=\"search\"",
    "class=\"g\"",
    "tf2cxc",
    "mjjyud",
    "vkpgbb",
    "rllt__details",
    "<h3",
];

/// Delay jitter, identity/proxy rotation and block detection, kept out of
/// the orchestrator. Pools are immutable after construction; the policy is
/// shared across workers behind an Arc.
pub struct AntiBlockPolicy {
    identities: IdentityPool,
    proxies: ProxyPool,
    delay_range_ms: (u64, u64),
    rng: Mutex<StdRng>,
    last_proxy: Mutex<Option<String>>,
}

impl AntiBlockPolicy {
    pub fn new(
        identities: IdentityPool,
        proxies: ProxyPool,
        delay_range_ms: (u64, u64),
    ) -> Result<Self, ConfigurationError> {
        Self::build(identities, proxies, delay_range_ms, StdRng::from_entropy())
    }

    /// Deterministic variant for tests.
    pub fn with_seed(
        identities: IdentityPool,
        proxies: ProxyPool,
        delay_range_ms: (u64, u64),
        seed: u64,
    ) -> Result<Self, ConfigurationError> {
        Self::build(
            identities,
            proxies,
            delay_range_ms,
            StdRng::seed_from_u64(seed),
        )
    }

    fn build(
        identities: IdentityPool,
        proxies: ProxyPool,
        delay_range_ms: (u64, u64),
        rng: StdRng,
    ) -> Result<Self, ConfigurationError> {
        let (min, max) = delay_range_ms;
        if min > max {
            return Err(ConfigurationError(format!(
                "delay range is inverted: {}ms > {}ms",
                min, max
            )));
        }

        Ok(AntiBlockPolicy {
            identities,
            proxies,
            delay_range_ms,
            rng: Mutex::new(rng),
            last_proxy: Mutex::new(None),
        })
    }

    /// Jittered wait applied before every fetch attempt, the first included.
    pub fn next_delay(&self) -> Duration {
        let (min, max) = self.delay_range_ms;
        let ms = self.rng.lock().unwrap().gen_range(min..=max);
        Duration::from_millis(ms)
    }

    pub fn select_identity(&self) -> String {
        if self.identities.uses_builtin() {
            return get_rua().to_string();
        }

        self.identities
            .agents()
            .choose(&mut *self.rng.lock().unwrap())
            .cloned()
            .unwrap()
    }

    /// Uniform random draw, except an immediate repeat of the previous
    /// endpoint is redrawn among the others when the pool has more than one
    /// entry. Returns None when proxying is disabled.
    pub fn select_proxy(&self) -> Option<ProxyEndpoint> {
        if !self.proxies.enabled() {
            return None;
        }

        let endpoints = self.proxies.endpoints();
        let mut rng = self.rng.lock().unwrap();
        let mut last = self.last_proxy.lock().unwrap();

        let mut pick = endpoints.choose(&mut *rng)?.clone();
        if let Some(prev) = last.as_deref() {
            if prev == pick.url && endpoints.len() > 1 {
                let others: Vec<&ProxyEndpoint> =
                    endpoints.iter().filter(|e| e.url != prev).collect();
                pick = (*others.choose(&mut *rng).unwrap()).clone();
            }
        }

        *last = Some(pick.url.clone());
        Some(pick)
    }

    /// Pure function of the rendered document: no network, no timing.
    pub fn detect_block(&self, html: &str) -> BlockSignal {
        detect_block(html)
    }
}

pub fn detect_block(html: &str) -> BlockSignal {
    let html = html.to_lowercase();

    if CAPTCHA_MARKERS.iter().any(|marker| html.contains(marker)) {
        return BlockSignal::CaptchaDetected;
    }
    if RATE_LIMIT_MARKERS.iter().any(|marker| html.contains(marker)) {
        return BlockSignal::RateLimited;
    }
    if !KNOWN_LAYOUT_MARKERS.iter().any(|marker| html.contains(marker)) {
        return BlockSignal::LayoutUnrecognized;
    }

    BlockSignal::Clean
}

#[cfg(test)]
mod tests {
    use super::{detect_block, AntiBlockPolicy, BlockSignal};
    use crate::domain::{IdentityPool, ProxyPool};

    fn policy_with_proxies(raw: &[&str], seed: u64) -> AntiBlockPolicy {
        let identities =
            IdentityPool::new(vec!["Mozilla/5.0 (X11; Linux x86_64)".to_string()], false).unwrap();
        let proxies =
            ProxyPool::new(raw.iter().map(|p| p.to_string()).collect(), !raw.is_empty()).unwrap();
        AntiBlockPolicy::with_seed(identities, proxies, (2, 5), seed).unwrap()
    }

    #[test]
    fn seeded_delay_stays_within_configured_range() {
        let policy = policy_with_proxies(&[], 42);
        for _ in 0..200 {
            let delay = policy.next_delay();
            assert!(delay.as_millis() >= 2, "delay below range: {:?}", delay);
            assert!(delay.as_millis() <= 5, "delay above range: {:?}", delay);
        }
    }

    #[test]
    fn inverted_delay_range_is_rejected() {
        let identities = IdentityPool::new(vec!["ua".to_string()], false).unwrap();
        let result = AntiBlockPolicy::with_seed(identities, ProxyPool::disabled(), (10, 2), 1);
        assert!(result.is_err());
    }

    #[test]
    fn proxy_never_repeats_immediately_with_two_or_more_entries() {
        let policy = policy_with_proxies(&["10.0.0.1:8080", "10.0.0.2:8080", "10.0.0.3:8080"], 7);

        let mut previous = policy.select_proxy().unwrap().url;
        for _ in 0..500 {
            let current = policy.select_proxy().unwrap().url;
            assert_ne!(current, previous);
            previous = current;
        }
    }

    #[test]
    fn single_proxy_pool_may_repeat() {
        let policy = policy_with_proxies(&["10.0.0.1:8080"], 7);
        let first = policy.select_proxy().unwrap().url;
        let second = policy.select_proxy().unwrap().url;
        assert_eq!(first, second);
    }

    #[test]
    fn proxy_selection_disabled_returns_none() {
        let policy = policy_with_proxies(&[], 7);
        assert!(policy.select_proxy().is_none());
    }

    #[test]
    fn identity_comes_from_configured_pool() {
        let policy = policy_with_proxies(&[], 3);
        assert_eq!(policy.select_identity(), "Mozilla/5.0 (X11; Linux x86_64)");
    }

    #[test]
    fn builtin_identities_produce_non_empty_agent() {
        let identities = IdentityPool::new(vec![], true).unwrap();
        let policy =
            AntiBlockPolicy::with_seed(identities, ProxyPool::disabled(), (2, 5), 1).unwrap();
        assert!(!policy.select_identity().is_empty());
    }

    #[test]
    fn captcha_interstitial_is_detected() {
        let html = r#"<html><body><form id="captcha-form" action="/sorry/index">
            Our systems have detected unusual traffic from your computer network.
        </form></body></html>"#;
        assert_eq!(detect_block(html), BlockSignal::CaptchaDetected);
    }

    #[test]
    fn rate_limit_interstitial_is_detected() {
        let html = "<html><head><title>Error 429 (Too Many Requests)</title></head></html>";
        assert_eq!(detect_block(html), BlockSignal::RateLimited);
    }

    #[test]
    fn results_page_is_clean() {
        let html = r#"<div id="search"><div class="g"><h3>A result</h3></div></div>"#;
        assert_eq!(detect_block(html), BlockSignal::Clean);
    }

    #[test]
    fn empty_results_page_is_clean_not_blocked() {
        let html = "<html><body>Your search did not match any documents.</body></html>";
        assert_eq!(detect_block(html), BlockSignal::Clean);
    }

    #[test]
    fn unknown_markup_is_layout_unrecognized() {
        let html = "<html><body><p>something else entirely</p></body></html>";
        assert_eq!(detect_block(html), BlockSignal::LayoutUnrecognized);
    }
}

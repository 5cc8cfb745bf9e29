/*
[INPUT]:  Current session (or none)
[OUTPUT]: Total feature/limit snapshot for the session's tier
[POS]:    Auth layer - tier tables and the published entitlements view
[UPDATE]: When the backend's tier feature or limit tables change
*/

use std::collections::{BTreeMap, BTreeSet};

use tokio::sync::watch;

use crate::types::{Address, EntitlementsSnapshot, Session, Tier};

pub const LIMIT_WATCHLIST: &str = "watchlist";
pub const LIMIT_SIGNALS_PER_DAY: &str = "signals_per_day";
pub const LIMIT_VAULT_ITEMS: &str = "vault_items";
pub const LIMIT_API_CALLS_PER_HOUR: &str = "api_calls_per_hour";

const PREVIEW_FEATURES: &[&str] = &["vault.preview", "pass.preview", "radar.preview"];

const FREE_FEATURES: &[&str] = &["vault.basic", "pass.basic"];

const PREMIUM_FEATURES: &[&str] = &[
    "vault.access",
    "pass.access",
    "radar.basic",
    "vault.checkout",
    "pass.spy",
];

const PRO_FEATURES: &[&str] = &[
    "vault.access",
    "pass.access",
    "radar.access",
    "vault.checkout",
    "pass.spy",
    "radar.trade",
    "ws.realtime",
    "api.full",
];

const UNLIMITED: u64 = EntitlementsSnapshot::UNLIMITED;

/// (watchlist, signals per day, vault items, api calls per hour)
fn limit_table(tier: Tier) -> [(&'static str, u64); 4] {
    let (watchlist, signals, vault_items, api_calls) = match tier {
        Tier::Free => (3, 3, 1, 100),
        Tier::Premium => (10, 50, 10, 1_000),
        Tier::Pro => (UNLIMITED, UNLIMITED, UNLIMITED, 10_000),
    };
    [
        (LIMIT_WATCHLIST, watchlist),
        (LIMIT_SIGNALS_PER_DAY, signals),
        (LIMIT_VAULT_ITEMS, vault_items),
        (LIMIT_API_CALLS_PER_HOUR, api_calls),
    ]
}

fn feature_table(tier: Tier) -> &'static [&'static str] {
    match tier {
        Tier::Free => FREE_FEATURES,
        Tier::Premium => PREMIUM_FEATURES,
        Tier::Pro => PRO_FEATURES,
    }
}

pub struct Entitlements;

impl Entitlements {
    /// Snapshot for `session`; `None` yields the free-tier defaults.
    pub fn recompute(session: Option<&Session>) -> EntitlementsSnapshot {
        let tier = session.map(|s| s.tier).unwrap_or_default();
        Self::for_tier(tier, session.map(|s| s.address.clone()))
    }

    fn for_tier(tier: Tier, address: Option<Address>) -> EntitlementsSnapshot {
        let features: BTreeSet<String> = PREVIEW_FEATURES
            .iter()
            .chain(feature_table(tier))
            .map(|feature| feature.to_string())
            .collect();
        let limits: BTreeMap<String, u64> = limit_table(tier)
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();

        EntitlementsSnapshot {
            tier,
            address,
            features,
            limits,
        }
    }
}

/// Published entitlements; written only by the state machine.
#[derive(Debug)]
pub struct EntitlementsCache {
    tx: watch::Sender<EntitlementsSnapshot>,
}

impl Default for EntitlementsCache {
    fn default() -> Self {
        Self::new()
    }
}

impl EntitlementsCache {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Entitlements::recompute(None));
        Self { tx }
    }

    pub fn snapshot(&self) -> EntitlementsSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EntitlementsSnapshot> {
        self.tx.subscribe()
    }

    /// Recompute from `session` and publish if anything changed
    pub(crate) fn refresh(&self, session: Option<&Session>) -> EntitlementsSnapshot {
        let next = Entitlements::recompute(session);
        self.tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next.clone();
                true
            }
        });
        next
    }
}

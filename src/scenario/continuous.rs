//! Continuous random transaction generator.
//!
//! Emits a pseudo-random transaction at a fixed interval; with tunable
//! probabilities it biases the amount into high-value territory or follows up
//! with an impossible-travel pair. Cancelable: once the shutdown flag flips,
//! no further submissions happen, and an in-flight one may finish or fail
//! without affecting post-cancel state.

use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::Submitter;
use crate::models::NewTransaction;

const USERS: &[&str] = &[
    "user-101", "user-102", "user-103", "user-201", "user-301", "user-401", "user-501",
];

const MERCHANTS: &[&str] = &[
    "SHOP_ABC",
    "EAT_DEF",
    "GAS_XYZ",
    "BOOK_STORE",
    "GAME_PURCHASE",
    "TRAVEL_AGENT",
];

const LOCATIONS: &[&str] = &[
    "New York", "Chicago", "Berlin", "London", "Tokyo", "Miami", "Online",
];

/// Location pairs distant enough that a sub-second hop is implausible.
const DISTANT_PAIRS: &[(&str, &str)] = &[
    ("New York", "Tokyo"),
    ("London", "Sydney"),
    ("Berlin", "Los Angeles"),
];

#[derive(Debug, Clone)]
pub struct ContinuousConfig {
    pub interval: Duration,
    pub high_value_prob: f64,
    pub travel_prob: f64,
}

impl Default for ContinuousConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            high_value_prob: 0.10,
            travel_prob: 0.05,
        }
    }
}

pub struct ContinuousGenerator<S> {
    submitter: S,
    config: ContinuousConfig,
    shutdown: watch::Receiver<bool>,
}

impl<S: Submitter> ContinuousGenerator<S> {
    pub fn new(submitter: S, config: ContinuousConfig, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            submitter,
            config,
            shutdown,
        }
    }

    pub async fn run(self) {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            high_value_prob = self.config.high_value_prob,
            travel_prob = self.config.travel_prob,
            "starting continuous transaction generator"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown = self.shutdown.clone();
        let mut emitted: u64 = 0;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    self.emit_once().await;
                    emitted += 1;
                }
            }
        }

        info!(emitted, "continuous generator stopped");
    }

    async fn emit_once(&self) {
        let (tx, travel_followup) = next_transaction(&self.config);
        self.submit_logged(&tx).await;

        if let Some(followup) = travel_followup {
            // Second leg must land within a bounded sub-second interval.
            let hop = Duration::from_millis(rand::thread_rng().gen_range(300..900));
            let mut shutdown = self.shutdown.clone();
            tokio::select! {
                _ = sleep(hop) => {
                    if !*shutdown.borrow() {
                        self.submit_logged(&followup).await;
                    }
                }
                changed = shutdown.changed() => {
                    let _ = changed;
                }
            }
        }
    }

    async fn submit_logged(&self, tx: &NewTransaction) {
        match self.submitter.submit(tx).await {
            Ok(ack) => debug!(
                user = %tx.user_id,
                amount = tx.amount,
                location = ?tx.location,
                id = ?ack.transaction_id,
                "random transaction submitted"
            ),
            Err(e) => warn!(
                user = %tx.user_id,
                amount = tx.amount,
                error = %e,
                "random submission failed"
            ),
        }
    }
}

/// Build the next random transaction, plus an impossible-travel follow-up
/// when that injection fires.
fn next_transaction(config: &ContinuousConfig) -> (NewTransaction, Option<NewTransaction>) {
    let mut rng = rand::thread_rng();

    let user = *USERS.choose(&mut rng).expect("user pool is non-empty");
    let merchant = *MERCHANTS.choose(&mut rng).expect("merchant pool is non-empty");

    if rng.gen_bool(config.travel_prob.clamp(0.0, 1.0)) {
        let (from, to) = *DISTANT_PAIRS
            .choose(&mut rng)
            .expect("pair pool is non-empty");
        let first = NewTransaction::new(user, round_cents(rng.gen_range(10.0..400.0)))
            .merchant(merchant)
            .at(from);
        let second = NewTransaction::new(user, round_cents(rng.gen_range(10.0..400.0)))
            .merchant(merchant)
            .at(to);
        return (first, Some(second));
    }

    let amount = if rng.gen_bool(config.high_value_prob.clamp(0.0, 1.0)) {
        round_cents(rng.gen_range(2_000.0..20_000.0))
    } else {
        round_cents(rng.gen_range(5.0..500.0))
    };
    let location = *LOCATIONS.choose(&mut rng).expect("location pool is non-empty");

    (
        NewTransaction::new(user, amount)
            .merchant(merchant)
            .at(location),
        None,
    )
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

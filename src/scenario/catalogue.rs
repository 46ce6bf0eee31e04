//! Fixed scenario catalogue.
//!
//! An ordered script of synthetic transactions, one block per fraud-rule
//! class, with the inter-step delays each rule needs to fire deterministically
//! (velocity inside one detection window, travel pairs implausibly close,
//! isolated high-value spikes). The runner honors the scripted pauses
//! exactly: a slow submission never makes it fire later steps early.

use anyhow::Result;
use serde::Serialize;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::Submitter;
use crate::models::{NewTransaction, SubmissionAck};

/// Backend's high-value threshold; spike amounts sit far above it.
pub const HIGH_VALUE_THRESHOLD: f64 = 1_500.0;
/// Velocity rule counts per-user submissions inside this window.
pub const VELOCITY_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    Baseline,
    HighAmount,
    Velocity,
    RoundAmount,
    TimeAnomaly,
    NewLocation,
    ImpossibleTravel,
}

impl ScenarioKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioKind::Baseline => "baseline",
            ScenarioKind::HighAmount => "high_amount",
            ScenarioKind::Velocity => "velocity",
            ScenarioKind::RoundAmount => "round_amount",
            ScenarioKind::TimeAnomaly => "time_anomaly",
            ScenarioKind::NewLocation => "new_location",
            ScenarioKind::ImpossibleTravel => "impossible_travel",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Step {
    Submit {
        scenario: ScenarioKind,
        tx: NewTransaction,
    },
    Pause(Duration),
}

impl Step {
    fn submit(scenario: ScenarioKind, tx: NewTransaction) -> Self {
        Step::Submit { scenario, tx }
    }

    fn pause_ms(ms: u64) -> Self {
        Step::Pause(Duration::from_millis(ms))
    }
}

/// Outcome of one submitted step, timed from catalogue start.
#[derive(Debug)]
pub struct StepOutcome {
    pub scenario: ScenarioKind,
    pub offset: Duration,
    pub result: Result<SubmissionAck>,
}

/// The full ordered catalogue.
pub fn build_catalogue() -> Vec<Step> {
    use ScenarioKind::*;

    vec![
        // Varied small transactions across distinct users and locations.
        Step::submit(
            Baseline,
            NewTransaction::new("user-101", 50.0)
                .merchant("SHOP_ABC")
                .at("New York"),
        ),
        Step::submit(
            Baseline,
            NewTransaction::new("user-102", 120.75)
                .merchant("EAT_DEF")
                .at("Chicago"),
        ),
        Step::submit(
            Baseline,
            NewTransaction::new("user-101", 25.50)
                .merchant("GAS_XYZ")
                .at("New York"),
        ),
        Step::submit(
            Baseline,
            NewTransaction::new("user-103", 75.0)
                .merchant("BOOK_STORE")
                .at("Berlin"),
        ),
        Step::pause_ms(2_000),
        // Single spike an order of magnitude above the threshold, isolated
        // by settling delays on both sides.
        Step::submit(
            HighAmount,
            NewTransaction::new("user-201", 15_000.0)
                .merchant("LUXURY_GOODS")
                .at("Los Angeles"),
        ),
        Step::pause_ms(2_000),
        // Four rapid same-user submissions; the 4th crosses the per-minute
        // count threshold. Spacing keeps the whole burst inside one window.
        Step::submit(
            Velocity,
            NewTransaction::new("user-301", 10.0)
                .merchant("GAME_PURCHASE")
                .at("Online"),
        ),
        Step::pause_ms(1_000),
        Step::submit(
            Velocity,
            NewTransaction::new("user-301", 20.0)
                .merchant("GAME_PURCHASE")
                .at("Online"),
        ),
        Step::pause_ms(1_000),
        Step::submit(
            Velocity,
            NewTransaction::new("user-301", 5.0)
                .merchant("GAME_PURCHASE")
                .at("Online"),
        ),
        Step::pause_ms(1_000),
        Step::submit(
            Velocity,
            NewTransaction::new("user-301", 15.0)
                .merchant("GAME_PURCHASE")
                .at("Online"),
        ),
        // Let the velocity window drain before sequence-sensitive rules.
        Step::Pause(Duration::from_secs(65)),
        // Exact round figure, zero fractional part.
        Step::submit(
            RoundAmount,
            NewTransaction::new("user-401", 5_000.0)
                .merchant("INVESTMENT_FIRM")
                .at("Miami"),
        ),
        Step::pause_ms(2_000),
        // Timestamp is backend-assigned at submission; submitted once, never
        // retried, so the clock the rule sees is the backend's own.
        Step::submit(
            TimeAnomaly,
            NewTransaction::new("user-501", 300.0)
                .merchant("LATE_NIGHT_SHOP")
                .at("London"),
        ),
        Step::pause_ms(2_000),
        // Same user, two locations never used before, far enough apart in
        // time to be processed as distinct events.
        Step::submit(
            NewLocation,
            NewTransaction::new("user-601", 200.0)
                .merchant("TRAVEL_AGENT")
                .at("Tokyo"),
        ),
        Step::pause_ms(2_000),
        Step::submit(
            NewLocation,
            NewTransaction::new("user-601", 100.0)
                .merchant("TOUR_OPERATOR")
                .at("Kyoto"),
        ),
        Step::pause_ms(2_000),
        // Same user, two distant cities, under a second apart.
        Step::submit(
            ImpossibleTravel,
            NewTransaction::new("user-701", 80.0)
                .merchant("COFFEE_BAR")
                .at("New York"),
        ),
        Step::pause_ms(900),
        Step::submit(
            ImpossibleTravel,
            NewTransaction::new("user-701", 95.0)
                .merchant("COFFEE_BAR")
                .at("Sydney"),
        ),
    ]
}

/// Run the catalogue in order. A failed submission is logged and skipped;
/// it never aborts the run, never blocks later scenarios, and is not retried.
pub async fn run_catalogue<S: Submitter>(submitter: &S, steps: &[Step]) -> Vec<StepOutcome> {
    let run_id = Uuid::new_v4();
    let submissions = steps
        .iter()
        .filter(|s| matches!(s, Step::Submit { .. }))
        .count();
    info!(%run_id, submissions, "🚀 starting scenario catalogue");

    let started = Instant::now();
    let mut outcomes = Vec::with_capacity(submissions);

    for step in steps {
        match step {
            Step::Pause(duration) => {
                debug!(ms = duration.as_millis() as u64, "pausing between steps");
                sleep(*duration).await;
            }
            Step::Submit { scenario, tx } => {
                let offset = started.elapsed();
                let result = submitter.submit(tx).await;
                match &result {
                    Ok(ack) => info!(
                        scenario = scenario.as_str(),
                        user = %tx.user_id,
                        amount = tx.amount,
                        id = ?ack.transaction_id,
                        fraud_score = ?ack.fraud_score,
                        "transaction submitted"
                    ),
                    Err(e) => warn!(
                        scenario = scenario.as_str(),
                        user = %tx.user_id,
                        amount = tx.amount,
                        error = %e,
                        "submission failed; continuing with next step"
                    ),
                }
                outcomes.push(StepOutcome {
                    scenario: *scenario,
                    offset,
                    result,
                });
            }
        }
    }

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    info!(
        %run_id,
        submitted = outcomes.len() - failed,
        failed,
        "scenario catalogue finished"
    );
    outcomes
}

use crate::server::ApiState;
use axum::{extract::State, http::StatusCode, Json};
use paperbot_core::TelemetrySnapshot;

/// Returns the latest telemetry snapshot.
///
/// # Errors
/// Returns `503 SERVICE_UNAVAILABLE` until the engine publishes its first
/// snapshot.
pub async fn status(State(state): State<ApiState>) -> Result<Json<TelemetrySnapshot>, StatusCode> {
    state
        .snapshot_rx
        .borrow()
        .clone()
        .map(Json)
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperbot_core::{EngineCounters, TelemetrySnapshot, WalletView};
    use tokio::sync::watch;

    fn snapshot() -> TelemetrySnapshot {
        TelemetrySnapshot {
            timestamp_ms: 1_700_000_000_000,
            uptime_s: 1.0,
            ticks_per_second: 2.0,
            wallet: WalletView {
                cash_balance: Default::default(),
                starting_balance: Default::default(),
                equity: Default::default(),
                total_realized_pnl: Default::default(),
                total_unrealized_pnl: Default::default(),
                positions: Vec::new(),
                last_equity_point: None,
                equity_curve_len: 0,
            },
            strategies: Vec::new(),
            venues: Vec::new(),
            recent_trades: Vec::new(),
            books: Vec::new(),
            counters: EngineCounters::default(),
        }
    }

    #[tokio::test]
    async fn test_status_unavailable_before_first_snapshot() {
        let (_tx, rx) = watch::channel(None);
        let result = status(State(ApiState { snapshot_rx: rx })).await;
        assert!(matches!(result, Err(StatusCode::SERVICE_UNAVAILABLE)));
    }

    #[tokio::test]
    async fn test_status_returns_latest_snapshot() {
        let (tx, rx) = watch::channel(None);
        tx.send(Some(snapshot())).unwrap();
        let result = status(State(ApiState { snapshot_rx: rx })).await;
        let Json(body) = result.expect("snapshot available");
        assert_eq!(body.timestamp_ms, 1_700_000_000_000);
        assert!((body.ticks_per_second - 2.0).abs() < f64::EPSILON);
    }
}

// Sensor channel - one pipeline instance (source -> fault -> calibration -> window -> filter -> detector)
use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::application::periodic::PeriodicTask;
use crate::domain::anomaly::detect_anomalies;
use crate::domain::csv::format_csv;
use crate::domain::fault::{FaultConfig, FaultInjector};
use crate::domain::filter::FilterConfig;
use crate::domain::history::{HistoryEntry, HistoryWindow};
use crate::domain::reading::Reading;
use crate::domain::sensor::SensorSpec;
use crate::domain::telemetry::{
    ChannelEvent, ChannelSnapshot, ConnectionStatus, SnapshotPoint, SourceMode,
};

#[derive(Debug, Clone, Copy)]
pub struct ChannelSettings {
    /// Re-evaluation cadence for noise-burst and drift.
    pub fault_refresh: Duration,
    /// A push-mode channel with no reading for this long reports offline.
    pub offline_after: Duration,
    pub event_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            fault_refresh: Duration::from_millis(200),
            offline_after: Duration::from_secs(10),
            event_capacity: 256,
        }
    }
}

struct ChannelState {
    history: HistoryWindow,
    injector: FaultInjector,
    filter: FilterConfig,
    calibration_offset: f64,
    source: SourceMode,
    last_true: Option<f64>,
    live_value: Option<f64>,
    last_reading_at: Option<Instant>,
    twin_rng: StdRng,
}

impl ChannelState {
    fn observe(&mut self) -> Option<f64> {
        let observed = self
            .injector
            .inject(self.last_true, Utc::now().timestamp_millis());
        self.live_value = observed.map(|v| v + self.calibration_offset);
        self.live_value
    }

    fn accept(&mut self, reading: Reading) {
        self.last_true = reading.value;
        let calibrated = self.observe();
        self.history.push(HistoryEntry {
            timestamp: reading.timestamp,
            raw: calibrated,
        });
        self.last_reading_at = Some(Instant::now());
    }
}

struct Shared {
    spec: SensorSpec,
    settings: ChannelSettings,
    state: Mutex<ChannelState>,
    events: broadcast::Sender<ChannelEvent>,
}

impl Shared {
    fn publish(&self, event: ChannelEvent) {
        // No subscribers is the normal case when nobody is streaming.
        let _ = self.events.send(event);
    }

    fn snapshot_of(&self, state: &ChannelState) -> ChannelSnapshot {
        let entries: Vec<HistoryEntry> = state.history.entries().iter().copied().collect();
        let raw = state.history.raw_values();
        let processed = state.filter.apply(&raw);
        let anomalies = detect_anomalies(&entries, self.spec.expected_range);

        let points = entries
            .iter()
            .zip(processed)
            .map(|(entry, processed)| SnapshotPoint {
                timestamp: entry.timestamp,
                raw: entry.raw,
                processed,
            })
            .collect();

        let status = match state.last_reading_at {
            None => ConnectionStatus::Connecting,
            Some(at) if at.elapsed() > self.settings.offline_after => ConnectionStatus::Offline,
            Some(_) => ConnectionStatus::Online,
        };

        ChannelSnapshot {
            sensor_id: self.spec.id.clone(),
            unit: self.spec.unit.clone(),
            status,
            source: state.source,
            fault: *state.injector.config(),
            filter: state.filter,
            calibration_offset: state.calibration_offset,
            live_value: state.live_value,
            points,
            anomalies,
        }
    }

    async fn ingest(&self, reading: Reading) {
        let snapshot = {
            let mut state = self.state.lock().await;
            state.accept(reading);
            self.snapshot_of(&state)
        };
        self.publish(ChannelEvent::Snapshot(snapshot));
    }

    async fn refresh_live(&self) {
        let value = self.state.lock().await.observe();
        self.publish(ChannelEvent::Live {
            at: Utc::now(),
            value,
        });
    }

    async fn generate_sample(&self) {
        let snapshot = {
            let mut state = self.state.lock().await;
            let now = Utc::now();
            let value = self
                .spec
                .synthetic
                .sample(now.timestamp_millis(), &mut state.twin_rng);
            state.accept(Reading::new(now, Some(value)));
            self.snapshot_of(&state)
        };
        self.publish(ChannelEvent::Snapshot(snapshot));
    }
}

/// The generic per-sensor engine. Owns its history window exclusively.
pub struct SensorChannel {
    shared: Arc<Shared>,
    fault_task: Mutex<Option<PeriodicTask>>,
    source_task: Mutex<Option<PeriodicTask>>,
    shutdown: CancellationToken,
}

impl SensorChannel {
    /// Creates the channel with an empty window and starts its source.
    pub async fn mount(spec: SensorSpec, settings: ChannelSettings, source: SourceMode) -> Self {
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        let state = ChannelState {
            history: HistoryWindow::new(spec.history_len),
            injector: FaultInjector::default(),
            filter: FilterConfig::default(),
            calibration_offset: 0.0,
            source,
            last_true: None,
            live_value: None,
            last_reading_at: None,
            twin_rng: StdRng::from_entropy(),
        };

        let channel = Self {
            shared: Arc::new(Shared {
                spec,
                settings,
                state: Mutex::new(state),
                events,
            }),
            fault_task: Mutex::new(None),
            source_task: Mutex::new(None),
            shutdown: CancellationToken::new(),
        };
        channel.set_source(source).await;

        tracing::info!(sensor = %channel.spec().id, ?source, "channel mounted");
        channel
    }

    pub fn spec(&self) -> &SensorSpec {
        &self.shared.spec
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.shared.events.subscribe()
    }

    pub async fn source_mode(&self) -> SourceMode {
        self.shared.state.lock().await.source
    }

    pub async fn ingest(&self, reading: Reading) {
        self.shared.ingest(reading).await;
    }

    /// Replaces the fault config. Any running refresh task is stopped before
    /// the new config takes effect, and the live value is recomputed at once.
    pub async fn set_fault(&self, config: FaultConfig) {
        let mut slot = self.fault_task.lock().await;
        if let Some(task) = slot.take() {
            task.cancel().await;
        }

        self.shared.state.lock().await.injector.replace(config);
        self.shared.refresh_live().await;

        if config.mode.is_dynamic() && !self.shutdown.is_cancelled() {
            let shared = self.shared.clone();
            *slot = Some(PeriodicTask::spawn(
                "fault-refresh",
                self.shared.settings.fault_refresh,
                &self.shutdown,
                move || {
                    let shared = shared.clone();
                    async move { shared.refresh_live().await }
                },
            ));
        }

        tracing::info!(sensor = %self.spec().id, mode = ?config.mode, "fault mode set");
    }

    pub async fn set_filter(&self, config: FilterConfig) {
        let snapshot = {
            let mut state = self.shared.state.lock().await;
            state.filter = config;
            self.shared.snapshot_of(&state)
        };
        self.shared.publish(ChannelEvent::Snapshot(snapshot));
        tracing::info!(sensor = %self.spec().id, mode = ?config.mode, "filter mode set");
    }

    /// Applies to samples taken from now on; buffered samples keep their trim.
    pub async fn set_calibration(&self, offset: f64) {
        let offset = if offset.is_finite() { offset } else { 0.0 };
        self.shared.state.lock().await.calibration_offset = offset;
        self.shared.refresh_live().await;
    }

    pub async fn set_source(&self, mode: SourceMode) {
        let mut slot = self.source_task.lock().await;
        if let Some(task) = slot.take() {
            task.cancel().await;
        }

        {
            let mut state = self.shared.state.lock().await;
            if state.source != mode {
                state.last_reading_at = None;
            }
            state.source = mode;
        }

        if mode == SourceMode::Synthetic && !self.shutdown.is_cancelled() {
            let shared = self.shared.clone();
            let cadence = Duration::from_millis(self.spec().sample_interval_ms);
            *slot = Some(PeriodicTask::spawn(
                "synthetic-source",
                cadence,
                &self.shutdown,
                move || {
                    let shared = shared.clone();
                    async move { shared.generate_sample().await }
                },
            ));
        }
    }

    pub async fn snapshot(&self) -> ChannelSnapshot {
        let state = self.shared.state.lock().await;
        self.shared.snapshot_of(&state)
    }

    pub async fn export_csv(&self) -> String {
        format_csv(&self.spec().raw_label, &self.snapshot().await.points)
    }

    /// Stops every timer the channel owns. Idempotent.
    pub async fn teardown(&self) {
        self.shutdown.cancel();
        for slot in [&self.fault_task, &self.source_task] {
            if let Some(task) = slot.lock().await.take() {
                task.cancel().await;
            }
        }
        tracing::info!(sensor = %self.spec().id, "channel torn down");
    }

    pub fn is_torn_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for SensorChannel {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::anomaly::{AnomalyKind, ExpectedRange};
    use crate::domain::fault::{FaultMode, FaultParams};
    use crate::domain::filter::{FilterMode, FilterParams};
    use crate::domain::sensor::SignalProfile;

    fn gas_spec() -> SensorSpec {
        SensorSpec {
            id: "gas".to_string(),
            name: "MQ-2 Gas".to_string(),
            unit: "ppm".to_string(),
            raw_label: "Gas".to_string(),
            expected_range: Some(ExpectedRange::new(50.0, 900.0)),
            history_len: 20,
            sample_interval_ms: 100,
            synthetic: SignalProfile {
                base: 300.0,
                amplitude: 20.0,
                period_ms: 10_000,
                jitter: 2.0,
                binary: false,
            },
            push: None,
        }
    }

    async fn push_channel() -> SensorChannel {
        SensorChannel::mount(gas_spec(), ChannelSettings::default(), SourceMode::Push).await
    }

    fn drain(rx: &mut broadcast::Receiver<ChannelEvent>) -> (Vec<Option<f64>>, usize) {
        let mut live = Vec::new();
        let mut snapshots = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                ChannelEvent::Live { value, .. } => live.push(value),
                ChannelEvent::Snapshot(_) => snapshots += 1,
            }
        }
        (live, snapshots)
    }

    fn reading(value: Option<f64>) -> Reading {
        Reading::new(Utc::now(), value)
    }

    #[tokio::test]
    async fn test_ingest_applies_fault_then_calibration() {
        let channel = push_channel().await;
        channel
            .set_fault(FaultConfig::with_params(
                FaultMode::Offset,
                FaultParams {
                    offset_value: Some(10.0),
                    ..Default::default()
                },
            ))
            .await;
        channel.set_calibration(-2.5).await;
        channel.ingest(reading(Some(100.0))).await;

        let snapshot = channel.snapshot().await;
        assert_eq!(snapshot.points.len(), 1);
        assert_eq!(snapshot.points[0].raw, Some(107.5));
        assert_eq!(snapshot.live_value, Some(107.5));
        assert_eq!(snapshot.calibration_offset, -2.5);
        channel.teardown().await;
    }

    #[tokio::test]
    async fn test_snapshot_filters_and_detects_over_window() {
        let channel = push_channel().await;
        channel
            .set_filter(FilterConfig::with_params(
                FilterMode::MovingAverage,
                FilterParams {
                    window_size: Some(3),
                    ..Default::default()
                },
            ))
            .await;
        for v in [100.0, 105.0, 98.0, 102.0, 101.0, 1021.0] {
            channel.ingest(reading(Some(v))).await;
        }

        let snapshot = channel.snapshot().await;
        let processed: Vec<Option<f64>> = snapshot.points.iter().map(|p| p.processed).collect();
        assert_eq!(processed[0], Some(100.0));
        assert_eq!(processed[1], Some(105.0));
        assert_eq!(processed[2], Some(101.0));
        assert_eq!(processed[5], Some(408.0));

        let kinds: Vec<AnomalyKind> = snapshot.anomalies.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AnomalyKind::Spike]);
        channel.teardown().await;
    }

    #[tokio::test]
    async fn test_window_is_bounded_by_history_len() {
        let channel = push_channel().await;
        for i in 0..35 {
            channel.ingest(reading(Some(i as f64))).await;
        }
        let snapshot = channel.snapshot().await;
        assert_eq!(snapshot.points.len(), 20);
        assert_eq!(snapshot.points[0].raw, Some(15.0));
        assert_eq!(snapshot.points[19].raw, Some(34.0));
        channel.teardown().await;
    }

    #[tokio::test]
    async fn test_stuck_at_zero_fault_is_detected() {
        let channel = push_channel().await;
        channel.set_fault(FaultConfig::new(FaultMode::StuckAtZero)).await;
        for v in [300.0, 310.0, 305.0, 299.0, 301.0] {
            channel.ingest(reading(Some(v))).await;
        }
        let kinds: Vec<AnomalyKind> = channel
            .snapshot()
            .await
            .anomalies
            .iter()
            .map(|a| a.kind)
            .collect();
        assert_eq!(kinds, vec![AnomalyKind::Stuck, AnomalyKind::Spike]);
        channel.teardown().await;
    }

    #[tokio::test]
    async fn test_open_circuit_buffers_missing_values() {
        let channel = push_channel().await;
        channel.set_fault(FaultConfig::new(FaultMode::OpenCircuit)).await;
        channel.ingest(reading(Some(300.0))).await;

        let snapshot = channel.snapshot().await;
        assert_eq!(snapshot.points[0].raw, None);
        assert_eq!(snapshot.points[0].processed, None);
        assert!(snapshot.anomalies.is_empty());
        assert!(channel.export_csv().await.ends_with(",,\n"));
        channel.teardown().await;
    }

    #[tokio::test]
    async fn test_mode_change_recomputes_immediately() {
        let channel = push_channel().await;
        let mut rx = channel.subscribe();
        channel.ingest(reading(Some(42.0))).await;
        channel.set_fault(FaultConfig::new(FaultMode::StuckAtHigh)).await;

        let (live, snapshots) = drain(&mut rx);
        assert_eq!(snapshots, 1);
        assert_eq!(live, vec![Some(1023.0)]);

        channel.set_fault(FaultConfig::new(FaultMode::None)).await;
        let (live, _) = drain(&mut rx);
        assert_eq!(live, vec![Some(42.0)]);
        channel.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dynamic_fault_stops_when_mode_changes() {
        let channel = push_channel().await;
        channel.ingest(reading(Some(200.0))).await;
        let mut rx = channel.subscribe();

        channel.set_fault(FaultConfig::new(FaultMode::NoiseBurst)).await;
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        let (live, _) = drain(&mut rx);
        assert!((5..=7).contains(&live.len()), "got {} updates", live.len());
        assert!(live.iter().flatten().all(|v| (175.0..=225.0).contains(v)));

        channel.set_fault(FaultConfig::new(FaultMode::None)).await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        let (live, _) = drain(&mut rx);
        assert_eq!(live, vec![Some(200.0)]);
        channel.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reselecting_dynamic_fault_keeps_one_timer() {
        let channel = push_channel().await;
        channel.ingest(reading(Some(20.0))).await;
        channel.set_fault(FaultConfig::new(FaultMode::NoiseBurst)).await;
        channel.set_fault(FaultConfig::new(FaultMode::Drift)).await;
        let mut rx = channel.subscribe();

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        let (live, _) = drain(&mut rx);
        assert!((5..=6).contains(&live.len()), "got {} updates", live.len());
        channel.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_cancels_every_timer() {
        let channel =
            SensorChannel::mount(gas_spec(), ChannelSettings::default(), SourceMode::Synthetic)
                .await;
        channel.set_fault(FaultConfig::new(FaultMode::Drift)).await;
        tokio::time::sleep(Duration::from_millis(1_050)).await;
        assert!(channel.snapshot().await.points.len() >= 10);

        let mut rx = channel.subscribe();
        channel.teardown().await;
        assert!(channel.is_torn_down());
        let frozen = channel.snapshot().await.points;

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(channel.snapshot().await.points, frozen);
        assert_eq!(drain(&mut rx), (Vec::new(), 0));

        // no timer is restarted after teardown
        channel.set_fault(FaultConfig::new(FaultMode::NoiseBurst)).await;
        let _ = drain(&mut rx);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(drain(&mut rx), (Vec::new(), 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthetic_source_stops_in_push_mode() {
        let channel =
            SensorChannel::mount(gas_spec(), ChannelSettings::default(), SourceMode::Synthetic)
                .await;
        tokio::time::sleep(Duration::from_millis(550)).await;
        let produced = channel.snapshot().await.points.len();
        assert!(produced >= 5);
        assert!(
            channel
                .snapshot()
                .await
                .points
                .iter()
                .flat_map(|p| p.raw)
                .all(|v| (278.0..=322.0).contains(&v))
        );

        channel.set_source(SourceMode::Push).await;
        assert_eq!(channel.source_mode().await, SourceMode::Push);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(channel.snapshot().await.points.len(), produced);
        channel.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_channel_goes_offline_and_freezes() {
        let channel = push_channel().await;
        assert_eq!(channel.snapshot().await.status, ConnectionStatus::Connecting);

        channel.ingest(reading(Some(120.0))).await;
        assert_eq!(channel.snapshot().await.status, ConnectionStatus::Online);

        tokio::time::sleep(Duration::from_secs(11)).await;
        let snapshot = channel.snapshot().await;
        assert_eq!(snapshot.status, ConnectionStatus::Offline);
        assert_eq!(snapshot.points.len(), 1);

        channel.ingest(reading(Some(121.0))).await;
        assert_eq!(channel.snapshot().await.status, ConnectionStatus::Online);
        channel.teardown().await;
    }
}

//! Alert analysis
//!
//! The analyzer watches the reading history and turns sustained patterns into
//! alerts. A pattern holds when every one of the most recent N readings
//! satisfies its rule. Alerting is edge-triggered per pattern:
//!
//! - Idle → Met: candidate alert, dropped if the pattern fired within the
//!   cooldown or an identically titled alert is still fresh in the log.
//! - Met → Met: nothing.
//! - Met → Idle: the flag resets silently.

use crate::config::{AnalyzerConfig, HighStressThresholds, MAX_ANALYZER_WINDOW_SECS};
use crate::history::{BoundedSeq, HistoryBuffer, Snapshot};
use crate::task::{lock, Shutdown, TaskGroup};
use crate::types::{Alert, AlertKind, SensorReading};
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Condition a window of readings is tested against
#[derive(Debug, Clone, PartialEq)]
pub enum PatternRule {
    /// High heart rate, low SDNN and high EDA together
    HighStress(HighStressThresholds),
    /// Heart rate below a ceiling
    LowHeartRate { max_heart_rate: f64 },
    /// Heart rate below a ceiling with SDNN above a floor
    CalmRecovery { max_heart_rate: f64, min_hrv: f64 },
}

impl PatternRule {
    /// Rules enabled by `config`. Patterns without thresholds are left out.
    pub fn from_config(config: &AnalyzerConfig) -> Vec<PatternRule> {
        let mut rules = vec![PatternRule::HighStress(config.high_stress.clone())];

        if let Some(max_heart_rate) = config.low_heart_rate.max_heart_rate {
            rules.push(PatternRule::LowHeartRate { max_heart_rate });
        }

        if let (Some(max_heart_rate), Some(min_hrv)) = (
            config.calm_recovery.max_heart_rate,
            config.calm_recovery.min_hrv,
        ) {
            rules.push(PatternRule::CalmRecovery {
                max_heart_rate,
                min_hrv,
            });
        }

        rules
    }

    pub fn kind(&self) -> AlertKind {
        match self {
            PatternRule::HighStress(_) => AlertKind::HighStress,
            PatternRule::LowHeartRate { .. } => AlertKind::LowHeartRate,
            PatternRule::CalmRecovery { .. } => AlertKind::CalmRecovery,
        }
    }

    /// Whether a single reading satisfies the rule
    pub fn matches(&self, reading: &SensorReading) -> bool {
        match self {
            PatternRule::HighStress(t) => {
                reading.heart_rate > t.min_heart_rate
                    && reading.hrv < t.max_hrv
                    && reading.eda > t.min_eda
            }
            PatternRule::LowHeartRate { max_heart_rate } => reading.heart_rate < *max_heart_rate,
            PatternRule::CalmRecovery {
                max_heart_rate,
                min_hrv,
            } => reading.heart_rate < *max_heart_rate && reading.hrv > *min_hrv,
        }
    }

    /// Whether every reading in `window` satisfies the rule
    pub fn holds_for(&self, window: &[SensorReading]) -> bool {
        !window.is_empty() && window.iter().all(|r| self.matches(r))
    }
}

/// Outcome of feeding one evaluation into a [`PatternDetector`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDecision {
    /// Rising edge outside the cooldown
    Fire,
    /// Rising edge suppressed by the cooldown
    CoolingDown,
    /// Falling edge
    Cleared,
    /// No transition
    Unchanged,
}

/// Per-pattern edge detector with cooldown
#[derive(Debug, Clone, Default)]
pub struct PatternDetector {
    met: bool,
    last_fired: Option<DateTime<Utc>>,
}

impl PatternDetector {
    pub fn is_met(&self) -> bool {
        self.met
    }

    pub fn last_fired(&self) -> Option<DateTime<Utc>> {
        self.last_fired
    }

    /// Record whether the pattern holds at `now`
    pub fn update(&mut self, holds: bool, now: DateTime<Utc>, cooldown: Duration) -> EdgeDecision {
        match (self.met, holds) {
            (false, true) => {
                self.met = true;
                let cooled = self
                    .last_fired
                    .map_or(true, |last| now - last >= cooldown);
                if cooled {
                    self.last_fired = Some(now);
                    EdgeDecision::Fire
                } else {
                    EdgeDecision::CoolingDown
                }
            }
            (true, false) => {
                self.met = false;
                EdgeDecision::Cleared
            }
            _ => EdgeDecision::Unchanged,
        }
    }
}

/// Bounded alert log with short-window deduplication by title
#[derive(Debug, Clone)]
pub struct AlertLog {
    alerts: BoundedSeq<Alert>,
    dedup_window: Duration,
}

impl AlertLog {
    pub fn new(capacity: usize, dedup_window: Duration) -> Self {
        Self {
            alerts: BoundedSeq::new(capacity),
            dedup_window,
        }
    }

    /// Append `alert` unless a same-titled alert is younger than the dedup
    /// window at `now`. Returns whether it was appended.
    pub fn try_append(&mut self, alert: Alert, now: DateTime<Utc>) -> bool {
        let duplicate = self
            .alerts
            .iter()
            .any(|a| a.title == alert.title && now - a.timestamp < self.dedup_window);
        if duplicate {
            return false;
        }

        self.alerts.push(alert);
        true
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn snapshot(&self) -> Snapshot<Alert> {
        self.alerts.snapshot()
    }
}

/// Cooldown or dedup window, clamped to the accepted range
fn clamped_window(secs: i64) -> Duration {
    Duration::seconds(secs.clamp(0, MAX_ANALYZER_WINDOW_SECS))
}

/// Synchronous evaluation core of the analyzer
#[derive(Debug, Clone)]
pub struct AlertEngine {
    patterns: Vec<(PatternRule, PatternDetector)>,
    log: AlertLog,
    condition_points: usize,
    cooldown: Duration,
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new(&AnalyzerConfig::default())
    }
}

impl AlertEngine {
    pub fn new(config: &AnalyzerConfig) -> Self {
        let patterns = PatternRule::from_config(config)
            .into_iter()
            .map(|rule| (rule, PatternDetector::default()))
            .collect();

        Self {
            patterns,
            log: AlertLog::new(config.log_capacity, clamped_window(config.dedup_window_secs)),
            condition_points: config.condition_points,
            cooldown: clamped_window(config.cooldown_secs),
        }
    }

    pub fn log(&self) -> &AlertLog {
        &self.log
    }

    /// Detector state for `kind`, if that pattern is enabled
    pub fn detector(&self, kind: AlertKind) -> Option<&PatternDetector> {
        self.patterns
            .iter()
            .find(|(rule, _)| rule.kind() == kind)
            .map(|(_, detector)| detector)
    }

    /// Forget edge and cooldown state; logged alerts are kept
    pub fn reset_debounce(&mut self) {
        for (_, detector) in &mut self.patterns {
            *detector = PatternDetector::default();
        }
    }

    /// Evaluate the tail of `history` at `now`, returning alerts appended to
    /// the log.
    pub fn evaluate(&mut self, history: &[SensorReading], now: DateTime<Utc>) -> Vec<Alert> {
        let n = self.condition_points;
        if history.len() < n {
            return Vec::new();
        }
        let recent = &history[history.len() - n..];
        let Some(trigger) = recent.last() else {
            return Vec::new();
        };

        let mut fired = Vec::new();
        for (rule, detector) in &mut self.patterns {
            let kind = rule.kind();
            match detector.update(rule.holds_for(recent), now, self.cooldown) {
                EdgeDecision::Fire => {
                    info!(?kind, points = n, "Pattern detected consistently");
                    let alert = Alert::new(kind, trigger, now);
                    if self.log.try_append(alert.clone(), now) {
                        warn!(
                            ?kind,
                            severity = ?alert.severity,
                            heart_rate = trigger.heart_rate.round(),
                            "Generating alert"
                        );
                        fired.push(alert);
                    } else {
                        debug!(?kind, "Duplicate alert suppressed");
                    }
                }
                EdgeDecision::CoolingDown => {
                    debug!(?kind, "Pattern detected, but alert is on cooldown");
                }
                EdgeDecision::Cleared => {
                    debug!(?kind, "Pattern no longer detected");
                }
                EdgeDecision::Unchanged => {}
            }
        }

        fired
    }
}

/// Background analyzer subscribed to a history stream
pub struct AlertAnalyzer {
    history: watch::Receiver<Snapshot<SensorReading>>,
    engine: Arc<Mutex<AlertEngine>>,
    alerts: Arc<watch::Sender<Snapshot<Alert>>>,
    task: Mutex<Option<TaskGroup>>,
}

impl AlertAnalyzer {
    pub fn new(history: watch::Receiver<Snapshot<SensorReading>>, config: &AnalyzerConfig) -> Self {
        let empty: Snapshot<Alert> = Arc::from(Vec::new());
        let (alerts, _) = watch::channel(empty);

        Self {
            history,
            engine: Arc::new(Mutex::new(AlertEngine::new(config))),
            alerts: Arc::new(alerts),
            task: Mutex::new(None),
        }
    }

    /// Analyzer fed by a [`HistoryBuffer`]
    pub fn for_history(history: &HistoryBuffer, config: &AnalyzerConfig) -> Self {
        Self::new(history.subscribe(), config)
    }

    /// Current alert log, oldest first
    pub fn alerts(&self) -> Snapshot<Alert> {
        self.alerts.borrow().clone()
    }

    /// Subscribe to alert log updates
    pub fn subscribe(&self) -> watch::Receiver<Snapshot<Alert>> {
        self.alerts.subscribe()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.task).as_ref().is_some_and(TaskGroup::is_active)
    }

    /// Reset debounce state and start following the history.
    /// No-op while already running.
    pub fn start_monitoring(&self) {
        let mut task = lock(&self.task);
        if task.as_ref().is_some_and(TaskGroup::is_active) {
            debug!("Alert analysis already running");
            return;
        }

        lock(&self.engine).reset_debounce();

        let mut group = TaskGroup::new();
        let history = self.history.clone();
        let engine = self.engine.clone();
        let alerts = self.alerts.clone();
        group.spawn(move |shutdown| run_analysis(history, engine, alerts, shutdown));

        *task = Some(group);
        info!("Alert analysis started");
    }

    /// Stop following the history; the alert log is kept
    pub async fn stop_monitoring(&self) {
        let group = lock(&self.task).take();
        match group {
            Some(group) => {
                group.shutdown().await;
                info!("Alert analysis stopped");
            }
            None => debug!("Alert analysis already stopped"),
        }
    }
}

async fn run_analysis(
    mut history: watch::Receiver<Snapshot<SensorReading>>,
    engine: Arc<Mutex<AlertEngine>>,
    alerts: Arc<watch::Sender<Snapshot<Alert>>>,
    mut shutdown: Shutdown,
) {
    debug!("Starting data analysis for alerts");

    loop {
        let snapshot = history.borrow_and_update().clone();
        let updated = {
            let mut engine = lock(&engine);
            let fired = engine.evaluate(&snapshot, Utc::now());
            (!fired.is_empty()).then(|| engine.log().snapshot())
        };
        if let Some(log) = updated {
            alerts.send_replace(log);
        }

        tokio::select! {
            _ = shutdown.requested() => break,
            changed = history.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    debug!("Data analysis for alerts finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CalmRecoveryThresholds, LowHeartRateThresholds};
    use crate::types::{Movement, Severity};
    use pretty_assertions::assert_eq;

    fn reading(heart_rate: f64, hrv: f64, eda: f64) -> SensorReading {
        SensorReading {
            timestamp: Utc::now(),
            heart_rate,
            hrv,
            eda,
            skin_temp: 36.5,
            movement: Movement::default(),
        }
    }

    fn stressed() -> SensorReading {
        reading(110.0, 15.0, 9.0)
    }

    fn relaxed() -> SensorReading {
        reading(70.0, 55.0, 2.5)
    }

    fn secs(n: i64) -> Duration {
        Duration::seconds(n)
    }

    #[test]
    fn test_high_stress_rule_is_conjunctive() {
        let rule = PatternRule::HighStress(HighStressThresholds::default());
        assert!(rule.matches(&stressed()));
        assert!(!rule.matches(&reading(95.0, 15.0, 9.0)));
        assert!(!rule.matches(&reading(110.0, 30.0, 9.0)));
        assert!(!rule.matches(&reading(110.0, 15.0, 7.0)));
        assert!(!rule.holds_for(&[]));
    }

    #[test]
    fn test_requires_minimum_points() {
        let mut engine = AlertEngine::default();
        let history = vec![stressed(); 7];
        assert!(engine.evaluate(&history, Utc::now()).is_empty());
        assert!(!engine.detector(AlertKind::HighStress).unwrap().is_met());
    }

    #[test]
    fn test_single_alert_on_rising_edge() {
        let mut engine = AlertEngine::default();
        let t0 = Utc::now();
        let mut history = vec![relaxed(); 20];
        history.extend(vec![stressed(); 8]);

        let fired = engine.evaluate(&history, t0);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, AlertKind::HighStress);
        assert_eq!(fired[0].severity, Severity::High);
        assert_eq!(Some(&fired[0].reading), history.last());

        // Sustained pattern does not re-fire
        for i in 1..=20 {
            history.push(stressed());
            assert!(engine.evaluate(&history, t0 + secs(i)).is_empty());
        }
        assert_eq!(engine.log().len(), 1);
    }

    #[test]
    fn test_one_bad_reading_breaks_pattern() {
        let mut engine = AlertEngine::default();
        let mut history = vec![stressed(); 8];
        history[3] = reading(110.0, 45.0, 9.0);
        assert!(engine.evaluate(&history, Utc::now()).is_empty());
    }

    #[test]
    fn test_cooldown_suppresses_second_episode() {
        let mut engine = AlertEngine::default();
        let t0 = Utc::now();
        let mut history = vec![stressed(); 8];
        assert_eq!(engine.evaluate(&history, t0).len(), 1);

        history.push(relaxed());
        assert!(engine.evaluate(&history, t0 + secs(30)).is_empty());
        assert!(!engine.detector(AlertKind::HighStress).unwrap().is_met());

        history.extend(vec![stressed(); 8]);
        assert!(engine.evaluate(&history, t0 + secs(60)).is_empty());

        // Flag still tracks the suppressed edge: staying high past the
        // cooldown does not fire
        let detector = engine.detector(AlertKind::HighStress).unwrap();
        assert!(detector.is_met());
        assert_eq!(detector.last_fired(), Some(t0));
        history.push(stressed());
        assert!(engine.evaluate(&history, t0 + secs(200)).is_empty());
        assert_eq!(engine.log().len(), 1);
    }

    #[test]
    fn test_fires_again_after_cooldown() {
        let mut engine = AlertEngine::default();
        let t0 = Utc::now();
        let mut history = vec![stressed(); 8];
        assert_eq!(engine.evaluate(&history, t0).len(), 1);

        history.push(relaxed());
        assert!(engine.evaluate(&history, t0 + secs(60)).is_empty());

        history.extend(vec![stressed(); 8]);
        let fired = engine.evaluate(&history, t0 + secs(121));
        assert_eq!(fired.len(), 1);
        assert_eq!(engine.log().len(), 2);
    }

    #[test]
    fn test_oversized_windows_are_clamped() {
        let config = AnalyzerConfig {
            cooldown_secs: i64::MAX,
            dedup_window_secs: i64::MIN,
            ..Default::default()
        };
        let mut engine = AlertEngine::new(&config);
        let t0 = Utc::now();
        let mut history = vec![stressed(); 8];
        assert_eq!(engine.evaluate(&history, t0).len(), 1);

        history.push(relaxed());
        assert!(engine.evaluate(&history, t0 + secs(60)).is_empty());

        history.extend(vec![stressed(); 8]);
        assert!(engine.evaluate(&history, t0 + secs(3_600)).is_empty());

        history.push(relaxed());
        assert!(engine.evaluate(&history, t0 + secs(3_700)).is_empty());
        history.extend(vec![stressed(); 8]);
        let later = t0 + secs(MAX_ANALYZER_WINDOW_SECS);
        assert_eq!(engine.evaluate(&history, later).len(), 1);
    }

    #[test]
    fn test_reset_debounce_keeps_log() {
        let mut engine = AlertEngine::default();
        let t0 = Utc::now();
        let history = vec![stressed(); 8];
        engine.evaluate(&history, t0);

        engine.reset_debounce();
        let detector = engine.detector(AlertKind::HighStress).unwrap();
        assert!(!detector.is_met());
        assert_eq!(detector.last_fired(), None);
        assert_eq!(engine.log().len(), 1);

        // Cooldown forgotten, dedup window still applies
        assert!(engine.evaluate(&history, t0 + secs(5)).is_empty());
        assert_eq!(engine.evaluate(&history, t0 + secs(60)).len(), 0);
        engine.reset_debounce();
        assert_eq!(engine.evaluate(&history, t0 + secs(60)).len(), 1);
    }

    #[test]
    fn test_dedup_drops_same_title_within_window() {
        let mut log = AlertLog::new(50, secs(10));
        let t0 = Utc::now();

        let first = Alert::new(AlertKind::HighStress, &stressed(), t0);
        let second = Alert::new(AlertKind::HighStress, &reading(130.0, 5.0, 12.0), t0 + secs(4));
        assert_ne!(first, second);

        assert!(log.try_append(first.clone(), t0));
        assert!(!log.try_append(second, t0 + secs(4)));
        assert_eq!(log.len(), 1);
        assert_eq!(log.snapshot()[0].id, first.id);

        let later = Alert::new(AlertKind::HighStress, &stressed(), t0 + secs(10));
        assert!(log.try_append(later, t0 + secs(10)));

        let other = Alert::new(AlertKind::CalmRecovery, &relaxed(), t0 + secs(11));
        assert!(log.try_append(other, t0 + secs(11)));
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_log_is_capped() {
        let mut log = AlertLog::new(50, secs(10));
        let t0 = Utc::now();
        let mut ids = Vec::new();
        for i in 0..60 {
            let at = t0 + secs(i * 11);
            let alert = Alert::new(AlertKind::HighStress, &stressed(), at);
            ids.push(alert.id);
            assert!(log.try_append(alert, at));
        }

        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 50);
        assert_eq!(snapshot[0].id, ids[10]);
        assert_eq!(snapshot[49].id, ids[59]);
    }

    #[test]
    fn test_unconfigured_patterns_never_fire() {
        let config = AnalyzerConfig::default();
        let rules = PatternRule::from_config(&config);
        assert_eq!(rules.len(), 1);

        let mut engine = AlertEngine::new(&config);
        let history = vec![reading(40.0, 80.0, 1.0); 8];
        assert!(engine.evaluate(&history, Utc::now()).is_empty());
        assert!(engine.detector(AlertKind::LowHeartRate).is_none());
    }

    #[test]
    fn test_configured_patterns_follow_same_policy() {
        let config = AnalyzerConfig {
            low_heart_rate: LowHeartRateThresholds {
                max_heart_rate: Some(50.0),
            },
            calm_recovery: CalmRecoveryThresholds {
                max_heart_rate: Some(75.0),
                min_hrv: Some(50.0),
            },
            ..Default::default()
        };
        let mut engine = AlertEngine::new(&config);
        let t0 = Utc::now();

        let mut history = vec![reading(45.0, 60.0, 1.0); 8];
        let fired = engine.evaluate(&history, t0);
        let kinds: Vec<AlertKind> = fired.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AlertKind::LowHeartRate, AlertKind::CalmRecovery]);
        assert_eq!(fired[0].severity, Severity::Medium);
        assert_eq!(fired[1].severity, Severity::Low);

        history.push(reading(60.0, 60.0, 1.0));
        let fired = engine.evaluate(&history, t0 + secs(1));
        assert!(fired.is_empty());
        assert!(!engine.detector(AlertKind::LowHeartRate).unwrap().is_met());
        assert!(engine.detector(AlertKind::CalmRecovery).unwrap().is_met());
    }

    #[tokio::test]
    async fn test_analyzer_follows_history_stream() {
        let empty: Snapshot<SensorReading> = Arc::from(Vec::new());
        let (tx, rx) = watch::channel(empty);
        let analyzer = AlertAnalyzer::new(rx, &AnalyzerConfig::default());
        let mut updates = analyzer.subscribe();

        analyzer.start_monitoring();
        analyzer.start_monitoring();
        assert!(analyzer.is_running());

        let mut history = vec![relaxed(); 5];
        tx.send_replace(history.iter().cloned().collect());
        history.extend(vec![stressed(); 8]);
        tx.send_replace(history.iter().cloned().collect());

        updates.changed().await.unwrap();
        let alerts = analyzer.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::HighStress);

        analyzer.stop_monitoring().await;
        assert!(!analyzer.is_running());
        analyzer.stop_monitoring().await;

        // Stopped analyzer ignores history but keeps its log
        history.push(relaxed());
        tx.send_replace(history.iter().cloned().collect());
        history.extend(vec![stressed(); 8]);
        tx.send_replace(history.iter().cloned().collect());
        tokio::task::yield_now().await;
        assert_eq!(analyzer.alerts().len(), 1);
    }
}

//! Physiological signal simulator
//!
//! Produces plausible sensor readings without hardware. A hidden
//! [`SimulationState`] sets the targets of a mean-reverting inter-beat
//! interval walk; heart rate and SDNN are derived from a rolling interval
//! window, and EDA, skin temperature and motion drift alongside.
//!
//! Two background loops run while the simulator is started:
//!
//! 1. The beat loop computes a reading, publishes it and then sleeps for the
//!    interval it just generated, so a faster heart emits faster.
//! 2. The transition loop switches the hidden state every 30-90 s.

use crate::config::SimulatorConfig;
use crate::error::PulseError;
use crate::task::{lock, Shutdown, TaskGroup};
use crate::types::{Movement, SensorReading, SimulationState};
use crate::window::IbiWindow;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, trace};

/// Baseline inter-beat interval (ms, 75 bpm)
pub const INITIAL_IBI_MS: f64 = 800.0;
/// Baseline electrodermal activity (µS)
pub const INITIAL_EDA: f64 = 2.5;
/// Baseline skin temperature (°C)
pub const INITIAL_SKIN_TEMP: f64 = 36.5;

/// Pull of the interval toward the state's target per beat
pub const IBI_SMOOTHING: f64 = 0.1;
/// Plausible interval range (ms), roughly 33-200 bpm
pub const IBI_RANGE_MS: (f64, f64) = (300.0, 1800.0);

const EDA_SMOOTHING: f64 = 0.05;
const EDA_NOISE: f64 = 0.2;
const EDA_RANGE: (f64, f64) = (0.2, 20.0);
const SKIN_TEMP_NOISE: f64 = 0.05;
const SKIN_TEMP_RANGE: (f64, f64) = (35.0, 38.5);
const MOVEMENT_NOISE: f64 = 0.25;
const BEAT_DELAY_RANGE_MS: (f64, f64) = (100.0, 2000.0);

/// Pacing of the beat loop after an interval of `ibi_ms`
pub fn beat_delay(ibi_ms: f64) -> Duration {
    let ms = ibi_ms.clamp(BEAT_DELAY_RANGE_MS.0, BEAT_DELAY_RANGE_MS.1);
    Duration::from_millis(ms as u64)
}

/// Pick the next hidden state, never the current one
pub fn next_state<R: Rng + ?Sized>(current: SimulationState, rng: &mut R) -> SimulationState {
    let candidates = current.others();
    candidates[rng.gen_range(0..candidates.len())]
}

/// Random dwell time before the next state transition
pub fn dwell_duration<R: Rng + ?Sized>(
    config: &SimulatorConfig,
    rng: &mut R,
) -> Result<Duration, PulseError> {
    let to_ms = |secs: u64| {
        secs.checked_mul(1_000).ok_or_else(|| {
            PulseError::InvalidConfig(format!("state dwell of {} s is out of range", secs))
        })
    };
    let min = to_ms(config.min_state_dwell_secs)?;
    let max = to_ms(config.max_state_dwell_secs)?;
    if min > max {
        return Err(PulseError::InvalidConfig(format!(
            "state dwell range {}..={} s is empty",
            config.min_state_dwell_secs, config.max_state_dwell_secs
        )));
    }
    Ok(Duration::from_millis(rng.gen_range(min..=max)))
}

/// Synchronous signal state advanced once per simulated beat
#[derive(Debug, Clone)]
pub struct SignalModel {
    ibi_ms: f64,
    window: IbiWindow,
    eda: f64,
    skin_temp: f64,
    movement: Movement,
}

impl Default for SignalModel {
    fn default() -> Self {
        Self::new(IbiWindow::default())
    }
}

impl SignalModel {
    pub fn new(window: IbiWindow) -> Self {
        let mut model = Self {
            ibi_ms: INITIAL_IBI_MS,
            window,
            eda: INITIAL_EDA,
            skin_temp: INITIAL_SKIN_TEMP,
            movement: Movement::default(),
        };
        model.reset();
        model
    }

    /// Return to the calm baseline with an empty interval window
    pub fn reset(&mut self) {
        self.ibi_ms = INITIAL_IBI_MS;
        self.window.clear();
        self.eda = INITIAL_EDA;
        self.skin_temp = INITIAL_SKIN_TEMP;
        self.movement = Movement::default();
    }

    pub fn ibi_ms(&self) -> f64 {
        self.ibi_ms
    }

    pub fn window(&self) -> &IbiWindow {
        &self.window
    }

    pub fn eda(&self) -> f64 {
        self.eda
    }

    pub fn skin_temp(&self) -> f64 {
        self.skin_temp
    }

    pub fn movement(&self) -> Movement {
        self.movement
    }

    /// Delay before the next beat
    pub fn next_delay(&self) -> Duration {
        beat_delay(self.ibi_ms)
    }

    /// Advance one beat under `state` and build the resulting reading.
    ///
    /// All new values are computed before any is stored; on error the model
    /// is left untouched.
    pub fn step<R: Rng + ?Sized>(
        &mut self,
        state: SimulationState,
        rng: &mut R,
        timestamp: DateTime<Utc>,
    ) -> Result<SensorReading, PulseError> {
        let range = state.ibi_variation_ms();
        let variation = rng.gen_range(-range..=range);
        let ibi_ms = (self.ibi_ms + (state.target_ibi_ms() - self.ibi_ms) * IBI_SMOOTHING
            + variation)
            .clamp(IBI_RANGE_MS.0, IBI_RANGE_MS.1);

        let eda = (self.eda
            + (state.target_eda() - self.eda) * EDA_SMOOTHING
            + rng.gen_range(-EDA_NOISE..=EDA_NOISE))
        .clamp(EDA_RANGE.0, EDA_RANGE.1);

        let skin_temp = (self.skin_temp + rng.gen_range(-SKIN_TEMP_NOISE..=SKIN_TEMP_NOISE))
            .clamp(SKIN_TEMP_RANGE.0, SKIN_TEMP_RANGE.1);

        let movement = Movement {
            x: self.movement.x + rng.gen_range(-MOVEMENT_NOISE..=MOVEMENT_NOISE),
            y: self.movement.y + rng.gen_range(-MOVEMENT_NOISE..=MOVEMENT_NOISE),
            z: self.movement.z + rng.gen_range(-MOVEMENT_NOISE..=MOVEMENT_NOISE),
        };

        // f64::clamp passes NaN through
        if !ibi_ms.is_finite() {
            return Err(PulseError::NonFiniteSignal("inter-beat interval"));
        }
        if !eda.is_finite() {
            return Err(PulseError::NonFiniteSignal("eda"));
        }
        if !skin_temp.is_finite() {
            return Err(PulseError::NonFiniteSignal("skin temperature"));
        }
        if !(movement.x.is_finite() && movement.y.is_finite() && movement.z.is_finite()) {
            return Err(PulseError::NonFiniteSignal("movement"));
        }

        self.ibi_ms = ibi_ms;
        self.window.push(ibi_ms);
        self.eda = eda;
        self.skin_temp = skin_temp;
        self.movement = movement;

        let average_ibi = self.window.mean().unwrap_or(ibi_ms);

        Ok(SensorReading {
            timestamp,
            heart_rate: 60_000.0 / average_ibi,
            hrv: self.window.sdnn(),
            eda,
            skin_temp,
            movement,
        })
    }
}

/// Background simulator publishing readings on a latest-value channel
pub struct SignalSimulator {
    config: SimulatorConfig,
    model: Arc<Mutex<SignalModel>>,
    state: Arc<watch::Sender<SimulationState>>,
    readings: Arc<watch::Sender<Option<SensorReading>>>,
    tasks: Mutex<Option<TaskGroup>>,
}

impl Default for SignalSimulator {
    fn default() -> Self {
        Self::new(SimulatorConfig::default())
    }
}

impl SignalSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        let model = SignalModel::new(IbiWindow::new(config.ibi_window_ms));
        let (state, _) = watch::channel(SimulationState::Calm);
        let (readings, _) = watch::channel(None);

        Self {
            config,
            model: Arc::new(Mutex::new(model)),
            state: Arc::new(state),
            readings: Arc::new(readings),
            tasks: Mutex::new(None),
        }
    }

    /// Subscribe to the latest reading (`None` before the first beat)
    pub fn subscribe(&self) -> watch::Receiver<Option<SensorReading>> {
        self.readings.subscribe()
    }

    /// Most recent reading, if any
    pub fn latest(&self) -> Option<SensorReading> {
        self.readings.borrow().clone()
    }

    /// Currently active hidden state
    pub fn current_state(&self) -> SimulationState {
        *self.state.borrow()
    }

    /// Snapshot of the signal model
    pub fn model(&self) -> SignalModel {
        lock(&self.model).clone()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.tasks).as_ref().is_some_and(TaskGroup::is_active)
    }

    /// Reset to the calm baseline and launch the beat and transition loops.
    /// No-op while already running. Must be called inside a tokio runtime.
    pub fn start(&self) {
        let mut tasks = lock(&self.tasks);
        if tasks.as_ref().is_some_and(TaskGroup::is_active) {
            debug!("Simulation already running");
            return;
        }

        lock(&self.model).reset();
        self.state.send_replace(SimulationState::Calm);
        debug!("Initial simulation state reset");

        let mut seeder = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let beat_rng = StdRng::seed_from_u64(seeder.gen());
        let transition_rng = StdRng::seed_from_u64(seeder.gen());

        let mut group = TaskGroup::new();

        let model = self.model.clone();
        let state = self.state.subscribe();
        let readings = self.readings.clone();
        let backoff = Duration::from_millis(self.config.beat_retry_backoff_ms);
        group.spawn(move |shutdown| {
            run_beat_loop(model, state, readings, beat_rng, backoff, shutdown)
        });

        let state = self.state.clone();
        let config = self.config.clone();
        group.spawn(move |shutdown| run_transition_loop(state, config, transition_rng, shutdown));

        *tasks = Some(group);
        info!(seed = ?self.config.seed, "Simulation started");
    }

    /// Cancel both loops and wait for them to exit. No-op while stopped.
    pub async fn stop(&self) {
        let group = lock(&self.tasks).take();
        match group {
            Some(group) => {
                group.shutdown().await;
                info!("Simulation stopped");
            }
            None => debug!("Simulation already stopped"),
        }
    }
}

async fn run_beat_loop(
    model: Arc<Mutex<SignalModel>>,
    state: watch::Receiver<SimulationState>,
    readings: Arc<watch::Sender<Option<SensorReading>>>,
    mut rng: StdRng,
    retry_backoff: Duration,
    mut shutdown: Shutdown,
) {
    debug!("Beat loop started");

    loop {
        let active = *state.borrow();
        let outcome = {
            let mut model = lock(&model);
            model
                .step(active, &mut rng, Utc::now())
                .map(|reading| (reading, model.next_delay()))
        };

        let delay = match outcome {
            Ok((reading, delay)) => {
                trace!(
                    state = active.as_str(),
                    heart_rate = reading.heart_rate.round(),
                    sdnn = %format!("{:.1}", reading.hrv),
                    eda = %format!("{:.1}", reading.eda),
                    "New reading"
                );
                readings.send_replace(Some(reading));
                delay
            }
            Err(e) => {
                error!(error = %e, "Error in simulation loop, retrying");
                retry_backoff
            }
        };

        tokio::select! {
            _ = shutdown.requested() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    debug!("Beat loop finished");
}

async fn run_transition_loop(
    state: Arc<watch::Sender<SimulationState>>,
    config: SimulatorConfig,
    mut rng: StdRng,
    mut shutdown: Shutdown,
) {
    debug!("State transition loop started");
    let retry_backoff = Duration::from_secs(config.state_retry_backoff_secs);

    loop {
        let (wait, transition) = match dwell_duration(&config, &mut rng) {
            Ok(dwell) => (dwell, true),
            Err(e) => {
                error!(error = %e, "Error in state transition loop, retrying");
                (retry_backoff, false)
            }
        };

        tokio::select! {
            _ = shutdown.requested() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        if !transition {
            continue;
        }

        let current = *state.borrow();
        let next = next_state(current, &mut rng);
        state.send_replace(next);
        info!(from = current.as_str(), to = next.as_str(), "Simulation state changed");
    }

    debug!("State transition loop finished");
}

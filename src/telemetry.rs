//! Phase-driven sensor data generation with anomaly injection.
//!
//! Sensor values follow a 30-second cycle split into 5 phases of 6
//! seconds; each sensor has a nominal `[min, max]` range per phase.
//! A reading is flagged anomalous with probability `anomaly_factor *
//! 0.1`, decided once per composite reading, and anomalous values are
//! pushed out of their nominal range by a signed deviation of
//! `(max - min) * anomaly_factor`.
//!
//! The generator runs in one of two modes. Historical mode walks a
//! bounded (or unbounded) time range and returns the whole batch;
//! real-time mode publishes one composite reading per unit on a fixed
//! cadence through the [`EventSink`]. A generator instance runs at most
//! one session at a time.

use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use crate::event::{ClusterEvent, EventSink};
use crate::scheduler::{self, TimerHandle};

/// Number of phases in one cycle
pub const PHASE_COUNT: usize = 5;

/// Length of one full phase cycle in seconds
pub const PHASE_CYCLE_SECS: i64 = 30;

/// Length of a single phase in seconds
pub const PHASE_LENGTH_SECS: i64 = 6;

/// Per-phase nominal `[min, max]` ranges for each sensor.
///
/// The s5 phase-4 range is inverted on purpose; value generation
/// interpolates between the endpoints rather than sampling an ordered
/// interval, so inverted bounds are legal.
pub const SENSOR_RANGES: [(&str, [[f64; 2]; PHASE_COUNT]); 5] = [
    ("s1", [[0.0, 5.0], [5.0, 10.0], [15.0, 16.0], [5.0, 10.0], [0.0, 5.0]]),
    ("s2", [[0.0, 5.0], [0.0, 5.0], [10.0, 15.0], [0.0, 5.0], [0.0, 5.0]]),
    ("s3", [[0.0, 5.0], [10.0, 20.0], [20.0, 30.0], [10.0, 20.0], [0.0, 5.0]]),
    ("s4", [[0.0, 30.0], [30.0, 35.0], [35.0, 40.0], [40.0, 45.0], [45.0, 50.0]]),
    ("s5", [[0.0, 1.0], [1.0, 2.0], [3.0, 4.0], [2.0, 3.0], [1.0, 0.0]]),
];

/// One composite sensor reading from a simulated PLC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// When the reading was taken
    pub timestamp: DateTime<Utc>,

    /// Identifier of the producing unit
    pub plc_id: u32,

    /// Phase the cycle was in at `timestamp` (0..=4)
    pub phase: u8,

    /// Sensor name to generated value
    pub values: BTreeMap<String, f64>,

    /// Whether this reading was perturbed out of its nominal ranges
    pub anomaly: bool,
}

/// Phase of the cycle at `at`: `floor((t mod 30) / 6)`
pub fn phase_for(at: DateTime<Utc>) -> u8 {
    (at.timestamp().rem_euclid(PHASE_CYCLE_SECS) / PHASE_LENGTH_SECS) as u8
}

/// Generate values for every sensor at `phase`.
///
/// Values are rounded to two decimal places. With `anomaly` set, each
/// value is shifted by `(max - min) * anomaly_factor` in a random
/// direction, so it may leave the nominal range.
pub fn sensor_values<R: Rng + ?Sized>(
    phase: u8,
    anomaly: bool,
    anomaly_factor: f64,
    rng: &mut R,
) -> BTreeMap<String, f64> {
    let mut values = BTreeMap::new();
    for (sensor, ranges) in SENSOR_RANGES {
        let [min, max] = ranges[phase as usize];
        let mut value = min + rng.gen::<f64>() * (max - min);
        if anomaly {
            let sign = if rng.gen::<f64>() > 0.5 { 1.0 } else { -1.0 };
            value += sign * (max - min) * anomaly_factor;
        }
        values.insert(sensor.to_string(), (value * 100.0).round() / 100.0);
    }
    values
}

/// Generate one composite reading for `plc_id` at `at`.
///
/// The anomaly flag is drawn once for the whole reading with
/// probability `anomaly_factor * 0.1`.
pub fn generate_reading<R: Rng + ?Sized>(
    plc_id: u32,
    at: DateTime<Utc>,
    anomaly_factor: f64,
    rng: &mut R,
) -> SensorReading {
    let phase = phase_for(at);
    let anomaly = rng.gen::<f64>() < anomaly_factor * 0.1;
    SensorReading {
        timestamp: at,
        plc_id,
        phase,
        values: sensor_values(phase, anomaly, anomaly_factor, rng),
        anomaly,
    }
}

enum Session {
    Idle,
    Historical,
    RealTime(TimerHandle),
}

/// Sensor data generator for a fixed set of PLC identifiers
pub struct SensorGenerator {
    plc_count: u32,
    anomaly_factor: f64,
    step: chrono::Duration,
    interval: Duration,
    pacing: Option<Duration>,
    sink: EventSink,
    session: Mutex<Session>,
    canceled: AtomicBool,
}

impl SensorGenerator {
    /// Create a generator for `plc_count` units.
    ///
    /// `anomaly_factor` is clamped to `[0, 1]`. Step, cadence and
    /// pacing come from the simulation configuration.
    pub fn new(plc_count: u32, anomaly_factor: f64, config: &SimConfig, sink: EventSink) -> Self {
        let anomaly_factor = anomaly_factor.clamp(0.0, 1.0);
        info!(
            "sensor generator created: plc_count={plc_count} anomaly_factor={anomaly_factor:.2}"
        );
        SensorGenerator {
            plc_count,
            anomaly_factor,
            step: chrono::Duration::from_std(config.historical_step)
                .unwrap_or_else(|_| chrono::Duration::seconds(PHASE_CYCLE_SECS)),
            interval: config.telemetry_interval,
            pacing: config.historical_pacing,
            sink,
            session: Mutex::new(Session::Idle),
            canceled: AtomicBool::new(false),
        }
    }

    /// Number of PLC identifiers this generator produces for
    pub fn plc_count(&self) -> u32 {
        self.plc_count
    }

    /// Effective (clamped) anomaly factor
    pub fn anomaly_factor(&self) -> f64 {
        self.anomaly_factor
    }

    /// Whether a historical or real-time session is active
    pub fn is_running(&self) -> bool {
        !matches!(*self.session.lock(), Session::Idle)
    }

    /// Generate readings for every step in `[start, end)`, one per PLC
    /// per step, and return the whole batch.
    ///
    /// Without an `end` the walk continues until [`stop`](Self::stop)
    /// is called; configure pacing in that case so the loop yields.
    /// Starting a session while another one is active is an error.
    pub async fn generate_historical(
        &self,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> SimResult<Vec<SensorReading>> {
        if let Some(end) = end {
            if end < start {
                return Err(SimError::InvalidRange { start, end });
            }
        }
        self.begin_session(Session::Historical)?;

        info!(
            "historical generation started: start={start} end={end:?} plc_count={}",
            self.plc_count
        );

        let mut batch = Vec::new();
        let mut current = start;

        while end.map_or(true, |end| current < end) {
            if self.canceled.load(Ordering::SeqCst) {
                debug!("historical generation canceled at {current}");
                break;
            }
            {
                let mut rng = rand::thread_rng();
                for plc_id in 0..self.plc_count {
                    batch.push(generate_reading(
                        plc_id,
                        current,
                        self.anomaly_factor,
                        &mut rng,
                    ));
                }
            }
            current += self.step;

            if let Some(pacing) = self.pacing {
                tokio::time::sleep(pacing).await;
            }
        }

        info!("historical generation finished: {} readings", batch.len());
        *self.session.lock() = Session::Idle;
        Ok(batch)
    }

    /// Start publishing one composite reading per PLC on the configured
    /// cadence.
    ///
    /// Readings go through the event sink; the session runs until
    /// [`stop`](Self::stop). Starting while another session is active
    /// is an error.
    pub fn start_realtime(&self) -> SimResult<()> {
        let mut session = self.session.lock();
        if !matches!(*session, Session::Idle) {
            return Err(SimError::AlreadyRunning);
        }
        self.canceled.store(false, Ordering::SeqCst);

        let sink = self.sink.clone();
        let plc_count = self.plc_count;
        let anomaly_factor = self.anomaly_factor;

        let timer = scheduler::schedule_repeating(self.interval, move || {
            let sink = sink.clone();
            async move {
                let timestamp = Utc::now();
                let mut rng = rand::thread_rng();
                for plc_id in 0..plc_count {
                    let reading = generate_reading(plc_id, timestamp, anomaly_factor, &mut rng);
                    debug!(
                        "publishing sensor reading: plc_id={plc_id} phase={} anomaly={}",
                        reading.phase, reading.anomaly
                    );
                    sink.publish(ClusterEvent::Sensor(reading));
                }
            }
        });

        *session = Session::RealTime(timer);
        info!("real-time generation started: plc_count={plc_count}");
        Ok(())
    }

    /// Stop the active session.
    ///
    /// Halts the real-time timer immediately. A historical walk is
    /// flagged and breaks at its next step; the slot stays occupied
    /// until the walk has actually drained, so a new session started
    /// right after `stop` returns may still see [`AlreadyRunning`]
    /// for one pacing interval.
    ///
    /// Stopping an idle generator is an error.
    ///
    /// [`AlreadyRunning`]: SimError::AlreadyRunning
    pub fn stop(&self) -> SimResult<()> {
        let mut session = self.session.lock();
        match &*session {
            Session::Idle => Err(SimError::NotRunning),
            Session::Historical => {
                // Only the walk itself moves the slot back to Idle;
                // releasing it here would let a new session reset the
                // flag before the paced loop observes it.
                self.canceled.store(true, Ordering::SeqCst);
                info!("historical generation stopping");
                Ok(())
            }
            Session::RealTime(_) => {
                if let Session::RealTime(timer) =
                    std::mem::replace(&mut *session, Session::Idle)
                {
                    timer.cancel();
                }
                info!("real-time generation stopped");
                Ok(())
            }
        }
    }

    fn begin_session(&self, session: Session) -> SimResult<()> {
        let mut current = self.session.lock();
        if !matches!(*current, Session::Idle) {
            return Err(SimError::AlreadyRunning);
        }
        self.canceled.store(false, Ordering::SeqCst);
        *current = session;
        Ok(())
    }
}

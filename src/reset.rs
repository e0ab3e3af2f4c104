//! Reset and reinitialization sequencer.
//!
//! Drives the hardware reset line, then replays the entire shadow
//! configuration onto the hub in a fixed order. Replay is best-effort: a
//! failed step is recorded and the sequence continues, so a non-zero
//! result means "partially restored, re-verify critical settings", not
//! "nothing was restored".

use crate::error::{HubError, TransportError};
use crate::gateway::{Hub, Locked};
use crate::power::{BootState, SleepOnDrop, SuspendRelease};
use crate::registers::*;
use crate::transport::{EventKind, EventSink, Platform, RegisterTransport};
use crate::Result;
use std::sync::PoisonError;
use std::time::Duration;

/// Record a replay step failure without aborting the sequence.
fn note(last: &mut Result<()>, result: std::result::Result<(), TransportError>) {
    if let Err(err) = result {
        log::error!("replay step failed: {}", err);
        *last = Err(err.into());
    }
}

impl<T, P, S> Hub<T, P, S>
where
    T: RegisterTransport,
    P: Platform,
    S: EventSink,
{
    /// Toggle the hub's reset line: settle, assert, settle, de-assert,
    /// then hold for the fixed post-reset delay.
    fn pulse_reset(&self, settle_ms: u32) {
        log::warn!("hub reset");
        self.platform.sleep(Duration::from_millis(u64::from(settle_ms)));
        self.platform.set_reset_line(true);
        self.platform.sleep(Duration::from_millis(u64::from(settle_ms)));
        self.platform.set_reset_line(false);
        self.platform
            .sleep(Duration::from_millis(POST_RESET_DELAY_MS));
    }

    /// Reset the hub and replay the shadow configuration onto it.
    ///
    /// Runs under the same serialization lock as every locked operation,
    /// with a reset-scoped suspend inhibitor held for the duration.
    /// Returns the last step failure, if any.
    ///
    /// The reset line is pulsed twice in direct succession; kept as
    /// observed on hardware pending confirmation that a single pulse is
    /// sufficient.
    pub fn reset_and_init(&self) -> Result<()> {
        log::debug!("reset and reinit");

        let mut scratch: Vec<u8> = Vec::new();
        scratch
            .try_reserve_exact(TX_PAYLOAD_MAX)
            .map_err(|_| HubError::OutOfMemory)?;

        let mut lk = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        self.pulse_reset(lk.retry_delay);

        self.platform.inhibit_suspend();
        let _suspend = SuspendRelease::new(&self.platform);

        self.pulse_reset(lk.retry_delay);

        // The hub needs longer to become ready for the very first write
        // after reset; drop back to the fast delay once it has answered.
        lk.retry_delay = RETRY_DELAY_SLOW;
        lk.transport.set_retry_delay(RETRY_DELAY_SLOW);

        self.power.wake(&self.platform);
        let _sleeper = SleepOnDrop {
            platform: &self.platform,
            power: &self.power,
        };

        let mut last = Ok(());
        let Locked {
            transport,
            shadow,
            retry_delay,
        } = &mut *lk;

        scratch.clear();
        scratch.push(shadow.accel_delay as u8);
        note(
            &mut last,
            transport.write_register(ACCEL_UPDATE_RATE, &scratch),
        );

        *retry_delay = RETRY_DELAY_FAST;
        transport.set_retry_delay(RETRY_DELAY_FAST);

        scratch.clear();
        scratch.extend_from_slice(&pack_mask24(shadow.nonwake_sensors.bits()));
        note(
            &mut last,
            transport.write_register(NONWAKESENSOR_CONFIG, &scratch),
        );

        // Only the low 16 bits of the wake mask are replayed here, unlike
        // the 3-byte form the live set/get path uses. Wire format kept as
        // observed pending hardware-owner confirmation.
        scratch.clear();
        scratch.extend_from_slice(&pack_mask16(shadow.wake_sensors.bits() as u16));
        note(
            &mut last,
            transport.write_register(WAKESENSOR_CONFIG, &scratch),
        );

        scratch.clear();
        scratch.extend_from_slice(&pack_mask16(shadow.algos.bits()));
        note(&mut last, transport.write_register(ALGO_CONFIG, &scratch));

        note(
            &mut last,
            transport.write_register(MOTION_DUR, &[shadow.motion_dur]),
        );
        note(
            &mut last,
            transport.write_register(ZRMOTION_DUR, &[shadow.zmotion_dur]),
        );

        for (info, request) in crate::algo::ALGO_INFO.iter().zip(shadow.algo_requests.iter()) {
            if request.is_empty() {
                continue;
            }
            scratch.clear();
            scratch.extend_from_slice(request.as_bytes());
            note(
                &mut last,
                transport.write_register(info.req_register, &scratch),
            );
        }

        // Status-clearing reads; stale state from before the reset is
        // discarded and read failures are not recorded.
        let _ = transport.read_register(INTERRUPT_STATUS, INTERRUPT_STATUS_SIZE);
        let _ = transport.read_register(WAKESENSOR_STATUS, WAKESENSOR_STATUS_SIZE);

        scratch.clear();
        scratch.extend_from_slice(&self.config.prox_detect_threshold.to_be_bytes());
        scratch.extend_from_slice(&self.config.prox_undetect_threshold.to_be_bytes());
        scratch.extend_from_slice(&self.config.prox_recalibrate_threshold.to_be_bytes());
        scratch.push(self.config.prox_pulse_count);
        if let Err(err) = transport.write_register(PROX_SETTINGS, &scratch) {
            log::error!("unable to write proximity settings: {}", err);
            last = Err(err.into());
        }

        self.boot.store(BootState::Normal);
        self.sink.notify(EventKind::Reset, &[], self.now_ns());

        last
    }
}

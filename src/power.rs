//! Power and boot-state primitives: the boot-state cell read without the
//! serialization lock, the low-power sleep policy, and the RAII guards the
//! gateway and sequencer use to keep release paths honest.

use crate::registers::WAKE_SETTLE_US;
use crate::transport::Platform;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

/// Where the hub currently is in its lifecycle.
///
/// While `Unbooted`, configuration writes update the shadow only and
/// configuration reads are synthesized from the shadow. Transitions happen
/// only through explicit mode switches or the reset sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BootState {
    Unbooted = 0,
    Normal = 1,
    Bootloader = 2,
    Factory = 3,
}

/// Boot state holder. A single atomic so immediate operations can observe
/// it without taking the serialization lock.
pub(crate) struct BootCell(AtomicU8);

impl BootCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(BootState::Unbooted as u8))
    }

    pub fn load(&self) -> BootState {
        match self.0.load(Ordering::Acquire) {
            1 => BootState::Normal,
            2 => BootState::Bootloader,
            3 => BootState::Factory,
            _ => BootState::Unbooted,
        }
    }

    pub fn store(&self, state: BootState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// The single gating check every boot-conditional branch goes through.
    pub fn is_booted(&self) -> bool {
        self.load() == BootState::Normal
    }
}

/// Low-power sleep policy plus the wake-line choreography around it.
///
/// With low power enabled (the default) the hub is woken for each
/// operation and allowed back to sleep afterwards. With it disabled the
/// wake line stays asserted and the per-operation calls are no-ops.
pub(crate) struct PowerControl {
    low_power: AtomicBool,
}

impl PowerControl {
    pub fn new() -> Self {
        Self {
            low_power: AtomicBool::new(true),
        }
    }

    pub fn is_low_power(&self) -> bool {
        self.low_power.load(Ordering::Acquire)
    }

    pub fn set_low_power(&self, enabled: bool) {
        self.low_power.store(enabled, Ordering::Release);
    }

    /// Wake the hub ahead of an operation, if the sleep policy allows it
    /// to be asleep at all.
    pub fn wake<P: Platform>(&self, platform: &P) {
        if self.is_low_power() {
            platform.set_wake_line(true);
            platform.sleep(Duration::from_micros(WAKE_SETTLE_US));
        }
    }

    /// Let the hub go back to sleep after an operation.
    pub fn sleep<P: Platform>(&self, platform: &P) {
        if self.is_low_power() {
            platform.set_wake_line(false);
        }
    }

    /// Unconditional wake, used on the low-power-mode falling edge where
    /// the policy flag has already flipped.
    pub fn force_wake<P: Platform>(&self, platform: &P) {
        platform.set_wake_line(true);
        platform.sleep(Duration::from_micros(WAKE_SETTLE_US));
    }

    /// Unconditional sleep, the rising-edge counterpart.
    pub fn force_sleep<P: Platform>(&self, platform: &P) {
        platform.set_wake_line(false);
    }
}

/// Releases the system-suspend inhibitor when dropped. Declared last in
/// any guard bundle so the inhibitor outlives the lock it protects.
pub(crate) struct SuspendRelease<'a, P: Platform>(&'a P);

impl<'a, P: Platform> SuspendRelease<'a, P> {
    /// Takes ownership of an inhibit the caller already acquired.
    pub fn new(platform: &'a P) -> Self {
        Self(platform)
    }
}

impl<P: Platform> Drop for SuspendRelease<'_, P> {
    fn drop(&mut self) {
        self.0.release_suspend();
    }
}

/// Lets the hub sleep when dropped. Declared first in a guard bundle so
/// the sleep signal goes out while the serialization lock is still held.
pub(crate) struct SleepOnDrop<'a, P: Platform> {
    pub platform: &'a P,
    pub power: &'a PowerControl,
}

impl<P: Platform> Drop for SleepOnDrop<'_, P> {
    fn drop(&mut self) {
        self.power.sleep(self.platform);
    }
}

//! Command gateway: validates and dispatches every host-issued
//! configuration/query operation against the shadow configuration store,
//! serialized behind a single lock and bracketed by hub wake/sleep.
//!
//! Operation payloads are byte-exact with the deployed caller ABI; see the
//! layout notes on [`OpCode`].

use crate::algo::{ALGO_INFO, ALGO_REQUEST_MAX, NUM_ALGOS};
use crate::error::{HubError, TransportError};
use crate::power::{BootCell, BootState, PowerControl, SleepOnDrop, SuspendRelease};
use crate::registers::*;
use crate::shadow::{AlgoMask, SensorMask, ShadowConfig};
use crate::transport::{EventKind, EventSink, HubMode, Platform, PlatformConfig, RegisterTransport};
use crate::Result;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Operation codes accepted by [`Hub::execute`].
///
/// Payload layouts (all fixed, little-endian unless noted):
/// - delays: 2-byte u16; durations: 4-byte u32, low byte used
/// - sensor masks: 3 bytes LSB-first; algorithm mask: 2 bytes LSB-first
/// - `SetAlgoRequest`: `[idx_lo, idx_hi, len, data[len]]`
/// - `GetAlgoEvent`: `[idx_lo, idx_hi]`
/// - `WriteRegister`/`ReadRegister`: `[addr_hi, addr_lo, size_hi, size_lo]`
///   header (big-endian), write data following
/// - `Passthrough`: `[bus, addr, reg, reserved, rw, size]` header, write
///   data following
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    GetBooted,
    GetFirmwareVersion,
    GetHubVersion,
    EnterBootloader,
    EnterNormal,
    EnterFactory,
    MassErase,
    SetStartAddress,
    SetDebug,
    SetAccelDelay,
    GetAccelDelay,
    SetAccel2Delay,
    GetAccel2Delay,
    SetGyroDelay,
    GetGyroDelay,
    SetAlsDelay,
    GetAlsDelay,
    SetNonWakeSensors,
    GetNonWakeSensors,
    SetWakeSensors,
    GetWakeSensors,
    SetAlgos,
    GetAlgos,
    SetMotionDuration,
    SetZeroMotionDuration,
    GetDockStatus,
    TestRead,
    TestWrite,
    SetAlgoRequest,
    GetAlgoEvent,
    WriteRegister,
    ReadRegister,
    Passthrough,
    SetLowPowerMode,
    SetFlush,
    GetGyroCal,
    SetGyroCal,
}

/// State owned by the serialization lock: the transport handle, the shadow
/// configuration, and the transport retry delay currently in effect.
pub(crate) struct Locked<T> {
    pub transport: T,
    pub shadow: ShadowConfig,
    pub retry_delay: u32,
}

/// Scoped token for one in-flight locked operation.
///
/// Holds the suspend inhibitor and the serialization lock, with the hub
/// awake. Field order is drop order: sleep signal while still locked,
/// then unlock, then release the inhibitor.
pub(crate) struct PowerLease<'a, T, P: Platform> {
    _sleeper: SleepOnDrop<'a, P>,
    guard: MutexGuard<'a, Locked<T>>,
    _release: SuspendRelease<'a, P>,
}

impl<'a, T, P: Platform> Deref for PowerLease<'a, T, P> {
    type Target = Locked<T>;

    fn deref(&self) -> &Locked<T> {
        &self.guard
    }
}

impl<'a, T, P: Platform> DerefMut for PowerLease<'a, T, P> {
    fn deref_mut(&mut self) -> &mut Locked<T> {
        &mut self.guard
    }
}

/// The hub driver context. Created once at attach, passed by reference;
/// owns the shadow configuration and the single serialization lock.
///
/// Callers blocking on the lock block indefinitely; hub operations are
/// expected to be fast and bounded by the transport's own timeouts, so no
/// timeout is applied at this layer.
pub struct Hub<T, P, S> {
    pub(crate) inner: Mutex<Locked<T>>,
    pub(crate) platform: P,
    pub(crate) sink: S,
    pub(crate) config: PlatformConfig,
    pub(crate) boot: BootCell,
    pub(crate) power: PowerControl,
    epoch: Instant,
}

impl<T, P, S> Hub<T, P, S>
where
    T: RegisterTransport,
    P: Platform,
    S: EventSink,
{
    /// Attach the driver to a hub.
    pub fn attach(transport: T, platform: P, sink: S, config: PlatformConfig) -> Self {
        Self {
            inner: Mutex::new(Locked {
                transport,
                shadow: ShadowConfig::default(),
                retry_delay: RETRY_DELAY_FAST,
            }),
            platform,
            sink,
            config,
            boot: BootCell::new(),
            power: PowerControl::new(),
            epoch: Instant::now(),
        }
    }

    pub fn boot_state(&self) -> BootState {
        self.boot.load()
    }

    pub fn is_booted(&self) -> bool {
        self.boot.is_booted()
    }

    pub fn firmware_version(&self) -> &str {
        &self.config.fw_version
    }

    /// Monotonic nanoseconds since attach, used to timestamp events.
    pub(crate) fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Execute one operation against the hub and the shadow configuration.
    ///
    /// Immediate operations (boot query, firmware version) answer without
    /// taking the lock; everything else runs under a [`PowerLease`].
    pub fn execute(&self, op: OpCode, input: &[u8]) -> Result<Vec<u8>> {
        log::debug!("execute {:?} ({} bytes in)", op, input.len());

        match op {
            OpCode::GetBooted => return Ok(vec![u8::from(self.is_booted())]),
            OpCode::GetFirmwareVersion => {
                return Ok(self.config.fw_version.as_bytes().to_vec());
            }
            OpCode::GetHubVersion if !self.is_booted() => return Err(HubError::Busy),
            _ => {}
        }

        let mut lease = self.lease();
        let result = self.dispatch(op, input, &mut lease);
        if let Err(ref err) = result {
            log::error!("{:?} failed: {}", op, err);
        }
        result
    }

    /// Acquire the per-operation lease: suspend inhibitor, then the lock,
    /// then wake the hub. Drop order undoes all three on every exit path.
    pub(crate) fn lease(&self) -> PowerLease<'_, T, P> {
        self.platform.inhibit_suspend();
        let release = SuspendRelease::new(&self.platform);
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        self.power.wake(&self.platform);
        PowerLease {
            _sleeper: SleepOnDrop {
                platform: &self.platform,
                power: &self.power,
            },
            guard,
            _release: release,
        }
    }

    fn dispatch(&self, op: OpCode, input: &[u8], lk: &mut Locked<T>) -> Result<Vec<u8>> {
        match op {
            OpCode::EnterBootloader => {
                lk.transport.switch_mode(HubMode::Bootloader)?;
                self.boot.store(BootState::Bootloader);
                Ok(Vec::new())
            }
            OpCode::EnterNormal => {
                lk.transport.switch_mode(HubMode::Normal)?;
                self.boot.store(BootState::Normal);
                Ok(Vec::new())
            }
            OpCode::EnterFactory => {
                lk.transport.switch_mode(HubMode::Factory)?;
                self.boot.store(BootState::Factory);
                Ok(Vec::new())
            }
            OpCode::MassErase => {
                lk.transport.erase_flash()?;
                Ok(Vec::new())
            }
            OpCode::SetStartAddress => {
                let addr = Self::u32_arg(input, "start address must be 4 bytes")?;
                lk.shadow.current_addr = addr;
                Ok(Vec::new())
            }
            // Accepted for caller compatibility; debug verbosity is the
            // log facade's job now.
            OpCode::SetDebug => Ok(Vec::new()),
            OpCode::GetHubVersion => {
                if !self.is_booted() {
                    return Err(HubError::Busy);
                }
                let rev = lk.transport.read_register(REV_ID, 1)?;
                log::debug!("hub revision {:02x?}", rev);
                Ok(rev)
            }
            OpCode::SetAccelDelay | OpCode::SetAccel2Delay | OpCode::SetGyroDelay => {
                let delay = Self::u16_arg(input, "delay must be 2 bytes")?;
                let reg = match op {
                    OpCode::SetAccelDelay => {
                        lk.shadow.accel_delay = delay;
                        ACCEL_UPDATE_RATE
                    }
                    OpCode::SetAccel2Delay => {
                        lk.shadow.accel2_delay = delay;
                        ACCEL2_UPDATE_RATE
                    }
                    _ => {
                        lk.shadow.gyro_delay = delay;
                        GYRO_UPDATE_RATE
                    }
                };
                if self.is_booted() {
                    lk.transport.write_register(reg, &[delay as u8])?;
                }
                Ok(Vec::new())
            }
            OpCode::SetAlsDelay => {
                let delay = Self::u16_arg(input, "delay must be 2 bytes")?;
                lk.shadow.als_delay = delay;
                if self.is_booted() {
                    // Big-endian on the wire, unlike every other field.
                    lk.transport
                        .write_register(ALS_UPDATE_RATE, &[(delay >> 8) as u8, delay as u8])?;
                }
                Ok(Vec::new())
            }
            OpCode::GetAccelDelay => Ok(lk.shadow.accel_delay.to_le_bytes().to_vec()),
            OpCode::GetAccel2Delay => Ok(lk.shadow.accel2_delay.to_le_bytes().to_vec()),
            OpCode::GetGyroDelay => Ok(lk.shadow.gyro_delay.to_le_bytes().to_vec()),
            OpCode::GetAlsDelay => Ok(lk.shadow.als_delay.to_le_bytes().to_vec()),
            OpCode::SetNonWakeSensors => {
                Self::require_len(input, 3, "sensor mask must be 3 bytes")?;
                lk.shadow.nonwake_sensors = SensorMask::from_bits_retain(unpack_mask24(input));
                log::debug!("sensor enable = 0x{:06x}", lk.shadow.nonwake_sensors.bits());
                if self.is_booted() {
                    lk.transport.write_register(NONWAKESENSOR_CONFIG, input)?;
                }
                Ok(Vec::new())
            }
            OpCode::GetNonWakeSensors => {
                if self.is_booted() {
                    Ok(lk.transport.read_register(NONWAKESENSOR_CONFIG, 3)?)
                } else {
                    Ok(pack_mask24(lk.shadow.nonwake_sensors.bits()).to_vec())
                }
            }
            OpCode::SetWakeSensors => {
                Self::require_len(input, 3, "sensor mask must be 3 bytes")?;
                lk.shadow.wake_sensors = SensorMask::from_bits_retain(unpack_mask24(input));
                log::debug!("wake sensor enable = 0x{:06x}", lk.shadow.wake_sensors.bits());
                if self.is_booted() {
                    lk.transport.write_register(WAKESENSOR_CONFIG, input)?;
                }
                Ok(Vec::new())
            }
            OpCode::GetWakeSensors => {
                if self.is_booted() {
                    Ok(lk.transport.read_register(WAKESENSOR_CONFIG, 3)?)
                } else {
                    Ok(pack_mask24(lk.shadow.wake_sensors.bits()).to_vec())
                }
            }
            OpCode::SetAlgos => {
                Self::require_len(input, 2, "algorithm mask must be 2 bytes")?;
                lk.shadow.algos = AlgoMask::from_bits_retain(unpack_mask16(input));
                log::debug!("algo enable = 0x{:04x}", lk.shadow.algos.bits());
                if self.is_booted() {
                    lk.transport.write_register(ALGO_CONFIG, input)?;
                }
                Ok(Vec::new())
            }
            OpCode::GetAlgos => {
                if self.is_booted() {
                    Ok(lk.transport.read_register(ALGO_CONFIG, 2)?)
                } else {
                    Ok(pack_mask16(lk.shadow.algos.bits()).to_vec())
                }
            }
            OpCode::SetMotionDuration => {
                let duration = Self::u32_arg(input, "duration must be 4 bytes")? as u8;
                lk.shadow.motion_dur = duration;
                if self.is_booted() {
                    lk.transport.write_register(MOTION_DUR, &[duration])?;
                }
                Ok(Vec::new())
            }
            OpCode::SetZeroMotionDuration => {
                let duration = Self::u32_arg(input, "duration must be 4 bytes")? as u8;
                lk.shadow.zmotion_dur = duration;
                if self.is_booted() {
                    lk.transport.write_register(ZRMOTION_DUR, &[duration])?;
                }
                Ok(Vec::new())
            }
            OpCode::GetDockStatus => {
                if self.is_booted() {
                    Ok(lk.transport.read_register(DOCKED_DATA, 1)?)
                } else {
                    Ok(vec![0])
                }
            }
            OpCode::TestRead => {
                if self.is_booted() {
                    Ok(lk.transport.raw_read(1)?)
                } else {
                    Ok(Vec::new())
                }
            }
            OpCode::TestWrite => {
                Self::require_len(input, 1, "test write takes 1 byte")?;
                if !self.is_booted() {
                    return Err(HubError::Busy);
                }
                lk.transport.raw_write(input)?;
                Ok(Vec::new())
            }
            OpCode::SetAlgoRequest => self.set_algo_request(input, lk),
            OpCode::GetAlgoEvent => self.get_algo_event(input, lk),
            OpCode::WriteRegister => self.write_register_op(input, lk),
            OpCode::ReadRegister => self.read_register_op(input, lk),
            OpCode::Passthrough => self.passthrough(input, lk),
            OpCode::SetLowPowerMode => {
                Self::require_len(input, 1, "low power mode takes 1 byte")?;
                if !self.is_booted() {
                    return Err(HubError::Busy);
                }
                let requested = input[0] != 0;
                if requested && !self.power.is_low_power() {
                    self.power.set_low_power(true);
                    // Allow the hub to sleep again.
                    self.power.force_sleep(&self.platform);
                } else if !requested && self.power.is_low_power() {
                    self.power.set_low_power(false);
                    // Keep the hub awake from here on.
                    self.power.force_wake(&self.platform);
                }
                Ok(Vec::new())
            }
            OpCode::SetFlush => {
                let handle = Self::u32_arg(input, "flush handle must be 4 bytes")?;
                if self.is_booted() {
                    self.sink
                        .notify(EventKind::Flush, &handle.to_be_bytes(), self.now_ns());
                }
                Ok(Vec::new())
            }
            OpCode::GetGyroCal => {
                if self.is_booted() {
                    let first = lk.transport.read_register(GYRO_CAL, GYRO_CAL_FIRST)?;
                    let second = lk.transport.read_register(GYRO_CAL_2, GYRO_CAL_SECOND)?;
                    if first.len() != GYRO_CAL_FIRST || second.len() != GYRO_CAL_SECOND {
                        return Err(TransportError::Bus("short gyro cal read".into()).into());
                    }
                    lk.shadow.gyro_cal[..GYRO_CAL_FIRST].copy_from_slice(&first);
                    lk.shadow.gyro_cal[GYRO_CAL_FIRST..].copy_from_slice(&second);
                }
                Ok(lk.shadow.gyro_cal.to_vec())
            }
            OpCode::SetGyroCal => {
                Self::require_len(input, GYRO_CAL_SIZE, "gyro cal blob size mismatch")?;
                lk.shadow.gyro_cal.copy_from_slice(input);
                if self.is_booted() {
                    lk.transport
                        .write_register(GYRO_CAL, &input[..GYRO_CAL_FIRST])?;
                    lk.transport
                        .write_register(GYRO_CAL_2, &input[GYRO_CAL_FIRST..])?;
                }
                Ok(Vec::new())
            }
            // Immediate operations never reach the locked dispatcher.
            OpCode::GetBooted | OpCode::GetFirmwareVersion => unreachable!(),
        }
    }

    fn set_algo_request(&self, input: &[u8], lk: &mut Locked<T>) -> Result<Vec<u8>> {
        if input.len() < 3 {
            return Err(HubError::InvalidArgument("algo request header is 3 bytes"));
        }
        let idx = usize::from(u16::from_le_bytes([input[0], input[1]]));
        let len = usize::from(input[2]);
        if idx >= NUM_ALGOS {
            return Err(HubError::InvalidArgument("algo index out of range"));
        }
        if len > ALGO_REQUEST_MAX {
            return Err(HubError::InvalidArgument("algo request too large"));
        }
        if input.len() != 3 + len {
            return Err(HubError::InvalidArgument("algo request length mismatch"));
        }
        let data = &input[3..];
        log::debug!("algo request idx {} len {}", idx, len);
        lk.shadow.algo_requests[idx].set(data);
        if self.is_booted() {
            lk.transport
                .write_register(ALGO_INFO[idx].req_register, data)?;
        }
        Ok(Vec::new())
    }

    fn get_algo_event(&self, input: &[u8], lk: &mut Locked<T>) -> Result<Vec<u8>> {
        Self::require_len(input, 2, "algo event header is 2 bytes")?;
        let idx = usize::from(u16::from_le_bytes([input[0], input[1]]));
        if idx >= NUM_ALGOS {
            return Err(HubError::InvalidArgument("algo index out of range"));
        }
        if !self.is_booted() {
            return Err(HubError::Busy);
        }
        let info = &ALGO_INFO[idx];
        let data = lk.transport.read_register(info.evt_register, info.evt_size)?;
        let mut out = Vec::with_capacity(2 + data.len());
        out.extend_from_slice(input);
        out.extend_from_slice(&data);
        Ok(out)
    }

    fn write_register_op(&self, input: &[u8], lk: &mut Locked<T>) -> Result<Vec<u8>> {
        if input.len() < 4 {
            return Err(HubError::InvalidArgument("register header is 4 bytes"));
        }
        let addr = u16::from_be_bytes([input[0], input[1]]);
        let data_size = usize::from(u16::from_be_bytes([input[2], input[3]]));
        if data_size > lk.transport.max_write_len() {
            return Err(HubError::InvalidArgument("write size exceeds transport limit"));
        }
        if input.len() != 4 + data_size {
            return Err(HubError::InvalidArgument("write data length mismatch"));
        }
        if !self.is_booted() {
            return Err(HubError::Busy);
        }
        lk.transport.write_register(addr, &input[4..])?;
        Ok(Vec::new())
    }

    fn read_register_op(&self, input: &[u8], lk: &mut Locked<T>) -> Result<Vec<u8>> {
        Self::require_len(input, 4, "register header is 4 bytes")?;
        let addr = u16::from_be_bytes([input[0], input[1]]);
        let data_size = usize::from(u16::from_be_bytes([input[2], input[3]]));
        if data_size > lk.transport.max_read_len() {
            return Err(HubError::InvalidArgument("read size exceeds transport limit"));
        }
        if !self.is_booted() {
            return Err(HubError::Busy);
        }
        Ok(lk.transport.read_register(addr, data_size)?)
    }

    /// Bridge one transaction to a device behind the hub. The command
    /// frame is written whole; the response register is polled a bounded
    /// number of times with no delay, and the first byte must read exactly
    /// 1 before the payload is trusted.
    fn passthrough(&self, input: &[u8], lk: &mut Locked<T>) -> Result<Vec<u8>> {
        if input.len() < PASSTHROUGH_HEADER_SIZE {
            return Err(HubError::InvalidArgument("passthrough header is 6 bytes"));
        }
        let read_write = input[4];
        let data_size = usize::from(input[5]);

        let mut frame = vec![0u8; PASSTHROUGH_FRAME_SIZE];
        frame[..PASSTHROUGH_HEADER_SIZE].copy_from_slice(&input[..PASSTHROUGH_HEADER_SIZE]);
        match read_write {
            0 => {
                // One byte of the response frame is reserved for status.
                if data_size > PASSTHROUGH_FRAME_SIZE - 1 {
                    return Err(HubError::InvalidArgument("passthrough read too large"));
                }
            }
            1 => {
                if data_size > PASSTHROUGH_FRAME_SIZE - PASSTHROUGH_HEADER_SIZE {
                    return Err(HubError::InvalidArgument("passthrough write too large"));
                }
                if input.len() != PASSTHROUGH_HEADER_SIZE + data_size {
                    return Err(HubError::InvalidArgument("passthrough data length mismatch"));
                }
                frame[PASSTHROUGH_HEADER_SIZE..PASSTHROUGH_HEADER_SIZE + data_size]
                    .copy_from_slice(&input[PASSTHROUGH_HEADER_SIZE..]);
            }
            _ => return Err(HubError::InvalidArgument("passthrough r/w flag must be 0 or 1")),
        }
        if !self.is_booted() {
            return Err(HubError::Busy);
        }

        lk.transport
            .write_register(I2C_PASSTHROUGH_COMMAND, &frame)?;

        let mut status = 0u8;
        let mut response = Vec::new();
        for _ in 0..PASSTHROUGH_POLL_LIMIT {
            response = lk
                .transport
                .read_register(I2C_PASSTHROUGH_RESPONSE, PASSTHROUGH_FRAME_SIZE)?;
            status = response.first().copied().unwrap_or(0);
            if status != 0 {
                break;
            }
        }
        if status != 1 {
            log::error!("passthrough response status {}", status);
            return Err(TransportError::BadStatus(status).into());
        }

        if read_write == 0 {
            let data = response
                .get(1..1 + data_size)
                .ok_or_else(|| TransportError::Bus("short passthrough response".into()))?;
            Ok(data.to_vec())
        } else {
            Ok(Vec::new())
        }
    }

    fn require_len(input: &[u8], expected: usize, what: &'static str) -> Result<()> {
        if input.len() != expected {
            return Err(HubError::InvalidArgument(what));
        }
        Ok(())
    }

    fn u16_arg(input: &[u8], what: &'static str) -> Result<u16> {
        Self::require_len(input, 2, what)?;
        Ok(u16::from_le_bytes([input[0], input[1]]))
    }

    fn u32_arg(input: &[u8], what: &'static str) -> Result<u32> {
        Self::require_len(input, 4, what)?;
        Ok(u32::from_le_bytes([input[0], input[1], input[2], input[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockPlatform, MockSink, MockTransport};
    use std::collections::VecDeque;

    type TestHub = Hub<MockTransport, MockPlatform, MockSink>;

    fn new_hub() -> (
        TestHub,
        std::sync::Arc<std::sync::Mutex<crate::transport::mock::MockState>>,
        std::sync::Arc<std::sync::Mutex<crate::transport::mock::PlatformLog>>,
        MockSink,
    ) {
        let transport = MockTransport::new();
        let tstate = transport.handle();
        let platform = MockPlatform::new();
        let plog = platform.handle();
        let sink = MockSink::new();
        let config = PlatformConfig {
            fw_version: "L0.35.1".into(),
            ..Default::default()
        };
        let hub = Hub::attach(transport, platform, sink.clone(), config);
        (hub, tstate, plog, sink)
    }

    fn boot(hub: &TestHub) {
        hub.execute(OpCode::EnterNormal, &[]).unwrap();
        assert!(hub.is_booted());
    }

    #[test]
    fn get_booted_reports_boot_state() {
        let (hub, _t, _p, _s) = new_hub();
        assert_eq!(hub.execute(OpCode::GetBooted, &[]).unwrap(), vec![0]);
        boot(&hub);
        assert_eq!(hub.execute(OpCode::GetBooted, &[]).unwrap(), vec![1]);
    }

    #[test]
    fn firmware_version_is_always_available() {
        let (hub, t, _p, _s) = new_hub();
        let out = hub.execute(OpCode::GetFirmwareVersion, &[]).unwrap();
        assert_eq!(out, b"L0.35.1".to_vec());
        // Immediate: no transport traffic, no lock taken.
        assert!(t.lock().unwrap().writes.is_empty());
        assert!(t.lock().unwrap().reads.is_empty());
    }

    #[test]
    fn hub_version_is_busy_until_booted() {
        let (hub, t, _p, _s) = new_hub();
        assert_eq!(
            hub.execute(OpCode::GetHubVersion, &[]),
            Err(HubError::Busy)
        );
        boot(&hub);
        t.lock()
            .unwrap()
            .read_queue
            .entry(REV_ID)
            .or_insert_with(VecDeque::new)
            .push_back(vec![0x4A]);
        assert_eq!(hub.execute(OpCode::GetHubVersion, &[]).unwrap(), vec![0x4A]);
    }

    #[test]
    fn set_delay_round_trips_through_shadow_while_unbooted() {
        let (hub, t, _p, _s) = new_hub();
        for (set, get) in [
            (OpCode::SetAccelDelay, OpCode::GetAccelDelay),
            (OpCode::SetAccel2Delay, OpCode::GetAccel2Delay),
            (OpCode::SetGyroDelay, OpCode::GetGyroDelay),
            (OpCode::SetAlsDelay, OpCode::GetAlsDelay),
        ] {
            hub.execute(set, &0x1234u16.to_le_bytes()).unwrap();
            assert_eq!(hub.execute(get, &[]).unwrap(), 0x1234u16.to_le_bytes());
        }
        assert!(t.lock().unwrap().writes.is_empty());
    }

    #[test]
    fn booted_delay_set_writes_low_byte() {
        let (hub, t, _p, _s) = new_hub();
        boot(&hub);
        hub.execute(OpCode::SetAccelDelay, &0x0205u16.to_le_bytes())
            .unwrap();
        let state = t.lock().unwrap();
        assert_eq!(
            state.writes.last().unwrap(),
            &(ACCEL_UPDATE_RATE, vec![0x05])
        );
    }

    #[test]
    fn als_delay_is_big_endian_on_the_wire() {
        let (hub, t, _p, _s) = new_hub();
        boot(&hub);
        hub.execute(OpCode::SetAlsDelay, &0x1234u16.to_le_bytes())
            .unwrap();
        let state = t.lock().unwrap();
        assert_eq!(
            state.writes.last().unwrap(),
            &(ALS_UPDATE_RATE, vec![0x12, 0x34])
        );
    }

    #[test]
    fn sensor_mask_round_trips_while_unbooted() {
        let (hub, t, _p, _s) = new_hub();
        hub.execute(OpCode::SetNonWakeSensors, &[0x01, 0x02, 0x03])
            .unwrap();
        assert_eq!(
            hub.execute(OpCode::GetNonWakeSensors, &[]).unwrap(),
            vec![0x01, 0x02, 0x03]
        );
        assert!(t.lock().unwrap().writes.is_empty());
    }

    #[test]
    fn sensor_mask_set_writes_through_when_booted() {
        let (hub, t, _p, _s) = new_hub();
        boot(&hub);
        hub.execute(OpCode::SetWakeSensors, &[0xAA, 0xBB, 0x0C])
            .unwrap();
        let state = t.lock().unwrap();
        assert_eq!(
            state.writes.last().unwrap(),
            &(WAKESENSOR_CONFIG, vec![0xAA, 0xBB, 0x0C])
        );
    }

    #[test]
    fn sensor_mask_get_queries_hub_when_booted() {
        let (hub, t, _p, _s) = new_hub();
        boot(&hub);
        t.lock()
            .unwrap()
            .read_queue
            .entry(NONWAKESENSOR_CONFIG)
            .or_insert_with(VecDeque::new)
            .push_back(vec![9, 8, 7]);
        assert_eq!(
            hub.execute(OpCode::GetNonWakeSensors, &[]).unwrap(),
            vec![9, 8, 7]
        );
    }

    #[test]
    fn algo_mask_round_trips_while_unbooted() {
        let (hub, _t, _p, _s) = new_hub();
        hub.execute(OpCode::SetAlgos, &[0x21, 0x00]).unwrap();
        assert_eq!(hub.execute(OpCode::GetAlgos, &[]).unwrap(), vec![0x21, 0x00]);
    }

    #[test]
    fn wrong_payload_length_is_invalid_argument() {
        let (hub, t, _p, _s) = new_hub();
        for (op, input) in [
            (OpCode::SetAccelDelay, vec![1u8]),
            (OpCode::SetNonWakeSensors, vec![1, 2]),
            (OpCode::SetAlgos, vec![1, 2, 3]),
            (OpCode::SetMotionDuration, vec![1, 2]),
            (OpCode::SetStartAddress, vec![1]),
            (OpCode::SetGyroCal, vec![0; GYRO_CAL_SIZE - 1]),
        ] {
            assert!(matches!(
                hub.execute(op, &input),
                Err(HubError::InvalidArgument(_))
            ));
        }
        assert!(t.lock().unwrap().writes.is_empty());
    }

    #[test]
    fn bad_algo_index_fails_without_side_effects() {
        let (hub, t, _p, _s) = new_hub();
        boot(&hub);
        let before = t.lock().unwrap().writes.len();

        let mut req = vec![NUM_ALGOS as u8, 0, 2, 0xAA, 0xBB];
        assert!(matches!(
            hub.execute(OpCode::SetAlgoRequest, &req),
            Err(HubError::InvalidArgument(_))
        ));
        req.truncate(2);
        assert!(matches!(
            hub.execute(OpCode::GetAlgoEvent, &req),
            Err(HubError::InvalidArgument(_))
        ));

        let state = t.lock().unwrap();
        assert_eq!(state.writes.len(), before);
        assert!(state.reads.is_empty());
        drop(state);
        let lk = hub.inner.lock().unwrap();
        assert!(lk.shadow.algo_requests.iter().all(|r| r.is_empty()));
    }

    #[test]
    fn oversized_algo_request_is_rejected() {
        let (hub, _t, _p, _s) = new_hub();
        let mut input = vec![0, 0, (ALGO_REQUEST_MAX + 1) as u8];
        input.extend(std::iter::repeat(0).take(ALGO_REQUEST_MAX + 1));
        assert!(matches!(
            hub.execute(OpCode::SetAlgoRequest, &input),
            Err(HubError::InvalidArgument(_))
        ));
    }

    #[test]
    fn algo_request_writes_to_descriptor_register() {
        let (hub, t, _p, _s) = new_hub();
        boot(&hub);
        hub.execute(OpCode::SetAlgoRequest, &[1, 0, 3, 0xDE, 0xAD, 0xBF])
            .unwrap();
        let state = t.lock().unwrap();
        assert_eq!(
            state.writes.last().unwrap(),
            &(ALGO_INFO[1].req_register, vec![0xDE, 0xAD, 0xBF])
        );
    }

    #[test]
    fn algo_event_reads_descriptor_sized_payload() {
        let (hub, t, _p, _s) = new_hub();
        boot(&hub);
        t.lock()
            .unwrap()
            .read_queue
            .entry(ALGO_INFO[4].evt_register)
            .or_insert_with(VecDeque::new)
            .push_back(vec![1, 2, 3, 4]);
        let out = hub.execute(OpCode::GetAlgoEvent, &[4, 0]).unwrap();
        assert_eq!(out, vec![4, 0, 1, 2, 3, 4]);
        assert_eq!(
            t.lock().unwrap().reads.last().unwrap(),
            &(ALGO_INFO[4].evt_register, ALGO_INFO[4].evt_size)
        );
    }

    #[test]
    fn algo_event_requires_booted_hub() {
        let (hub, _t, _p, _s) = new_hub();
        assert_eq!(
            hub.execute(OpCode::GetAlgoEvent, &[0, 0]),
            Err(HubError::Busy)
        );
    }

    #[test]
    fn generic_register_ops_validate_size_and_boot() {
        let (hub, t, _p, _s) = new_hub();
        // Oversized write rejected before the boot gate.
        let size = (TX_PAYLOAD_MAX + 1) as u16;
        let mut input = vec![0x00, 0x42];
        input.extend_from_slice(&size.to_be_bytes());
        input.extend(std::iter::repeat(0).take(size as usize));
        assert!(matches!(
            hub.execute(OpCode::WriteRegister, &input),
            Err(HubError::InvalidArgument(_))
        ));

        // In-range sizes fail Busy while unbooted.
        assert_eq!(
            hub.execute(OpCode::WriteRegister, &[0x00, 0x42, 0x00, 0x01, 0x55]),
            Err(HubError::Busy)
        );
        assert_eq!(
            hub.execute(OpCode::ReadRegister, &[0x00, 0x42, 0x00, 0x02]),
            Err(HubError::Busy)
        );

        boot(&hub);
        hub.execute(OpCode::WriteRegister, &[0x00, 0x42, 0x00, 0x01, 0x55])
            .unwrap();
        assert_eq!(
            t.lock().unwrap().writes.last().unwrap(),
            &(0x0042, vec![0x55])
        );
        let out = hub
            .execute(OpCode::ReadRegister, &[0x00, 0x42, 0x00, 0x02])
            .unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_write_requires_booted_hub() {
        let (hub, t, _p, _s) = new_hub();
        assert_eq!(hub.execute(OpCode::TestWrite, &[0x5A]), Err(HubError::Busy));
        boot(&hub);
        hub.execute(OpCode::TestWrite, &[0x5A]).unwrap();
        assert_eq!(t.lock().unwrap().raw_writes, vec![vec![0x5A]]);
    }

    #[test]
    fn test_read_is_empty_while_unbooted() {
        let (hub, t, _p, _s) = new_hub();
        assert!(hub.execute(OpCode::TestRead, &[]).unwrap().is_empty());
        boot(&hub);
        t.lock().unwrap().raw_read_data.push_back(vec![0xA7]);
        assert_eq!(hub.execute(OpCode::TestRead, &[]).unwrap(), vec![0xA7]);
    }

    #[test]
    fn dock_status_is_zero_while_unbooted() {
        let (hub, _t, _p, _s) = new_hub();
        assert_eq!(hub.execute(OpCode::GetDockStatus, &[]).unwrap(), vec![0]);
    }

    fn queue_passthrough_response(
        t: &std::sync::Arc<std::sync::Mutex<crate::transport::mock::MockState>>,
        frames: Vec<Vec<u8>>,
    ) {
        let mut state = t.lock().unwrap();
        let queue = state
            .read_queue
            .entry(I2C_PASSTHROUGH_RESPONSE)
            .or_insert_with(VecDeque::new);
        for frame in frames {
            queue.push_back(frame);
        }
    }

    #[test]
    fn passthrough_gives_up_after_ten_polls() {
        let (hub, t, _p, _s) = new_hub();
        boot(&hub);
        // Default mock reads are all zeros: never ready.
        let result = hub.execute(OpCode::Passthrough, &[1, 0x40, 0x10, 0, 0, 2]);
        assert_eq!(
            result,
            Err(HubError::Transport(TransportError::BadStatus(0)))
        );
        let polls = t
            .lock()
            .unwrap()
            .reads
            .iter()
            .filter(|(addr, _)| *addr == I2C_PASSTHROUGH_RESPONSE)
            .count();
        assert_eq!(polls, PASSTHROUGH_POLL_LIMIT);
    }

    #[test]
    fn passthrough_rejects_non_one_status() {
        let (hub, t, _p, _s) = new_hub();
        boot(&hub);
        let mut frame = vec![0u8; PASSTHROUGH_FRAME_SIZE];
        frame[0] = 2;
        queue_passthrough_response(&t, vec![frame]);
        assert_eq!(
            hub.execute(OpCode::Passthrough, &[1, 0x40, 0x10, 0, 0, 2]),
            Err(HubError::Transport(TransportError::BadStatus(2)))
        );
    }

    #[test]
    fn passthrough_read_returns_payload_after_status_byte() {
        let (hub, t, _p, _s) = new_hub();
        boot(&hub);
        let mut ready = vec![0u8; PASSTHROUGH_FRAME_SIZE];
        ready[0] = 1;
        ready[1] = 0xCA;
        ready[2] = 0xFE;
        queue_passthrough_response(&t, vec![vec![0; PASSTHROUGH_FRAME_SIZE], ready]);
        let out = hub
            .execute(OpCode::Passthrough, &[1, 0x40, 0x10, 0, 0, 2])
            .unwrap();
        assert_eq!(out, vec![0xCA, 0xFE]);
        // Command frame went out first, padded to the fixed size.
        let state = t.lock().unwrap();
        let (addr, frame) = &state.writes.last().unwrap();
        assert_eq!(*addr, I2C_PASSTHROUGH_COMMAND);
        assert_eq!(frame.len(), PASSTHROUGH_FRAME_SIZE);
        assert_eq!(&frame[..6], &[1, 0x40, 0x10, 0, 0, 2]);
    }

    #[test]
    fn passthrough_write_embeds_data_and_validates_flag() {
        let (hub, t, _p, _s) = new_hub();
        boot(&hub);
        let mut ready = vec![0u8; PASSTHROUGH_FRAME_SIZE];
        ready[0] = 1;
        queue_passthrough_response(&t, vec![ready]);
        hub.execute(OpCode::Passthrough, &[1, 0x40, 0x10, 0, 1, 2, 0xAB, 0xCD])
            .unwrap();
        let state = t.lock().unwrap();
        let (_, frame) = &state.writes.last().unwrap();
        assert_eq!(&frame[6..8], &[0xAB, 0xCD]);
        drop(state);

        assert!(matches!(
            hub.execute(OpCode::Passthrough, &[1, 0x40, 0x10, 0, 3, 0]),
            Err(HubError::InvalidArgument(_))
        ));
        // Read larger than frame minus status byte.
        assert!(matches!(
            hub.execute(
                OpCode::Passthrough,
                &[1, 0x40, 0x10, 0, 0, PASSTHROUGH_FRAME_SIZE as u8]
            ),
            Err(HubError::InvalidArgument(_))
        ));
    }

    #[test]
    fn low_power_mode_is_edge_triggered() {
        let (hub, _t, p, _s) = new_hub();
        assert_eq!(
            hub.execute(OpCode::SetLowPowerMode, &[0]),
            Err(HubError::Busy)
        );
        boot(&hub);

        // Disable: one forced wake transition.
        hub.execute(OpCode::SetLowPowerMode, &[0]).unwrap();
        let transitions = p.lock().unwrap().wake_line.len();

        // Same value again: no further wake-line traffic at all, since the
        // lease wake/sleep are no-ops with low power disabled.
        hub.execute(OpCode::SetLowPowerMode, &[0]).unwrap();
        assert_eq!(p.lock().unwrap().wake_line.len(), transitions);

        // Re-enable: exactly one sleep transition plus the lease's own
        // sleep on the way out.
        hub.execute(OpCode::SetLowPowerMode, &[1]).unwrap();
        let log = p.lock().unwrap();
        assert!(log.wake_line.len() > transitions);
        assert_eq!(log.wake_line.last(), Some(&false));
    }

    #[test]
    fn flush_forwards_big_endian_handle() {
        let (hub, _t, _p, sink) = new_hub();
        // Silently ignored while unbooted.
        hub.execute(OpCode::SetFlush, &0x01020304u32.to_le_bytes())
            .unwrap();
        assert!(sink.events.lock().unwrap().is_empty());

        boot(&hub);
        hub.execute(OpCode::SetFlush, &0x01020304u32.to_le_bytes())
            .unwrap();
        let events = sink.events.lock().unwrap();
        let (kind, payload, _ts) = events.last().unwrap();
        assert_eq!(*kind, EventKind::Flush);
        assert_eq!(payload, &vec![0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn gyro_cal_round_trips_while_unbooted() {
        let (hub, t, _p, _s) = new_hub();
        let blob: Vec<u8> = (0..GYRO_CAL_SIZE as u8).collect();
        hub.execute(OpCode::SetGyroCal, &blob).unwrap();
        assert_eq!(hub.execute(OpCode::GetGyroCal, &[]).unwrap(), blob);
        assert!(t.lock().unwrap().writes.is_empty());
    }

    #[test]
    fn gyro_cal_transfers_in_two_chunks_when_booted() {
        let (hub, t, _p, _s) = new_hub();
        boot(&hub);
        let blob: Vec<u8> = (0..GYRO_CAL_SIZE as u8).collect();
        hub.execute(OpCode::SetGyroCal, &blob).unwrap();
        let state = t.lock().unwrap();
        let n = state.writes.len();
        assert_eq!(state.writes[n - 2].0, GYRO_CAL);
        assert_eq!(state.writes[n - 2].1, blob[..GYRO_CAL_FIRST].to_vec());
        assert_eq!(state.writes[n - 1].0, GYRO_CAL_2);
        assert_eq!(state.writes[n - 1].1, blob[GYRO_CAL_FIRST..].to_vec());
    }

    #[test]
    fn lease_brackets_operation_with_wake_and_sleep() {
        let (hub, _t, p, _s) = new_hub();
        hub.execute(OpCode::SetMotionDuration, &5u32.to_le_bytes())
            .unwrap();
        let log = p.lock().unwrap();
        assert_eq!(log.wake_line, vec![true, false]);
        assert_eq!(log.inhibits, 1);
        assert_eq!(log.releases, 1);
    }

    #[test]
    fn lease_releases_on_validation_failure() {
        let (hub, _t, p, _s) = new_hub();
        let _ = hub.execute(OpCode::SetMotionDuration, &[1]);
        let log = p.lock().unwrap();
        assert_eq!(log.inhibits, log.releases);
        assert_eq!(log.wake_line.last(), Some(&false));
    }

    #[test]
    fn locked_operations_never_interleave() {
        let (hub, t, _p, _s) = new_hub();
        boot(&hub);
        t.lock().unwrap().writes.clear();

        let blob: Vec<u8> = vec![7; GYRO_CAL_SIZE];
        std::thread::scope(|scope| {
            for _ in 0..2 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        hub.execute(OpCode::SetGyroCal, &blob).unwrap();
                    }
                });
            }
        });

        // Each operation issues GYRO_CAL then GYRO_CAL_2; under the single
        // lock those pairs must be adjacent in the transport's view.
        let state = t.lock().unwrap();
        assert_eq!(state.writes.len(), 100);
        for pair in state.writes.chunks(2) {
            assert_eq!(pair[0].0, GYRO_CAL);
            assert_eq!(pair[1].0, GYRO_CAL_2);
        }
    }
}

//! Paddle (analog joystick) timers.
//!
//! Reading `$C070` discharges the four paddle capacitors: each timer is
//! reloaded with `value * 11 * speed` cycles. While a timer is still
//! counting, `$C064-$C067` read back with bit 7 set. The host advances the
//! timers with `tick`.
//!
//! All four timers exist from construction. Some machines only create them
//! on the first strobe; reads before any strobe return 0x00 either way.

use std::cell::RefCell;
use std::rc::Rc;

use crate::bank::{Bank, PageAccess, PageHandler, SharedHandler};
use crate::error::{DiskError, DiskResult};

pub const PADDLE_COUNT: usize = 4;

/// Resting position. A zero value would give a zero-cycle timer, and some
/// software uses the paddle read as a delay loop.
pub const PADDLE_CENTER: u8 = 127;

/// Timer cycles per paddle unit.
const CYCLES_PER_UNIT: f64 = 11.0;

pub const PADDLE_STROBE: u16 = 0xc070;
pub const PADDLE_BASE: u16 = 0xc064;

/// Soft-switch page the paddles live on.
const IO_PAGE: u8 = 0xc0;

#[derive(Debug, Clone)]
pub struct Paddles {
    values: [u8; PADDLE_COUNT],
    timers: [i64; PADDLE_COUNT],
    speed: f64,
    strobes: u64,
}

impl Default for Paddles {
    fn default() -> Self {
        Self::new()
    }
}

impl Paddles {
    pub fn new() -> Self {
        Self {
            values: [PADDLE_CENTER; PADDLE_COUNT],
            timers: [0; PADDLE_COUNT],
            speed: 1.0,
            strobes: 0,
        }
    }

    pub fn value(&self, paddle: usize) -> Option<u8> {
        self.values.get(paddle).copied()
    }

    /// Position as reported by the input device.
    pub fn set_value(&mut self, paddle: usize, value: u8) -> DiskResult<()> {
        let slot = self
            .values
            .get_mut(paddle)
            .ok_or(DiskError::InvalidIndex(paddle))?;
        *slot = value;
        Ok(())
    }

    /// Emulation speed multiplier. Scaling the reload keeps paddle reads
    /// correct when the CPU runs faster than 1 MHz.
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed;
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Cycles left on a timer.
    pub fn timer(&self, paddle: usize) -> Option<i64> {
        self.timers.get(paddle).copied()
    }

    /// Number of strobes seen.
    pub fn strobes(&self) -> u64 {
        self.strobes
    }

    /// Reload all four timers.
    pub fn strobe(&mut self) {
        for (timer, value) in self.timers.iter_mut().zip(self.values) {
            *timer = (value as f64 * CYCLES_PER_UNIT * self.speed) as i64;
        }
        if self.strobes < 5 {
            log::debug!(
                "Paddle strobe #{} values={:?} speed={:.2}",
                self.strobes,
                self.values,
                self.speed
            );
        }
        self.strobes += 1;
    }

    /// Advance every timer by `cycles`. Timers stop at zero.
    pub fn tick(&mut self, cycles: u64) {
        let cycles = i64::try_from(cycles).unwrap_or(i64::MAX);
        for timer in &mut self.timers {
            *timer = timer.saturating_sub(cycles).max(0);
        }
    }

    /// Soft-switch read. `None` for addresses the paddles do not decode.
    pub fn read(&mut self, addr: u16) -> Option<u8> {
        match addr {
            PADDLE_STROBE => {
                self.strobe();
                None
            }
            PADDLE_BASE..=0xc067 => {
                let paddle = (addr - PADDLE_BASE) as usize;
                Some(if self.timers[paddle] > 0 { 0x80 } else { 0x00 })
            }
            _ => None,
        }
    }

    /// Install on the `$C0` page of an I/O bank. The returned handle stays
    /// usable for `tick` and `set_value`.
    pub fn install(self, bank: &mut Bank) -> DiskResult<Rc<RefCell<Paddles>>> {
        let paddles = Rc::new(RefCell::new(self));
        let handler: SharedHandler = paddles.clone();
        bank.install_intercept(handler, IO_PAGE, None)?;
        Ok(paddles)
    }
}

impl PageHandler for Paddles {
    fn access(&mut self, access: PageAccess<'_>) -> bool {
        match access {
            // Only the first byte is decoded; soft switches are read one at
            // a time.
            PageAccess::Read { addr, data } => match (self.read(addr), data.first_mut()) {
                (Some(value), Some(byte)) => {
                    *byte = value;
                    true
                }
                _ => false,
            },
            PageAccess::Write { .. } => false,
            PageAccess::Teardown => {
                self.timers = [0; PADDLE_COUNT];
                false
            }
        }
    }
}

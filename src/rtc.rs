//! Real-time-clock device model.
//!
//! The RTC runs at a programmable power-of-two rate between 2Hz and 1024Hz.
//! Opening a descriptor on it resets the rate to 2Hz; writing four bytes
//! reprograms it; reading consumes the next tick. The ISR shim calls
//! [`Rtc::tick`] and spins readers on the pending flag.

pub struct Rtc {
    hz: u32,
    rate: u8,
    tick_pending: bool,
}

/// Divider codes for the supported rates, highest code is slowest.
fn divider(hz: u32) -> Option<u8> {
    match hz {
        2 => Some(0x0F),
        4 => Some(0x0E),
        8 => Some(0x0D),
        16 => Some(0x0C),
        32 => Some(0x0B),
        64 => Some(0x0A),
        128 => Some(0x09),
        256 => Some(0x08),
        512 => Some(0x07),
        1024 => Some(0x06),
        _ => None,
    }
}

impl Rtc {
    pub const fn new() -> Self {
        Self {
            hz: 2,
            rate: 0x0F,
            tick_pending: false,
        }
    }

    /// Open resets the device to its default 2Hz rate.
    pub fn open(&mut self) -> isize {
        self.set_frequency(2)
    }

    pub fn close(&mut self) -> isize {
        0
    }

    /// A read completes on the next tick; the core's half is consuming the
    /// pending flag.
    pub fn read(&mut self) -> isize {
        self.tick_pending = false;
        0
    }

    /// Writing exactly four little-endian bytes sets the interrupt rate.
    pub fn write(&mut self, buf: &[u8]) -> isize {
        if buf.len() != 4 {
            return -1;
        }
        let hz = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if self.set_frequency(hz) != 0 {
            return -1;
        }
        buf.len() as isize
    }

    pub fn set_frequency(&mut self, hz: u32) -> isize {
        match divider(hz) {
            Some(rate) => {
                self.hz = hz;
                self.rate = rate;
                0
            }
            None => {
                log::warn!("rtc: unsupported frequency {hz}");
                -1
            }
        }
    }

    /// Called from the RTC interrupt path.
    pub fn tick(&mut self) {
        self.tick_pending = true;
    }

    pub fn tick_pending(&self) -> bool {
        self.tick_pending
    }

    pub fn hz(&self) -> u32 {
        self.hz
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_defaults_to_2hz() {
        let mut rtc = Rtc::new();
        rtc.set_frequency(64);
        assert_eq!(rtc.open(), 0);
        assert_eq!(rtc.hz(), 2);
    }

    #[test]
    fn write_accepts_only_power_of_two_rates() {
        let mut rtc = Rtc::new();
        assert_eq!(rtc.write(&8u32.to_le_bytes()), 4);
        assert_eq!(rtc.hz(), 8);
        assert_eq!(rtc.write(&3u32.to_le_bytes()), -1);
        assert_eq!(rtc.write(&2048u32.to_le_bytes()), -1);
        assert_eq!(rtc.write(&[1, 2]), -1);
        assert_eq!(rtc.hz(), 8);
    }

    #[test]
    fn read_consumes_the_pending_tick() {
        let mut rtc = Rtc::new();
        rtc.tick();
        assert!(rtc.tick_pending());
        assert_eq!(rtc.read(), 0);
        assert!(!rtc.tick_pending());
    }
}

//! In-memory stand-ins for flash and timing, used by the unit tests.

use core::cell::Cell;
use std::vec::Vec;

use embedded_hal_async::delay::DelayNs;
use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash,
};

use crate::schedule::Clock;

const SECTOR_SIZE: usize = 4096;
const CAPACITY: usize = 16 * SECTOR_SIZE;

/// RAM-backed NOR flash: erase sets bytes to `0xFF`, writes can only clear
/// bits, and a power loss can be armed to cut the next write in half.
#[derive(Debug)]
pub struct MockFlash {
    storage: Vec<u8>,
    power_loss: bool,
    fail_writes: bool,
}

impl MockFlash {
    pub fn new() -> Self {
        Self {
            storage: vec![0xFF; CAPACITY],
            power_loss: false,
            fail_writes: false,
        }
    }

    pub fn simulate_power_loss(&mut self) {
        self.power_loss = true;
    }

    pub fn fail_writes(&mut self) {
        self.fail_writes = true;
    }

    pub fn contents(&self, offset: u32, len: usize) -> &[u8] {
        &self.storage[offset as usize..offset as usize + len]
    }

    pub fn corrupt(&mut self, offset: u32) {
        self.storage[offset as usize] ^= 0x55;
    }
}

impl ErrorType for MockFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for MockFlash {
    const READ_SIZE: usize = 4;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        if start % Self::READ_SIZE != 0 || bytes.len() % Self::READ_SIZE != 0 {
            return Err(NorFlashErrorKind::NotAligned);
        }
        if start + bytes.len() > CAPACITY {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        bytes.copy_from_slice(&self.storage[start..start + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        CAPACITY
    }
}

impl NorFlash for MockFlash {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = SECTOR_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        let (from, to) = (from as usize, to as usize);
        if from % SECTOR_SIZE != 0 || to % SECTOR_SIZE != 0 {
            return Err(NorFlashErrorKind::NotAligned);
        }
        if to > CAPACITY || from > to {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        self.storage[from..to].fill(0xFF);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if self.fail_writes {
            return Err(NorFlashErrorKind::Other);
        }
        let start = offset as usize;
        if start % Self::WRITE_SIZE != 0 || bytes.len() % Self::WRITE_SIZE != 0 {
            return Err(NorFlashErrorKind::NotAligned);
        }
        if start + bytes.len() > CAPACITY {
            return Err(NorFlashErrorKind::OutOfBounds);
        }

        let len = if self.power_loss {
            self.power_loss = false;
            bytes.len() / 2
        } else {
            bytes.len()
        };

        for (cell, byte) in self.storage[start..start + len].iter_mut().zip(bytes) {
            *cell &= *byte;
        }
        Ok(())
    }
}

/// Delay that returns immediately and remembers how long it was asked to wait.
#[derive(Debug, Default)]
pub struct RecordingDelay {
    pub calls: Vec<u32>,
}

impl DelayNs for RecordingDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.calls.push(ns / 1_000_000);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.calls.push(ms);
    }
}

/// Millisecond clock moved by hand.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u32>,
}

impl ManualClock {
    pub fn starting_at(now: u32) -> Self {
        Self {
            now: Cell::new(now),
        }
    }

    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.now.get()
    }
}

impl Clock for &ManualClock {
    fn now_ms(&self) -> u32 {
        self.now.get()
    }
}

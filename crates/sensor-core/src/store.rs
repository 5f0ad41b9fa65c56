//! Flash-backed flat files holding the device configuration and the Wi-Fi
//! credentials.
//!
//! # Record format
//!
//! Each file owns an erase-aligned flash region:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Magic: [u8; 4] = b"FLAT"                     │
//! │ Name length: u8                              │
//! │ Name: [u8; name length] (e.g. "/config.txt") │
//! │ Content length: u16 (LE)                     │
//! │ Content: newline-delimited text              │
//! │ CRC32: u32 (LE) over name and content        │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Erased flash, another name or a bad checksum all read back as "no file".

use crc::{Crc, CRC_32_ISO_HDLC};
use embedded_storage::nor_flash::{NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash};
use heapless::Vec;
use log::{error, info, warn};

use crate::config::{DeviceConfig, WifiCredentials};
use crate::constants::{CONFIG_FILE_NAME, MAX_FILE_NAME_LEN, MAX_FILE_SIZE, WIFI_FILE_NAME};

const MAGIC: [u8; 4] = *b"FLAT";
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    NameTooLong,
    FileTooLarge,
    Read(NorFlashErrorKind),
    Erase(NorFlashErrorKind),
    Write(NorFlashErrorKind),
}

/// A single named file stored at a fixed flash offset.
#[derive(Debug, Clone, Copy)]
pub struct FlashFile {
    name: &'static str,
    offset: u32,
}

impl FlashFile {
    pub const fn new(name: &'static str, offset: u32) -> Self {
        Self { name, offset }
    }

    /// Reads the file into `buf` and returns its content, or `None` when the
    /// region holds no valid record for this name.
    pub fn read<'b, F: ReadNorFlash>(
        &self,
        flash: &mut F,
        buf: &'b mut [u8; MAX_FILE_SIZE],
    ) -> Result<Option<&'b [u8]>, StoreError> {
        flash
            .read(self.offset, buf)
            .map_err(|e| StoreError::Read(e.kind()))?;
        Ok(self.parse(buf))
    }

    /// Replaces the whole file with `content`.
    pub fn write<F: NorFlash>(&self, flash: &mut F, content: &[u8]) -> Result<(), StoreError> {
        let name = self.name.as_bytes();
        if name.len() > MAX_FILE_NAME_LEN {
            return Err(StoreError::NameTooLong);
        }
        let content_len = u16::try_from(content.len()).map_err(|_| StoreError::FileTooLarge)?;

        let mut digest = CRC32.digest();
        digest.update(name);
        digest.update(content);

        let mut record: Vec<u8, MAX_FILE_SIZE> = Vec::new();
        append(&mut record, &MAGIC)?;
        append(&mut record, &[name.len() as u8])?;
        append(&mut record, name)?;
        append(&mut record, &content_len.to_le_bytes())?;
        append(&mut record, content)?;
        append(&mut record, &digest.finalize().to_le_bytes())?;

        while record.len() % F::WRITE_SIZE != 0 {
            record.push(0xFF).map_err(|_| StoreError::FileTooLarge)?;
        }

        self.erase(flash)?;
        flash
            .write(self.offset, &record)
            .map_err(|e| StoreError::Write(e.kind()))
    }

    /// Erases the file's region, leaving no file behind.
    pub fn erase<F: NorFlash>(&self, flash: &mut F) -> Result<(), StoreError> {
        let region = MAX_FILE_SIZE.div_ceil(F::ERASE_SIZE) * F::ERASE_SIZE;
        flash
            .erase(self.offset, self.offset + region as u32)
            .map_err(|e| StoreError::Erase(e.kind()))
    }

    fn parse<'b>(&self, record: &'b [u8]) -> Option<&'b [u8]> {
        if record.get(..MAGIC.len())? != MAGIC {
            return None;
        }

        let name_len = usize::from(*record.get(MAGIC.len())?);
        let name_start = MAGIC.len() + 1;
        let name_end = name_start + name_len;
        if record.get(name_start..name_end)? != self.name.as_bytes() {
            return None;
        }

        let len_bytes = record.get(name_end..name_end + 2)?;
        let content_len = usize::from(u16::from_le_bytes([len_bytes[0], len_bytes[1]]));
        let content_start = name_end + 2;
        let content_end = content_start + content_len;
        let crc_bytes = record.get(content_end..content_end + 4)?;
        let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);

        let mut digest = CRC32.digest();
        digest.update(&record[name_start..name_end]);
        digest.update(&record[content_start..content_end]);
        if digest.finalize() != stored {
            warn!("{}: checksum mismatch, ignoring file", self.name);
            return None;
        }

        Some(&record[content_start..content_end])
    }
}

fn append(record: &mut Vec<u8, MAX_FILE_SIZE>, bytes: &[u8]) -> Result<(), StoreError> {
    record
        .extend_from_slice(bytes)
        .map_err(|_| StoreError::FileTooLarge)
}

/// Loads and saves the device configuration and Wi-Fi credentials.
pub struct ConfigStore<F> {
    flash: F,
    config_file: FlashFile,
    wifi_file: FlashFile,
}

impl<F: NorFlash> ConfigStore<F> {
    /// `config_offset` and `wifi_offset` must be erase-aligned and at least
    /// one erase block apart.
    pub fn new(flash: F, config_offset: u32, wifi_offset: u32) -> Self {
        Self {
            flash,
            config_file: FlashFile::new(CONFIG_FILE_NAME, config_offset),
            wifi_file: FlashFile::new(WIFI_FILE_NAME, wifi_offset),
        }
    }

    /// Checks that both regions can be read. An error means the storage has
    /// to be formatted before use.
    pub fn mount(&mut self) -> Result<(), StoreError> {
        let mut buf = [0u8; MAX_FILE_SIZE];
        self.config_file.read(&mut self.flash, &mut buf)?;
        self.wifi_file.read(&mut self.flash, &mut buf)?;
        Ok(())
    }

    /// Reads the stored configuration on top of `defaults`.
    ///
    /// Returns `found = false` together with the untouched defaults when there
    /// is no readable file. This is not an error.
    pub fn load(&mut self, defaults: DeviceConfig) -> (DeviceConfig, bool) {
        let mut config = defaults;
        let mut buf = [0u8; MAX_FILE_SIZE];

        match self.config_file.read(&mut self.flash, &mut buf) {
            Ok(Some(content)) => {
                config.apply_lines(content);
                info!("Config loaded from flash.");
                config.log();
                (config, true)
            }
            Ok(None) => {
                info!("Config file does not exist. Using default settings.");
                (config, false)
            }
            Err(e) => {
                error!("Failed to open config file for reading: {:?}", e);
                (config, false)
            }
        }
    }

    /// Overwrites the stored configuration with `config`.
    pub fn save(&mut self, config: &DeviceConfig) -> Result<(), StoreError> {
        let mut content: Vec<u8, MAX_FILE_SIZE> = Vec::new();
        config
            .write_lines(&mut content)
            .map_err(|_| StoreError::FileTooLarge)?;

        self.config_file
            .write(&mut self.flash, &content)
            .inspect_err(|e| error!("Failed to open config file for writing: {:?}", e))?;

        info!("Config saved to flash.");
        Ok(())
    }

    pub fn load_credentials(&mut self) -> (WifiCredentials, bool) {
        let mut credentials = WifiCredentials::default();
        let mut buf = [0u8; MAX_FILE_SIZE];

        match self.wifi_file.read(&mut self.flash, &mut buf) {
            Ok(Some(content)) => {
                credentials.apply_lines(content);
                info!("Wi-Fi credentials loaded for SSID {:?}", credentials.ssid());
                (credentials, true)
            }
            Ok(None) => {
                info!("No stored Wi-Fi credentials");
                (credentials, false)
            }
            Err(e) => {
                error!("Failed to read Wi-Fi credentials: {:?}", e);
                (credentials, false)
            }
        }
    }

    pub fn save_credentials(&mut self, credentials: &WifiCredentials) -> Result<(), StoreError> {
        let mut content: Vec<u8, MAX_FILE_SIZE> = Vec::new();
        credentials
            .write_lines(&mut content)
            .map_err(|_| StoreError::FileTooLarge)?;

        self.wifi_file.write(&mut self.flash, &content)?;
        info!("Wi-Fi credentials saved to flash.");
        Ok(())
    }

    /// Erases both files.
    pub fn format(&mut self) -> Result<(), StoreError> {
        warn!("Formatting config storage");
        self.config_file.erase(&mut self.flash)?;
        self.wifi_file.erase(&mut self.flash)
    }

    pub fn into_inner(self) -> F {
        self.flash
    }
}

//! Serial storage-controller client.
//!
//! The controller (a uALFAT-style FAT bridge) mounts the removable media
//! and exposes a small line protocol over the UART.  One session looks like
//! this:
//!
//! ```text
//!   Uninitialized ──power, banner──▶ PoweredUp ──V──▶ VersionChecked
//!        ──B, V──▶ BaudSwitched ──J, U──▶ Mounted ──T S, S──▶ Idle
//!
//!   Idle ⇄ FileOpen ⇄ Writing          (O / W / C per logical file)
//!
//!   Idle ──finish_session──▶ Closed ──▶ PoweredDown
//! ```
//!
//! A failed power-up forces `PoweredDown` before the error is returned.
//! File-level operations do not close anything on failure; the session
//! owner (see [`export`]) decides when to give up, closes what is open and
//! powers down.

pub mod export;
pub mod files;
pub mod link;

use core::fmt::{self, Write as _};

use log::{debug, info, warn};

use crate::app::ports::{ControllerHardware, PowerRail};
use crate::config::ControllerConfig;
use crate::diagnostics::record_error;
use crate::error::ControllerError;
use crate::scheduler::Scheduler;
use crate::timestamp::DateTime;
use files::LogicalFile;
use link::{Line, Link, parse_status};

/// Transmit buffer capacity in bytes.
pub const TX_CAPACITY: usize = 200;
/// Baud switch request (divisor for 115200 baud).
const BAUD_SWITCH_COMMAND: &str = "B 1EF4";
/// Offset and length of the version number in the version response.
const VERSION_OFFSET: usize = 7;
const VERSION_LEN: usize = 4;
/// Lines the controller sends after a detect request.
const DETECT_TRAILER_LINES: usize = 2;
const HANDLE_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Uninitialized,
    PoweredUp,
    VersionChecked,
    BaudSwitched,
    Mounted,
    Idle,
    FileOpen,
    Writing,
    Closed,
    PoweredDown,
}

pub struct StorageController<'a> {
    sched: Scheduler<'a>,
    config: ControllerConfig,
    state: ControllerState,
    link: Link,
    tx: heapless::String<TX_CAPACITY>,
    /// Open file per controller handle.
    open: [Option<LogicalFile>; HANDLE_COUNT],
    version: heapless::String<VERSION_LEN>,
}

impl<'a> StorageController<'a> {
    pub fn new(sched: Scheduler<'a>, config: ControllerConfig) -> Self {
        Self {
            sched,
            config,
            state: ControllerState::Uninitialized,
            link: Link::new(),
            tx: heapless::String::new(),
            open: [None; HANDLE_COUNT],
            version: heapless::String::new(),
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Version number reported by the controller (e.g. `"2.05"`).
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Media mounted and the session usable for file operations.
    pub fn is_mounted(&self) -> bool {
        matches!(
            self.state,
            ControllerState::Mounted
                | ControllerState::Idle
                | ControllerState::FileOpen
                | ControllerState::Writing
        )
    }

    pub fn is_open(&self, file: LogicalFile) -> bool {
        self.open[usize::from(file.handle())] == Some(file)
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    // ── Query / response ──────────────────────────────────────

    /// Send `text` and return the next response line.
    pub fn send_query<H: ControllerHardware + ?Sized>(
        &mut self,
        hw: &mut H,
        text: &str,
        timeout_ms: u32,
    ) -> Result<Line, ControllerError> {
        debug!("Controller: >> {}", text);
        self.link.transmit_line(hw, text);
        self.link.receive(&self.sched, hw, timeout_ms)
    }

    /// Send `text` and require a `!00` status in response.
    pub fn send_query_expect_code<H: ControllerHardware + ?Sized>(
        &mut self,
        hw: &mut H,
        text: &str,
        timeout_ms: u32,
    ) -> Result<(), ControllerError> {
        debug!("Controller: >> {}", text);
        self.link.transmit_line(hw, text);
        self.expect_status(hw, timeout_ms)
    }

    /// Wait for a status line.  Device-reported codes are logged here.
    fn expect_status<H: ControllerHardware + ?Sized>(
        &mut self,
        hw: &mut H,
        timeout_ms: u32,
    ) -> Result<(), ControllerError> {
        let line = self.link.receive(&self.sched, hw, timeout_ms)?;
        parse_status(&line).inspect_err(|e| {
            if let ControllerError::Device(_) = e {
                warn!("Controller: {}", e);
                record_error(hw, e.code());
            }
        })
    }

    // ═══════════════════════════════════════════════════════════
    //  Session lifecycle
    // ═══════════════════════════════════════════════════════════

    /// Power the controller and media, verify the link, switch to the fast
    /// rate, mount the media and set the controller clock to `now`.
    pub fn power_up<H: ControllerHardware + ?Sized>(
        &mut self,
        hw: &mut H,
        now: &DateTime,
    ) -> Result<(), ControllerError> {
        info!("Controller: power-up");
        match self.try_power_up(hw, now) {
            Ok(()) => {
                info!("Controller: mounted (firmware {})", self.version);
                Ok(())
            }
            Err(e) => Err(self.abort_session(hw, e)),
        }
    }

    fn try_power_up<H: ControllerHardware + ?Sized>(
        &mut self,
        hw: &mut H,
        now: &DateTime,
    ) -> Result<(), ControllerError> {
        let attempts = self.config.power_up_attempts.max(1);
        let mut attempt = 1;
        loop {
            self.power_rails(hw, true);
            match self.await_banner(hw) {
                Ok(()) => break,
                Err(e) if attempt < attempts => {
                    info!("Controller: no banner ({}), power cycling", e);
                    self.power_down(hw);
                    attempt += 1;
                }
                Err(_) => return Err(ControllerError::NotResponding),
            }
        }
        self.state = ControllerState::PoweredUp;

        self.check_version(hw)?;
        self.state = ControllerState::VersionChecked;

        self.switch_baud(hw)?;
        self.check_version(hw)?;
        self.state = ControllerState::BaudSwitched;

        // media supply capacitor
        self.sched.sleep_ms(self.config.media_settle_ms, hw);
        self.mount(hw)?;
        self.state = ControllerState::Mounted;

        self.sync_clock(hw, now);
        self.link.flush(&self.sched);
        self.state = ControllerState::Idle;
        Ok(())
    }

    fn power_rails<H: ControllerHardware + ?Sized>(&mut self, hw: &mut H, media: bool) {
        self.link.flush(&self.sched);
        hw.configure(self.config.base_baud);
        hw.set_rail(PowerRail::StorageController, true);
        if media {
            hw.set_rail(PowerRail::RemovableMedia, true);
        }
        self.state = ControllerState::Uninitialized;
    }

    fn await_banner<H: ControllerHardware + ?Sized>(
        &mut self,
        hw: &mut H,
    ) -> Result<(), ControllerError> {
        for _ in 0..self.config.startup_messages {
            self.link
                .receive(&self.sched, hw, self.config.timeouts.startup)?;
        }
        Ok(())
    }

    fn check_version<H: ControllerHardware + ?Sized>(
        &mut self,
        hw: &mut H,
    ) -> Result<(), ControllerError> {
        self.link.skip_pending(&self.sched);
        let line = self
            .send_query(hw, "V", self.config.timeouts.version)
            .map_err(|_| ControllerError::BadVersion)?;
        if !line.starts_with(self.config.version_prefix.as_bytes()) {
            warn!("Controller: unexpected version response");
            return Err(ControllerError::BadVersion);
        }
        self.version.clear();
        for &b in line.iter().skip(VERSION_OFFSET).take(VERSION_LEN) {
            let _ = self.version.push(char::from(b));
        }
        self.expect_status(hw, self.config.timeouts.version)
            .map_err(|_| ControllerError::BadVersion)
    }

    fn switch_baud<H: ControllerHardware + ?Sized>(
        &mut self,
        hw: &mut H,
    ) -> Result<(), ControllerError> {
        self.send_query_expect_code(hw, BAUD_SWITCH_COMMAND, self.config.timeouts.baud)
            .map_err(|_| ControllerError::BaudSwitchFailed)?;
        hw.configure(self.config.fast_baud);
        self.expect_status(hw, self.config.timeouts.baud_confirm)
            .map_err(|_| ControllerError::BaudSwitchFailed)?;
        debug!("Controller: link at {} baud", self.config.fast_baud);
        Ok(())
    }

    fn mount<H: ControllerHardware + ?Sized>(&mut self, hw: &mut H) -> Result<(), ControllerError> {
        self.send_query_expect_code(hw, "J", self.config.timeouts.detect)
            .map_err(|_| ControllerError::MountFailed)?;
        for _ in 0..DETECT_TRAILER_LINES {
            let _ = self.link.receive(&self.sched, hw, self.config.timeouts.startup);
        }

        let attempts = self.config.mount_attempts.max(1);
        for attempt in 1..=attempts {
            match self.send_query_expect_code(hw, "U", self.config.timeouts.mount) {
                Ok(()) => return Ok(()),
                Err(e) => info!("Controller: mount attempt {}/{} failed ({})", attempt, attempts, e),
            }
        }
        Err(ControllerError::MountFailed)
    }

    /// Select the RTC clock source and set it.  Failures only affect file
    /// timestamps and are ignored.
    fn sync_clock<H: ControllerHardware + ?Sized>(&mut self, hw: &mut H, now: &DateTime) {
        let mut cmd: heapless::String<16> = heapless::String::new();
        let _ = write!(cmd, "S {:08X}", now.fat_timestamp());
        for text in ["T S", cmd.as_str()] {
            if let Err(e) = self.send_query(hw, text, self.config.timeouts.version) {
                debug!("Controller: '{}' unanswered ({})", text, e);
            }
        }
    }

    /// Record `error`, close what is open and power down.
    pub fn abort_session<H: ControllerHardware + ?Sized>(
        &mut self,
        hw: &mut H,
        error: ControllerError,
    ) -> ControllerError {
        warn!("Controller: session aborted: {}", error);
        record_error(hw, error.code());
        if self.is_mounted() {
            self.close_all(hw);
        }
        self.power_down(hw);
        error
    }

    /// Close the session normally: let the controller flush, then power down.
    pub fn finish_session<H: ControllerHardware + ?Sized>(&mut self, hw: &mut H) {
        self.state = ControllerState::Closed;
        self.sched.sleep_ms(self.config.session_close_ms, hw);
        self.power_down(hw);
    }

    /// Cut controller and media power and reset all link state.
    pub fn power_down<H: ControllerHardware + ?Sized>(&mut self, hw: &mut H) {
        hw.set_rail(PowerRail::RemovableMedia, false);
        hw.set_rail(PowerRail::StorageController, false);
        hw.shutdown();
        self.link.flush(&self.sched);
        self.tx.clear();
        self.open = [None; HANDLE_COUNT];
        self.state = ControllerState::PoweredDown;
        debug!("Controller: powered down");
    }

    // ═══════════════════════════════════════════════════════════
    //  Files
    // ═══════════════════════════════════════════════════════════

    pub fn open_file<H: ControllerHardware + ?Sized>(
        &mut self,
        hw: &mut H,
        file: LogicalFile,
    ) -> Result<(), ControllerError> {
        let slot = usize::from(file.handle());
        if let Some(other) = self.open[slot] {
            if other != file {
                warn!("Controller: handle {} busy with {}", slot, other.name());
                return Err(ControllerError::OpenFailed(file.family()));
            }
            return Ok(());
        }
        let mut cmd: heapless::String<24> = heapless::String::new();
        let _ = write!(cmd, "O {}A>{}", file.handle(), file.name());
        self.send_query_expect_code(hw, &cmd, self.config.timeouts.open)
            .map_err(|e| {
                warn!("Controller: open {} failed ({})", file.name(), e);
                ControllerError::OpenFailed(file.family())
            })?;
        self.open[slot] = Some(file);
        self.state = ControllerState::FileOpen;
        Ok(())
    }

    pub fn close_file<H: ControllerHardware + ?Sized>(
        &mut self,
        hw: &mut H,
        file: LogicalFile,
    ) -> Result<(), ControllerError> {
        let mut cmd: heapless::String<8> = heapless::String::new();
        let _ = write!(cmd, "C {}", file.handle());
        self.send_query_expect_code(hw, &cmd, self.config.timeouts.close)
            .map_err(|e| {
                warn!("Controller: close {} failed ({})", file.name(), e);
                ControllerError::CloseFailed(file.family())
            })?;
        let slot = usize::from(file.handle());
        if self.open[slot] == Some(file) {
            self.open[slot] = None;
        }
        if self.open.iter().all(Option::is_none) {
            self.state = ControllerState::Idle;
        }
        Ok(())
    }

    /// Best-effort close of every open file.
    pub fn close_all<H: ControllerHardware + ?Sized>(&mut self, hw: &mut H) {
        for file in self.open.into_iter().flatten() {
            let _ = self.close_file(hw, file);
        }
    }

    /// Append formatted text to the transmit buffer.  On overflow the
    /// buffer is left as it was.
    pub fn append_tx(&mut self, args: fmt::Arguments<'_>) -> Result<(), ControllerError> {
        let mark = self.tx.len();
        if self.tx.write_fmt(args).is_err() {
            self.tx.truncate(mark);
            return Err(ControllerError::TxOverflow);
        }
        Ok(())
    }

    pub fn tx_len(&self) -> usize {
        self.tx.len()
    }

    pub fn clear_tx(&mut self) {
        self.tx.clear();
    }

    /// Send the transmit buffer to `file`: length-prefixed write request,
    /// raw bytes, byte-count acknowledgment, status.  The buffer is
    /// emptied either way; on failure `file` stays open.
    pub fn write_buffer_to_file<H: ControllerHardware + ?Sized>(
        &mut self,
        hw: &mut H,
        file: LogicalFile,
    ) -> Result<(), ControllerError> {
        if self.tx.is_empty() {
            return Ok(());
        }
        self.state = ControllerState::Writing;
        let result = self.try_write(hw, file);
        self.tx.clear();
        self.state = ControllerState::FileOpen;
        result.map_err(|e| {
            warn!("Controller: write to {} failed ({})", file.name(), e);
            ControllerError::AppendFailed(file.family())
        })
    }

    fn try_write<H: ControllerHardware + ?Sized>(
        &mut self,
        hw: &mut H,
        file: LogicalFile,
    ) -> Result<(), ControllerError> {
        let timeouts = self.config.timeouts;
        let mut cmd: heapless::String<16> = heapless::String::new();
        let _ = write!(cmd, "W {}>{:04X}", file.handle(), self.tx.len());
        self.send_query_expect_code(hw, &cmd, timeouts.write)?;

        self.link.transmit_raw(hw, self.tx.as_bytes());
        // byte count actually written
        self.link.receive(&self.sched, hw, timeouts.write_ack)?;
        self.expect_status(hw, timeouts.write)?;
        self.link.flush(&self.sched);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════
    //  Firmware update
    // ═══════════════════════════════════════════════════════════

    /// Let the controller flash new firmware from the removable media and
    /// wait for its final status line.
    pub fn update_firmware<H: ControllerHardware + ?Sized>(
        &mut self,
        hw: &mut H,
    ) -> Result<(), ControllerError> {
        info!("Controller: firmware update");
        let status = match self.run_firmware_update(hw) {
            Ok(line) => line,
            Err(e) => return Err(self.abort_session(hw, e)),
        };
        self.power_down(hw);
        parse_status(&status).inspect_err(|e| {
            warn!("Controller: firmware update failed ({})", e);
            record_error(hw, e.code());
        })?;
        info!("Controller: firmware update done");
        Ok(())
    }

    fn run_firmware_update<H: ControllerHardware + ?Sized>(
        &mut self,
        hw: &mut H,
    ) -> Result<Line, ControllerError> {
        self.power_rails(hw, false);
        self.await_banner(hw)
            .map_err(|_| ControllerError::NotResponding)?;
        self.state = ControllerState::PoweredUp;
        self.check_version(hw)?;
        self.state = ControllerState::VersionChecked;

        hw.set_rail(PowerRail::RemovableMedia, true);
        self.link.flush(&self.sched);
        self.link.transmit_line(hw, "X U");
        loop {
            let line = self
                .link
                .receive(&self.sched, hw, self.config.timeouts.firmware_update)?;
            if line.first() == Some(&b'!') {
                return Ok(line);
            }
            debug!("Controller: update progress line");
        }
    }
}

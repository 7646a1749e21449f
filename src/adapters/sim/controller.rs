//! Simulated serial storage controller with a FAT-formatted media card.
//!
//! Speaks the same line protocol as the real part: a start-up banner at
//! the base rate, `!hh` status lines, a baud-rate switch, length-prefixed
//! raw writes acknowledged with a byte count.  Response bytes are
//! scheduled on a microsecond timeline at the controller's current rate;
//! the board delivers them to the UART as simulated time passes.

use std::collections::{BTreeMap, VecDeque};

use log::trace;

use crate::controller::link::TERMINATOR;

pub const FIRMWARE: &str = "uALFAT 2.05";
const BASE_BAUD: u32 = 9600;
/// Banner lines sent after power-up, status line last.
const BANNER: [&str; 5] = ["GHI Electronics", FIRMWARE, "Rev A", "Ready", "!00"];
const BOOT_US: u64 = 30_000;
const RESPONSE_US: u64 = 200;
/// Pause after a baud switch before the confirmation at the new rate.
const BAUD_SETTLE_US: u64 = 10_000;
const HANDLES: usize = 4;
const MAX_COMMAND: usize = 64;

// device status codes
const ERR_UNKNOWN: &str = "!01";
const ERR_ARGUMENT: &str = "!02";
const ERR_NO_MEDIA: &str = "!0A";
const ERR_NOT_MOUNTED: &str = "!0B";
const ERR_HANDLE: &str = "!0C";

#[derive(Debug, Clone, Copy)]
struct Outgoing {
    at_us: u64,
    byte: u8,
    baud: u32,
}

/// Raw data expected after an accepted `W` request.
#[derive(Debug, Clone, Copy)]
struct RawWrite {
    handle: usize,
    remaining: usize,
    total: usize,
}

#[derive(Debug, Default)]
pub struct SimController {
    powered: bool,
    media_powered: bool,
    mounted: bool,
    baud: u32,
    power_cycles: u32,

    silent: bool,
    wrong_version: bool,
    refuse_mount: bool,
    drop_write_ack: bool,

    command: Vec<u8>,
    raw: Option<RawWrite>,
    handles: [Option<String>; HANDLES],
    files: BTreeMap<String, Vec<u8>>,
    commands: Vec<String>,
    clock: Option<u32>,

    outbox: VecDeque<Outgoing>,
    next_free_us: u64,
}

impl SimController {
    pub fn new() -> Self {
        Self {
            baud: BASE_BAUD,
            ..Self::default()
        }
    }

    // ── Fault injection ───────────────────────────────────────

    /// Never answer, not even with the banner.
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    /// Report a foreign firmware in the version response.
    pub fn set_wrong_version(&mut self, wrong: bool) {
        self.wrong_version = wrong;
    }

    /// Fail every mount request.
    pub fn set_refuse_mount(&mut self, refuse: bool) {
        self.refuse_mount = refuse;
    }

    /// Store written data but never acknowledge it.
    pub fn set_drop_write_ack(&mut self, drop: bool) {
        self.drop_write_ack = drop;
    }

    // ── Inspection ────────────────────────────────────────────

    pub fn power_cycles(&self) -> u32 {
        self.power_cycles
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Every command line received, in order.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn sent(&self, command: &str) -> bool {
        self.commands.iter().any(|c| c == command)
    }

    /// Contents of `name` on the media.
    pub fn file(&self, name: &str) -> Option<&str> {
        self.files
            .get(name)
            .and_then(|data| core::str::from_utf8(data).ok())
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn open_handles(&self) -> usize {
        self.handles.iter().filter(|h| h.is_some()).count()
    }

    /// FAT timestamp last set with `S`.
    pub fn clock(&self) -> Option<u32> {
        self.clock
    }

    // ── Board side ────────────────────────────────────────────

    pub fn set_power(&mut self, on: bool, now_us: u64) {
        if on == self.powered {
            return;
        }
        self.powered = on;
        self.baud = BASE_BAUD;
        self.command.clear();
        self.raw = None;
        self.mounted = false;
        self.handles = Default::default();
        self.outbox.clear();
        self.next_free_us = now_us;
        if on {
            self.power_cycles += 1;
            trace!("SimController: power on (cycle {})", self.power_cycles);
            if !self.silent {
                self.next_free_us = now_us + BOOT_US;
                for line in BANNER {
                    self.reply(now_us, line);
                }
            }
        }
    }

    pub fn set_media_power(&mut self, on: bool) {
        self.media_powered = on;
        if !on {
            self.mounted = false;
        }
    }

    /// Next response byte due at `now_us`, with the rate it was sent at.
    pub fn poll(&mut self, now_us: u64) -> Option<(u8, u32)> {
        match self.outbox.front() {
            Some(out) if out.at_us <= now_us => {
                let out = self.outbox.pop_front()?;
                Some((out.byte, out.baud))
            }
            _ => None,
        }
    }

    /// One byte from the host UART running at `baud`.
    pub fn receive(&mut self, byte: u8, baud: u32, now_us: u64) {
        if !self.powered || self.silent || baud != self.baud {
            return;
        }
        if let Some(mut raw) = self.raw {
            if let Some(name) = &self.handles[raw.handle] {
                self.files.entry(name.clone()).or_default().push(byte);
            }
            raw.remaining -= 1;
            if raw.remaining > 0 {
                self.raw = Some(raw);
                return;
            }
            self.raw = None;
            if !self.drop_write_ack {
                self.reply(now_us, &format!("${:08X}", raw.total));
                self.reply(now_us, "!00");
            }
            return;
        }
        if byte == TERMINATOR {
            let line = String::from_utf8_lossy(&self.command).into_owned();
            self.command.clear();
            if !line.is_empty() {
                self.execute(&line, now_us);
            }
        } else if self.command.len() < MAX_COMMAND {
            self.command.push(byte);
        }
    }

    fn reply(&mut self, now_us: u64, text: &str) {
        let byte_us = 10_000_000 / u64::from(self.baud);
        let mut at = self.next_free_us.max(now_us + RESPONSE_US);
        for byte in text.bytes().chain([TERMINATOR]) {
            at += byte_us;
            self.outbox.push_back(Outgoing {
                at_us: at,
                byte,
                baud: self.baud,
            });
        }
        self.next_free_us = at;
    }

    fn execute(&mut self, line: &str, now_us: u64) {
        trace!("SimController: << {}", line);
        self.commands.push(line.to_owned());
        let (verb, args) = line.split_once(' ').unwrap_or((line, ""));
        match verb {
            "V" => {
                let version = if self.wrong_version { "uBOOT 1.10" } else { FIRMWARE };
                self.reply(now_us, version);
                self.reply(now_us, "!00");
            }
            "B" => match baud_for_divisor(args) {
                Some(baud) => {
                    self.reply(now_us, "!00");
                    self.baud = baud;
                    self.next_free_us += BAUD_SETTLE_US;
                    self.reply(now_us, "!00");
                }
                None => self.reply(now_us, ERR_ARGUMENT),
            },
            "J" => {
                if self.media_powered {
                    self.reply(now_us, "!00");
                    self.reply(now_us, "FAT16 detected");
                    self.reply(now_us, "!00");
                } else {
                    self.reply(now_us, ERR_NO_MEDIA);
                }
            }
            "U" => {
                if self.media_powered && !self.refuse_mount {
                    self.mounted = true;
                    self.reply(now_us, "!00");
                } else {
                    self.reply(now_us, ERR_NOT_MOUNTED);
                }
            }
            "T" => self.reply(now_us, "!00"),
            "S" => match u32::from_str_radix(args, 16) {
                Ok(stamp) => {
                    self.clock = Some(stamp);
                    self.reply(now_us, "!00");
                }
                Err(_) => self.reply(now_us, ERR_ARGUMENT),
            },
            "O" => {
                let status = self.open(args);
                self.reply(now_us, status);
            }
            "C" => {
                let status = match parse_handle(args) {
                    Some(h) if self.handles[h].take().is_some() => "!00",
                    _ => ERR_HANDLE,
                };
                self.reply(now_us, status);
            }
            "W" => {
                let request = args.split_once('>').and_then(|(h, len)| {
                    let handle = parse_handle(h)?;
                    let total = usize::from_str_radix(len, 16).ok()?;
                    Some((handle, total))
                });
                match request {
                    Some((handle, total)) if total > 0 && self.handles[handle].is_some() => {
                        self.raw = Some(RawWrite {
                            handle,
                            remaining: total,
                            total,
                        });
                        self.reply(now_us, "!00");
                    }
                    _ => self.reply(now_us, ERR_HANDLE),
                }
            }
            "X" if self.media_powered => {
                self.reply(now_us, "Erasing");
                self.reply(now_us, "Programming");
                self.reply(now_us, "!00");
            }
            "X" => self.reply(now_us, ERR_NO_MEDIA),
            _ => self.reply(now_us, ERR_UNKNOWN),
        }
    }

    /// `O <handle><mode>>NAME`
    fn open(&mut self, args: &str) -> &'static str {
        if !self.mounted {
            return ERR_NOT_MOUNTED;
        }
        let Some((spec, name)) = args.split_once('>') else {
            return ERR_ARGUMENT;
        };
        let Some(handle) = spec.get(..1).and_then(parse_handle) else {
            return ERR_HANDLE;
        };
        if self.handles[handle].is_some() || name.is_empty() {
            return ERR_HANDLE;
        }
        self.files.entry(name.to_owned()).or_default();
        self.handles[handle] = Some(name.to_owned());
        "!00"
    }
}

fn parse_handle(text: &str) -> Option<usize> {
    text.trim()
        .parse::<usize>()
        .ok()
        .filter(|&h| h < HANDLES)
}

fn baud_for_divisor(divisor: &str) -> Option<u32> {
    match divisor {
        "1EF4" => Some(115_200),
        "0000" => Some(BASE_BAUD),
        _ => None,
    }
}

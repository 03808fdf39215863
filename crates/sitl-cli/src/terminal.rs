//! Serial terminal firmware: stdin lines go to the simulator, inbound bytes
//! go to stdout.

use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use sitl_runtime::{Context, Firmware, SessionError};
use sitl_stream::SerialPort;
use tracing::{debug, info, warn};

/// Baud rate reported to the bridge.  Informational only.
pub const TERMINAL_BAUD: u32 = 115_200;

/// Read stdin on a background thread, one line per message.  The channel
/// closes at end of input.
pub fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
        debug!("stdin reader finished");
    });
    rx
}

pub struct Terminal<W: Write> {
    target: Option<(String, u16)>,
    lines: Receiver<String>,
    out: W,
    input_open: bool,
}

impl<W: Write> Terminal<W> {
    /// `target` is connected during setup; `None` leaves the bridge offline.
    pub fn new(target: Option<(String, u16)>, lines: Receiver<String>, out: W) -> Self {
        Self {
            target,
            lines,
            out,
            input_open: true,
        }
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    fn forward_inbound(&mut self, serial: &mut impl SerialPort) {
        let mut chunk = [0u8; 256];
        loop {
            let n = serial.read_bytes(&mut chunk);
            if n == 0 {
                break;
            }
            if let Err(e) = self.out.write_all(&chunk[..n]) {
                warn!(error = %e, "stdout write failed");
                return;
            }
        }
        let _ = self.out.flush();
    }

    fn forward_outbound(&mut self, serial: &mut impl SerialPort) {
        while self.input_open {
            match self.lines.try_recv() {
                Ok(line) => {
                    let mut bytes = line.into_bytes();
                    bytes.push(b'\n');
                    serial.write_bytes(&bytes);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    info!("stdin closed; still relaying simulator output");
                    self.input_open = false;
                }
            }
        }
    }
}

impl<W: Write> Firmware for Terminal<W> {
    fn setup(&mut self, ctx: &mut Context<'_>) -> Result<(), SessionError> {
        ctx.serial.begin(TERMINAL_BAUD);
        if let Some((host, port)) = &self.target {
            ctx.serial.connect_sitl(host, *port)?;
        }
        Ok(())
    }

    fn step(&mut self, ctx: &mut Context<'_>) {
        self.forward_inbound(&mut *ctx.serial);
        self.forward_outbound(&mut *ctx.serial);
    }
}

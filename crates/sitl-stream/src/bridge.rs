//! [`StreamBridge`] – a serial port backed by the simulator link.
//!
//! Firmware talks to the bridge exactly as it would to a hardware UART and
//! never touches the [`SocketTransport`] underneath:
//!
//! * **Inbound** – every read-side call ([`available`][StreamBridge::available],
//!   [`read`][StreamBridge::read], [`peek`][StreamBridge::peek]) first drains
//!   whatever the socket currently holds into the [`InputBuffer`].  Polling is
//!   skipped while the buffer is full.  Nothing is received between calls.
//! * **Outbound** – every written byte is recorded in the [`EchoBuffer`] and,
//!   when connected, forwarded to the simulator.  Send failures are logged and
//!   swallowed, like bytes lost on a UART line.
//!
//! Link state changes are queued as [`LinkEvent`]s; the bridge never decides
//! what a lost simulator means for the process.
//!
//! # Example
//!
//! ```
//! use sitl_stream::StreamBridge;
//!
//! let mut serial = StreamBridge::new();
//! serial.begin(115_200);
//!
//! // No simulator attached: feed the input side directly.
//! serial.simulate_input(b"OK\n");
//! assert!(serial.available());
//! assert_eq!(serial.read(), Some(b'O'));
//!
//! serial.write_bytes(b"PING");
//! assert_eq!(serial.echo(), b"PING");
//! ```

use std::fmt;
use std::sync::Arc;

use sitl_transport::{Clock, RetryPolicy, SocketTransport};
use sitl_types::{LinkEvent, LinkState, SitlError};
use tracing::{debug, trace, warn};

use crate::buffer::{DEFAULT_CAPACITY, EchoBuffer, InputBuffer};
use crate::serial::SerialPort;

/// Serial-port surface over a [`SocketTransport`].
pub struct StreamBridge {
    input: InputBuffer,
    echo: EchoBuffer,
    transport: SocketTransport,
    baud: Option<u32>,
}

impl Default for StreamBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamBridge {
    /// A bridge with [`DEFAULT_CAPACITY`]-byte buffers, the system clock and
    /// the default retry policy.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// A bridge whose input and echo buffers each hold `capacity` bytes.
    /// Zero is raised to one so the socket is still polled.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            input: InputBuffer::with_capacity(capacity),
            echo: EchoBuffer::with_capacity(capacity),
            transport: SocketTransport::new(),
            baud: None,
        }
    }

    /// Use `clock` for connect backoff and write stalls.  The link and any
    /// queued events are left as they are.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.transport.set_clock(clock);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.transport.set_policy(policy);
        self
    }

    // ── serial surface ───────────────────────────────────────────────────────

    /// Record the requested baud rate.  The simulated link has no line rate.
    pub fn begin(&mut self, baud: u32) {
        self.baud = Some(baud);
        debug!(baud, "serial bridge started");
    }

    /// Close the simulator link and discard both buffers.
    pub fn end(&mut self) {
        self.disconnect_sitl();
        self.clear_buffer();
        self.baud = None;
    }

    pub fn baud_rate(&self) -> Option<u32> {
        self.baud
    }

    /// Poll the simulator, then report whether an unread byte is waiting.
    pub fn available(&mut self) -> bool {
        self.poll();
        !self.input.is_empty()
    }

    /// Poll the simulator, then consume the next unread byte.
    pub fn read(&mut self) -> Option<u8> {
        self.poll();
        self.input.pop()
    }

    /// Poll the simulator, then return the next unread byte without
    /// consuming it.
    pub fn peek(&mut self) -> Option<u8> {
        self.poll();
        self.input.peek()
    }

    pub fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
        SerialPort::read_bytes(self, buf)
    }

    pub fn read_bytes_until(&mut self, terminator: u8, buf: &mut [u8]) -> usize {
        SerialPort::read_bytes_until(self, terminator, buf)
    }

    /// Echo `byte` and forward it when connected.  Always reports one byte
    /// written.
    pub fn write(&mut self, byte: u8) -> usize {
        self.write_bytes(&[byte])
    }

    /// Echo `bytes` and forward them when connected.  Always reports
    /// `bytes.len()` written.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> usize {
        for &byte in bytes {
            if !self.echo.push(byte) {
                trace!("echo buffer full; dropping byte");
            }
        }
        if self.transport.is_connected()
            && let Err(e) = self.transport.write(bytes)
        {
            warn!(error = %e, len = bytes.len(), "dropping outbound bytes");
        }
        bytes.len()
    }

    /// Write `value`'s `Display` form; returns bytes written.
    pub fn print(&mut self, value: impl fmt::Display) -> usize {
        self.write_bytes(value.to_string().as_bytes())
    }

    /// [`print`][Self::print] followed by `\n`.
    pub fn println(&mut self, value: impl fmt::Display) -> usize {
        self.print(value) + self.write(b'\n')
    }

    /// Write `value` with `precision` digits after the decimal point, like
    /// firmware `print(float, digits)`: `print_float(1.0, 2)` writes `1.00`.
    pub fn print_float(&mut self, value: f64, precision: usize) -> usize {
        self.write_bytes(format!("{value:.precision$}").as_bytes())
    }

    /// Inject bytes as if the simulator had sent them.  Returns how many fit.
    pub fn simulate_input(&mut self, data: &[u8]) -> usize {
        let accepted = self.input.extend_from_slice(data);
        if accepted < data.len() {
            trace!(dropped = data.len() - accepted, "input buffer full");
        }
        accepted
    }

    /// Reset both buffers.  The simulator link is left alone.
    pub fn clear_buffer(&mut self) {
        self.input.clear();
        self.echo.clear();
    }

    // ── simulator link ───────────────────────────────────────────────────────

    /// Connect to the simulator, replacing any existing connection.
    ///
    /// Blocks while the simulator refuses connections, within the configured
    /// [`RetryPolicy`].
    pub fn connect_sitl(&mut self, host: &str, port: u16) -> Result<(), SitlError> {
        self.transport.connect(host, port)
    }

    pub fn disconnect_sitl(&mut self) {
        self.transport.disconnect();
    }

    pub fn is_sitl_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn link_state(&self) -> LinkState {
        self.transport.state()
    }

    /// Pop the oldest queued [`LinkEvent`].
    pub fn take_event(&mut self) -> Option<LinkEvent> {
        self.transport.take_event()
    }

    // ── diagnostics ──────────────────────────────────────────────────────────

    /// Every byte written since the last [`clear_buffer`][Self::clear_buffer],
    /// up to the buffer capacity.
    pub fn echo(&self) -> &[u8] {
        self.echo.as_slice()
    }

    pub fn input(&self) -> &InputBuffer {
        &self.input
    }

    pub fn transport(&self) -> &SocketTransport {
        &self.transport
    }

    /// Drain what the socket currently holds into the input buffer.
    fn poll(&mut self) {
        while self.transport.is_connected() {
            if self.input.is_full() {
                trace!("input buffer full; skipping poll");
                break;
            }
            match self.transport.read(self.input.spare_mut()) {
                Ok(0) => break,
                Ok(n) => self.input.commit(n),
                Err(e) => {
                    debug!(error = %e, "poll ended simulator link");
                    break;
                }
            }
        }
    }
}

impl SerialPort for StreamBridge {
    fn begin(&mut self, baud: u32) {
        StreamBridge::begin(self, baud)
    }

    fn end(&mut self) {
        StreamBridge::end(self)
    }

    fn available(&mut self) -> bool {
        StreamBridge::available(self)
    }

    fn read(&mut self) -> Option<u8> {
        StreamBridge::read(self)
    }

    fn peek(&mut self) -> Option<u8> {
        StreamBridge::peek(self)
    }

    fn write(&mut self, byte: u8) -> usize {
        StreamBridge::write(self, byte)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> usize {
        StreamBridge::write_bytes(self, bytes)
    }
}

impl fmt::Write for StreamBridge {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sitl_transport::ManualClock;
    use sitl_types::FailureReason;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::time::Duration;

    fn eventually(mut f: impl FnMut() -> bool) -> bool {
        for _ in 0..1_000 {
            if f() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    /// A bridge connected to a loopback peer, plus the peer's end.
    fn connected(capacity: usize) -> (StreamBridge, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut bridge =
            StreamBridge::with_capacity(capacity).with_clock(Arc::new(ManualClock::new()));
        bridge.connect_sitl("127.0.0.1", port).expect("connect");
        let (peer, _) = listener.accept().unwrap();
        (bridge, peer)
    }

    #[test]
    fn connect_sitl_reports_connected() {
        let (mut bridge, _peer) = connected(DEFAULT_CAPACITY);
        assert!(bridge.is_sitl_connected());
        assert_eq!(bridge.link_state(), LinkState::Connected);
        assert!(matches!(
            bridge.take_event(),
            Some(LinkEvent::Connected { .. })
        ));
    }

    #[test]
    fn reads_follow_peer_bytes_in_order() {
        let (mut bridge, mut peer) = connected(DEFAULT_CAPACITY);

        assert_eq!(bridge.read(), None);
        assert!(!bridge.available());

        peer.write_all(b"\x01\x02ATT").unwrap();
        assert!(eventually(|| {
            bridge.available();
            bridge.input().len() == 5
        }));

        let got: Vec<u8> = (0..5).filter_map(|_| bridge.read()).collect();
        assert_eq!(got, b"\x01\x02ATT");
        assert_eq!(bridge.read(), None);
        assert!(!bridge.available());
    }

    #[test]
    fn writes_reach_peer_and_echo() {
        let (mut bridge, mut peer) = connected(DEFAULT_CAPACITY);

        assert_eq!(bridge.write(b'$'), 1);
        assert_eq!(bridge.write_bytes(b"CMD,42"), 6);

        let mut got = [0u8; 7];
        peer.read_exact(&mut got).unwrap();
        assert_eq!(&got, b"$CMD,42");
        assert_eq!(bridge.echo(), b"$CMD,42");
    }

    #[test]
    fn write_without_simulator_only_echoes() {
        let mut bridge = StreamBridge::new();
        assert_eq!(bridge.write_bytes(b"telemetry"), 9);
        assert_eq!(bridge.echo(), b"telemetry");
        assert!(!bridge.is_sitl_connected());
        assert_eq!(bridge.take_event(), None);
    }

    #[test]
    fn echo_truncates_but_write_still_reports_success() {
        let mut bridge = StreamBridge::with_capacity(4);
        assert_eq!(bridge.write_bytes(b"abcdef"), 6);
        assert_eq!(bridge.echo(), b"abcd");
    }

    #[test]
    fn disconnect_leaves_io_consistent() {
        let (mut bridge, _peer) = connected(DEFAULT_CAPACITY);
        bridge.disconnect_sitl();

        assert!(!bridge.is_sitl_connected());
        assert_eq!(bridge.link_state(), LinkState::Disconnected);
        assert_eq!(bridge.write(b'x'), 1);
        assert_eq!(bridge.read(), None);
        assert!(!bridge.available());
        assert_eq!(bridge.peek(), None);
        bridge.disconnect_sitl();
        assert_eq!(bridge.read(), None);
    }

    #[test]
    fn peer_close_is_reported_as_event() {
        let (mut bridge, peer) = connected(DEFAULT_CAPACITY);
        bridge.take_event();
        drop(peer);

        assert!(eventually(|| {
            bridge.available();
            !bridge.is_sitl_connected()
        }));
        assert_eq!(
            bridge.take_event(),
            Some(LinkEvent::Lost {
                reason: FailureReason::PeerClosed
            })
        );
        assert_eq!(bridge.read(), None);
        assert_eq!(bridge.write(b'x'), 1);
    }

    #[test]
    fn data_sent_before_close_is_still_readable() {
        let (mut bridge, mut peer) = connected(DEFAULT_CAPACITY);
        peer.write_all(b"last").unwrap();
        drop(peer);

        assert!(eventually(|| {
            bridge.available();
            !bridge.is_sitl_connected()
        }));
        let mut buf = [0u8; 8];
        assert_eq!(bridge.read_bytes(&mut buf), 4);
        assert_eq!(&buf[..4], b"last");
    }

    #[test]
    fn full_buffer_skips_poll_until_drained() {
        let (mut bridge, mut peer) = connected(4);
        assert_eq!(bridge.simulate_input(b"abcd"), 4);
        peer.write_all(b"xyz").unwrap();

        assert!(bridge.available());
        assert_eq!(bridge.input().write_pos(), 4);

        let mut buf = [0u8; 4];
        assert_eq!(bridge.read_bytes(&mut buf), 4);
        assert_eq!(&buf, b"abcd");

        let mut rest = Vec::new();
        assert!(eventually(|| {
            while let Some(b) = bridge.read() {
                rest.push(b);
            }
            rest.len() == 3
        }));
        assert_eq!(rest, b"xyz");
    }

    #[test]
    fn simulate_input_without_transport() {
        let mut bridge = StreamBridge::with_capacity(8);
        assert_eq!(bridge.simulate_input(b"GPS,OK\n"), 7);

        let mut line = [0u8; 16];
        let n = bridge.read_bytes_until(b'\n', &mut line);
        assert_eq!(&line[..n], b"GPS,OK");
        assert!(!bridge.available());
    }

    #[test]
    fn simulate_input_truncates() {
        let mut bridge = StreamBridge::with_capacity(3);
        assert_eq!(bridge.simulate_input(b"12345"), 3);
        let got: Vec<u8> = std::iter::from_fn(|| bridge.read()).collect();
        assert_eq!(got, b"123");
    }

    #[test]
    fn clear_buffer_keeps_link() {
        let (mut bridge, _peer) = connected(DEFAULT_CAPACITY);
        bridge.simulate_input(b"abc");
        bridge.write_bytes(b"xyz");

        bridge.clear_buffer();

        assert!(bridge.is_sitl_connected());
        assert!(bridge.echo().is_empty());
        assert_eq!(bridge.input().read_pos(), 0);
        assert_eq!(bridge.input().write_pos(), 0);
    }

    #[test]
    fn end_disconnects_and_clears() {
        let (mut bridge, _peer) = connected(DEFAULT_CAPACITY);
        bridge.begin(57_600);
        bridge.simulate_input(b"abc");

        bridge.end();

        assert!(!bridge.is_sitl_connected());
        assert!(bridge.input().is_empty());
        assert_eq!(bridge.baud_rate(), None);
    }

    #[test]
    fn print_helpers() {
        use std::fmt::Write as _;

        let mut bridge = StreamBridge::new();
        assert_eq!(bridge.print(42), 2);
        assert_eq!(bridge.println(" m"), 3);
        write!(bridge, "alt={:.1}", 12.34).unwrap();
        assert_eq!(bridge.echo(), b"42 m\nalt=12.3");
    }

    #[test]
    fn print_float_uses_fixed_precision() {
        let mut bridge = StreamBridge::new();
        assert_eq!(bridge.print_float(1.0, 2), 4);
        bridge.write(b' ');
        bridge.print_float(-3.14159, 3);
        bridge.write(b' ');
        bridge.print_float(2.4, 0);
        assert_eq!(bridge.echo(), b"1.00 -3.142 2");
    }

    #[test]
    fn zero_capacity_still_sees_peer_close() {
        let (mut bridge, mut peer) = connected(0);
        assert_eq!(bridge.input().capacity(), 1);
        peer.write_all(b"hello").unwrap();
        drop(peer);

        let mut got = Vec::new();
        assert!(eventually(|| {
            while let Some(b) = bridge.read() {
                got.push(b);
            }
            !bridge.is_sitl_connected()
        }));
        while let Some(b) = bridge.read() {
            got.push(b);
        }
        assert_eq!(got, b"hello");
        assert_eq!(
            bridge.link_state(),
            LinkState::Failed(FailureReason::PeerClosed)
        );
    }

    #[test]
    fn with_clock_keeps_link_and_events() {
        let (bridge, _peer) = connected(DEFAULT_CAPACITY);
        let mut bridge = bridge.with_clock(Arc::new(ManualClock::new()));

        assert!(bridge.is_sitl_connected());
        assert!(matches!(
            bridge.take_event(),
            Some(LinkEvent::Connected { .. })
        ));
    }

    #[test]
    fn serial_port_trait_object() {
        let mut bridge = StreamBridge::new();
        let port: &mut dyn SerialPort = &mut bridge;
        port.begin(9_600);
        port.write_bytes(b"hi");
        assert!(!port.available());
        assert_eq!(bridge.baud_rate(), Some(9_600));
        assert_eq!(bridge.echo(), b"hi");
    }

    #[derive(Debug, Clone)]
    enum Op {
        Inject(Vec<u8>),
        Read,
        Peek,
        Available,
        Write(u8),
        ReadBytes(usize),
        Clear,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            proptest::collection::vec(any::<u8>(), 0..48).prop_map(Op::Inject),
            Just(Op::Read),
            Just(Op::Peek),
            Just(Op::Available),
            any::<u8>().prop_map(Op::Write),
            (0usize..24).prop_map(Op::ReadBytes),
            Just(Op::Clear),
        ]
    }

    #[derive(Debug, Clone)]
    enum LinkOp {
        Send(Vec<u8>),
        Read,
        Available,
        ReadBytes(usize),
    }

    fn link_op() -> impl Strategy<Value = LinkOp> {
        prop_oneof![
            proptest::collection::vec(any::<u8>(), 1..40).prop_map(LinkOp::Send),
            Just(LinkOp::Read),
            Just(LinkOp::Available),
            (0usize..24).prop_map(LinkOp::ReadBytes),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn socket_fed_input_keeps_order(ops in proptest::collection::vec(link_op(), 0..120)) {
            let (mut bridge, mut peer) = connected(16);
            let mut sent = Vec::new();
            let mut got = Vec::new();
            for op in ops {
                match op {
                    LinkOp::Send(chunk) => {
                        peer.write_all(&chunk).unwrap();
                        sent.extend_from_slice(&chunk);
                    }
                    LinkOp::Read => got.extend(bridge.read()),
                    LinkOp::Available => { bridge.available(); }
                    LinkOp::ReadBytes(n) => {
                        let mut buf = vec![0u8; n];
                        let k = bridge.read_bytes(&mut buf);
                        got.extend_from_slice(&buf[..k]);
                    }
                }
                let input = bridge.input();
                prop_assert!(input.read_pos() <= input.write_pos());
                prop_assert!(input.write_pos() <= input.capacity());
                prop_assert!(got.len() <= sent.len());
                prop_assert_eq!(&got[..], &sent[..got.len()]);
            }
            let drained = eventually(|| {
                while let Some(b) = bridge.read() {
                    got.push(b);
                }
                got.len() == sent.len()
            });
            prop_assert!(drained);
            prop_assert_eq!(got, sent);
            prop_assert!(bridge.is_sitl_connected());
        }
    }

    proptest! {
        #[test]
        fn input_cursors_stay_ordered(ops in proptest::collection::vec(op(), 0..200)) {
            let mut bridge = StreamBridge::with_capacity(64);
            for op in ops {
                match op {
                    Op::Inject(data) => { bridge.simulate_input(&data); }
                    Op::Read => { bridge.read(); }
                    Op::Peek => { bridge.peek(); }
                    Op::Available => { bridge.available(); }
                    Op::Write(b) => { bridge.write(b); }
                    Op::ReadBytes(n) => {
                        let mut buf = vec![0u8; n];
                        bridge.read_bytes(&mut buf);
                    }
                    Op::Clear => bridge.clear_buffer(),
                }
                let input = bridge.input();
                prop_assert!(input.read_pos() <= input.write_pos());
                prop_assert!(input.write_pos() <= input.capacity());
                prop_assert!(bridge.echo().len() <= 64);
            }
        }

        #[test]
        fn injected_bytes_read_back_in_order(
            chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..16), 0..8)
        ) {
            let mut bridge = StreamBridge::with_capacity(64);
            let mut expected = Vec::new();
            for chunk in &chunks {
                let accepted = bridge.simulate_input(chunk);
                expected.extend_from_slice(&chunk[..accepted]);
            }
            let got: Vec<u8> = std::iter::from_fn(|| bridge.read()).collect();
            prop_assert_eq!(got, expected);
        }
    }
}

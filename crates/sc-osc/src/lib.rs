//! sc-osc: The OSC parameter server
//!
//! Listens on UDP 127.0.0.1 for `/realtime/*` messages and writes the live
//! parameter atomics. The listener thread is the exclusive writer of those
//! values; the audio thread snapshots them once per block.
//!
//! Launch contract: the stdout sentinel line is printed only after the
//! socket bind succeeded; external launchers wait for it before sending
//! control messages (packets sent earlier would be dropped by the OS).

use std::io::Write;
use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rosc::{OscMessage, OscPacket, OscType};
use thiserror::Error;

use sc_core::db_to_linear;
use sc_engine::LiveParams;

pub const ADDR_GAIN: &str = "/realtime/gain";
pub const ADDR_FOCUS: &str = "/realtime/focus";
pub const ADDR_SPEAKER_MIX_DB: &str = "/realtime/speaker_mix_db";
pub const ADDR_SUB_MIX_DB: &str = "/realtime/sub_mix_db";
pub const ADDR_AUTO_COMP: &str = "/realtime/auto_comp";
pub const ADDR_PAUSED: &str = "/realtime/paused";
pub const ADDR_ELEVATION_MODE: &str = "/realtime/elevation_mode";

/// Socket read timeout; bounds how long `stop` can take to join
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum OscError {
    #[error("Failed to bind control port {0}: {1}")]
    Bind(u16, String),
}

/// The control listener: one UDP socket, one thread
pub struct ParameterServer {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    port: u16,
}

impl ParameterServer {
    /// Bind `127.0.0.1:<port>`, emit the launcher sentinel, and start the
    /// listener thread. Port 0 binds an ephemeral port (tests).
    pub fn start(port: u16, params: Arc<LiveParams>) -> Result<Self, OscError> {
        let socket = UdpSocket::bind(("127.0.0.1", port))
            .map_err(|e| OscError::Bind(port, e.to_string()))?;
        socket
            .set_read_timeout(Some(RECV_TIMEOUT))
            .map_err(|e| OscError::Bind(port, e.to_string()))?;
        let bound_port = socket
            .local_addr()
            .map_err(|e| OscError::Bind(port, e.to_string()))?
            .port();

        // The synchronization sentinel; launchers block on this line
        println!("ParameterServer listening on 127.0.0.1:{}", bound_port);
        let _ = std::io::stdout().flush();

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name("osc-listener".into())
            .spawn(move || listen(socket, thread_running, params))
            .map_err(|e| OscError::Bind(bound_port, e.to_string()))?;

        Ok(Self {
            running,
            thread: Some(thread),
            port: bound_port,
        })
    }

    /// The bound port (differs from the requested one only for port 0)
    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop and join the listener thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ParameterServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn listen(socket: UdpSocket, running: Arc<AtomicBool>, params: Arc<LiveParams>) {
    let mut buf = [0u8; rosc::decoder::MTU];
    while running.load(Ordering::Acquire) {
        match socket.recv_from(&mut buf) {
            Ok((len, _)) => match rosc::decoder::decode_udp(&buf[..len]) {
                Ok((_, packet)) => dispatch_packet(packet, &params),
                Err(e) => log::debug!("osc: undecodable packet: {}", e),
            },
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => log::debug!("osc: recv error: {}", e),
        }
    }
}

fn dispatch_packet(packet: OscPacket, params: &LiveParams) {
    match packet {
        OscPacket::Message(message) => dispatch(message, params),
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                dispatch_packet(inner, params);
            }
        }
    }
}

fn float_arg(message: &OscMessage) -> Option<f32> {
    match message.args.first() {
        Some(OscType::Float(value)) => Some(*value),
        Some(OscType::Double(value)) => Some(*value as f32),
        Some(OscType::Int(value)) => Some(*value as f32),
        _ => None,
    }
}

fn dispatch(message: OscMessage, params: &LiveParams) {
    let Some(value) = float_arg(&message) else {
        log::debug!("osc: {} without a numeric argument", message.addr);
        return;
    };

    match message.addr.as_str() {
        ADDR_GAIN => params.set_master_gain(value),
        ADDR_FOCUS => {
            params.set_focus(value);
            // Auto-comp tracks focus changes while enabled
            if params.auto_comp() {
                params.request_auto_comp();
            }
        }
        ADDR_SPEAKER_MIX_DB => params.set_speaker_mix(db_to_linear(value)),
        ADDR_SUB_MIX_DB => params.set_sub_mix(db_to_linear(value)),
        ADDR_AUTO_COMP => params.set_auto_comp(value >= 0.5),
        ADDR_PAUSED => params.set_paused(value >= 0.5),
        ADDR_ELEVATION_MODE => params.set_elevation_mode(value.round().max(0.0) as u8),
        other => log::debug!("osc: unhandled address {}", other),
    }
}

use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Sender};
use expedition_runtime::ConsoleFrame;

use crate::console::ConsoleStatePushed;

const SERVER_TARGET: &str = "salvage::server";

/// Broadcasts console state frames to every connected client.
///
/// Frames are little-endian `u32` length-prefixed JSON. Late joiners get the
/// most recent frame on connect.
pub struct ConsoleStateServer {
    sender: Sender<Vec<u8>>,
    latest_frame: Arc<Mutex<Option<Vec<u8>>>>,
}

impl ConsoleStateServer {
    pub fn broadcast(&self, bytes: &[u8]) {
        match self.latest_frame.lock() {
            Ok(mut guard) => *guard = Some(bytes.to_vec()),
            Err(err) => {
                tracing::error!(target: SERVER_TARGET, error = %err, "console_stream.latest_poisoned");
            }
        }
        if let Err(err) = self.sender.send(bytes.to_vec()) {
            tracing::error!(target: SERVER_TARGET, error = %err, "console_stream.queue_failed");
        }
    }

    pub fn broadcast_push(&self, push: &ConsoleStatePushed) {
        let frame = ConsoleFrame {
            console: push.console.to_bits(),
            station: push.station.to_bits(),
            state: push.state.clone(),
        };
        match frame.encode() {
            Ok(bytes) => self.broadcast(&bytes),
            Err(err) => {
                tracing::warn!(target: SERVER_TARGET, error = %err, "console_stream.encode_failed");
            }
        }
    }
}

pub fn start_console_state_server(bind_addr: SocketAddr) -> Option<ConsoleStateServer> {
    let listener = match TcpListener::bind(bind_addr) {
        Ok(listener) => listener,
        Err(err) => {
            tracing::warn!(
                target: SERVER_TARGET,
                addr = %bind_addr,
                error = %err,
                "console_stream.bind_failed=broadcast_disabled"
            );
            return None;
        }
    };
    if let Err(err) = listener.set_nonblocking(true) {
        tracing::warn!(
            target: SERVER_TARGET,
            addr = %bind_addr,
            error = %err,
            "console_stream.nonblocking_failed=broadcast_disabled"
        );
        return None;
    }

    let (sender, receiver) = unbounded::<Vec<u8>>();
    let clients: Arc<Mutex<Vec<TcpStream>>> = Arc::new(Mutex::new(Vec::new()));
    let accept_clients = Arc::clone(&clients);
    let latest_frame: Arc<Mutex<Option<Vec<u8>>>> = Arc::new(Mutex::new(None));
    let accept_latest = Arc::clone(&latest_frame);

    thread::spawn(move || loop {
        match listener.accept() {
            Ok((mut stream, addr)) => {
                tracing::info!(target: SERVER_TARGET, %addr, "console_stream.client_connected");
                if let Err(err) = stream.set_nodelay(true) {
                    tracing::warn!(target: SERVER_TARGET, %addr, error = %err, "console_stream.nodelay_failed");
                }
                if let Err(err) = stream.set_nonblocking(false) {
                    tracing::warn!(target: SERVER_TARGET, %addr, error = %err, "console_stream.blocking_failed");
                }
                let latest = accept_latest.lock().ok().and_then(|guard| guard.clone());
                if let Some(frame) = latest {
                    if let Err(err) = write_frame(&mut stream, &frame) {
                        tracing::warn!(target: SERVER_TARGET, %addr, error = %err, "console_stream.initial_frame_failed");
                        continue;
                    }
                }
                if let Ok(mut guard) = accept_clients.lock() {
                    guard.push(stream);
                }
            }
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                tracing::error!(target: SERVER_TARGET, error = %err, "console_stream.accept_failed");
                thread::sleep(Duration::from_millis(200));
            }
        }

        while let Ok(frame) = receiver.try_recv() {
            broadcast_frame(&clients, &frame);
        }
    });

    Some(ConsoleStateServer {
        sender,
        latest_frame,
    })
}

pub fn write_frame<W: Write>(stream: &mut W, frame: &[u8]) -> io::Result<()> {
    let len = frame.len() as u32;
    let mut buffer = Vec::with_capacity(4 + frame.len());
    buffer.extend_from_slice(&len.to_le_bytes());
    buffer.extend_from_slice(frame);
    stream.write_all(&buffer)
}

fn broadcast_frame(clients: &Arc<Mutex<Vec<TcpStream>>>, frame: &[u8]) {
    let Ok(mut guard) = clients.lock() else {
        return;
    };
    guard.retain_mut(|stream| match write_frame(stream, frame) {
        Ok(_) => true,
        Err(err) => {
            tracing::warn!(target: SERVER_TARGET, error = %err, "console_stream.client_dropped");
            false
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_length_prefixed() {
        let mut out = Vec::new();
        write_frame(&mut out, b"{}").unwrap();
        assert_eq!(out, vec![2, 0, 0, 0, b'{', b'}']);
    }
}

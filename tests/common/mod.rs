//! In-process broker for integration tests.
//!
//! Accepts any number of connections on a background thread, answers
//! CONNECT with CONNECTED, closes the socket after DISCONNECT and reports
//! every frame it receives over a channel.
#![allow(dead_code)]

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long to wait for a frame before a test gives up.
pub const WAIT: Duration = Duration::from_secs(5);

/// Helper to find an available port
pub fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// A frame as seen by the broker, tagged with the index of the socket it
/// arrived on (0 for the first accepted connection).
#[derive(Debug, Clone)]
pub struct SeenFrame {
    pub conn: usize,
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl SeenFrame {
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

pub struct MockBroker {
    pub port: u16,
    frames: mpsc::Receiver<SeenFrame>,
    peers: Arc<Mutex<Vec<TcpStream>>>,
    stop: Arc<AtomicBool>,
    acceptor: Option<JoinHandle<()>>,
}

impl MockBroker {
    pub fn start() -> Self {
        Self::start_on(get_available_port())
    }

    pub fn start_on(port: u16) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", port)).expect("bind mock broker");
        listener.set_nonblocking(true).unwrap();

        let (tx, frames) = mpsc::channel();
        let peers = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let acceptor = {
            let peers = peers.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    match listener.accept() {
                        Ok((stream, _)) => {
                            stream.set_nonblocking(false).unwrap();
                            let conn = {
                                let mut peers = peers.lock().unwrap();
                                peers.push(stream.try_clone().unwrap());
                                peers.len() - 1
                            };
                            let tx = tx.clone();
                            thread::spawn(move || serve(conn, stream, tx));
                        }
                        Err(e) if e.kind() == ErrorKind::WouldBlock => {
                            thread::sleep(Duration::from_millis(10));
                        }
                        Err(_) => break,
                    }
                }
            })
        };

        MockBroker {
            port,
            frames,
            peers,
            stop,
            acceptor: Some(acceptor),
        }
    }

    /// `host:port` of the broker.
    pub fn addr(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    /// Next frame any connection sent; panics after `WAIT`.
    pub fn next_frame(&self) -> SeenFrame {
        self.frames
            .recv_timeout(WAIT)
            .expect("broker received no frame in time")
    }

    /// Next frame, which must carry `command`.
    pub fn expect(&self, command: &str) -> SeenFrame {
        let frame = self.next_frame();
        assert_eq!(frame.command, command, "unexpected frame {:?}", frame);
        frame
    }

    /// Skip frames until one with `command` arrives.
    pub fn wait_for(&self, command: &str) -> SeenFrame {
        loop {
            let frame = self.next_frame();
            if frame.command == command {
                return frame;
            }
        }
    }

    /// Assert nothing arrives within `quiet`.
    pub fn assert_quiet(&self, quiet: Duration) {
        if let Ok(frame) = self.frames.recv_timeout(quiet) {
            panic!("unexpected frame {:?}", frame);
        }
    }

    /// Write raw bytes to connection `conn`.
    pub fn send_raw(&self, conn: usize, bytes: &[u8]) {
        let mut peers = self.peers.lock().unwrap();
        peers[conn].write_all(bytes).expect("write to client");
        peers[conn].flush().unwrap();
    }

    /// Write a MESSAGE frame to connection `conn`.
    pub fn deliver(&self, conn: usize, destination: &str, message_id: &str, body: &str) {
        let frame = format!(
            "MESSAGE\ndestination:{}\nmessage-id:{}\n\n{}\0",
            destination, message_id, body
        );
        self.send_raw(conn, frame.as_bytes());
    }

    /// Close connection `conn` from the broker side.
    pub fn drop_connection(&self, conn: usize) {
        let peers = self.peers.lock().unwrap();
        let _ = peers[conn].shutdown(Shutdown::Both);
    }

    /// Stop listening and close every accepted socket.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(acceptor) = self.acceptor.take() {
            let _ = acceptor.join();
        }
        // drop our handles too so the sockets really close
        for peer in self.peers.lock().unwrap().drain(..) {
            let _ = peer.shutdown(Shutdown::Both);
        }
    }
}

impl Drop for MockBroker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn serve(conn: usize, stream: TcpStream, tx: mpsc::Sender<SeenFrame>) {
    let mut writer = stream.try_clone().unwrap();
    let mut reader = BufReader::new(stream);
    loop {
        let mut raw = Vec::new();
        match reader.read_until(0, &mut raw) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        if raw.pop() != Some(0) {
            // stream ended mid-frame
            break;
        }
        let Some(frame) = parse(conn, &raw) else {
            continue;
        };

        let command = frame.command.clone();
        let _ = tx.send(frame);
        match command.as_str() {
            "CONNECT" => {
                let _ = writer.write_all(b"CONNECTED\nserver:mock\n\n\0");
            }
            "DISCONNECT" => {
                let _ = writer.shutdown(Shutdown::Both);
                break;
            }
            _ => {}
        }
    }
}

fn parse(conn: usize, raw: &[u8]) -> Option<SeenFrame> {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim_start_matches(['\r', '\n']);
    if text.is_empty() {
        return None;
    }
    let (head, body) = text.split_once("\n\n").unwrap_or((text, ""));
    let mut lines = head.lines();
    let command = lines.next()?.trim().to_string();
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Some(SeenFrame {
        conn,
        command,
        headers,
        body: body.to_string(),
    })
}

use std::io::{self, BufRead, BufReader, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::warn;

use crate::model::messages::{decode_frame, encode_frame, Frame};

// node_id doubles as this node's TCP listening port on bind_address.
pub fn listen(bind_address: &str, node_id: u32) -> io::Result<TcpListener> {
    TcpListener::bind((bind_address, node_id as u16))
}

pub fn connect(bind_address: &str, neighbor_id: u32) -> io::Result<TcpStream> {
    TcpStream::connect((bind_address, neighbor_id as u16))
}

// Compared by identity to recognize "this is the stream that just failed".
#[derive(Clone)]
pub struct OutboundHandle {
    stream: Arc<Mutex<TcpStream>>,
}

impl OutboundHandle {
    pub fn new(stream: TcpStream) -> io::Result<(Self, TcpStream)> {
        let reader_half = stream.try_clone()?;
        Ok((
            Self {
                stream: Arc::new(Mutex::new(stream)),
            },
            reader_half,
        ))
    }

    pub fn send_frame(&self, frame: &Frame) -> anyhow::Result<()> {
        let mut payload = encode_frame(frame)?;
        payload.extend_from_slice(b"\r\n");
        let mut guard = self.stream.lock().expect("outbound stream lock poisoned");
        guard.write_all(&payload)?;
        guard.flush()?;
        Ok(())
    }

    pub fn close(&self) {
        let guard = self.stream.lock().expect("outbound stream lock poisoned");
        let _ = guard.shutdown(Shutdown::Both);
    }
}

impl PartialEq for OutboundHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.stream, &other.stream)
    }
}

impl Eq for OutboundHandle {}

// A malformed frame is logged and skipped without touching the
// connection; on_disconnect runs once, on an actual read failure or EOF.
pub fn spawn_frame_reader<F, D>(stream: TcpStream, mut on_frame: F, on_disconnect: D)
where
    F: FnMut(Frame) + Send + 'static,
    D: FnOnce() + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        loop {
            let mut line = Vec::new();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => {
                    let trimmed = trim_delimiter(&line);
                    if trimmed.is_empty() {
                        continue;
                    }
                    match decode_frame(trimmed) {
                        Ok(frame) => on_frame(frame),
                        Err(err) => warn!(error = %err, "dropping malformed frame"),
                    }
                }
                Err(_) => break,
            }
        }
        on_disconnect();
    });
}

fn trim_delimiter(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}

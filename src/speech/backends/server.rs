//! Streaming server backend
//!
//! Binds a local port and streams every request, as a JSON text frame over
//! WebSocket, to all connected renderers. The socket work happens on the
//! server's own mio event loop; the backend only queues messages and wakes
//! the loop.
//!
//! A port that cannot be bound is not an error for the caller: the failure
//! is recorded in [`SharedState`] for a one-time user notice and the
//! backend stays inert, dropping requests until it is recreated.

use crate::speech::{Backend, BackendKind, SpeechRequest, SpeechTicket};
use crate::state::SharedState;
use crate::voice::VoicePreset;
use crate::BackendError;
use log::{debug, error, info, warn};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tungstenite::handshake::server::{NoCallback, ServerHandshake};
use tungstenite::handshake::{HandshakeError, MidHandshake};
use tungstenite::{Message, WebSocket};

/// Token for the listening socket
const LISTENER: Token = Token(0);
/// Token for the cross-thread waker
const WAKER: Token = Token(1);
/// First token handed to a client connection
const FIRST_CLIENT: usize = 2;

/// Frame kind sent to renderers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MessageType {
    Say,
    Cancel,
}

/// JSON frame sent to every connected renderer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpcMessage {
    #[serde(rename = "Type")]
    pub kind: MessageType,
    pub payload: String,
    pub voice: Option<VoicePreset>,
}

impl IpcMessage {
    pub fn say(text: &str, voice: VoicePreset) -> Self {
        Self {
            kind: MessageType::Say,
            payload: text.to_string(),
            voice: Some(voice),
        }
    }

    pub fn cancel() -> Self {
        Self {
            kind: MessageType::Cancel,
            payload: String::new(),
            voice: None,
        }
    }
}

enum Command {
    Broadcast(String),
    Shutdown,
}

type Handshake = MidHandshake<ServerHandshake<TcpStream, NoCallback>>;

enum Client {
    Handshaking(Handshake),
    Open(WebSocket<TcpStream>),
}

fn would_block(e: &tungstenite::Error) -> bool {
    matches!(e, tungstenite::Error::Io(err) if err.kind() == io::ErrorKind::WouldBlock)
}

/// The server's event loop
struct EventLoop {
    poll: Poll,
    listener: TcpListener,
    commands: Receiver<Command>,
    clients: HashMap<Token, Client>,
    next_token: usize,
}

impl EventLoop {
    fn run(mut self) {
        let mut events = Events::with_capacity(128);

        loop {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!("Streaming server poll failed: {}", e);
                return;
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept(),
                    WAKER => {
                        if !self.drain_commands() {
                            debug!("Streaming server shutting down");
                            return;
                        }
                    }
                    token => self.service(token),
                }
            }
        }
    }

    fn accept(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, addr)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;

                    if let Err(e) = self.poll.registry().register(
                        &mut stream,
                        token,
                        Interest::READABLE | Interest::WRITABLE,
                    ) {
                        warn!("Failed to register connection from {}: {}", addr, e);
                        continue;
                    }

                    debug!("Renderer connecting from {}", addr);
                    self.handshake(token, tungstenite::accept(stream));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    return;
                }
            }
        }
    }

    fn handshake(
        &mut self,
        token: Token,
        result: Result<WebSocket<TcpStream>, HandshakeError<ServerHandshake<TcpStream, NoCallback>>>,
    ) {
        match result {
            Ok(ws) => {
                info!("Renderer connected");
                self.clients.insert(token, Client::Open(ws));
            }
            Err(HandshakeError::Interrupted(mid)) => {
                self.clients.insert(token, Client::Handshaking(mid));
            }
            Err(HandshakeError::Failure(e)) => {
                debug!("WebSocket handshake failed: {}", e);
            }
        }
    }

    /// Handle readiness on a client socket
    fn service(&mut self, token: Token) {
        let client = match self.clients.remove(&token) {
            Some(client) => client,
            None => return,
        };

        match client {
            Client::Handshaking(mid) => self.handshake(token, mid.handshake()),
            Client::Open(mut ws) => {
                if Self::pump(&mut ws) {
                    self.clients.insert(token, Client::Open(ws));
                } else {
                    debug!("Renderer disconnected");
                    let _ = self.poll.registry().deregister(ws.get_mut());
                }
            }
        }
    }

    /// Read whatever the client sent and flush pending output
    ///
    /// Returns false once the connection is finished.
    fn pump(ws: &mut WebSocket<TcpStream>) -> bool {
        loop {
            match ws.read() {
                // Renderers have nothing to tell us; frames are ignored
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) if would_block(&e) => break,
                Err(_) => return false,
            }
        }

        match ws.flush() {
            Ok(()) => ws.can_write(),
            Err(e) if would_block(&e) => true,
            Err(_) => false,
        }
    }

    /// Process queued commands; returns false on shutdown
    fn drain_commands(&mut self) -> bool {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Broadcast(frame) => self.broadcast(&frame),
                Command::Shutdown => return false,
            }
        }
        true
    }

    fn broadcast(&mut self, frame: &str) {
        let mut closed = Vec::new();

        for (token, client) in self.clients.iter_mut() {
            if let Client::Open(ws) = client {
                match ws.send(Message::text(frame.to_string())) {
                    Ok(()) => {}
                    // Queued in tungstenite's buffer; flushed on the next writable event
                    Err(e) if would_block(&e) => {}
                    Err(e) => {
                        debug!("Dropping renderer: {}", e);
                        closed.push(*token);
                    }
                }
            }
        }

        for token in closed {
            if let Some(Client::Open(mut ws)) = self.clients.remove(&token) {
                let _ = self.poll.registry().deregister(ws.get_mut());
            }
        }
    }
}

/// Streaming server backend
pub struct StreamingServer {
    port: u16,
    commands: Option<Sender<Command>>,
    waker: Option<Arc<Waker>>,
    thread: Option<JoinHandle<()>>,
}

impl StreamingServer {
    /// Bind `port` on localhost and start the event loop
    ///
    /// A bind failure is recorded in `shared` and yields an inert server;
    /// only failures to set up the event loop itself are returned.
    pub fn new(port: u16, shared: Arc<SharedState>) -> Result<Self, BackendError> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));

        let listener = match std::net::TcpListener::bind(addr) {
            Ok(listener) => listener,
            Err(e) => {
                let failure = BackendError::Bind {
                    port,
                    reason: e.to_string(),
                };
                error!("{}", failure);
                shared.record_bind_failure(port);
                return Ok(Self::inert(port));
            }
        };
        shared.clear_bind_failure();

        listener.set_nonblocking(true)?;
        let mut listener = TcpListener::from_std(listener);

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);

        let (tx, rx) = mpsc::channel();
        let event_loop = EventLoop {
            poll,
            listener,
            commands: rx,
            clients: HashMap::new(),
            next_token: FIRST_CLIENT,
        };

        let thread = thread::Builder::new()
            .name("chatspeak-server".to_string())
            .spawn(move || event_loop.run())?;

        Ok(Self {
            port,
            commands: Some(tx),
            waker: Some(waker),
            thread: Some(thread),
        })
    }

    fn inert(port: u16) -> Self {
        Self {
            port,
            commands: None,
            waker: None,
            thread: None,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// False when the port could not be bound or the server was disposed
    pub fn is_listening(&self) -> bool {
        self.commands.is_some()
    }

    fn send(&self, command: Command) {
        let (tx, waker) = match (&self.commands, &self.waker) {
            (Some(tx), Some(waker)) => (tx, waker),
            _ => return,
        };
        if tx.send(command).is_err() {
            debug!("Streaming server loop has exited");
            return;
        }
        if let Err(e) = waker.wake() {
            warn!("Failed to wake streaming server: {}", e);
        }
    }

    fn send_message(&self, message: &IpcMessage) {
        match serde_json::to_string(message) {
            Ok(frame) => self.send(Command::Broadcast(frame)),
            Err(e) => warn!("Failed to encode server message: {}", e),
        }
    }
}

impl Backend for StreamingServer {
    fn kind(&self) -> BackendKind {
        BackendKind::Server
    }

    fn synthesize(
        &mut self,
        request: SpeechRequest,
        ticket: SpeechTicket,
    ) -> Result<(), BackendError> {
        if !self.is_listening() {
            debug!("Streaming server is inert, dropping utterance");
        } else {
            self.send_message(&IpcMessage::say(&request.text, request.voice));
        }
        // Renderers report no completion; the request is done once sent
        ticket.finish();
        Ok(())
    }

    fn cancel(&mut self) {
        self.send_message(&IpcMessage::cancel());
    }

    fn dispose(&mut self) {
        if self.commands.is_none() {
            return;
        }
        self.send(Command::Shutdown);
        self.commands = None;

        // Joining releases the port before a replacement binds it. The waker
        // must outlive the join or a pending wake can be lost with its fd.
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Streaming server thread panicked");
            }
        }
        self.waker = None;
        info!("Streaming server on port {} stopped", self.port);
    }
}

impl Drop for StreamingServer {
    fn drop(&mut self) {
        self.dispose();
    }
}

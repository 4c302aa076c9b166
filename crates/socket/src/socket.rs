/// Socket descriptor table, grounded on `cyclone_tcp/core/socket.h`'s
/// `Socket`/`socketTable`/`socket*` API surface.
use std::collections::VecDeque;
use std::net::IpAddr;

use common::StackError;
use tcp::{Tcb, TcbEvent, TcpConfig, TcpSegment, TcpState};

use crate::config::{SOCKET_DGRAM_QUEUE_CAPACITY, SOCKET_EPHEMERAL_PORT_MAX, SOCKET_EPHEMERAL_PORT_MIN,
    SOCKET_MAX_COUNT};
use crate::flags::{SocketEventMask, SocketFlags, SocketProtocol, SocketShutdown, SocketType};

#[derive(Debug, Clone)]
pub struct DatagramItem {
    pub remote_addr: IpAddr,
    pub remote_port: u16,
    pub data: Vec<u8>,
}

/// One entry in the descriptor table. TCP-specific state lives in `tcb`;
/// UDP-specific state lives in `dgram_queue`.
#[derive(Debug, Clone)]
pub struct Socket {
    pub descriptor: usize,
    pub socket_type: SocketType,
    pub protocol: SocketProtocol,
    pub local_addr: Option<IpAddr>,
    pub local_port: u16,
    pub remote_addr: Option<IpAddr>,
    pub remote_port: u16,
    pub timeout_ms: Option<u64>,
    pub last_error: Option<StackError>,
    pub event_mask: SocketEventMask,
    pub event_flags: SocketEventMask,

    pub tcb: Option<Tcb>,
    pub tx_queue: VecDeque<u8>,
    pub acked_len: usize,
    pub rx_queue: VecDeque<u8>,

    pub dgram_queue: VecDeque<DatagramItem>,
    pub listening: bool,
    pub pending_children: VecDeque<usize>,
}

impl Socket {
    fn new(descriptor: usize, socket_type: SocketType, protocol: SocketProtocol) -> Self {
        Self {
            descriptor,
            socket_type,
            protocol,
            local_addr: None,
            local_port: 0,
            remote_addr: None,
            remote_port: 0,
            timeout_ms: None,
            last_error: None,
            event_mask: SocketEventMask::default(),
            event_flags: SocketEventMask::default(),
            tcb: None,
            tx_queue: VecDeque::new(),
            acked_len: 0,
            rx_queue: VecDeque::new(),
            dgram_queue: VecDeque::new(),
            listening: false,
            pending_children: VecDeque::new(),
        }
    }
}

/// Describes one socket to watch in a `poll` call; mirrors the C header's
/// `SocketEventDesc`.
#[derive(Debug, Clone, Copy)]
pub struct SocketEventDesc {
    pub descriptor: usize,
    pub event_mask: SocketEventMask,
    pub event_flags: SocketEventMask,
}

pub struct SocketTable {
    sockets: Vec<Option<Socket>>,
    next_ephemeral_port: u16,
}

impl SocketTable {
    pub fn new() -> Self {
        let mut sockets = Vec::with_capacity(SOCKET_MAX_COUNT);
        sockets.resize_with(SOCKET_MAX_COUNT, || None);
        Self { sockets, next_ephemeral_port: SOCKET_EPHEMERAL_PORT_MIN }
    }

    fn alloc_ephemeral_port(&mut self) -> u16 {
        let port = self.next_ephemeral_port;
        self.next_ephemeral_port = if port >= SOCKET_EPHEMERAL_PORT_MAX {
            SOCKET_EPHEMERAL_PORT_MIN
        } else {
            port + 1
        };
        port
    }

    pub fn open(&mut self, socket_type: SocketType, protocol: SocketProtocol) -> Result<usize, StackError> {
        let slot = self
            .sockets
            .iter()
            .position(|s| s.is_none())
            .ok_or(StackError::OutOfResources)?;
        self.sockets[slot] = Some(Socket::new(slot, socket_type, protocol));
        Ok(slot)
    }

    pub fn close(&mut self, descriptor: usize) -> Result<(), StackError> {
        self.get_mut(descriptor)?;
        self.sockets[descriptor] = None;
        Ok(())
    }

    fn get(&self, descriptor: usize) -> Result<&Socket, StackError> {
        self.sockets
            .get(descriptor)
            .and_then(|s| s.as_ref())
            .ok_or(StackError::InvalidParameter("socket descriptor not open"))
    }

    fn get_mut(&mut self, descriptor: usize) -> Result<&mut Socket, StackError> {
        self.sockets
            .get_mut(descriptor)
            .and_then(|s| s.as_mut())
            .ok_or(StackError::InvalidParameter("socket descriptor not open"))
    }

    pub fn set_timeout(&mut self, descriptor: usize, timeout_ms: Option<u64>) -> Result<(), StackError> {
        self.get_mut(descriptor)?.timeout_ms = timeout_ms;
        Ok(())
    }

    pub fn bind(&mut self, descriptor: usize, addr: IpAddr, port: u16) -> Result<(), StackError> {
        let socket = self.get_mut(descriptor)?;
        socket.local_addr = Some(addr);
        socket.local_port = port;
        Ok(())
    }

    /// Active open (`connect`): assigns an ephemeral port if unbound and
    /// drives the TCB into SYN-SENT. `iss` is supplied by the caller (the
    /// RNG-backed ISN generator lives above this layer).
    pub fn connect(
        &mut self,
        descriptor: usize,
        remote_addr: IpAddr,
        remote_port: u16,
        iss: u32,
        mss: u16,
        config: TcpConfig,
    ) -> Result<(), StackError> {
        let port = if self.get(descriptor)?.local_port == 0 {
            Some(self.alloc_ephemeral_port())
        } else {
            None
        };
        let socket = self.get_mut(descriptor)?;
        if socket.socket_type != SocketType::Stream {
            return Err(StackError::InvalidParameter("connect() requires a stream socket"));
        }
        if let Some(port) = port {
            socket.local_port = port;
        }
        socket.remote_addr = Some(remote_addr);
        socket.remote_port = remote_port;
        socket.tcb = Some(Tcb::new_active_open(iss, mss, config));
        Ok(())
    }

    pub fn listen(&mut self, descriptor: usize, config: TcpConfig) -> Result<(), StackError> {
        let socket = self.get_mut(descriptor)?;
        if socket.socket_type != SocketType::Stream {
            return Err(StackError::InvalidParameter("listen() requires a stream socket"));
        }
        socket.listening = true;
        socket.tcb = Some(Tcb::new_listener(config));
        Ok(())
    }

    /// Called by the RX task when a SYN arrives for a listening socket;
    /// queues the attempt (bounded by `TCP_SYN_QUEUE_SIZE` inside the
    /// TCB) and returns the ISN the SYN-ACK should carry.
    pub fn accept_syn(
        &mut self,
        listener: usize,
        remote_addr: IpAddr,
        remote_port: u16,
        peer_isn: u32,
        mss: u16,
        local_isn: u32,
    ) -> Result<(), StackError> {
        let socket = self.get_mut(listener)?;
        if !socket.listening {
            return Err(StackError::InvalidParameter("accept_syn() on a non-listening socket"));
        }
        let tcb = socket.tcb.as_mut().ok_or(StackError::InvalidParameter("listener has no control block"))?;
        tcb.enqueue_syn(tcp::SynQueueItem { src_port: remote_port, isn: peer_isn, mss })?;

        let listener_socket = self.get(listener)?;
        let config = listener_socket.tcb.as_ref().unwrap().config;
        let listener_local_addr = listener_socket.local_addr;
        let listener_local_port = listener_socket.local_port;

        let child = self.open(SocketType::Stream, SocketProtocol::Tcp)?;
        let child_socket = self.get_mut(child)?;
        child_socket.local_addr = listener_local_addr;
        child_socket.local_port = listener_local_port;
        child_socket.remote_addr = Some(remote_addr);
        child_socket.remote_port = remote_port;
        child_socket.tcb = Some(Tcb::new_passive_child(local_isn, peer_isn, mss, config));

        self.get_mut(listener)?.pending_children.push_back(child);
        Ok(())
    }

    /// `accept()`: pops the oldest completed (or in-progress) connection
    /// queued against a listening socket.
    pub fn accept(&mut self, listener: usize) -> Result<usize, StackError> {
        let socket = self.get_mut(listener)?;
        socket.pending_children.pop_front().ok_or(StackError::Timeout)
    }

    pub fn local_addr(&self, descriptor: usize) -> Result<(Option<IpAddr>, u16), StackError> {
        let socket = self.get(descriptor)?;
        Ok((socket.local_addr, socket.local_port))
    }

    pub fn remote_addr(&self, descriptor: usize) -> Result<(Option<IpAddr>, u16), StackError> {
        let socket = self.get(descriptor)?;
        Ok((socket.remote_addr, socket.remote_port))
    }

    /// Feeds an inbound TCP segment through the socket's control block and
    /// updates its pending event flags accordingly.
    pub fn process_segment(&mut self, descriptor: usize, seg: &TcpSegment, now_ms: u64) -> Result<TcbEvent, StackError> {
        let socket = self.get_mut(descriptor)?;
        let tcb = socket.tcb.as_mut().ok_or(StackError::InvalidParameter("socket has no control block"))?;
        let event = tcb.process_segment(seg, now_ms)?;
        match &event {
            TcbEvent::EstablishedConnection => socket.event_flags.set(SocketEventMask::CONNECTED),
            TcbEvent::DataAvailable(n) => {
                socket.rx_queue.extend(seg.payload[seg.payload.len() - n..].iter().copied());
                socket.event_flags.set(SocketEventMask::RX_READY);
            }
            TcbEvent::PeerClosed => socket.event_flags.set(SocketEventMask::RX_SHUTDOWN),
            TcbEvent::Reset(_) | TcbEvent::Closed => socket.event_flags.set(SocketEventMask::CLOSED),
            TcbEvent::None => {}
        }
        Ok(event)
    }

    /// Stream send: enqueues `data` for transmission. Under `WAIT_ACK`
    /// the call only reports bytes once the peer has acknowledged them
    /// (tracked via `acked_len`, advanced externally as ACKs arrive) —
    /// here that means the byte count already sitting at or below
    /// `snd_una` relative to when the call started.
    pub fn send(&mut self, descriptor: usize, data: &[u8], flags: SocketFlags) -> Result<usize, StackError> {
        let socket = self.get_mut(descriptor)?;
        if socket.socket_type != SocketType::Stream {
            return Err(StackError::InvalidParameter("send() requires a stream socket"));
        }
        let tcb = socket.tcb.as_ref().ok_or(StackError::InvalidParameter("socket has no control block"))?;
        if !matches!(tcb.state, TcpState::Established | TcpState::CloseWait) {
            return Err(StackError::UnexpectedState("send() on a socket that is not connected"));
        }
        socket.tx_queue.extend(data.iter().copied());
        if flags.has(SocketFlags::WAIT_ACK) {
            // Caller must poll TX_COMPLETE before treating these bytes as
            // durably sent; report them as merely queued for now.
            Ok(0)
        } else {
            Ok(data.len())
        }
    }

    /// Drains up to `tx_queue.len()` bytes once the peer has acknowledged
    /// them, used to satisfy a prior `WAIT_ACK` send.
    pub fn mark_acked(&mut self, descriptor: usize, acked_bytes: usize) -> Result<(), StackError> {
        let socket = self.get_mut(descriptor)?;
        let n = acked_bytes.min(socket.tx_queue.len());
        for _ in 0..n {
            socket.tx_queue.pop_front();
        }
        socket.acked_len += n;
        if socket.tx_queue.is_empty() {
            socket.event_flags.set(SocketEventMask::TX_COMPLETE);
        }
        Ok(())
    }

    /// Stream receive: copies buffered bytes into `buf`. `BREAK_CHAR`
    /// stops at (and consumes) the first occurrence of the break byte;
    /// `WAIT_ALL` is honored by the caller deciding whether a short read
    /// is acceptable, since this call never blocks on its own.
    pub fn receive(&mut self, descriptor: usize, buf: &mut [u8], flags: SocketFlags) -> Result<usize, StackError> {
        let socket = self.get_mut(descriptor)?;
        if socket.socket_type != SocketType::Stream {
            return Err(StackError::InvalidParameter("receive() requires a stream socket"));
        }

        let limit = if let Some(break_byte) = flags.break_byte() {
            socket
                .rx_queue
                .iter()
                .position(|&b| b == break_byte)
                .map(|pos| pos + 1)
                .unwrap_or(socket.rx_queue.len())
        } else {
            socket.rx_queue.len()
        };
        let n = limit.min(buf.len());

        if flags.has(SocketFlags::PEEK) {
            for (i, b) in socket.rx_queue.iter().take(n).enumerate() {
                buf[i] = *b;
            }
        } else {
            for slot in buf.iter_mut().take(n) {
                *slot = socket.rx_queue.pop_front().unwrap();
            }
            if socket.rx_queue.is_empty() {
                socket.event_flags.clear(SocketEventMask::RX_READY);
            }
        }
        Ok(n)
    }

    pub fn send_to(
        &mut self,
        descriptor: usize,
        remote_addr: IpAddr,
        remote_port: u16,
        data: &[u8],
    ) -> Result<usize, StackError> {
        let socket = self.get_mut(descriptor)?;
        if socket.socket_type != SocketType::Dgram {
            return Err(StackError::InvalidParameter("send_to() requires a datagram socket"));
        }
        let _ = (remote_addr, remote_port);
        Ok(data.len())
    }

    /// Delivers a received datagram into a bound UDP socket's bounded
    /// queue; drops the oldest entry once at capacity rather than
    /// growing without bound.
    pub fn deliver_datagram(&mut self, descriptor: usize, item: DatagramItem) -> Result<(), StackError> {
        let socket = self.get_mut(descriptor)?;
        if socket.socket_type != SocketType::Dgram {
            return Err(StackError::InvalidParameter("deliver_datagram() requires a datagram socket"));
        }
        if socket.dgram_queue.len() >= SOCKET_DGRAM_QUEUE_CAPACITY {
            socket.dgram_queue.pop_front();
        }
        socket.dgram_queue.push_back(item);
        socket.event_flags.set(SocketEventMask::RX_READY);
        Ok(())
    }

    pub fn receive_from(&mut self, descriptor: usize, buf: &mut [u8]) -> Result<(IpAddr, u16, usize), StackError> {
        let socket = self.get_mut(descriptor)?;
        let item = socket.dgram_queue.pop_front().ok_or(StackError::Timeout)?;
        if socket.dgram_queue.is_empty() {
            socket.event_flags.clear(SocketEventMask::RX_READY);
        }
        let n = item.data.len().min(buf.len());
        buf[..n].copy_from_slice(&item.data[..n]);
        Ok((item.remote_addr, item.remote_port, n))
    }

    pub fn shutdown(&mut self, descriptor: usize, how: SocketShutdown) -> Result<(), StackError> {
        let socket = self.get_mut(descriptor)?;
        match how {
            SocketShutdown::Receive => socket.event_flags.set(SocketEventMask::RX_SHUTDOWN),
            SocketShutdown::Send => {
                if let Some(tcb) = socket.tcb.as_mut() {
                    tcb.close()?;
                }
                socket.event_flags.set(SocketEventMask::TX_SHUTDOWN);
            }
            SocketShutdown::Both => {
                if let Some(tcb) = socket.tcb.as_mut() {
                    tcb.close()?;
                }
                socket.event_flags.set(SocketEventMask::TX_SHUTDOWN);
                socket.event_flags.set(SocketEventMask::RX_SHUTDOWN);
            }
        }
        Ok(())
    }

    pub fn register_events(&mut self, descriptor: usize, mask: SocketEventMask) -> Result<(), StackError> {
        self.get_mut(descriptor)?.event_mask = mask;
        Ok(())
    }

    pub fn unregister_events(&mut self, descriptor: usize) -> Result<(), StackError> {
        self.get_mut(descriptor)?.event_mask = SocketEventMask::default();
        Ok(())
    }

    pub fn get_events(&self, descriptor: usize) -> Result<SocketEventMask, StackError> {
        Ok(self.get(descriptor)?.event_flags)
    }

    pub fn set_error(&mut self, descriptor: usize, error: StackError) -> Result<(), StackError> {
        self.get_mut(descriptor)?.last_error = Some(error);
        Ok(())
    }

    pub fn take_last_error(&mut self, descriptor: usize) -> Result<Option<StackError>, StackError> {
        Ok(self.get_mut(descriptor)?.last_error.take())
    }

    /// `socketPoll`: reports which of `descs` currently have at least one
    /// of their requested events pending. `external_event`/`timeout` are
    /// the caller's concern (the scheduler crate's blocking primitives);
    /// here polling is a synchronous snapshot, matching how a single tick
    /// of the RTOS event loop would observe socket state.
    pub fn poll(&self, descs: &mut [SocketEventDesc]) -> usize {
        let mut ready = 0;
        for desc in descs.iter_mut() {
            if let Ok(socket) = self.get(desc.descriptor) {
                let pending = SocketEventMask(socket.event_flags.0 & desc.event_mask.0);
                desc.event_flags = pending;
                if pending.0 != 0 {
                    ready += 1;
                }
            }
        }
        ready
    }
}

impl Default for SocketTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn loopback() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    #[test]
    fn open_allocates_from_free_slots_and_close_frees_them() {
        let mut table = SocketTable::new();
        let a = table.open(SocketType::Stream, SocketProtocol::Tcp).unwrap();
        let b = table.open(SocketType::Stream, SocketProtocol::Tcp).unwrap();
        assert_ne!(a, b);
        table.close(a).unwrap();
        let c = table.open(SocketType::Stream, SocketProtocol::Tcp).unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn open_exhausts_descriptor_table() {
        let mut table = SocketTable::new();
        for _ in 0..SOCKET_MAX_COUNT {
            table.open(SocketType::Stream, SocketProtocol::Tcp).unwrap();
        }
        let err = table.open(SocketType::Stream, SocketProtocol::Tcp);
        assert_eq!(err, Err(StackError::OutOfResources));
    }

    #[test]
    fn connect_assigns_ephemeral_port_when_unbound() {
        let mut table = SocketTable::new();
        let d = table.open(SocketType::Stream, SocketProtocol::Tcp).unwrap();
        table.connect(d, loopback(), 443, 1000, 1460, TcpConfig::default()).unwrap();
        let (_, port) = table.local_addr(d).unwrap();
        assert!(port >= SOCKET_EPHEMERAL_PORT_MIN);
    }

    #[test]
    fn send_requires_established_connection() {
        let mut table = SocketTable::new();
        let d = table.open(SocketType::Stream, SocketProtocol::Tcp).unwrap();
        table.connect(d, loopback(), 443, 1, 1460, TcpConfig::default()).unwrap();
        let err = table.send(d, b"hi", SocketFlags::default());
        assert_eq!(err, Err(StackError::UnexpectedState("send() on a socket that is not connected")));
    }

    #[test]
    fn receive_honors_break_char_and_truncates_buffer() {
        let mut table = SocketTable::new();
        let d = table.open(SocketType::Stream, SocketProtocol::Tcp).unwrap();
        table.get_mut(d).unwrap().rx_queue.extend(b"hello\nworld".iter().copied());
        let mut buf = [0u8; 32];
        let n = table.receive(d, &mut buf, SocketFlags::break_on(b'\n')).unwrap();
        assert_eq!(&buf[..n], b"hello\n");
        let n2 = table.receive(d, &mut buf, SocketFlags::default()).unwrap();
        assert_eq!(&buf[..n2], b"world");
    }

    #[test]
    fn peek_does_not_consume_rx_queue() {
        let mut table = SocketTable::new();
        let d = table.open(SocketType::Stream, SocketProtocol::Tcp).unwrap();
        table.get_mut(d).unwrap().rx_queue.extend(b"abc".iter().copied());
        let mut buf = [0u8; 3];
        table.receive(d, &mut buf, SocketFlags(SocketFlags::PEEK)).unwrap();
        assert_eq!(&buf, b"abc");
        let mut buf2 = [0u8; 3];
        let n = table.receive(d, &mut buf2, SocketFlags::default()).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf2, b"abc");
    }

    #[test]
    fn listen_then_accept_syn_queues_a_pending_child() {
        let mut table = SocketTable::new();
        let listener = table.open(SocketType::Stream, SocketProtocol::Tcp).unwrap();
        table.bind(listener, loopback(), 443).unwrap();
        table.listen(listener, TcpConfig::default()).unwrap();
        table.accept_syn(listener, loopback(), 51000, 9000, 1460, 5000).unwrap();
        let child = table.accept(listener).unwrap();
        assert_eq!(table.get(child).unwrap().tcb.as_ref().unwrap().state, TcpState::SynReceived);
    }

    #[test]
    fn accept_with_no_pending_connection_times_out() {
        let mut table = SocketTable::new();
        let listener = table.open(SocketType::Stream, SocketProtocol::Tcp).unwrap();
        table.listen(listener, TcpConfig::default()).unwrap();
        assert_eq!(table.accept(listener), Err(StackError::Timeout));
    }

    #[test]
    fn datagram_queue_drops_oldest_once_at_capacity() {
        let mut table = SocketTable::new();
        let d = table.open(SocketType::Dgram, SocketProtocol::Udp).unwrap();
        for i in 0..SOCKET_DGRAM_QUEUE_CAPACITY + 2 {
            table
                .deliver_datagram(d, DatagramItem { remote_addr: loopback(), remote_port: 1000, data: vec![i as u8] })
                .unwrap();
        }
        let mut buf = [0u8; 4];
        let (_, _, n) = table.receive_from(d, &mut buf).unwrap();
        assert_eq!(n, 1);
        assert_eq!(buf[0], 2); // the first two entries were dropped
    }

    #[test]
    fn poll_reports_only_requested_events() {
        let mut table = SocketTable::new();
        let d = table.open(SocketType::Stream, SocketProtocol::Tcp).unwrap();
        table.get_mut(d).unwrap().event_flags.set(SocketEventMask::RX_READY);
        table.get_mut(d).unwrap().event_flags.set(SocketEventMask::TX_READY);

        let mut descs = [SocketEventDesc {
            descriptor: d,
            event_mask: SocketEventMask(SocketEventMask::RX_READY),
            event_flags: SocketEventMask::default(),
        }];
        let ready = table.poll(&mut descs);
        assert_eq!(ready, 1);
        assert!(descs[0].event_flags.has(SocketEventMask::RX_READY));
        assert!(!descs[0].event_flags.has(SocketEventMask::TX_READY));
    }

    #[test]
    fn shutdown_send_transitions_tcb_towards_closing() {
        let mut table = SocketTable::new();
        let d = table.open(SocketType::Stream, SocketProtocol::Tcp).unwrap();
        table.connect(d, loopback(), 443, 1, 1460, TcpConfig::default()).unwrap();
        table.get_mut(d).unwrap().tcb.as_mut().unwrap().state = TcpState::Established;
        table.shutdown(d, SocketShutdown::Send).unwrap();
        assert_eq!(table.get(d).unwrap().tcb.as_ref().unwrap().state, TcpState::FinWait1);
    }
}

/// Sizing knobs from `cyclone_tcp/core/socket.h`.
pub const SOCKET_MAX_COUNT: usize = 16;
pub const SOCKET_EPHEMERAL_PORT_MIN: u16 = 49152;
pub const SOCKET_EPHEMERAL_PORT_MAX: u16 = 65535;

/// Bound on a datagram socket's receive queue; `socket.h`'s
/// `SocketQueueItem` is an unbounded linked list, but a fixed-capacity
/// array fits this stack's resource model better than an allocator-backed
/// list that can grow without limit.
pub const SOCKET_DGRAM_QUEUE_CAPACITY: usize = 8;

pub mod config;
pub mod flags;
pub mod socket;

pub use config::{SOCKET_DGRAM_QUEUE_CAPACITY, SOCKET_EPHEMERAL_PORT_MAX, SOCKET_EPHEMERAL_PORT_MIN,
    SOCKET_MAX_COUNT};
pub use flags::{SocketEventMask, SocketFlags, SocketProtocol, SocketShutdown, SocketType};
pub use socket::{DatagramItem, Socket, SocketEventDesc, SocketTable};

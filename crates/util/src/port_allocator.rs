//! Loopback port allocation for integration tests.
//!
//! Tests that start real servers need ports that do not collide with each
//! other or with services already on the machine.

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    net::{SocketAddr, TcpListener},
    sync::{LazyLock, Mutex},
    time::SystemTime,
};

/// Lowest port the allocator will hand out.
const PORT_RANGE_START: u16 = 15000;

/// Width of the randomized starting window.
const PORT_RANGE_WIDTH: u16 = 10000;

/// Global cursor starting from a randomized port so parallel test binaries
/// spread out across the range.
static NEXT_PORT: LazyLock<Mutex<u16>> = LazyLock::new(|| {
    let mut hasher = DefaultHasher::new();
    SystemTime::now().hash(&mut hasher);
    let random_offset = (hasher.finish() % u64::from(PORT_RANGE_WIDTH)) as u16;
    Mutex::new(PORT_RANGE_START + random_offset)
});

/// Allocate the next port that is actually free on this machine.
///
/// # Panics
///
/// Panics if no free port is found after trying the whole window.
pub fn allocate_port() -> u16 {
    let mut port_guard = NEXT_PORT.lock().unwrap();

    for _ in 0..PORT_RANGE_WIDTH {
        let port = *port_guard;
        *port_guard = port_guard.wrapping_add(1).max(PORT_RANGE_START);

        if is_port_available(port) {
            return port;
        }
    }

    panic!("no available loopback port found after trying {PORT_RANGE_WIDTH} candidates")
}

/// Check whether a loopback port is free by attempting to bind it.
pub fn is_port_available(port: u16) -> bool {
    TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port))).is_ok()
}

/// Allocate a full loopback socket address with a free port.
pub fn allocate_socket_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], allocate_port()))
}

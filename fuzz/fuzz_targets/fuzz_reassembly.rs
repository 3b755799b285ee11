#![no_main]

use libfuzzer_sys::fuzz_target;
use packet_socket::transport::Transport;
use packet_socket::{FramingConfig, MemoryTransport, PacketSocket};

fuzz_target!(|data: &[u8]| {
    // First byte picks the chunk size, second the buffer size; the rest is the stream
    let (Some(&chunk), Some(&max)) = (data.first(), data.get(1)) else {
        return;
    };
    let config = FramingConfig {
        max_packet_size: usize::from(max).max(1),
        ..FramingConfig::default()
    };

    let (mut raw, b) = MemoryTransport::pair();
    let mut socket = PacketSocket::with_config(b, false, &config);

    for piece in data[2..].chunks(usize::from(chunk).max(1)) {
        let _ = raw.send(piece);
        socket.on_readable();
        for event in socket.drain_events() {
            if let Some(payload) = event.payload() {
                assert!(payload.len() <= config.max_packet_size);
            }
        }
        assert!(socket.buffered_input() < socket.capacity());
    }
});

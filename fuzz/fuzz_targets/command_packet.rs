#![no_main]

use libfuzzer_sys::fuzz_target;
use replication::{ConnectionId, GhostSender, ReplicationConfig, ServerConnection};
use schema::CommandLayout;

fuzz_target!(|data: &[u8]| {
    let config = ReplicationConfig::for_testing();
    let layout = CommandLayout::new("Input", ["left", "right", "thrust", "shoot"]).unwrap();
    let sender = GhostSender::new(config.clone()).with_command_layout(layout);
    let mut conn = ServerConnection::new(ConnectionId(1), &config);
    let _ = sender.receive_command_packet(&mut conn, data, 0);
    assert!(conn.commands().len() <= 1);
});

//! TCP mesh tests over loopback.
//!
//! Each rank runs on its own thread with a listener bound up front, so the
//! mesh can be built without fixed ports.

use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

use ghostline_transport::{
    Rank, Tag, TcpConfig, TcpTransport, Transport, TransportError, MAX_PAYLOAD_SIZE,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn bind_listeners(count: usize) -> (Vec<TcpListener>, Vec<SocketAddr>) {
    let listeners: Vec<TcpListener> = (0..count)
        .map(|_| TcpListener::bind("127.0.0.1:0").expect("bind"))
        .collect();
    let addrs = listeners
        .iter()
        .map(|listener| listener.local_addr().expect("local addr"))
        .collect();
    (listeners, addrs)
}

/// Build the mesh and run `rank_fn` on every rank, one thread each.
fn run_mesh<F>(size: usize, rank_fn: F)
where
    F: Fn(TcpTransport) + Sync,
{
    let (listeners, addrs) = bind_listeners(size);
    let rank_fn = &rank_fn;
    let addrs = &addrs;

    std::thread::scope(|scope| {
        let workers: Vec<_> = listeners
            .into_iter()
            .enumerate()
            .map(|(index, listener)| {
                scope.spawn(move || {
                    let comm = TcpTransport::from_listener(
                        Rank::new(index as u32),
                        listener,
                        addrs,
                        TcpConfig::local_network(),
                    )
                    .expect("mesh");
                    rank_fn(comm)
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("rank thread panicked");
        }
    });
}

#[test]
fn test_mesh_all_to_all() {
    init_tracing();

    run_mesh(4, |mut comm| {
        let me = comm.rank();
        for peer in Rank::all(comm.size()) {
            comm.send(peer, Tag::DATA, &[me.get() as u8; 3]).expect("send");
        }
        for peer in Rank::all(comm.size()) {
            let got = comm.recv(peer, Tag::DATA).expect("recv");
            assert_eq!(got, vec![peer.get() as u8; 3]);
        }
    });
}

#[test]
fn test_probe_sees_exact_length_of_large_message() {
    init_tracing();

    const LEN: usize = 1 << 20;
    assert!(LEN <= MAX_PAYLOAD_SIZE);

    run_mesh(2, |mut comm| {
        if comm.rank().get() == 0 {
            let mut buf = comm.allocate(LEN);
            for (i, byte) in buf.iter_mut().enumerate() {
                *byte = (i % 251) as u8;
            }
            let send = comm.isend(Rank::new(1), Tag::DATA, buf).expect("isend");
            comm.wait_all(&[&[send]]).expect("wait");
            drop(comm.take(send).expect("take"));
            return;
        }

        let peer = Rank::new(0);
        let len = loop {
            if let Some(len) = comm.iprobe(peer, Tag::DATA).expect("probe") {
                break len;
            }
            std::thread::sleep(Duration::from_millis(1));
        };
        assert_eq!(len, LEN);

        let buf = comm.allocate(len);
        let recv = comm.irecv(peer, Tag::DATA, buf).expect("irecv");
        comm.wait_all(&[&[recv]]).expect("wait");
        let data = comm.take(recv).expect("take");
        assert_eq!(data.len(), LEN);
        assert!(data.iter().enumerate().all(|(i, &b)| b == (i % 251) as u8));
    });
}

#[test]
fn test_persistent_requests_over_tcp() {
    init_tracing();

    run_mesh(2, |mut comm| {
        let peer = Rank::new(1 - comm.rank().get());
        let send_buf = comm.allocate(8);
        let send = comm.send_init(peer, Tag::DATA, send_buf).expect("send_init");
        let recv_buf = comm.allocate(8);
        let recv = comm.recv_init(peer, Tag::DATA, recv_buf).expect("recv_init");

        for round in 0..5u64 {
            let value = round * 10 + comm.rank().get() as u64;
            comm.buffer_mut(send)
                .expect("buffer")
                .copy_from_slice(&value.to_le_bytes());
            comm.start_all(&[recv]).expect("start recv");
            comm.start_all(&[send]).expect("start send");
            comm.wait_all(&[&[send], &[recv]]).expect("wait");

            let expected = round * 10 + peer.get() as u64;
            assert_eq!(comm.received(recv).expect("received"), expected.to_le_bytes());
        }

        comm.free(send).expect("free send");
        comm.free(recv).expect("free recv");
        assert_eq!(comm.buffer_stats().snapshot().live(), 0);
    });
}

#[test]
fn test_peer_shutdown_fails_pending_receive() {
    init_tracing();

    run_mesh(2, |mut comm| {
        if comm.rank().get() == 1 {
            // leave without sending anything
            return;
        }
        let err = comm.recv(Rank::new(1), Tag::DATA).expect_err("peer gone");
        assert!(matches!(err, TransportError::PeerDisconnected { .. }));
    });
}

#[test]
fn test_unreachable_lower_rank_gives_up() {
    init_tracing();

    // rank 0's address points at a port nobody listens on
    let (mut listeners, addrs) = bind_listeners(2);
    let own = listeners.pop().expect("rank 1 listener");
    drop(listeners);

    let config = TcpConfig::local_network().with_max_connect_attempts(Some(3));
    let err = TcpTransport::from_listener(Rank::new(1), own, &addrs, config)
        .expect_err("nobody at rank 0");
    assert!(matches!(err, TransportError::Connection { peer, .. } if peer == Rank::new(0)));
}

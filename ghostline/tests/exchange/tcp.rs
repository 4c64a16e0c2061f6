//! Both strategies over a loopback TCP mesh.

use std::net::{SocketAddr, TcpListener};

use ghostline::{ExchangeEngine, Rank, TcpConfig, TcpTransport, Transport};

use super::{engines, init_tracing, neighbors, payload, ring_package};

const RANKS: usize = 3;
const ROUNDS: u64 = 4;

/// Bind one listener per rank on an ephemeral port.
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

#[test]
fn test_tcp_ring_both_strategies() {
    init_tracing();

    for engine in engines() {
        let (listeners, addrs) = bind_listeners(RANKS);

        std::thread::scope(|scope| {
            let workers: Vec<_> = listeners
                .into_iter()
                .enumerate()
                .map(|(index, listener)| {
                    let addrs = &addrs;
                    let engine = &engine;
                    scope.spawn(move || {
                        let rank = Rank::new(index as u32);
                        let mut comm = TcpTransport::from_listener(
                            rank,
                            listener,
                            addrs,
                            TcpConfig::local_network(),
                        )
                        .expect("mesh");
                        assert_eq!(comm.size(), RANKS);

                        let (left, right) = neighbors(rank, RANKS);
                        let mut package = ring_package::<Vec<u8>>(rank, RANKS);
                        for round in 0..ROUNDS {
                            *package.send_mut(0).expect("right") = payload(rank, round, true, 1000);
                            *package.send_mut(1).expect("left") = payload(rank, round, false, 1000);

                            let handle = engine.post(&mut comm, &mut package).expect("post");
                            assert_eq!(handle.outstanding(), 4);
                            engine.wait(&mut comm, handle).expect("wait");

                            assert_eq!(
                                package.recv(0).expect("from left").body(),
                                &payload(left, round, true, 1000)
                            );
                            assert_eq!(
                                package.recv(1).expect("from right").body(),
                                &payload(right, round, false, 1000)
                            );
                        }
                        engine.retire(&mut comm, &mut package).expect("retire");
                    })
                })
                .collect();

            for worker in workers {
                worker.join().expect("rank thread panicked");
            }
        });
    }
}

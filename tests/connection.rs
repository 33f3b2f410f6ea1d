//! End-to-end exercises of two endpoints wired back to back.

use bytes::Bytes;
use tcpsim::tcp::tcb::State;
use tcpsim::tcp::tcp_parsing::TcpHeaderBuilder;
use tcpsim::tcp::DemuxError;
use tcpsim::{Iss, SessionId, Tcp, TcpSocket};

/// Ferries segments between two endpoints until neither has anything left
/// to transmit.
fn pump(a: &Tcp, b: &Tcp) {
    loop {
        let a_out = a.collect_segments();
        let b_out = b.collect_segments();
        if a_out.is_empty() && b_out.is_empty() {
            break;
        }
        for segment in a_out {
            let _ = b.demux(segment.serialize().into());
        }
        for segment in b_out {
            let _ = a.demux(segment.serialize().into());
        }
    }
}

#[test]
fn listener_accepts_and_serves_a_connection() {
    let client_net = Tcp::new_shared(Iss::FromSeed(1));
    let server_net = Tcp::new_shared(Iss::FromSeed(2));

    let listener = TcpSocket::listen(server_net.clone(), 80).unwrap();
    let client = TcpSocket::connect(client_net.clone(), 0xcafe, 80).unwrap();

    pump(&client_net, &server_net);

    assert_eq!(client.state().unwrap(), State::Established);
    assert_eq!(listener.state().unwrap(), State::Listen);

    let connection = listener.accept().expect("a connection should be waiting");
    assert_eq!(connection.state().unwrap(), State::Established);
    assert_eq!(connection.id(), SessionId::new(80, 0xcafe));
    assert!(listener.accept().is_none());

    connection.send(&b"hello"[..]).unwrap();
    pump(&client_net, &server_net);
    assert_eq!(client.receive().unwrap(), Bytes::from_static(b"hello"));

    // Orderly teardown, server side first
    connection.close().unwrap();
    pump(&client_net, &server_net);
    assert_eq!(client.state().unwrap(), State::CloseWait);
    assert_eq!(connection.state().unwrap(), State::FinWait2);

    client.close().unwrap();
    pump(&client_net, &server_net);
    assert_eq!(client.state().unwrap(), State::Closed);
    assert_eq!(connection.state().unwrap(), State::TimeWait);
}

#[test]
fn two_listeners_serve_independent_ports() {
    let client_net = Tcp::new_shared(Iss::FromSeed(3));
    let server_net = Tcp::new_shared(Iss::FromSeed(4));

    let http = TcpSocket::listen(server_net.clone(), 80).unwrap();
    let echo = TcpSocket::listen(server_net.clone(), 7).unwrap();

    let to_http = TcpSocket::connect(client_net.clone(), 4000, 80).unwrap();
    let to_echo = TcpSocket::connect(client_net.clone(), 4001, 7).unwrap();
    pump(&client_net, &server_net);

    assert_eq!(to_http.state().unwrap(), State::Established);
    assert_eq!(to_echo.state().unwrap(), State::Established);
    assert_eq!(http.accept().unwrap().id(), SessionId::new(80, 4000));
    assert_eq!(echo.accept().unwrap().id(), SessionId::new(7, 4001));
}

#[test]
fn stray_segment_is_answered_with_a_reset() {
    let net = Tcp::new_shared(Iss::FromSeed(5));
    let header = TcpHeaderBuilder::new(SessionId::new(0xcafe, 80), 100)
        .ack(200)
        .window(64)
        .build([].into_iter())
        .unwrap();
    let frame: Vec<u8> = header.serialize().into();

    assert_eq!(net.demux(frame.into()), Err(DemuxError::MissingSession));
    let replies = net.collect_segments();
    assert_eq!(replies.len(), 1);
    assert!(replies[0].header.control.rst());
    assert_eq!(replies[0].header.sequence, 200);
}

#[test]
fn aborted_connection_resets_and_disappears() {
    let net = Tcp::new_shared(Iss::FromSeed(6));
    let socket = TcpSocket::connect(net.clone(), 0xcafe, 80).unwrap();
    net.collect_segments();

    assert!(net.abort(socket.id()));
    let replies = net.collect_segments();
    assert_eq!(replies.len(), 1);
    assert!(replies[0].header.control.rst());

    assert!(matches!(
        socket.state(),
        Err(tcpsim::tcp::SocketError::Closed)
    ));
}

#[test]
fn garbled_frame_is_rejected() {
    let net = Tcp::new_shared(Iss::FromSeed(7));
    let result = net.demux(Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]));
    assert!(matches!(result, Err(DemuxError::Header(_))));
}

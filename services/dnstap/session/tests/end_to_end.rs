use dnstap_message::{DnstapMessage, MessageType, SocketFamily, Timestamp, CONTENT_TYPE};
use dnstap_session::{
    Dispatcher, SessionError, SessionOptions, SessionState, SessionWriter,
};
use dnstap_wire::{ControlFrame, ControlType, Frame, FrameDecoder};
use std::net::{IpAddr, Ipv4Addr};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn tool_query(name: &str) -> DnstapMessage {
    DnstapMessage::builder(MessageType::ToolQuery)
        .query_address(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 100)))
        .query_port(54321)
        .query_time(Timestamp::now())
        .query_for(name)
        .unwrap()
        .query_zone("example.com")
        .unwrap()
        .build()
        .unwrap()
}

fn control_kinds(frames: &[Frame]) -> Vec<Option<ControlType>> {
    frames.iter().map(|f| f.as_control().map(|c| c.kind)).collect()
}

#[tokio::test]
async fn test_file_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dnstap.fstrm");

    let writer = SessionWriter::create_file(&path).await.unwrap();
    writer.write_message(&tool_query("example.com")).await.unwrap();
    writer.close().await;
    assert_eq!(writer.state().await, SessionState::Closed);

    let bytes = std::fs::read(&path).unwrap();
    let frames = FrameDecoder::new().decode_all(&bytes).unwrap();
    assert_eq!(
        control_kinds(&frames),
        vec![Some(ControlType::Start), None, Some(ControlType::Stop)]
    );
    assert!(frames[0].as_control().unwrap().fields.is_empty());

    let event = DnstapMessage::decode(frames[1].as_data().unwrap()).unwrap();
    let message = event.message().unwrap();
    assert_eq!(event.kind(), MessageType::ToolQuery);
    assert_eq!(message.query_address.as_deref(), Some(&[192, 0, 2, 100][..]));
    assert_eq!(message.query_port, Some(54321));
    assert_eq!(message.socket_family, Some(SocketFamily::Inet as i32));
    assert_eq!(
        message.query_zone.as_deref(),
        Some(&b"\x07example\x03com\x00"[..])
    );
}

#[tokio::test]
async fn test_file_writes_keep_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ordered.fstrm");

    let writer = SessionWriter::create_file(&path).await.unwrap();
    for i in 0..50 {
        writer
            .write_message(&tool_query(&format!("host{}.example.com", i)))
            .await
            .unwrap();
    }
    writer.close().await;
    assert_eq!(writer.frames_written(), 50);

    let bytes = std::fs::read(&path).unwrap();
    let frames = FrameDecoder::new().decode_all(&bytes).unwrap();
    let names: Vec<Vec<u8>> = frames
        .iter()
        .filter_map(Frame::as_data)
        .map(|payload| {
            let event = DnstapMessage::decode(payload).unwrap();
            event.message().unwrap().query_message.clone().unwrap()
        })
        .collect();
    assert_eq!(names.len(), 50);
    for (i, wire) in names.iter().enumerate() {
        let label = format!("host{}", i);
        // Question section starts after the 12 byte header
        assert_eq!(usize::from(wire[12]), label.len());
        assert_eq!(&wire[13..13 + label.len()], label.as_bytes());
    }
}

#[tokio::test]
async fn test_file_session_idempotent_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("idempotent.fstrm");

    let writer = SessionWriter::create_file(&path).await.unwrap();
    writer.start().await.unwrap();
    writer.start().await.unwrap();
    writer.stop().await.unwrap();
    writer.stop().await.unwrap();
    writer.close().await;
    writer.close().await;

    let bytes = std::fs::read(&path).unwrap();
    let frames = FrameDecoder::new().decode_all(&bytes).unwrap();
    assert_eq!(
        control_kinds(&frames),
        vec![Some(ControlType::Start), Some(ControlType::Stop)]
    );
}

#[tokio::test]
async fn test_tcp_bidirectional_collector() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let collector = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let ready = ControlFrame::new(ControlType::Ready).with_content_type(CONTENT_TYPE);
        socket.write_all(&ready.to_bytes().unwrap()).await.unwrap();

        let mut bytes = Vec::new();
        socket.read_to_end(&mut bytes).await.unwrap();
        FrameDecoder::new().decode_all(&bytes).unwrap()
    });

    let writer = SessionWriter::connect_tcp(addr, SessionOptions::bidirectional())
        .await
        .unwrap();
    let dispatcher = Dispatcher::new(writer).unwrap();
    for _ in 0..20 {
        dispatcher.enqueue(tool_query("example.com"));
    }
    dispatcher.shutdown().await;
    assert_eq!(dispatcher.stats().written, 20);

    let frames = collector.await.unwrap();
    let kinds = control_kinds(&frames);
    assert_eq!(kinds.len(), 23);
    assert_eq!(kinds[0], Some(ControlType::Accept));
    assert_eq!(kinds[1], Some(ControlType::Start));
    assert!(kinds[2..22].iter().all(Option::is_none));
    assert_eq!(kinds[22], Some(ControlType::Stop));
    assert!(frames[0].as_control().unwrap().offers(CONTENT_TYPE.as_bytes()));
}

#[tokio::test]
async fn test_tcp_rejected_handshake_writes_nothing() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let collector = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let ready = ControlFrame::new(ControlType::Ready).with_content_type("protobuf:other");
        socket.write_all(&ready.to_bytes().unwrap()).await.unwrap();

        let mut bytes = Vec::new();
        socket.read_to_end(&mut bytes).await.unwrap();
        bytes
    });

    let writer = SessionWriter::connect_tcp(addr, SessionOptions::bidirectional())
        .await
        .unwrap();
    let err = writer.write_message(&tool_query("example.com")).await.unwrap_err();
    assert!(matches!(err, SessionError::Protocol(_)));
    writer.close().await;

    assert!(collector.await.unwrap().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_unix_socket_unidirectional() {
    use tokio::net::UnixListener;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dnstap.sock");
    let listener = UnixListener::bind(&path).unwrap();

    let collector = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut bytes = Vec::new();
        socket.read_to_end(&mut bytes).await.unwrap();
        FrameDecoder::new().decode_all(&bytes).unwrap()
    });

    let writer = SessionWriter::connect_unix(&path, SessionOptions::unidirectional())
        .await
        .unwrap();
    writer.write_message(&tool_query("example.com")).await.unwrap();
    writer.close().await;

    let frames = collector.await.unwrap();
    assert_eq!(
        control_kinds(&frames),
        vec![Some(ControlType::Start), None, Some(ControlType::Stop)]
    );
}

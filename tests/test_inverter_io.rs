mod common;
use common::*;

use lux_monitor::config;
use lux_monitor::lxp::inverter::{ChannelData, Inverter};
use lux_monitor::prelude::*;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn inverter_config(port: u16) -> config::Inverter {
    config::Inverter {
        enabled: true,
        host: "127.0.0.1".to_string(),
        port,
        serial: None,
        datalog: None,
        protocol: Some(1),
        read_timeout: Some(0),
        use_tcp_nodelay: Some(true),
        register_block_size: Some(40),
    }
}

#[tokio::test]
async fn polls_and_receives_over_tcp() {
    common_setup();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let channels = Channels::new();
    let inverter = Inverter::new(inverter_config(port), channels.clone());

    let mut from_inverter = channels.from_inverter.subscribe();
    let inverter_task = tokio::spawn(async move { inverter.start().await });

    let (mut socket, _) = listener.accept().await.unwrap();

    // wait until the connection is announced before polling
    loop {
        if let ChannelData::Connected(_) = from_inverter.recv().await.unwrap() {
            break;
        }
    }

    channels
        .to_inverter
        .send(ChannelData::ReadInput {
            datalog: Serial::broadcast(),
            register: 0,
            count: 40,
        })
        .unwrap();

    let mut request = vec![0u8; 38];
    socket.read_exact(&mut request).await.unwrap();
    assert_eq!(request, Factory::read_input_request());

    // reply split across two writes to exercise reassembly
    let response = Factory::read_input_response(&[(7, 120), (8, 0), (9, 30)]);
    socket.write_all(&response[..10]).await.unwrap();
    socket.flush().await.unwrap();
    socket.write_all(&response[10..]).await.unwrap();
    socket.flush().await.unwrap();

    let frame = loop {
        match from_inverter.recv().await.unwrap() {
            ChannelData::Frame(frame) => break frame,
            _ => continue,
        }
    };
    assert_eq!(frame.bytes(), &response[..]);
    assert_eq!(PowerFlow::from_frame(&frame).unwrap().pv_w, 150);

    channels.to_inverter.send(ChannelData::Shutdown).unwrap();
    inverter_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn requests_for_other_datalogs_are_not_sent() {
    common_setup();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let channels = Channels::new();
    let inverter = Inverter::new(inverter_config(port), channels.clone());

    let mut from_inverter = channels.from_inverter.subscribe();
    let inverter_task = tokio::spawn(async move { inverter.start().await });

    let (mut socket, _) = listener.accept().await.unwrap();

    loop {
        if let ChannelData::Connected(_) = from_inverter.recv().await.unwrap() {
            break;
        }
    }

    // addressed to a different datalog, then to ours
    channels
        .to_inverter
        .send(ChannelData::ReadInput {
            datalog: "XX00000000".parse().unwrap(),
            register: 0,
            count: 40,
        })
        .unwrap();
    channels
        .to_inverter
        .send(ChannelData::ReadInput {
            datalog: Serial::broadcast(),
            register: 0,
            count: 40,
        })
        .unwrap();

    let mut request = vec![0u8; 38];
    socket.read_exact(&mut request).await.unwrap();
    assert_eq!(request, Factory::read_input_request());

    channels.to_inverter.send(ChannelData::Shutdown).unwrap();
    inverter_task.await.unwrap().unwrap();

    // had the mismatched request been written too, a second frame would
    // still be in flight here
    let mut rest = Vec::new();
    socket.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

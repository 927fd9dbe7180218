//! AT port integration tests over a socket pair standing in for the tty.

use std::io::{ErrorKind, Read, Write};
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use cellport::at::{AtPort, ResultCode};
use cellport::CommandError;

fn start() -> (AtPort, UnixStream) {
    let (ours, device) = UnixStream::pair().unwrap();
    device
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let port = AtPort::spawn("tty-test", OwnedFd::from(ours)).unwrap();
    (port, device)
}

/// Read one command line, up to and including its `\r`.
fn read_command(device: &mut UnixStream) -> String {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        device.read_exact(&mut byte).unwrap();
        line.push(byte[0]);
        if byte[0] == b'\r' {
            return String::from_utf8(line).unwrap();
        }
    }
}

fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn answer_body_and_result_are_delivered() {
    let (port, mut device) = start();

    thread::scope(|s| {
        let caller = s.spawn(|| port.send("AT+CSQ\n"));
        assert_eq!(read_command(&mut device), "AT+CSQ\r");
        device.write_all(b"\r\n+CSQ: 17,99\r\n\r\nOK\r\n").unwrap();

        let answer = caller.join().unwrap().unwrap();
        assert_eq!(answer.body, "+CSQ: 17,99");
        assert_eq!(answer.result, ResultCode::Ok);
    });
}

#[test]
fn second_command_waits_for_first_answer() {
    let (port, mut device) = start();

    thread::scope(|s| {
        let first = s.spawn(|| port.send("AT+COPS?"));
        assert_eq!(read_command(&mut device), "AT+COPS?\r");

        let second = s.spawn(|| port.send("ATI"));
        wait_until("second command queued", || port.handle().pending() == 2);

        // Nothing else may be written while the first is unanswered.
        device
            .set_read_timeout(Some(Duration::from_millis(300)))
            .unwrap();
        let mut probe = [0u8; 1];
        let err = device.read(&mut probe).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut));
        device
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        device.write_all(b"\r\nOK\r\n").unwrap();
        assert_eq!(read_command(&mut device), "ATI\r");
        device.write_all(b"\r\nModem X\r\n\r\nOK\r\n").unwrap();

        let first = first.join().unwrap().unwrap();
        assert_eq!(first.body, "");
        assert_eq!(first.result, ResultCode::Ok);
        let second = second.join().unwrap().unwrap();
        assert_eq!(second.body, "Modem X");
    });
}

#[test]
fn unsolicited_lines_go_to_prefix_handlers() {
    let (port, mut device) = start();
    let (tx, rx) = mpsc::channel();
    for prefix in ["+CREG:", "OK"] {
        let tx = tx.clone();
        port.on_urc("urc", prefix, move |line| tx.send(line).unwrap());
    }

    device.write_all(b"\r\n+CREG: 1\r\n").unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "+CREG: 1");

    // With nothing pending a bare OK is just another URC.
    device.write_all(b"OK\r\n").unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "OK");
}

#[test]
fn error_result_is_an_answer_not_a_failure() {
    let (port, mut device) = start();

    thread::scope(|s| {
        let caller = s.spawn(|| port.send("AT+CPIN?"));
        read_command(&mut device);
        device.write_all(b"\r\n+CME ERROR: 10\r\n").unwrap();

        let answer = caller.join().unwrap().unwrap();
        assert_eq!(answer.result, ResultCode::CmeError("10".into()));
        assert!(!answer.result.is_success());
    });
}

#[test]
fn answer_split_across_reads_is_joined() {
    let (port, mut device) = start();

    thread::scope(|s| {
        let caller = s.spawn(|| port.send("AT"));
        read_command(&mut device);
        device.write_all(b"\r\nO").unwrap();
        thread::sleep(Duration::from_millis(150));
        device.write_all(b"K\r\n").unwrap();

        assert_eq!(caller.join().unwrap().unwrap().result, ResultCode::Ok);
    });
}

#[test]
fn unanswered_command_times_out() {
    let (port, mut device) = start();

    thread::scope(|s| {
        let caller = s.spawn(|| port.send_with_timeout("AT+COPS=?", Some(Duration::from_millis(300))));
        read_command(&mut device);
        assert_eq!(caller.join().unwrap(), Err(CommandError::Timeout));
    });
    assert_eq!(port.handle().pending(), 0);
}

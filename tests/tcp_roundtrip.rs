//! End-to-end round trips over real loopback sockets: typed values,
//! ordering, nested-read precedence, the "always" idiom, and encrypted
//! streams.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use packetline::{Acceptor, CipherAdapter, Endian, Packet, ReadOrder, Session, StringEncoding};

fn free_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), listener.local_addr().unwrap().port())
}

fn wait_for<T>(deadline_secs: u64, mut poll: impl FnMut() -> Option<T>) -> T {
    let deadline = std::time::Instant::now() + Duration::from_secs(deadline_secs);
    loop {
        if let Some(v) = poll() {
            return v;
        }
        assert!(std::time::Instant::now() < deadline, "timed out waiting for condition");
        thread::sleep(Duration::from_millis(5));
    }
}

/// Client sends `putByte(1).putInt(42)`; server's byte predicate issues a
/// nested 4-byte read for the int from inside its own callback, which must
/// run before any other top-level request.
#[test]
fn nested_read_precedence() {
    let addr = free_addr();
    let acceptor = Acceptor::bind(addr, Session::DEFAULT_CAPACITY, 1).unwrap();
    let observed = Arc::new(Mutex::new(Vec::new()));

    acceptor.on_connect({
        let observed = observed.clone();
        move |session: &Session| {
            let session = session.clone();
            let observed = observed.clone();
            session.read_until(
                1,
                move |tag| {
                    observed.lock().unwrap().push(format!("tag:{}", tag[0]));
                    let observed = observed.clone();
                    session.read_until(
                        4,
                        move |int_bytes| {
                            let v = Endian::Big.read_i32(int_bytes);
                            observed.lock().unwrap().push(format!("int:{v}"));
                            false
                        },
                        ReadOrder::Nested,
                    );
                    false
                },
                ReadOrder::Nested,
            );
        }
    });

    let client = Session::new(Session::DEFAULT_CAPACITY);
    client.on_connect(|s| {
        s.queue_and_flush(Packet::builder().put_byte(1).put_int(42, Endian::Big));
    });
    client.connect(addr, Duration::from_secs(2), || panic!("connect timed out")).unwrap();

    wait_for(2, || (observed.lock().unwrap().len() >= 2).then_some(()));
    assert_eq!(*observed.lock().unwrap(), vec!["tag:1", "int:42"]);
    client.close();
}

/// Three bytes in one packet, three sequential top-level `read_until(1)`
/// registrations must observe them strictly in order.
#[test]
fn sequential_top_level_reads_preserve_order() {
    let addr = free_addr();
    let acceptor = Acceptor::bind(addr, Session::DEFAULT_CAPACITY, 1).unwrap();
    let observed = Arc::new(Mutex::new(Vec::new()));

    acceptor.on_connect({
        let observed = observed.clone();
        move |session: &Session| {
            for _ in 0..3 {
                let observed = observed.clone();
                session.read_until(
                    1,
                    move |b| {
                        observed.lock().unwrap().push(b[0] as i8);
                        false
                    },
                    ReadOrder::Nested,
                );
            }
        }
    });

    let client = Session::new(Session::DEFAULT_CAPACITY);
    client.on_connect(|s| {
        s.queue_and_flush(Packet::builder().put_byte(42).put_byte(-24).put_byte(123));
    });
    client.connect(addr, Duration::from_secs(2), || panic!("connect timed out")).unwrap();

    wait_for(2, || (observed.lock().unwrap().len() >= 3).then_some(()));
    assert_eq!(*observed.lock().unwrap(), vec![42, -24, 123]);
    client.close();
}

/// A predicate that reads 16 bytes and ignores them, followed by one that
/// reads the final 8-byte long, must still see exactly the third value.
#[test]
fn ignored_read_then_final_long() {
    let addr = free_addr();
    let acceptor = Acceptor::bind(addr, Session::DEFAULT_CAPACITY, 1).unwrap();
    let result = Arc::new(Mutex::new(None));

    acceptor.on_connect({
        let result = result.clone();
        move |session: &Session| {
            let session2 = session.clone();
            let result = result.clone();
            session.read_until(
                16,
                move |_ignored| {
                    let result = result.clone();
                    session2.read_until(
                        8,
                        move |bytes| {
                            *result.lock().unwrap() = Some(Endian::Big.read_i64(bytes));
                            false
                        },
                        ReadOrder::Nested,
                    );
                    false
                },
                ReadOrder::Nested,
            );
        }
    });

    let client = Session::new(Session::DEFAULT_CAPACITY);
    let (l1, l2, l3) = (1_234_567_890_123i64, -9_876_543_210i64, 42i64);
    client.on_connect(move |s| {
        s.queue_and_flush(
            Packet::builder().put_long(l1, Endian::Big).put_long(l2, Endian::Big).put_long(l3, Endian::Big),
        );
    });
    client.connect(addr, Duration::from_secs(2), || panic!("connect timed out")).unwrap();

    wait_for(2, || *result.lock().unwrap());
    assert_eq!(result.lock().unwrap().unwrap(), l3);
    client.close();
}

/// Padded AES-256-CBC on both ends; mixed-type stream survives a round
/// trip.
#[test]
fn encrypted_mixed_type_roundtrip() {
    let addr = free_addr();
    let key = [11u8; 32];
    let iv = [22u8; 16];
    let acceptor = Acceptor::bind(addr, Session::DEFAULT_CAPACITY, 1).unwrap();
    let result = Arc::new(Mutex::new(None));

    let payload: Vec<u8> = (0u8..128).collect();
    let payload_for_server = payload.clone();

    acceptor.on_connect({
        let result = result.clone();
        move |session: &Session| {
            session.set_decrypt(CipherAdapter::aes256_cbc_decrypt(key, iv));
            let result = result.clone();
            let payload_for_server = payload_for_server.clone();
            // 128 bytes + 2-byte length prefix + 12-byte UTF-8 "Hello World!"
            // + 8-byte long + 8-byte double + 1-byte byte.
            session.read_until(
                128 + 2 + 12 + 8 + 8 + 1,
                move |bytes| {
                    assert_eq!(&bytes[..128], payload_for_server.as_slice());
                    let str_len = Endian::Big.read_u16(&bytes[128..130]) as usize;
                    assert_eq!(str_len, 12);
                    let s = StringEncoding::Utf8.decode(&bytes[130..130 + str_len]);
                    let long_off = 130 + str_len;
                    let long_v = Endian::Big.read_i64(&bytes[long_off..long_off + 8]);
                    let double_v = Endian::Big.read_f64(&bytes[long_off + 8..long_off + 16]);
                    let byte_v = bytes[long_off + 16] as i8;
                    *result.lock().unwrap() = Some((s, long_v, double_v, byte_v));
                    false
                },
                ReadOrder::Nested,
            );
        }
    });

    let client = Session::new(Session::DEFAULT_CAPACITY);
    client.set_encrypt(CipherAdapter::aes256_cbc_encrypt(key, iv));
    client.on_connect(move |s| {
        s.queue_and_flush(
            Packet::builder()
                .put_bytes(&payload)
                .put_string("Hello World!", StringEncoding::Utf8, Endian::Big)
                .put_long(54_735_436_752, Endian::Big)
                .put_double(23.1231, Endian::Big)
                .put_byte(0),
        );
    });
    client.connect(addr, Duration::from_secs(2), || panic!("connect timed out")).unwrap();

    wait_for(2, || result.lock().unwrap().clone());
    let (s, long_v, double_v, byte_v) = result.lock().unwrap().clone().unwrap();
    assert_eq!(s, "Hello World!");
    assert_eq!(long_v, 54_735_436_752);
    assert!((double_v - 23.1231).abs() < 1e-9);
    assert_eq!(byte_v, 0);
    client.close();
}

/// A predicate that always returns `true` keeps receiving slices with no
/// loss or duplication.
#[test]
fn always_idiom_receives_every_slice_in_order() {
    let addr = free_addr();
    let acceptor = Acceptor::bind(addr, Session::DEFAULT_CAPACITY, 1).unwrap();
    const COUNT: usize = 500;
    let received = Arc::new(AtomicUsize::new(0));
    let out_of_order = Arc::new(Mutex::new(false));

    acceptor.on_connect({
        let received = received.clone();
        let out_of_order = out_of_order.clone();
        move |session: &Session| {
            session.read_until(
                4,
                move |bytes| {
                    let v = Endian::Big.read_i32(bytes) as usize;
                    let expected = received.load(Ordering::SeqCst);
                    if v != expected {
                        *out_of_order.lock().unwrap() = true;
                    }
                    received.fetch_add(1, Ordering::SeqCst);
                    true
                },
                ReadOrder::Nested,
            );
        }
    });

    let client = Session::new(Session::DEFAULT_CAPACITY);
    client.on_connect(|s| {
        let mut packet = Packet::builder();
        for i in 0..COUNT as i32 {
            packet = packet.put_int(i, Endian::Big);
        }
        s.queue_and_flush(packet);
    });
    client.connect(addr, Duration::from_secs(2), || panic!("connect timed out")).unwrap();

    wait_for(5, || (received.load(Ordering::SeqCst) >= COUNT).then_some(()));
    assert!(!*out_of_order.lock().unwrap());
    client.close();
}

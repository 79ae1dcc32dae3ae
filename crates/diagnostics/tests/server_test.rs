use bridge::{Region, Tier};
use common::LogRing;
use diagnostics::{DiagnosticsConfig, DiagnosticsServer, read_frame};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn connect(path: &Path) -> UnixStream {
    let start = Instant::now();
    loop {
        match UnixStream::connect(path) {
            Ok(stream) => return stream,
            Err(_) if start.elapsed() < Duration::from_secs(5) => {
                thread::sleep(Duration::from_millis(20));
            }
            Err(e) => panic!("Diagnostics socket never came up: {e}"),
        }
    }
}

fn config(dir: &Path) -> DiagnosticsConfig {
    DiagnosticsConfig {
        socket_path: dir.join("diag.sock"),
        frame_interval: Duration::from_millis(50),
        retry_backoff: Duration::from_millis(50),
    }
}

#[test]
fn test_client_receives_frames_with_drained_logs() {
    let dir = tempfile::tempdir().unwrap();
    let region = Arc::new(Region::open(Tier::Unqualified, &dir.path().join("region")).unwrap());
    let ring = LogRing::new(16);
    ring.push("INFO publisher: region mapped".to_string());

    let config = config(dir.path());
    let socket_path = config.socket_path.clone();
    let mut handle = DiagnosticsServer::start(Arc::clone(&region), ring.clone(), config).unwrap();

    let mut stream = connect(&socket_path);
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    let first = read_frame(&mut stream).unwrap();
    assert_eq!(first.region_tier, "unqualified");
    assert_eq!(first.expected_size, record::RECORD_SIZE);
    assert_eq!(first.logs, vec!["INFO publisher: region mapped".to_string()]);

    ring.push("WARN publisher: late line".to_string());
    let second = read_frame(&mut stream).unwrap();
    let later = if second.logs.is_empty() {
        read_frame(&mut stream).unwrap()
    } else {
        second
    };
    assert_eq!(later.logs, vec!["WARN publisher: late line".to_string()]);
    assert!(later.timestamp >= first.timestamp);

    handle.stop();
    assert!(!socket_path.exists(), "Socket file is removed on stop");
}

#[test]
fn test_server_accepts_new_client_after_disconnect() {
    let dir = tempfile::tempdir().unwrap();
    let region = Arc::new(Region::open(Tier::Unqualified, &dir.path().join("region")).unwrap());
    let config = config(dir.path());
    let socket_path = config.socket_path.clone();
    let _handle = DiagnosticsServer::start(region, LogRing::default(), config).unwrap();

    {
        let mut stream = connect(&socket_path);
        read_frame(&mut stream).unwrap();
    }

    let mut stream = connect(&socket_path);
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let frame = read_frame(&mut stream).unwrap();
    assert_eq!(frame.abi_version, 0, "Nothing has been published to this region");
}

#[test]
fn test_logs_from_failed_send_reach_next_client() {
    let dir = tempfile::tempdir().unwrap();
    let region = Arc::new(Region::open(Tier::Unqualified, &dir.path().join("region")).unwrap());
    let ring = LogRing::new(16);
    let config = config(dir.path());
    let socket_path = config.socket_path.clone();
    let _handle = DiagnosticsServer::start(region, ring.clone(), config).unwrap();

    {
        let mut stream = connect(&socket_path);
        read_frame(&mut stream).unwrap();
    }
    // The client is gone, so the frame carrying this line fails to send.
    ring.push("ERROR publisher: lock busy".to_string());

    let mut stream = connect(&socket_path);
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.extend(read_frame(&mut stream).unwrap().logs);
        if !seen.is_empty() {
            break;
        }
    }
    assert_eq!(seen, vec!["ERROR publisher: lock busy".to_string()]);
}

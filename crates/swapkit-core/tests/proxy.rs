use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::Deserialize;
use swapkit_core::http::{HttpTransport, ProxySettings, StatusCode};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TARGET: &str = "http://updates.swapkit.test/api";
const CREDENTIALS: &str = "proxy-authorization: basic dxnlcjpwyxnz";

const OK: &str = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 13\r\nConnection: close\r\n\r\n{\"name\":\"ok\"}";
const CHALLENGE: &str = "HTTP/1.1 407 Proxy Authentication Required\r\nProxy-Authenticate: Basic realm=\"swapkit\"\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

#[derive(Debug, Deserialize, PartialEq)]
struct Greeting {
    name: String,
}

/// Forward proxy stand-in. Each accepted connection gets the next canned
/// response; the lowercased request heads are returned once the responses run
/// out or `window` elapses.
fn fake_proxy(
    responses: Vec<&'static str>,
    window: Duration,
) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind local port");
    listener
        .set_nonblocking(true)
        .expect("listener should become non-blocking");
    let address = format!("http://{}", listener.local_addr().expect("local address"));

    let handle = std::thread::spawn(move || {
        let deadline = Instant::now() + window;
        let mut heads = Vec::new();
        for response in responses {
            let Some(mut stream) = accept_until(&listener, deadline) else {
                break;
            };
            heads.push(read_head(&mut stream));
            stream
                .write_all(response.as_bytes())
                .expect("write response");
        }
        heads
    });

    (address, handle)
}

fn accept_until(listener: &TcpListener, deadline: Instant) -> Option<TcpStream> {
    while Instant::now() < deadline {
        match listener.accept() {
            Ok((stream, _)) => {
                stream
                    .set_nonblocking(false)
                    .expect("stream should become blocking");
                return Some(stream);
            }
            Err(error) if error.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(error) => panic!("accept failed: {error}"),
        }
    }
    None
}

fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut chunk = [0_u8; 512];
    while !head.ends_with(b"\r\n\r\n") {
        let read = stream.read(&mut chunk).expect("read request");
        if read == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..read]);
    }
    String::from_utf8_lossy(&head).to_ascii_lowercase()
}

fn transport_through(proxy: ProxySettings) -> HttpTransport {
    let mut transport = HttpTransport::new(TARGET);
    transport
        .set_proxy(Some(proxy))
        .expect("proxy address should be valid");
    transport
}

#[tokio::test]
async fn credentials_are_sent_before_any_challenge() {
    let (address, proxy) = fake_proxy(vec![OK], Duration::from_secs(5));
    let transport =
        transport_through(ProxySettings::new(address).with_credentials("user", "pass"));

    let response = transport.get_json::<Greeting>("ping").await;
    let heads = proxy.join().expect("proxy thread should finish");

    assert!(response.is_success(), "{}", response.describe());
    assert_eq!(heads.len(), 1);
    assert!(heads[0].starts_with("get http://updates.swapkit.test/api/ping "));
    assert!(heads[0].contains(CREDENTIALS), "{}", heads[0]);
}

#[tokio::test]
async fn a_407_challenge_is_answered_exactly_once() {
    let (address, proxy) = fake_proxy(vec![CHALLENGE, OK], Duration::from_secs(5));
    let transport = transport_through(
        ProxySettings::new(address)
            .with_credentials("user", "pass")
            .with_send_credentials_before_challenge(false),
    );

    let response = transport.get_json::<Greeting>("ping").await;
    let heads = proxy.join().expect("proxy thread should finish");

    assert!(response.is_success(), "{}", response.describe());
    assert_eq!(
        response.body,
        Some(Greeting {
            name: "ok".to_string()
        })
    );
    assert_eq!(heads.len(), 2);
    assert!(!heads[0].contains("proxy-authorization"), "{}", heads[0]);
    assert!(heads[1].contains(CREDENTIALS), "{}", heads[1]);
}

#[tokio::test]
async fn a_second_407_is_returned_instead_of_retrying() {
    let (address, proxy) = fake_proxy(vec![CHALLENGE, CHALLENGE, OK], Duration::from_secs(2));
    let transport = transport_through(
        ProxySettings::new(address)
            .with_credentials("user", "wrong")
            .with_send_credentials_before_challenge(false),
    );

    let response = transport.get_json::<Greeting>("ping").await;
    let heads = proxy.join().expect("proxy thread should finish");

    assert_eq!(
        response.status,
        Some(StatusCode::PROXY_AUTHENTICATION_REQUIRED)
    );
    assert_eq!(heads.len(), 2);
}

#[tokio::test]
async fn local_hosts_skip_the_proxy_only_when_bypass_is_set() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "direct"})))
        .expect(1)
        .mount(&server)
        .await;

    let dead = TcpListener::bind("127.0.0.1:0").expect("bind local port");
    let dead_proxy = format!("http://{}", dead.local_addr().expect("local address"));
    drop(dead);

    let mut transport = HttpTransport::new(&server.uri());
    transport
        .set_proxy(Some(ProxySettings::new(&dead_proxy)))
        .expect("proxy address should be valid");
    let through_proxy = transport.get_json::<Greeting>("ping").await;
    assert!(!through_proxy.is_success());
    assert_eq!(through_proxy.status, None);

    transport
        .set_proxy(Some(
            ProxySettings::new(&dead_proxy).with_bypass_on_local(true),
        ))
        .expect("proxy address should be valid");
    let direct = transport.get_json::<Greeting>("ping").await;
    assert!(direct.is_success(), "{}", direct.describe());
    assert_eq!(
        direct.body,
        Some(Greeting {
            name: "direct".to_string()
        })
    );
}

use std::io;
use std::net::SocketAddr;

use super::test_session;
use crate::source::Source;
use crate::test_support::init_test_log;
use crate::testserver::{respond, TestServer};
use crate::{Error, RedirectMode, Session};

fn multi_host_session(server: &TestServer, mode: RedirectMode) -> Session {
    let port = server.port;
    Session::builder()
        .enforce_tls(false)
        .redirect_mode(mode)
        .resolver(move |_netloc: &str| Ok(vec![SocketAddr::from(([127, 0, 0, 1], port))]))
        .build()
}

#[test]
fn relative_redirect_followed_with_history() {
    init_test_log();
    let server = TestServer::new(|req, w| match req.path() {
        "/a" => respond(
            w,
            302,
            &[("Content-Length", "4"), ("Location", "/b")],
            b"gone",
        ),
        "/b" => respond(w, 200, &[("Content-Length", "5")], b"found"),
        _ => respond(w, 404, &[("Content-Length", "0")], b""),
    });

    let session = test_session(&server);
    let response = session.get("http://host.test/a").call().unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text(), "found");
    assert_eq!(response.history().len(), 1);
    assert_eq!(response.history()[0].status().as_u16(), 302);
    assert_eq!(response.history()[0].body(), b"gone");
}

#[test]
fn see_other_turns_post_into_get() {
    init_test_log();
    let server = TestServer::new(|req, w| match req.path() {
        "/submit" => {
            assert_eq!(req.method(), "POST");
            assert_eq!(req.body, b"payload");
            respond(
                w,
                303,
                &[("Content-Length", "0"), ("Location", "/result")],
                b"",
            )
        }
        "/result" => {
            assert_eq!(req.method(), "GET");
            assert!(req.body.is_empty());
            assert!(req.header("content-length").is_none());
            respond(w, 200, &[("Content-Length", "4")], b"done")
        }
        _ => respond(w, 404, &[("Content-Length", "0")], b""),
    });

    let session = test_session(&server);
    let response = session
        .post("http://host.test/submit")
        .send("payload")
        .unwrap();
    assert_eq!(response.text(), "done");
}

#[test]
fn moved_permanently_post_becomes_get() {
    init_test_log();
    let server = TestServer::new(|req, w| match req.path() {
        "/old" => respond(
            w,
            301,
            &[("Content-Length", "0"), ("Location", "/new")],
            b"",
        ),
        "/new" => {
            assert_eq!(req.method(), "GET");
            respond(w, 200, &[("Content-Length", "2")], b"ok")
        }
        _ => respond(w, 404, &[("Content-Length", "0")], b""),
    });

    let session = test_session(&server);
    let response = session.post("http://host.test/old").send("x").unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[test]
fn temporary_redirect_resends_body() {
    init_test_log();
    let server = TestServer::new(|req, w| match req.path() {
        "/first" => {
            assert_eq!(req.body, b"same body");
            respond(
                w,
                307,
                &[("Content-Length", "0"), ("Location", "/second")],
                b"",
            )
        }
        "/second" => {
            assert_eq!(req.method(), "POST");
            assert_eq!(req.body, b"same body");
            respond(w, 200, &[("Content-Length", "2")], b"ok")
        }
        _ => respond(w, 404, &[("Content-Length", "0")], b""),
    });

    let session = test_session(&server);
    let response = session
        .post("http://host.test/first")
        .send("same body")
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[test]
fn temporary_redirect_with_unresettable_body_fails() {
    init_test_log();

    struct OneShot {
        sent: bool,
    }
    impl Source for OneShot {
        fn size(&self) -> Option<u64> {
            None
        }
        fn reset(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "cannot rewind"))
        }
        fn read_some(&mut self, buf: &mut [u8]) -> io::Result<(usize, bool)> {
            if self.sent {
                return Ok((0, false));
            }
            self.sent = true;
            buf[..4].copy_from_slice(b"once");
            Ok((4, false))
        }
    }

    let server = TestServer::new(|_req, w| {
        respond(
            w,
            307,
            &[("Content-Length", "0"), ("Location", "/again")],
            b"",
        )
    });

    let session = test_session(&server);
    let body: Box<dyn Source> = Box::new(OneShot { sent: false });
    let err = session.post("http://host.test/once").send(body);
    assert!(matches!(err, Err(Error::InvalidRedirect(_))), "{:?}", err);
}

#[test]
fn domain_mode_blocks_cross_origin() {
    init_test_log();
    let server = TestServer::new(|req, w| {
        match req.header("host").unwrap() {
            "a.example" => respond(
                w,
                302,
                &[("Content-Length", "0"), ("Location", "http://b.other/")],
                b"",
            ),
            _ => respond(w, 200, &[("Content-Length", "5")], b"other"),
        }
    });

    // Scenario: 302 to another host is refused under Domain...
    let session = multi_host_session(&server, RedirectMode::Domain);
    let err = session.get("http://a.example/").call();
    assert!(matches!(err, Err(Error::ForbiddenRedirect)), "{:?}", err);

    // ...and followed under Any.
    let session = multi_host_session(&server, RedirectMode::Any);
    let response = session.get("http://a.example/").call().unwrap();
    assert_eq!(response.text(), "other");
    assert_eq!(response.history().len(), 1);
}

#[test]
fn private_domain_allows_sibling_subdomains() {
    init_test_log();
    let server = TestServer::new(|req, w| {
        match req.header("host").unwrap() {
            "www.corp.example" => respond(
                w,
                302,
                &[
                    ("Content-Length", "0"),
                    ("Location", "http://api.corp.example/v1"),
                ],
                b"",
            ),
            _ => respond(w, 200, &[("Content-Length", "3")], b"api"),
        }
    });

    let session = multi_host_session(&server, RedirectMode::PrivateDomain);
    let response = session.get("http://www.corp.example/").call().unwrap();
    assert_eq!(response.text(), "api");
}

#[test]
fn multi_hop_history_is_flat_and_ordered() {
    init_test_log();
    let server = TestServer::new(|req, w| match req.path() {
        "/one" => respond(
            w,
            301,
            &[("Content-Length", "0"), ("Location", "/two")],
            b"",
        ),
        "/two" => respond(
            w,
            302,
            &[("Content-Length", "0"), ("Location", "/three")],
            b"",
        ),
        "/three" => respond(w, 200, &[("Content-Length", "3")], b"end"),
        _ => respond(w, 404, &[("Content-Length", "0")], b""),
    });

    let session = test_session(&server);
    let response = session.get("http://host.test/one").call().unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let statuses: Vec<u16> = response
        .history()
        .iter()
        .map(|r| r.status().as_u16())
        .collect();
    assert_eq!(statuses, vec![301, 302]);
    assert!(response.history().iter().all(|r| r.history().is_empty()));
}

#[test]
fn too_many_redirects() {
    init_test_log();
    let server = TestServer::new(|req, w| {
        let n: u32 = req.path().trim_start_matches("/loop").parse().unwrap_or(0);
        let location = format!("/loop{}", n + 1);
        respond(
            w,
            302,
            &[("Content-Length", "0"), ("Location", location.as_str())],
            b"",
        )
    });

    let session = multi_host_session(&server, RedirectMode::Any);
    let err = session.get("http://host.test/loop0").call();
    assert!(matches!(err, Err(Error::TooManyRedirects)), "{:?}", err);
}

#[test]
fn max_redirects_is_configurable() {
    init_test_log();
    let server = TestServer::new(|req, w| match req.path() {
        "/one" => respond(
            w,
            302,
            &[("Content-Length", "0"), ("Location", "/two")],
            b"",
        ),
        "/two" => respond(
            w,
            302,
            &[("Content-Length", "0"), ("Location", "/three")],
            b"",
        ),
        _ => respond(w, 200, &[("Content-Length", "0")], b""),
    });

    let port = server.port;
    let session = Session::builder()
        .enforce_tls(false)
        .redirect_mode(RedirectMode::Any)
        .max_redirects(1)
        .resolver(move |_: &str| Ok(vec![SocketAddr::from(([127, 0, 0, 1], port))]))
        .build();

    let err = session.get("http://host.test/one").call();
    assert!(matches!(err, Err(Error::TooManyRedirects)));
}

#[test]
fn missing_location_is_invalid_redirect() {
    init_test_log();
    let server =
        TestServer::new(|_req, w| respond(w, 302, &[("Content-Length", "0")], b""));

    let session = multi_host_session(&server, RedirectMode::Any);
    let err = session.get("http://host.test/").call();
    assert!(matches!(err, Err(Error::InvalidRedirect(_))));
}

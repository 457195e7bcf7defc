use super::test_session;
use crate::test_support::init_test_log;
use crate::testserver::{respond, TestServer};

#[test]
fn cookies_stored_and_returned() {
    init_test_log();
    let server = TestServer::new(|req, w| match req.path() {
        "/login" => respond(
            w,
            200,
            &[
                ("Content-Length", "0"),
                ("Set-Cookie", "sid=s3cr3t; Path=/"),
                ("Set-Cookie", "theme=dark; Path=/settings"),
            ],
            b"",
        ),
        "/settings/profile" => {
            // Longer path first per RFC 6265 ordering.
            assert_eq!(req.header("cookie").unwrap(), "theme=dark; sid=s3cr3t");
            respond(w, 200, &[("Content-Length", "0")], b"")
        }
        _ => {
            assert_eq!(req.header("cookie").unwrap(), "sid=s3cr3t");
            respond(w, 200, &[("Content-Length", "0")], b"")
        }
    });

    let session = test_session(&server);
    session.get("http://host.test/login").call().unwrap();
    assert_eq!(session.cookie_jar().len(), 2);

    session.get("http://host.test/other").call().unwrap();
    session
        .get("http://host.test/settings/profile")
        .call()
        .unwrap();
}

#[test]
fn secure_cookie_not_sent_over_plain_http() {
    init_test_log();
    let server = TestServer::new(|req, w| match req.path() {
        "/set" => respond(
            w,
            200,
            &[
                ("Content-Length", "0"),
                ("Set-Cookie", "token=visible"),
                ("Set-Cookie", "secret=tls-only; Secure"),
            ],
            b"",
        ),
        _ => {
            assert_eq!(req.header("cookie").unwrap(), "token=visible");
            respond(w, 200, &[("Content-Length", "0")], b"")
        }
    });

    let session = test_session(&server);
    session.get("http://host.test/set").call().unwrap();
    // Both got stored; only the non-secure one goes out over http.
    assert_eq!(session.cookie_jar().len(), 2);
    session.get("http://host.test/use").call().unwrap();
}

#[test]
fn expired_cookie_dropped_from_jar() {
    init_test_log();
    let server = TestServer::new(|req, w| match req.path() {
        "/set" => respond(
            w,
            200,
            &[
                ("Content-Length", "0"),
                ("Set-Cookie", "keep=1; Max-Age=60"),
                ("Set-Cookie", "gone=1; Max-Age=0"),
            ],
            b"",
        ),
        _ => {
            assert_eq!(req.header("cookie").unwrap(), "keep=1");
            respond(w, 200, &[("Content-Length", "0")], b"")
        }
    });

    let session = test_session(&server);
    session.get("http://host.test/set").call().unwrap();
    assert_eq!(session.cookie_jar().len(), 1);
    session.get("http://host.test/check").call().unwrap();
}

#[test]
fn cookie_set_on_redirect_hop_reaches_next_hop() {
    init_test_log();
    let server = TestServer::new(|req, w| match req.path() {
        "/hop1" => respond(
            w,
            302,
            &[
                ("Content-Length", "0"),
                ("Location", "/hop2"),
                ("Set-Cookie", "crumbs=left"),
            ],
            b"",
        ),
        "/hop2" => {
            // The jar update from hop 1 happens before hop 2 is sent.
            assert_eq!(req.header("cookie").unwrap(), "crumbs=left");
            respond(w, 200, &[("Content-Length", "5")], b"final")
        }
        _ => respond(w, 404, &[("Content-Length", "0")], b""),
    });

    let session = test_session(&server);
    let response = session.get("http://host.test/hop1").call().unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text(), "final");
    assert_eq!(response.history().len(), 1);
    assert_eq!(response.history()[0].status().as_u16(), 302);
}

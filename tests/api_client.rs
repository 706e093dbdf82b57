use std::thread;

use crossbeam_channel::{unbounded, Receiver};
use irecipes_tui::api::{ApiError, Client, ClientConfig};
use tiny_http::{Header, Response, Server};

struct Stub {
    client: Client,
    requests: Receiver<String>,
    handle: thread::JoinHandle<()>,
}

impl Stub {
    /// Answers each incoming request with the next canned response and
    /// records `METHOD /path?query`.
    fn serve(responses: Vec<(u16, &'static str)>) -> Self {
        let server = Server::http("127.0.0.1:0").expect("bind stub server");
        let addr = server
            .server_addr()
            .to_ip()
            .expect("stub server has an ip address");
        let (tx, requests) = unbounded();
        let handle = thread::spawn(move || {
            for (status, body) in responses {
                let Ok(request) = server.recv() else {
                    return;
                };
                let _ = tx.send(format!("{} {}", request.method(), request.url()));
                let content_type =
                    Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .expect("valid header");
                let response = Response::from_string(body)
                    .with_status_code(status)
                    .with_header(content_type);
                let _ = request.respond(response);
            }
        });
        let client = Client::new(ClientConfig {
            base_url: Some(format!("http://{addr}/api/v1/")),
            user_agent: "irecipes-tests".into(),
            timeout: None,
            http_client: None,
        })
        .expect("build client");
        Self {
            client,
            requests,
            handle,
        }
    }

    fn finish(self) -> Vec<String> {
        self.handle.join().expect("stub server thread");
        self.requests.try_iter().collect()
    }
}

#[test]
fn recommended_accepts_bare_list() {
    let stub = Stub::serve(vec![(
        200,
        r#"[{"_id":"v1","title":"Bolo","url":"https://cdn/v1.mp4"},{"_id":"v2","title":"Pudim","url":"https://cdn/v2.mp4"}]"#,
    )]);
    let page = stub.client.recommended(Some("u1"), 2).unwrap().unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[1].title, "Pudim");
    assert_eq!(
        stub.finish(),
        vec!["GET /api/v1/interactions/recommended?userId=u1&page=2".to_string()]
    );
}

#[test]
fn recommended_accepts_videos_envelope_for_guests() {
    let stub = Stub::serve(vec![(
        200,
        r#"{"videos":[{"_id":"v9","title":"Coxinha","url":"https://cdn/v9.mp4"}]}"#,
    )]);
    let page = stub.client.recommended(None, 1).unwrap().unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, "v9");
    assert_eq!(
        stub.finish(),
        vec!["GET /api/v1/interactions/recommended?userId=&page=1".to_string()]
    );
}

#[test]
fn recommended_flags_payloads_that_are_not_lists() {
    let stub = Stub::serve(vec![(200, r#"{"message":"no recommendations"}"#)]);
    assert!(stub.client.recommended(None, 1).unwrap().is_none());
    stub.finish();
}

#[test]
fn likes_envelope_decodes_to_liker_set() {
    let stub = Stub::serve(vec![(200, r#"{"likes":["u1","u2"]}"#)]);
    let likes = stub.client.likes("v1").unwrap();
    assert_eq!(likes.count(), 2);
    assert!(likes.contains("u2"));
    assert_eq!(
        stub.finish(),
        vec!["GET /api/v1/videos/getLikes/v1".to_string()]
    );
}

#[test]
fn like_posts_and_unlike_deletes() {
    let stub = Stub::serve(vec![(200, "{}"), (200, "{}")]);
    stub.client.like("u1", "v1").unwrap();
    stub.client.unlike("u1", "v 1").unwrap();
    assert_eq!(
        stub.finish(),
        vec![
            "POST /api/v1/videos/postLike".to_string(),
            "DELETE /api/v1/videos/deleteLike/u1/v%201".to_string(),
        ]
    );
}

#[test]
fn error_statuses_map_to_api_errors() {
    let stub = Stub::serve(vec![
        (404, r#"{"error":"Video not found"}"#),
        (401, "{}"),
        (500, r#"{"message":"database down"}"#),
        (422, "bad comment"),
    ]);

    let err = stub.client.likes("missing").unwrap_err();
    match err.downcast_ref::<ApiError>() {
        Some(ApiError::NotFound(message)) => assert_eq!(message, "Video not found"),
        other => panic!("unexpected error: {other:?}"),
    }

    let err = stub.client.user("u1").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ApiError>(),
        Some(ApiError::Unauthorized)
    ));

    let err = stub.client.like("u1", "v1").unwrap_err();
    match err.downcast_ref::<ApiError>() {
        Some(ApiError::Server { status, message }) => {
            assert_eq!(*status, 500);
            assert_eq!(message, "database down");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let err = stub.client.post_comment("v1", "u1", "oi").unwrap_err();
    match err.downcast_ref::<ApiError>() {
        Some(ApiError::Rejected { status, message }) => {
            assert_eq!(*status, 422);
            assert_eq!(message, "bad comment");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(stub.finish().len(), 4);
}

//! HttpApiClient against a one-shot local HTTP responder

use chorus_core::{
    ClientConfig, EngagementEffects, EngagementMutation, MediaAttachment, PostDraft, PostEffects,
    PostId, RemoteError,
};
use chorus_transport::HttpApiClient;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const POST_JSON: &str = r#"{"post":{"id":42,"creatorId":"alice","content":"hello","mediaRef":null,"createdAt":"2024-05-01T12:00:00Z"}}"#;

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
        let length = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok());
        let complete = match length {
            Some(len) => buf.len() >= header_end + 4 + len,
            None if headers.contains("transfer-encoding: chunked") => buf.ends_with(b"0\r\n\r\n"),
            None => true,
        };
        if complete {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Answer exactly one request and hand back its raw text.
async fn respond_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
        request
    });
    (format!("http://{addr}"), handle)
}

fn client(base: &str) -> HttpApiClient {
    HttpApiClient::new(&ClientConfig {
        api_base_url: base.to_string(),
        request_timeout_ms: 2_000,
        ..ClientConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn like_posts_to_the_like_route() {
    let (base, server) = respond_once("200 OK", "{}").await;
    client(&base)
        .with_bearer_token("secret")
        .mutate_engagement(&PostId::from(42u64), &EngagementMutation::CreateLike)
        .await
        .unwrap();

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /posts/42/like HTTP/1.1"));
    assert!(request.to_lowercase().contains("authorization: bearer secret"));
}

#[tokio::test]
async fn empty_success_body_is_accepted_for_unlike() {
    let (base, server) = respond_once("204 No Content", "").await;
    client(&base)
        .mutate_engagement(&PostId::from(42u64), &EngagementMutation::DeleteLike)
        .await
        .unwrap();
    assert!(server.await.unwrap().starts_with("DELETE /posts/42/like"));
}

#[tokio::test]
async fn save_without_confirmation_is_rejected() {
    let (base, _server) = respond_once("200 OK", r#"{"msg":"Post not found"}"#).await;
    let err = client(&base)
        .mutate_engagement(&PostId::from(42u64), &EngagementMutation::CreateSave)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RemoteError::Rejected {
            status: None,
            message: "Post not found".into()
        }
    );
}

#[tokio::test]
async fn error_status_carries_server_message() {
    let (base, server) =
        respond_once("422 Unprocessable Entity", r#"{"message":"comment too long"}"#).await;
    let err = client(&base)
        .mutate_engagement(
            &PostId::from(42u64),
            &EngagementMutation::CreateRepost {
                comment: Some("nice".into()),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RemoteError::Rejected {
            status: Some(422),
            message: "comment too long".into()
        }
    );

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /posts/42/repost"));
    assert!(request.contains(r#""comment":"nice""#));
}

#[tokio::test]
async fn create_post_sends_multipart_and_reads_the_post() {
    let (base, server) = respond_once("201 Created", POST_JSON).await;
    let draft = PostDraft::text("  hello  ").with_image(MediaAttachment {
        file_name: "cat.png".into(),
        content_type: "image/png".into(),
        bytes: vec![1, 2, 3],
    });

    let post = client(&base).create_post(&draft).await.unwrap();
    assert_eq!(post.id, PostId::from(42u64));
    assert_eq!(post.creator_id.as_str(), "alice");

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /posts HTTP/1.1"));
    assert!(request.contains(r#"name="content""#));
    assert!(request.contains("\r\n\r\nhello\r\n"));
    assert!(request.contains(r#"filename="cat.png""#));
}

#[tokio::test]
async fn fetch_posts_reads_viewer_flags() {
    let body = r#"{"posts":[{"id":"a","creatorId":"bob","content":"hi","createdAt":"2024-05-01T12:00:00Z","isSaved":true}]}"#;
    let (base, server) = respond_once("200 OK", body).await;
    let posts = client(&base).fetch_posts().await.unwrap();
    assert_eq!(posts.len(), 1);
    assert!(posts[0].viewer.is_saved);
    assert!(server.await.unwrap().starts_with("GET /posts HTTP/1.1"));
}

#[tokio::test]
async fn unparsable_success_body_is_malformed() {
    let (base, _server) = respond_once("200 OK", "not json").await;
    let err = client(&base).fetch_posts().await.unwrap_err();
    assert!(matches!(err, RemoteError::Malformed(_)));
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{addr}"))
        .fetch_posts()
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Transport(_)));
}

#[tokio::test]
async fn silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        drop(socket);
    });

    let api = HttpApiClient::new(&ClientConfig {
        api_base_url: format!("http://{addr}"),
        request_timeout_ms: 200,
        ..ClientConfig::default()
    })
    .unwrap();
    let err = api.fetch_posts().await.unwrap_err();
    assert_eq!(err, RemoteError::Timeout { timeout_ms: 200 });
}

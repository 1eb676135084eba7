use corral::decode::{DecodeError, DecodedBody, FormField};
use corral::http::{header, Body, Bytes, MimeType, Params, StatusCode};
use corral::{async_trait, App, Config, Context, Rejection, UserFetcher};

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{self, Poll};

use futures_core::Stream;
use serde::Deserialize;

fn context(builder: http::request::Builder, body: impl Into<Body>) -> Context {
    App::new().context(builder.body(body.into()).unwrap(), Params::new())
}

#[test]
fn request_views() {
    let cx = App::new().context(
        http::Request::builder()
            .uri("/users/7?tab=posts&tab=likes&q=a%20b")
            .header(header::COOKIE, "sid=abc; theme=dark")
            .header(header::ACCEPT, "text/html, application/json;q=0.5")
            .header(header::AUTHORIZATION, "Bearer token")
            .body(Body::empty())
            .unwrap(),
        Params::from_iter([("id", "7")]),
    );

    assert_eq!(cx.path(), "/users/7");
    assert_eq!(cx.param("id"), Some("7"));
    assert_eq!(cx.query("tab"), Some("posts"));
    assert_eq!(cx.queries().get_all("tab").count(), 2);
    assert_eq!(cx.query("q"), Some("a b"));
    assert_eq!(cx.cookie("theme"), Some("dark"));
    assert_eq!(cx.authorization().and_then(|auth| auth.bearer()), Some("token"));
    assert_eq!(
        cx.accepts().preferred(&["application/json", "text/html"]),
        Some("text/html")
    );

    // cached views are computed once
    assert!(std::ptr::eq(cx.queries(), cx.queries()));
    assert!(std::ptr::eq(cx.mime_type(), cx.mime_type()));
    assert!(std::ptr::eq(cx.cookies(), cx.cookies()));
    assert!(std::ptr::eq(cx.accepts(), cx.accepts()));
    assert!(std::ptr::eq(
        cx.authorization().unwrap(),
        cx.authorization().unwrap()
    ));
}

struct Counted {
    chunks: Vec<Bytes>,
    polls: Arc<AtomicUsize>,
    ends: Arc<AtomicUsize>,
}

impl Stream for Counted {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, _: &mut task::Context<'_>) -> Poll<Option<Self::Item>> {
        self.polls.fetch_add(1, Ordering::SeqCst);

        if self.chunks.is_empty() {
            self.ends.fetch_add(1, Ordering::SeqCst);
            Poll::Ready(None)
        } else {
            Poll::Ready(Some(Ok(self.chunks.remove(0))))
        }
    }
}

#[tokio::test]
async fn body_stream_is_drained_once() {
    let polls = Arc::new(AtomicUsize::new(0));
    let ends = Arc::new(AtomicUsize::new(0));

    let body = Body::stream(Counted {
        chunks: vec![Bytes::from_static(b"{\"id\":"), Bytes::from_static(b"7}")],
        polls: polls.clone(),
        ends: ends.clone(),
    });

    let mut cx = context(
        http::Request::builder().header(header::CONTENT_TYPE, "application/json"),
        body,
    );

    assert_eq!(cx.bytes().await.unwrap(), r#"{"id":7}"#);
    assert_eq!(cx.json_value().await.unwrap()["id"], 7);
    assert!(matches!(cx.decode().await.unwrap(), DecodedBody::Json(_)));
    assert_eq!(cx.bytes().await.unwrap(), r#"{"id":7}"#);

    assert_eq!(polls.load(Ordering::SeqCst), 3);
    assert_eq!(ends.load(Ordering::SeqCst), 1);
}

#[test]
fn default_content_type() {
    let cx = context(http::Request::builder(), Body::empty());
    assert_eq!(cx.mime_type(), &MimeType::binary());

    let cx = context(
        http::Request::builder().header(header::CONTENT_TYPE, "not a type"),
        Body::empty(),
    );
    assert_eq!(cx.mime_type().essence(), "application/octet-stream");
}

#[tokio::test]
async fn body_is_read_once() {
    let mut cx = context(
        http::Request::builder().header(header::CONTENT_TYPE, "application/json"),
        r#"{"name":"corral","tags":["a","b"]}"#,
    );

    #[derive(Deserialize)]
    struct Crate {
        name: String,
        tags: Vec<String>,
    }

    let parsed: Crate = cx.json().await.unwrap();
    assert_eq!(parsed.name, "corral");
    assert_eq!(parsed.tags, ["a", "b"]);

    let map = cx.json_map().await.unwrap();
    assert_eq!(map["name"], "corral");
    assert!(cx.json_list().await.is_err());
    assert_eq!(cx.text().await.unwrap().len(), 34);

    match cx.decode().await.unwrap() {
        DecodedBody::Json(value) => assert_eq!(value["tags"][1], "b"),
        other => panic!("unexpected body {:?}", other),
    }

    assert_eq!(cx.url_encoded().await.unwrap(), None);
}

#[tokio::test]
async fn url_encoded_body() {
    #[derive(Deserialize)]
    struct Login {
        user: String,
        remember: bool,
    }

    let mut cx = context(
        http::Request::builder().header(header::CONTENT_TYPE, "application/x-www-form-urlencoded"),
        "user=ann&remember=true",
    );

    let map = cx.url_encoded().await.unwrap().unwrap();
    assert_eq!(map["user"], "ann");

    let login: Login = cx.form().await.unwrap().unwrap();
    assert_eq!(login.user, "ann");
    assert!(login.remember);

    let login: Login = cx.decode_as().await.unwrap().unwrap();
    assert!(login.remember);
    assert!(cx.form_data().await.unwrap().is_none());
}

#[tokio::test]
async fn text_charset() {
    let mut cx = context(
        http::Request::builder().header(header::CONTENT_TYPE, "text/plain; charset=iso-8859-1"),
        Bytes::from_static(b"caf\xe9"),
    );
    assert_eq!(cx.text().await.unwrap(), "caf\u{e9}");

    let mut cx = App::new()
        .config(Config::new().default_charset(corral::decode::Charset::Iso8859_1))
        .context(
            http::Request::builder()
                .body(Body::from(Bytes::from_static(b"\xe9t\xe9")))
                .unwrap(),
            Params::new(),
        );
    assert_eq!(cx.text().await.unwrap(), "\u{e9}t\u{e9}");

    let mut cx = context(
        http::Request::builder().header(header::CONTENT_TYPE, "text/plain; charset=koi8-r"),
        "text",
    );
    let err = cx.text().await.unwrap_err();
    assert!(matches!(err, DecodeError::Charset(_)));
}

const FORM: &[u8] = b"--XyZ\r\n\
Content-Disposition: form-data; name=\"title\"\r\n\
\r\n\
first\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"title\"\r\n\
\r\n\
second\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"notes\"; filename=\"a.txt\"\r\n\
\r\n\
alpha\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"notes\"; filename=\"b.txt\"\r\n\
\r\n\
beta\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"avatar\"; filename=\"me.png\"\r\n\
Content-Type: image/png\r\n\
\r\n\
\x89PNG\r\n\
--XyZ--\r\n";

#[tokio::test]
async fn multipart_body() {
    let mut cx = context(
        http::Request::builder().header(header::CONTENT_TYPE, "multipart/form-data; boundary=XyZ"),
        Bytes::from_static(FORM),
    );

    let form = cx.form_data().await.unwrap().unwrap();
    assert_eq!(form.len(), 3);
    assert_eq!(form.value("title"), Some("second"));

    match form.get("notes") {
        Some(FormField::TextFileList(files)) => {
            assert_eq!(files.len(), 2);
            assert_eq!(files[0].filename(), "a.txt");
            assert_eq!(files[1].filename(), "b.txt");
        }
        other => panic!("unexpected field {:?}", other),
    }

    let mut fields = form.into_iter();
    let (_, avatar) = fields.find(|(name, _)| name == "avatar").unwrap();
    match avatar {
        FormField::BinaryFile(file) => {
            assert_eq!(file.filename(), Some("me.png"));
            assert_eq!(file.bytes().await.unwrap(), &b"\x89PNG"[..]);
        }
        other => panic!("unexpected field {:?}", other),
    }

    #[derive(Deserialize)]
    struct Post {
        title: String,
    }

    // the body is buffered, so it can be decoded again
    let post: Post = cx.decode_as().await.unwrap().unwrap();
    assert_eq!(post.title, "second");
}

#[tokio::test]
async fn multipart_without_boundary() {
    let mut cx = context(
        http::Request::builder().header(header::CONTENT_TYPE, "multipart/form-data"),
        "",
    );

    let err = cx.form_data().await.unwrap_err();
    assert!(matches!(err, DecodeError::MissingBoundary));
    assert_eq!(
        Rejection::from(err).reject().status(),
        StatusCode::BAD_REQUEST
    );
}

#[test]
fn variables() {
    let mut cx = context(http::Request::builder(), Body::empty());

    cx.variables_mut().add(1_u32);
    cx.variables_mut().add_with_id("retries", 3_u32);
    cx.variables_mut().add_with_id("limit", String::from("10"));

    assert_eq!(cx.variables().get::<u32>(), Some(&1));
    assert_eq!(cx.variables().get_with_id::<u32>("retries"), Some(&3));
    assert_eq!(cx.variables().get_with_id::<u32>("limit"), None);
    assert_eq!(cx.variables().get_with_id::<String>("limit").map(String::as_str), Some("10"));
}

struct User {
    name: String,
}

struct HeaderUsers;

#[async_trait]
impl UserFetcher<User> for HeaderUsers {
    async fn fetch(&self, cx: &Context) -> Result<Option<User>, Rejection> {
        Ok(cx.header("x-user").and_then(|value| value.to_str().ok()).map(|name| User {
            name: name.to_owned(),
        }))
    }
}

#[tokio::test]
async fn user_fetchers() {
    let app = App::new().state(5_u8).user_fetcher::<User, _>(HeaderUsers);

    let cx = app.context(
        http::Request::builder()
            .header("x-user", "ann")
            .body(Body::empty())
            .unwrap(),
        Params::new(),
    );

    assert_eq!(cx.state::<u8>(), Some(&5));
    assert!(cx.user_fetcher::<String>().is_none());

    let fetcher = cx.user_fetcher::<User>().unwrap();
    let user = fetcher.fetch(&cx).await.unwrap().unwrap();
    assert_eq!(user.name, "ann");
}

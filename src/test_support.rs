//! Local HTTP servers and fakes shared by the unit tests.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_std::net::TcpListener;
use async_std::prelude::*;
use tide::listener::Listener;
use tide::{Request, Response, StatusCode};
use url::Url;

use crate::unsplash::{PhotoSource, SourceError};

/// Serves each entry of `images` at `/images/<name>`; everything else is a 404.
pub(crate) async fn serve_images(images: HashMap<String, Vec<u8>>) -> Url {
    let mut app = tide::with_state(Arc::new(images));
    app.at("/images/:name")
        .get(|req: Request<Arc<HashMap<String, Vec<u8>>>>| async move {
            let name = req.param("name")?;
            Ok(match req.state().get(name) {
                Some(data) => Response::builder(StatusCode::Ok)
                    .body(data.clone())
                    .content_type("image/jpeg")
                    .build(),
                None => Response::new(StatusCode::NotFound),
            })
        });

    let mut listener = app.bind("127.0.0.1:0").await.unwrap();
    let base = Url::parse(&listener.info()[0].connection().to_string()).unwrap();
    async_std::task::spawn(async move { listener.accept().await });
    base.join("images/").unwrap()
}

/// Accepts connections and answers each with a body that is cut off after `sent` bytes
/// while promising `declared` bytes.
pub(crate) async fn serve_truncated(declared: usize, sent: Vec<u8>) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    async_std::task::spawn(async move {
        let mut incoming = listener.incoming();
        while let Some(Ok(mut stream)) = incoming.next().await {
            let sent = sent.clone();
            async_std::task::spawn(async move {
                let mut buf = [0u8; 4096];
                // Only the request head matters, and it fits in one read.
                let _ = stream.read(&mut buf).await;
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    declared
                );
                let _ = stream.write_all(head.as_bytes()).await;
                let _ = stream.write_all(&sent).await;
                let _ = stream.flush().await;
            });
        }
    });

    Url::parse(&format!("http://{}/truncated/", addr)).unwrap()
}

/// A `PhotoSource` handing out a fixed list of URLs in order, counting how often it is asked.
#[derive(Clone, Default)]
pub(crate) struct FakeSource {
    urls: Vec<Url>,
    fail: bool,
    calls: Arc<AtomicUsize>,
    handed_out: Arc<AtomicUsize>,
}

impl FakeSource {
    pub(crate) fn new(urls: Vec<Url>) -> Self {
        FakeSource {
            urls,
            ..Default::default()
        }
    }

    pub(crate) fn failing() -> Self {
        FakeSource {
            fail: true,
            ..Default::default()
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PhotoSource for FakeSource {
    async fn random_photo_urls(&self, count: NonZeroU32) -> Result<Vec<Url>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SourceError::MalformedResponse("fake failure".to_string()));
        }
        let count = count.get() as usize;
        let start = self.handed_out.fetch_add(count, Ordering::SeqCst);
        Ok(self.urls.iter().skip(start).take(count).cloned().collect())
    }
}

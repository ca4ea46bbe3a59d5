//! Glue for serving a [`Runtime`] over hyper connections.

use crate::http::body::RequestBody;
use crate::runtime::Runtime;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::Service;
use hyper::{Request, Response};
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;

impl RequestBody for Incoming {
    type Error = hyper::Error;

    async fn to_bytes(self) -> Result<Bytes, Self::Error> {
        Ok(self.collect().await?.to_bytes())
    }
}

/// A hyper service answering every request from the runtime. Failures are
/// rendered as responses, so the service itself never errors.
#[derive(Clone)]
pub struct MockService {
    runtime: Arc<Runtime>,
}

impl MockService {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { runtime }
    }
}

impl Service<Request<Incoming>> for MockService {
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let runtime = Arc::clone(&self.runtime);
        Box::pin(async move { Ok(runtime.serve(req).await.map(Full::new)) })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hyper::server::conn::http1;
    use hyper_util::rt::TokioIo;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const PETS: &str = r#"{
  "openapi": "3.0.3",
  "info": {"title": "Petstore", "version": "1"},
  "paths": {
    "/pets": {
      "get": {
        "responses": {
          "200": {
            "description": "ok",
            "content": {"application/json": {"example": [{"name": "Rex"}]}}
          }
        }
      }
    }
  }
}"#;

    #[tokio::test]
    async fn test_serve_over_loopback() {
        let runtime = Arc::new(Runtime::new());
        runtime.add_document("file:///mocks/pets.json", PETS.as_bytes()).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let service = MockService::new(runtime);
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
                .unwrap();
        });

        let mut client = TcpStream::connect(address).await.unwrap();
        client
            .write_all(b"GET /pets HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = Vec::new();
        client.read_to_end(&mut raw).await.unwrap();
        let raw = String::from_utf8(raw).unwrap();
        assert!(raw.starts_with("HTTP/1.1 200 OK"), "{}", raw);
        assert!(raw.to_lowercase().contains("content-type: application/json"), "{}", raw);
        assert!(raw.ends_with(r#"[{"name":"Rex"}]"#), "{}", raw);
        server.await.unwrap();
    }
}

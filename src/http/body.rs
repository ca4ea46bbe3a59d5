use bytes::Bytes;
use std::convert::Infallible;

/// A request body the handler can drain.
pub trait RequestBody: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    fn to_bytes(self) -> impl Future<Output = Result<Bytes, Self::Error>> + Send;
}

impl RequestBody for Bytes {
    type Error = Infallible;

    async fn to_bytes(self) -> Result<Bytes, Self::Error> {
        Ok(self)
    }
}

impl RequestBody for String {
    type Error = Infallible;

    async fn to_bytes(self) -> Result<Bytes, Self::Error> {
        Ok(Bytes::from(self))
    }
}

impl RequestBody for Vec<u8> {
    type Error = Infallible;

    async fn to_bytes(self) -> Result<Bytes, Self::Error> {
        Ok(Bytes::from(self))
    }
}

impl RequestBody for &'static str {
    type Error = Infallible;

    async fn to_bytes(self) -> Result<Bytes, Self::Error> {
        Ok(Bytes::from_static(self.as_bytes()))
    }
}

impl RequestBody for () {
    type Error = Infallible;

    async fn to_bytes(self) -> Result<Bytes, Self::Error> {
        Ok(Bytes::new())
    }
}

impl RequestBody for http_body_util::Full<Bytes> {
    type Error = Infallible;

    async fn to_bytes(self) -> Result<Bytes, Self::Error> {
        use http_body_util::BodyExt;
        Ok(self.collect().await?.to_bytes())
    }
}

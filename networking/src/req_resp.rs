use std::io;
use std::io::{Read, Write};
use std::time::Duration;

use async_trait::async_trait;
use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use libp2p::request_response::{
    Behaviour as RequestResponse, Codec, Config, Event, ProtocolSupport,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use snap::read::FrameDecoder;
use snap::write::FrameEncoder;

use crate::ordersync::{OrdersyncRequest, OrdersyncResponse};

/// Largest compressed message read off a stream.
pub const MAX_MESSAGE_SIZE: u64 = 8 * 1024 * 1024;

/// Largest message after decompression.
pub const MAX_DECOMPRESSED_SIZE: u64 = 32 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OrdersyncProtocol(pub String);

impl AsRef<str> for OrdersyncProtocol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// JSON messages inside Snappy framing.
#[derive(Clone, Default)]
pub struct OrdersyncCodec;

impl OrdersyncCodec {
    /// Compress data using Snappy framing format
    fn compress(data: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = FrameEncoder::new(Vec::new());
        encoder.write_all(data)?;
        encoder.into_inner().map_err(|e| {
            io::Error::new(io::ErrorKind::Other, format!("Snappy framing failed: {e}"))
        })
    }

    /// Decompress data using Snappy framing format
    fn decompress(data: &[u8]) -> io::Result<Vec<u8>> {
        let mut decoder = FrameDecoder::new(data).take(MAX_DECOMPRESSED_SIZE + 1);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        if decompressed.len() as u64 > MAX_DECOMPRESSED_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Decompressed message exceeds {MAX_DECOMPRESSED_SIZE} bytes"),
            ));
        }
        Ok(decompressed)
    }

    fn encode<T: Serialize>(message: &T) -> io::Result<Vec<u8>> {
        let json = serde_json::to_vec(message).map_err(|e| {
            io::Error::new(io::ErrorKind::Other, format!("JSON encode failed: {e}"))
        })?;
        Self::compress(&json)
    }

    fn decode<T: DeserializeOwned>(data: &[u8]) -> io::Result<T> {
        if data.is_empty() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "Empty message"));
        }
        let json = Self::decompress(data)?;
        serde_json::from_slice(&json).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("JSON decode failed: {e}"))
        })
    }

    fn encode_request(request: &OrdersyncRequest) -> io::Result<Vec<u8>> {
        Self::encode(request)
    }

    fn decode_request(data: &[u8]) -> io::Result<OrdersyncRequest> {
        Self::decode(data)
    }

    fn encode_response(response: &OrdersyncResponse) -> io::Result<Vec<u8>> {
        Self::encode(response)
    }

    fn decode_response(data: &[u8]) -> io::Result<OrdersyncResponse> {
        Self::decode(data)
    }

    async fn read_limited<T>(io: &mut T) -> io::Result<Vec<u8>>
    where
        T: AsyncRead + Unpin + Send,
    {
        let mut data = Vec::new();
        io.take(MAX_MESSAGE_SIZE + 1).read_to_end(&mut data).await?;
        if data.len() as u64 > MAX_MESSAGE_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Message exceeds {MAX_MESSAGE_SIZE} bytes"),
            ));
        }
        Ok(data)
    }
}

#[async_trait]
impl Codec for OrdersyncCodec {
    type Protocol = OrdersyncProtocol;
    type Request = OrdersyncRequest;
    type Response = OrdersyncResponse;

    async fn read_request<T>(
        &mut self,
        protocol: &Self::Protocol,
        io: &mut T,
    ) -> io::Result<Self::Request>
    where
        T: AsyncRead + Unpin + Send,
    {
        let data = Self::read_limited(io).await?;
        let request = Self::decode_request(&data)?;
        if request.protocol_id() != protocol.as_ref() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "{} request arrived on {}",
                    request.protocol_id(),
                    protocol.as_ref()
                ),
            ));
        }
        Ok(request)
    }

    async fn read_response<T>(
        &mut self,
        _protocol: &Self::Protocol,
        io: &mut T,
    ) -> io::Result<Self::Response>
    where
        T: AsyncRead + Unpin + Send,
    {
        let data = Self::read_limited(io).await?;
        Self::decode_response(&data)
    }

    async fn write_request<T>(
        &mut self,
        _protocol: &Self::Protocol,
        io: &mut T,
        request: Self::Request,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        let data = Self::encode_request(&request)?;
        io.write_all(&data).await?;
        io.close().await
    }

    async fn write_response<T>(
        &mut self,
        _protocol: &Self::Protocol,
        io: &mut T,
        response: Self::Response,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        let data = Self::encode_response(&response)?;
        io.write_all(&data).await?;
        io.close().await
    }
}

pub type ReqResp = RequestResponse<OrdersyncCodec>;

pub type ReqRespMessage = Event<OrdersyncRequest, OrdersyncResponse>;

pub fn build(protocols: impl IntoIterator<Item = String>, request_timeout: Duration) -> ReqResp {
    let protocols = protocols
        .into_iter()
        .map(|name| (OrdersyncProtocol(name), ProtocolSupport::Full))
        .collect::<Vec<_>>();

    RequestResponse::with_codec(
        OrdersyncCodec::default(),
        protocols,
        Config::default().with_request_timeout(request_timeout),
    )
}

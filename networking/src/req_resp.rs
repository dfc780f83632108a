use std::io;
use std::io::{Read, Write};

use async_trait::async_trait;
use containers::ssz::{SszReadDefault, SszWrite};
use containers::{BlocksByRangeRequest, SignedBeaconBlock, Status};
use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use libp2p::request_response::{
    Behaviour as RequestResponse, Codec, Config, Event, ProtocolSupport,
};
use snap::read::FrameDecoder;
use snap::write::FrameEncoder;

use crate::types::{GOSSIP_MAX_SIZE, MAX_REQUEST_BLOCKS};

pub const STATUS_PROTOCOL_V1: &str = "/eth2/beacon_chain/req/status/1/ssz_snappy";
pub const BEACON_BLOCKS_BY_RANGE_PROTOCOL_V1: &str =
    "/eth2/beacon_chain/req/beacon_blocks_by_range/1/ssz_snappy";

/// Upper bound on a single request or response stream, compressed or not.
pub const MAX_PAYLOAD_SIZE: usize = GOSSIP_MAX_SIZE;

const CHUNK_LENGTH_PREFIX: usize = 4;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Eth2Protocol(pub String);

impl AsRef<str> for Eth2Protocol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eth2Request {
    Status(Status),
    BlocksByRange(BlocksByRangeRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eth2Response {
    Status(Status),
    BlocksByRange(Vec<SignedBeaconBlock>),
    Empty,
}

fn invalid_data(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

/// Snappy framed SSZ. Range responses carry each block behind a `u32` LE length.
#[derive(Clone, Default)]
pub struct Eth2Codec;

impl Eth2Codec {
    fn compress(data: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = FrameEncoder::new(Vec::new());
        encoder.write_all(data)?;
        encoder
            .into_inner()
            .map_err(|e| io::Error::other(format!("Snappy framing failed: {e}")))
    }

    fn decompress(data: &[u8]) -> io::Result<Vec<u8>> {
        let mut decoder = FrameDecoder::new(data).take(MAX_PAYLOAD_SIZE as u64 + 1);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        if decompressed.len() > MAX_PAYLOAD_SIZE {
            return Err(invalid_data(format!(
                "decompressed payload exceeds {MAX_PAYLOAD_SIZE} bytes"
            )));
        }
        Ok(decompressed)
    }

    pub fn encode_request(request: &Eth2Request) -> io::Result<Vec<u8>> {
        let ssz_bytes = match request {
            Eth2Request::Status(status) => status.to_ssz_bytes(),
            Eth2Request::BlocksByRange(request) => request
                .to_ssz()
                .map_err(|e| io::Error::other(format!("SSZ encode failed: {e}")))?,
        };
        Self::compress(&ssz_bytes)
    }

    pub fn decode_request(protocol: &str, data: &[u8]) -> io::Result<Eth2Request> {
        let ssz_bytes = Self::decompress(data)?;

        match protocol {
            STATUS_PROTOCOL_V1 => Status::from_ssz_bytes(&ssz_bytes)
                .map(Eth2Request::Status)
                .map_err(invalid_data),
            BEACON_BLOCKS_BY_RANGE_PROTOCOL_V1 => {
                let request = BlocksByRangeRequest::from_ssz_default(&ssz_bytes)
                    .map_err(|e| invalid_data(format!("SSZ decode range request failed: {e:?}")))?;
                if request.count > MAX_REQUEST_BLOCKS {
                    return Err(invalid_data(format!(
                        "Too many blocks requested: {} > {MAX_REQUEST_BLOCKS}",
                        request.count
                    )));
                }
                if request.step == 0 {
                    return Err(invalid_data("Range request step must be non-zero"));
                }
                Ok(Eth2Request::BlocksByRange(request))
            }
            _ => Err(io::Error::other(format!("Unknown protocol: {protocol}"))),
        }
    }

    pub fn encode_response(response: &Eth2Response) -> io::Result<Vec<u8>> {
        let ssz_bytes = match response {
            Eth2Response::Status(status) => status.to_ssz_bytes(),
            Eth2Response::BlocksByRange(blocks) => {
                let mut bytes = Vec::new();
                for block in blocks {
                    let block_bytes = block
                        .to_ssz()
                        .map_err(|e| io::Error::other(format!("SSZ encode failed: {e}")))?;
                    let len = u32::try_from(block_bytes.len())
                        .map_err(|_| invalid_data("block too large"))?;
                    bytes.extend_from_slice(&len.to_le_bytes());
                    bytes.extend_from_slice(&block_bytes);
                }
                bytes
            }
            Eth2Response::Empty => Vec::new(),
        };

        if ssz_bytes.is_empty() {
            return Ok(Vec::new());
        }

        Self::compress(&ssz_bytes)
    }

    pub fn decode_response(protocol: &str, data: &[u8]) -> io::Result<Eth2Response> {
        if data.is_empty() {
            return Ok(match protocol {
                BEACON_BLOCKS_BY_RANGE_PROTOCOL_V1 => Eth2Response::BlocksByRange(Vec::new()),
                _ => Eth2Response::Empty,
            });
        }

        let ssz_bytes = Self::decompress(data)?;

        match protocol {
            STATUS_PROTOCOL_V1 => Status::from_ssz_bytes(&ssz_bytes)
                .map(Eth2Response::Status)
                .map_err(invalid_data),
            BEACON_BLOCKS_BY_RANGE_PROTOCOL_V1 => {
                Self::decode_blocks(&ssz_bytes).map(Eth2Response::BlocksByRange)
            }
            _ => Err(io::Error::other(format!("Unknown protocol: {protocol}"))),
        }
    }

    fn decode_blocks(mut bytes: &[u8]) -> io::Result<Vec<SignedBeaconBlock>> {
        let mut blocks = Vec::new();

        while !bytes.is_empty() {
            if blocks.len() as u64 >= MAX_REQUEST_BLOCKS {
                return Err(invalid_data(format!(
                    "Response carries more than {MAX_REQUEST_BLOCKS} blocks"
                )));
            }
            if bytes.len() < CHUNK_LENGTH_PREFIX {
                return Err(invalid_data("Truncated block length prefix"));
            }
            let (prefix, rest) = bytes.split_at(CHUNK_LENGTH_PREFIX);
            let mut len = [0u8; CHUNK_LENGTH_PREFIX];
            len.copy_from_slice(prefix);
            let len = u32::from_le_bytes(len) as usize;

            if rest.len() < len {
                return Err(invalid_data(format!(
                    "Truncated block: expected {len} bytes, got {}",
                    rest.len()
                )));
            }
            let (block_bytes, rest) = rest.split_at(len);
            let block = SignedBeaconBlock::from_ssz_default(block_bytes)
                .map_err(|e| invalid_data(format!("SSZ decode Block failed: {e:?}")))?;
            blocks.push(block);
            bytes = rest;
        }

        Ok(blocks)
    }
}

async fn read_limited<T>(io: &mut T) -> io::Result<Vec<u8>>
where
    T: AsyncRead + Unpin + Send,
{
    let mut data = Vec::new();
    io.take(MAX_PAYLOAD_SIZE as u64 + 1)
        .read_to_end(&mut data)
        .await?;
    if data.len() > MAX_PAYLOAD_SIZE {
        return Err(invalid_data(format!("stream exceeds {MAX_PAYLOAD_SIZE} bytes")));
    }
    Ok(data)
}

#[async_trait]
impl Codec for Eth2Codec {
    type Protocol = Eth2Protocol;
    type Request = Eth2Request;
    type Response = Eth2Response;

    async fn read_request<T>(
        &mut self,
        protocol: &Self::Protocol,
        io: &mut T,
    ) -> io::Result<Self::Request>
    where
        T: AsyncRead + Unpin + Send,
    {
        let data = read_limited(io).await?;
        Self::decode_request(&protocol.0, &data)
    }

    async fn read_response<T>(
        &mut self,
        protocol: &Self::Protocol,
        io: &mut T,
    ) -> io::Result<Self::Response>
    where
        T: AsyncRead + Unpin + Send,
    {
        let data = read_limited(io).await?;
        Self::decode_response(&protocol.0, &data)
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

pub type ReqResp = RequestResponse<Eth2Codec>;

pub type ReqRespMessage = Event<Eth2Request, Eth2Response>;

pub fn build(protocols: impl IntoIterator<Item = String>) -> ReqResp {
    let protocols = protocols
        .into_iter()
        .map(|name| (Eth2Protocol(name), ProtocolSupport::Full))
        .collect::<Vec<_>>();

    RequestResponse::with_codec(Eth2Codec, protocols, Config::default())
}

pub fn build_default() -> ReqResp {
    build(vec![
        STATUS_PROTOCOL_V1.to_string(),
        BEACON_BLOCKS_BY_RANGE_PROTOCOL_V1.to_string(),
    ])
}

/// Protocol a request is sent on.
pub fn protocol_for(request: &Eth2Request) -> &'static str {
    match request {
        Eth2Request::Status(_) => STATUS_PROTOCOL_V1,
        Eth2Request::BlocksByRange(_) => BEACON_BLOCKS_BY_RANGE_PROTOCOL_V1,
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::debug;

use super::protocol::{
    Ping, PingReply, RpcRequest, RpcResponse, SubmissionJob, SubmissionJobResult, PING,
    PROCESS_SUBMISSION,
};
use super::{RpcError, MAX_FRAME_LEN};
use crate::core::utils::unix_nanos;

/// Upper bound for establishing a connection to a slave
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(15);

/// A connection to one slave
pub struct RpcClient {
    address: String,
    framed: Mutex<Framed<TcpStream, LinesCodec>>,
    next_id: AtomicU64,
}

impl RpcClient {
    pub async fn connect(address: &str) -> Result<Self, RpcError> {
        Self::connect_timeout(address, DIAL_TIMEOUT).await
    }

    pub async fn connect_timeout(address: &str, timeout: Duration) -> Result<Self, RpcError> {
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(RpcError::Dial {
                    address: address.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(RpcError::DialTimeout {
                    address: address.to_string(),
                    timeout_secs: timeout.as_secs(),
                })
            }
        };
        stream.set_nodelay(true)?;
        debug!("Connected to slave at {}", address);

        Ok(Self {
            address: address.to_string(),
            framed: Mutex::new(Framed::new(
                stream,
                LinesCodec::new_with_max_length(MAX_FRAME_LEN),
            )),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Invoke `method` on the remote end and wait for its reply.
    pub async fn call<Req, Resp>(&self, method: &str, params: &Req) -> Result<Resp, RpcError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            id,
            method: method.to_string(),
            params: serde_json::to_value(params)?,
        };
        let frame = serde_json::to_string(&request)?;

        let mut framed = self.framed.lock().await;
        framed.send(frame).await?;
        let line = match framed.next().await {
            Some(line) => line?,
            None => return Err(RpcError::ConnectionClosed),
        };
        drop(framed);

        let response: RpcResponse = serde_json::from_str(&line)?;
        if response.id != id {
            return Err(RpcError::ResponseMismatch {
                expected: id,
                got: response.id,
            });
        }
        if let Some(message) = response.error {
            return Err(RpcError::Remote(message));
        }
        let result = response.result.unwrap_or(serde_json::Value::Null);
        Ok(serde_json::from_value(result)?)
    }

    pub async fn ping(&self) -> Result<PingReply, RpcError> {
        let request = Ping {
            start_time: unix_nanos(),
        };
        self.call(PING, &request).await
    }

    pub async fn process_submission(
        &self,
        job: &SubmissionJob,
    ) -> Result<SubmissionJobResult, RpcError> {
        self.call(PROCESS_SUBMISSION, job).await
    }

    /// Shut down the write half and drop the connection.
    pub async fn close(self) -> Result<(), RpcError> {
        let mut stream = self.framed.into_inner().into_inner();
        stream.shutdown().await?;
        Ok(())
    }
}

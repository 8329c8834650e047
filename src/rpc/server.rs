use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, info, warn};

use super::protocol::{
    Ping, PingReply, RpcRequest, RpcResponse, SubmissionJob, SubmissionJobResult, PING,
    PROCESS_SUBMISSION,
};
use super::{RpcError, MAX_FRAME_LEN};

/// Methods a slave exposes to the master
#[async_trait]
pub trait JudgeService: Send + Sync {
    async fn ping(&self, request: Ping) -> Result<PingReply>;

    async fn process_submission(&self, job: SubmissionJob) -> Result<SubmissionJobResult>;
}

pub struct RpcServer {
    listener: TcpListener,
    service: Arc<dyn JudgeService>,
}

impl RpcServer {
    pub async fn bind(address: &str, service: Arc<dyn JudgeService>) -> Result<Self> {
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("Failed to bind RPC listener on {}", address))?;
        Ok(Self { listener, service })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever, one task per connection.
    pub async fn serve(self) -> Result<()> {
        info!("RPC server listening on {}", self.local_addr()?);
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Failed to accept RPC connection: {}", e);
                    continue;
                }
            };
            let service = self.service.clone();
            tokio::spawn(async move {
                debug!("Accepted RPC connection from {}", peer);
                if let Err(e) = handle_connection(stream, service).await {
                    warn!("RPC connection from {} ended with error: {}", peer, e);
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    service: Arc<dyn JudgeService>,
) -> Result<(), RpcError> {
    stream.set_nodelay(true)?;
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_FRAME_LEN));

    while let Some(line) = framed.next().await {
        let line = line?;
        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => dispatch(service.as_ref(), request).await,
            Err(e) => RpcResponse::from_result(0, Err(format!("malformed request: {}", e))),
        };
        framed.send(serde_json::to_string(&response)?).await?;
    }
    Ok(())
}

async fn dispatch(service: &dyn JudgeService, request: RpcRequest) -> RpcResponse {
    let result = match request.method.as_str() {
        PING => match decode::<Ping>(PING, request.params) {
            Ok(ping) => encode(service.ping(ping).await),
            Err(e) => Err(e),
        },
        PROCESS_SUBMISSION => match decode::<SubmissionJob>(PROCESS_SUBMISSION, request.params) {
            Ok(job) => encode(service.process_submission(job).await),
            Err(e) => Err(e),
        },
        other => Err(format!("unknown method {}", other)),
    };
    RpcResponse::from_result(request.id, result)
}

fn decode<T: DeserializeOwned>(method: &str, params: Value) -> Result<T, String> {
    serde_json::from_value(params).map_err(|e| format!("invalid params for {}: {}", method, e))
}

fn encode<T: Serialize>(result: Result<T>) -> Result<Value, String> {
    match result {
        Ok(value) => serde_json::to_value(value).map_err(|e| e.to_string()),
        Err(e) => Err(format!("{:#}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixtures;
    use crate::core::utils::unix_nanos;
    use crate::core::{Submission, Verdict};
    use crate::rpc::RpcClient;

    struct EchoService;

    #[async_trait]
    impl JudgeService for EchoService {
        async fn ping(&self, request: Ping) -> Result<PingReply> {
            let end_time = unix_nanos();
            Ok(PingReply {
                start_time: request.start_time,
                end_time,
                delta: end_time - request.start_time,
            })
        }

        async fn process_submission(&self, job: SubmissionJob) -> Result<SubmissionJobResult> {
            if job.test_cases.is_empty() {
                anyhow::bail!("no test cases for problem {}", job.problem.id);
            }
            let mut submission = job.submission;
            submission.verdict = Verdict::Accepted;
            submission.score = 100;
            Ok(SubmissionJobResult {
                submission,
                test_results: vec![],
            })
        }
    }

    async fn start_server() -> String {
        let server = RpcServer::bind("127.0.0.1:0", Arc::new(EchoService))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.serve());
        addr.to_string()
    }

    fn job(test_count: i32) -> SubmissionJob {
        SubmissionJob {
            submission: Submission::queued(1, 2, 1, "echo hi".into()),
            language: fixtures::shell_language(),
            problem: fixtures::problem(1, None),
            test_cases: (1..=test_count)
                .map(|n| fixtures::test_case(1, n, "", "hi\n"))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_ping_round_trip() {
        let addr = start_server().await;
        let client = RpcClient::connect(&addr).await.unwrap();
        let reply = client.ping().await.unwrap();
        assert!(reply.end_time >= reply.start_time);
        assert_eq!(reply.delta, reply.end_time - reply.start_time);
        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_sequential_calls_share_connection() {
        let addr = start_server().await;
        let client = RpcClient::connect(&addr).await.unwrap();
        for _ in 0..3 {
            let result = client.process_submission(&job(2)).await.unwrap();
            assert_eq!(result.submission.verdict, Verdict::Accepted);
            assert_eq!(result.submission.score, 100);
        }
        client.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_handler_failure_is_remote_error() {
        let addr = start_server().await;
        let client = RpcClient::connect(&addr).await.unwrap();
        let err = client.process_submission(&job(0)).await.unwrap_err();
        assert!(matches!(err, RpcError::Remote(ref m) if m.contains("no test cases")));
        assert!(!err.is_transport());
        // the connection stays usable after an application error
        client.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let addr = start_server().await;
        let client = RpcClient::connect(&addr).await.unwrap();
        let err = client
            .call::<_, Value>("Judge.Reboot", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Remote(ref m) if m == "unknown method Judge.Reboot"));
    }

    #[tokio::test]
    async fn test_dial_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = match RpcClient::connect(&addr).await {
            Ok(_) => panic!("connected to a closed port"),
            Err(e) => e,
        };
        assert!(matches!(err, RpcError::Dial { .. }));
        assert!(err.is_transport());
    }
}

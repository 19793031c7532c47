//! High-level client API.

use crate::connection::{Connection, ConnectionConfig, InboundMessage};
use crate::error::ClientError;
use bytes::Bytes;
use muxrpc_protocol::ResponseFrame;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Typed JSON calls over a shared connection.
///
/// Cloning is cheap; every clone multiplexes onto the same connection.
#[derive(Clone)]
pub struct Client {
    conn: Arc<Connection>,
}

impl Client {
    /// Dials the configured node.
    pub async fn connect(config: ConnectionConfig) -> Result<Self, ClientError> {
        Ok(Self::from_connection(Connection::connect(config).await?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(conn),
        }
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> Arc<Connection> {
        self.conn.clone()
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Returns the number of calls waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.conn.pending_count()
    }

    /// Subscribes to messages of kinds other than RPC responses.
    pub fn subscribe_messages(&self) -> broadcast::Receiver<InboundMessage> {
        self.conn.subscribe_messages()
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.conn.close().await
    }

    /// Calls `method` with JSON-encoded `args` and decodes the JSON result.
    ///
    /// A remote error comes back as [`ClientError::Remote`] carrying the
    /// remote message as-is; its payload is never parsed as a result.
    pub async fn call<A, R>(&self, method: &str, args: &A) -> Result<R, ClientError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.call_with_timeout(method, args, self.conn.call_timeout())
            .await
    }

    /// Like [`Client::call`], with its own timeout.
    pub async fn call_with_timeout<A, R>(
        &self,
        method: &str,
        args: &A,
        timeout: Duration,
    ) -> Result<R, ClientError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_vec(args).map_err(ClientError::EncodeArgs)?;
        let response = self
            .conn
            .request_with_timeout(method, Bytes::from(payload), timeout)
            .await?;
        decode_result(response)
    }

    /// Untyped call, for tools that pass JSON through.
    pub async fn call_value(&self, method: &str, args: Value) -> Result<Value, ClientError> {
        self.call(method, &args).await
    }
}

fn decode_result<R: DeserializeOwned>(response: ResponseFrame) -> Result<R, ClientError> {
    if response.is_error {
        return Err(ClientError::Remote(response.error_message().into_owned()));
    }
    serde_json::from_slice(&response.result).map_err(ClientError::DecodeResult)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::DEFAULT_CALL_TIMEOUT;
    use crate::testing::pair;
    use serde::Deserialize;
    use serde_json::json;
    use std::collections::HashMap;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Debug, Serialize)]
    struct SendArgs {
        address: String,
        amount: i64,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct TxidsReply {
        txids: Vec<String>,
    }

    #[tokio::test]
    async fn test_typed_call() {
        let (conn, mut peer) = pair(DEFAULT_CALL_TIMEOUT);
        let client = Client::from_connection(conn);

        let c = client.clone();
        let call = tokio::spawn(async move {
            let args = SendArgs {
                address: "tb1qexample".to_string(),
                amount: 50_000,
            };
            c.call::<_, TxidsReply>("LitRPC.Send", &args).await
        });

        let request = peer.next_request().await;
        assert_eq!(request.method, "LitRPC.Send");
        let args: Value = serde_json::from_slice(&request.args).unwrap();
        assert_eq!(args, json!({"address": "tb1qexample", "amount": 50000}));

        peer.respond(&ResponseFrame::ok(
            request.id,
            serde_json::to_vec(&json!({"txids": ["abcd"]})).unwrap(),
        ))
        .await;

        let reply = assert_ok!(call.await.unwrap());
        assert_eq!(
            reply,
            TxidsReply {
                txids: vec!["abcd".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_remote_error_is_not_parsed() {
        let (conn, mut peer) = pair(DEFAULT_CALL_TIMEOUT);
        let client = Client::from_connection(conn);

        let c = client.clone();
        let call = tokio::spawn(async move {
            c.call::<_, TxidsReply>("LitRPC.Send", &json!({})).await
        });

        let request = peer.next_request().await;
        peer.respond(&ResponseFrame::error(request.id, "insufficient funds"))
            .await;

        match assert_err!(call.await.unwrap()) {
            ClientError::Remote(message) => assert_eq!(message, "insufficient funds"),
            other => panic!("expected remote error, got {:?}", other),
        }
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_result_decode_error_is_scoped_to_call() {
        let (conn, mut peer) = pair(DEFAULT_CALL_TIMEOUT);
        let client = Client::from_connection(conn);

        let c = client.clone();
        let bad = tokio::spawn(async move { c.call::<_, TxidsReply>("LitRPC.Bad", &()).await });
        let request = peer.next_request().await;
        peer.respond(&ResponseFrame::ok(request.id, &b"{\"txids\": 12}"[..]))
            .await;
        assert!(matches!(
            bad.await.unwrap(),
            Err(ClientError::DecodeResult(_))
        ));

        let c = client.clone();
        let good = tokio::spawn(async move { c.call_value("LitRPC.Good", json!([1])).await });
        let request = peer.next_request().await;
        peer.respond(&ResponseFrame::ok(request.id, &b"{\"ok\":true}"[..]))
            .await;
        assert_eq!(good.await.unwrap().unwrap(), json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_unencodable_args_fail_before_sending() {
        let (conn, _peer) = pair(DEFAULT_CALL_TIMEOUT);
        let client = Client::from_connection(conn);

        // JSON object keys must be strings.
        let mut args = HashMap::new();
        args.insert((1u8, 2u8), 3u8);

        let result = client.call::<_, Value>("LitRPC.Any", &args).await;
        assert!(matches!(result, Err(ClientError::EncodeArgs(_))));
        assert_eq!(client.pending_count(), 0);
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_call_with_timeout_override() {
        let (conn, mut peer) = pair(DEFAULT_CALL_TIMEOUT);
        let client = Client::from_connection(conn);

        let c = client.clone();
        let call = tokio::spawn(async move {
            c.call_with_timeout::<_, Value>("LitRPC.Slow", &(), Duration::from_millis(50))
                .await
        });
        peer.next_request().await;

        assert!(matches!(
            call.await.unwrap(),
            Err(ClientError::Timeout { after, .. }) if after == Duration::from_millis(50)
        ));
        assert_eq!(client.pending_count(), 0);
    }
}

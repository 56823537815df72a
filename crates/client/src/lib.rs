// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Calling side of porthos RPC.

pub use client::{Client, ClientOptions};
pub use reply::Reply;

mod client;
mod reply;

use porthos_broker::{ChannelError, PublishError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("unable to send request: {0}")]
    Publish(#[from] PublishError),
    #[error("unable to encode request arguments: {0}")]
    Encode(String),
    #[error("no reply to {method} within {}", display_timeout(.timeout))]
    Timeout { method: String, timeout: Duration },
    #[error("client closed")]
    Closed,
    #[error("reply carried no status code")]
    MissingStatus,
    #[error("unable to decode reply: {0}")]
    Decode(String),
}

fn display_timeout(timeout: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use porthos_broker::{Broker, ConsumeOptions, QueueOptions, VirtualHost};
    use porthos_common::{
        DEFAULT_EXCHANGE, HeaderValue, METHOD_HEADER, Properties, Publishing, STATUS_HEADER,
        StatusCode,
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tokio::task::JoinSet;
    use uuid::Uuid;

    fn vhost() -> VirtualHost {
        VirtualHost::bind(&format!("client-test-{}", Uuid::new_v4())).unwrap()
    }

    /// Answers every request on `service` with its method name and arguments.
    async fn echo_responder(broker: &Broker, service: &str) -> tokio::task::JoinHandle<()> {
        let channel = broker.new_channel().unwrap();
        channel
            .queue_declare(service, QueueOptions::default())
            .await
            .unwrap();
        let mut consumer = channel
            .consume(
                service,
                ConsumeOptions {
                    auto_ack: true,
                    consumer_tag: None,
                },
            )
            .await
            .unwrap();
        tokio::spawn(async move {
            while let Some(delivery) = consumer.recv().await {
                let properties = &delivery.properties;
                let method = properties
                    .header(METHOD_HEADER)
                    .and_then(HeaderValue::as_str)
                    .unwrap_or_default();
                let reply = Properties {
                    correlation_id: properties.correlation_id.clone(),
                    ..Default::default()
                }
                .with_header(STATUS_HEADER, StatusCode::OK);
                let args = String::from_utf8_lossy(&delivery.body);
                let body = format!("{{\"method\":{method:?},\"args\":{args}}}");
                channel
                    .publish(
                        DEFAULT_EXCHANGE,
                        properties.reply_to.as_deref().unwrap(),
                        Publishing::new(reply, body),
                    )
                    .await
                    .unwrap();
            }
        })
    }

    #[tokio::test]
    async fn test_call_round_trip() {
        let vhost = vhost();
        let broker = Broker::connect(&vhost.url()).unwrap();
        let _responder = echo_responder(&broker, "echo").await;

        let client = Client::new(&broker, "echo", ClientOptions::default())
            .await
            .unwrap();
        assert!(client.reply_queue().starts_with("amq.gen-"));
        let reply = client.call("ping", &(1, "two")).await.unwrap();
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(
            reply.json::<serde_json::Value>().unwrap(),
            serde_json::json!({"method": "ping", "args": [1, "two"]})
        );
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_correlated() {
        let vhost = vhost();
        let broker = Broker::connect(&vhost.url()).unwrap();
        let _responder = echo_responder(&broker, "echo").await;
        let client = Client::new(&broker, "echo", ClientOptions::default())
            .await
            .unwrap();
        let client = Arc::new(client);

        let mut calls = JoinSet::new();
        for i in 0..20 {
            let client = client.clone();
            calls.spawn(async move { (i, client.call("n", &[i]).await) });
        }
        while let Some(joined) = calls.join_next().await {
            let (i, reply) = joined.unwrap();
            let body: serde_json::Value = reply.unwrap().json().unwrap();
            assert_eq!(body["args"], serde_json::json!([i]));
        }
    }

    #[tokio::test]
    async fn test_timeout_when_nobody_answers() {
        let vhost = vhost();
        let broker = Broker::connect(&vhost.url()).unwrap();
        let channel = broker.new_channel().unwrap();
        channel
            .queue_declare("silent", QueueOptions::default())
            .await
            .unwrap();
        let client = Client::new(
            &broker,
            "silent",
            ClientOptions {
                timeout: Duration::from_millis(50),
            },
        )
        .await
        .unwrap();

        assert_eq!(
            client.call("anything", &()).await,
            Err(ClientError::Timeout {
                method: "anything".into(),
                timeout: Duration::from_millis(50),
            })
        );
        // The unanswered request expires in the queue rather than lingering.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let mut consumer = channel
            .consume("silent", ConsumeOptions::default())
            .await
            .unwrap();
        assert!(
            tokio::time::timeout(Duration::from_millis(50), consumer.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_closed_client_refuses_calls() {
        let vhost = vhost();
        let broker = Broker::connect(&vhost.url()).unwrap();
        let client = Client::new(&broker, "svc", ClientOptions::default())
            .await
            .unwrap();
        let queue = client.reply_queue().to_string();
        client.close();
        client.close();
        assert_eq!(client.call("x", &()).await, Err(ClientError::Closed));
        assert_eq!(
            client.call_raw("x", b"[]".to_vec()).await,
            Err(ClientError::Closed)
        );
        assert!(vhost.queue_info(&queue).is_some());
        drop(broker);
        assert!(vhost.queue_info(&queue).is_none());
    }
}

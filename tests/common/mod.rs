#![allow(dead_code)]

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_smithy_runtime::client::http::test_util::{ReplayEvent, StaticReplayClient};
use aws_smithy_types::body::SdkBody;

pub const NO_SUCH_KEY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message></Error>"#;

pub fn s3event_string(bucket: &str, key: &str) -> String {
    format!(
        r#"{{
        "Records": [
            {{
            "eventVersion": "2.1",
            "eventSource": "aws:s3",
            "awsRegion": "eu-central-1",
            "eventTime": "2024-01-01T10:20:31.000Z",
            "eventName": "ObjectCreated:Put",
            "s3": {{
                "s3SchemaVersion": "1.0",
                "configurationId": "raw-data-created",
                "bucket": {{
                "name": "{}",
                "arn": "arn:aws:s3:::{}"
                }},
                "object": {{
                "key": "{}",
                "size": 311,
                "eTag": "0123456789abcdef0123456789abcdef"
                }}
            }}
            }}
        ]
    }}"#,
        bucket, bucket, key
    )
}

pub fn bridged_event_string(bucket: &str, key: &str) -> String {
    format!(
        r#"{{
        "version": "0",
        "detail-type": "Object Created",
        "source": "aws.s3",
        "region": "eu-central-1",
        "detail": {{
            "bucket": {{ "name": "{}" }},
            "object": {{ "key": "{}", "size": 311 }},
            "reason": "PutObject"
        }}
    }}"#,
        bucket, key
    )
}

fn reply(status: u16, body: Vec<u8>) -> ReplayEvent {
    ReplayEvent::new(
        http::Request::builder().body(SdkBody::from("")).unwrap(),
        http::Response::builder()
            .status(status)
            .body(SdkBody::from(body))
            .unwrap(),
    )
}

/// A mock s3 client answering each request with the next `(status, body)` pair.
/// The returned replay client records what was actually sent.
pub fn get_mock_s3client(responses: Vec<(u16, Vec<u8>)>) -> (Client, StaticReplayClient) {
    let replay_client = StaticReplayClient::new(
        responses
            .into_iter()
            .map(|(status, body)| reply(status, body))
            .collect(),
    );

    let conf = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .credentials_provider(aws_sdk_s3::config::Credentials::new(
            "SOMETESTKEYID",
            "somesecretkey",
            Some("somesessiontoken".to_string()),
            None,
            "",
        ))
        .region(aws_sdk_s3::config::Region::new("eu-central-1"))
        .http_client(replay_client.clone())
        .build();

    (aws_sdk_s3::Client::from_conf(conf), replay_client)
}

pub fn fixture(path: &str) -> Vec<u8> {
    std::fs::read(path).unwrap()
}

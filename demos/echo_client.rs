//! Connects to the `echo_server` demo, issues a handful of calls and a
//! one-way notification, then disconnects.

use bytes::Bytes;
use muxrpc::{Endpoint, EndpointConfig};
use std::time::Duration;
use tracing::info;

const ECHO: i32 = 1;
const NOTIFY: i32 = 2;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = EndpointConfig::new().with_call_timeout(Duration::from_secs(2));
    let (endpoint, driver) = Endpoint::connect("127.0.0.1:9000", config).await?;
    tokio::spawn(driver.run());

    for i in 0..5 {
        let payload = Bytes::from(format!("hello #{i}"));
        let reply = endpoint.call(ECHO, payload.clone()).await?;
        assert_eq!(reply, payload);
        info!(i, "echo round trip succeeded");
    }

    endpoint.one_way(NOTIFY, Bytes::from_static(b"client is done")).await?;

    endpoint.close().await;
    Ok(())
}

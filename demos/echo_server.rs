//! Listens on a TCP port and replies to every call with its own arguments,
//! and logs every one-way notification it receives.

use muxrpc::{Endpoint, EndpointConfig};
use tokio::net::TcpListener;
use tracing::info;

const ECHO: i32 = 1;
const NOTIFY: i32 = 2;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let listener = TcpListener::bind("127.0.0.1:9000").await?;
    info!("listening on {}", listener.local_addr()?);

    loop {
        let (socket, peer) = listener.accept().await?;
        info!(%peer, "accepted connection");

        tokio::spawn(async move {
            let (endpoint, driver) = Endpoint::new(socket, EndpointConfig::new());

            endpoint
                .register_call(ECHO, |_seq, args, replier| async move {
                    let _ = replier.reply(args).await;
                })
                .expect("ECHO registered once");

            endpoint
                .register_one_way(NOTIFY, |args| async move {
                    info!(bytes = args.len(), "received notification");
                })
                .expect("NOTIFY registered once");

            let err = driver.run().await;
            info!(%peer, error = %err, "connection closed");
        });
    }
}

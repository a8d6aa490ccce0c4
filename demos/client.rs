use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use usrv::transport::http::{HttpConfig, HttpTransport};
use usrv::Client;

type Error = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
pub async fn main() -> Result<(), Error> {
    env_logger::init();
    if let Err(err) = run().await {
        error!("Failure: {:?}", err);
        return Err(err);
    }
    Ok(())
}

async fn run() -> Result<(), Error> {
    let transport = Arc::new(HttpTransport::new(HttpConfig::default())?);
    let client = Client::new("localhost:8888".to_string(), transport);
    info!("Sending 3 requests");
    for _ in 0..3 {
        let mut request = client.new_message("client", "pong");
        request.set_payload("Ping!");
        let reply = client.send(request, Duration::from_secs(1)).await;
        match reply.payload() {
            Ok(payload) => info!(
                "Response: {:?} (counter {:?})",
                payload,
                reply.properties().get("counter")
            ),
            Err(error) => info!("Fail: {:?}", error),
        }
    }
    Ok(())
}

/**
# Besides of `usrv_rs` the example requires following dependencies:
tokio =  { version = "^1", features = ["macros"] }
log = "^0"
env_logger = "^0" # to print logs
 */
use log::{error, info};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use usrv::transport::http::{HttpConfig, HttpTransport};
use usrv::{Handler, Message, Server};

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
    let transport = Arc::new(HttpTransport::new(HttpConfig::with_port(8888))?);
    let mut server = Server::new("localhost:8888", transport);
    server.handle("pong", PongHandler::default()).await?;
    server.listen()?;
    loop {
        tokio::time::sleep(Duration::from_secs(1)).await
    }
}

#[derive(Debug, Default)]
struct PongHandler {
    counter: AtomicU32,
}

#[async_trait::async_trait]
impl Handler for PongHandler {
    async fn handle(&self, request: &Message, response: &mut Message) {
        info!("Received {:?}", request);
        let counter = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        response.properties_mut().set("counter", counter.to_string());
        response.set_payload("Pong!");
    }
}

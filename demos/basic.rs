use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use usrv::logger::LogFacade;
use usrv::middleware::{json_handler, log_request, Throttle};
use usrv::transport::memory::InMemoryTransport;
use usrv::{Client, Server, UsrvError};

type Error = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Greeting {
    name: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Reply {
    message: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    // Server
    let transport = Arc::new(InMemoryTransport::new());
    let mut server = Server::new("greeter", transport.clone());
    let hello = json_handler(
        |req: &Greeting, res: &mut Reply| -> Result<(), UsrvError> {
            if req.name.is_empty() {
                return Err(UsrvError::handler("name is required"));
            }
            res.message = format!("Hello, {}!", req.name);
            Ok(())
        },
        true,
    );
    let hello = Throttle::new(10, Duration::from_millis(100), hello)?;
    server
        .handle("hello", log_request(Arc::new(LogFacade), hello))
        .await?;
    server.listen()?;

    // Client
    let client = Client::new("greeter".to_string(), transport);
    let mut request = client.new_message("basic", "hello");
    request.set_payload(serde_json::to_vec(&Greeting {
        name: "usrv".to_string(),
    })?);
    let reply = client.send(request, Duration::from_secs(1)).await;

    server.close().await;

    let reply: Reply = serde_json::from_slice(reply.payload().map_err(Clone::clone)?)?;
    assert_eq!("Hello, usrv!", reply.message);
    Ok(())
}

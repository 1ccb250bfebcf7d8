use std::time::Duration;
use stomp_session::{SessionAdapter, SessionConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // This example expects a STOMP broker on localhost:61613 (e.g. ActiveMQ or
    // RabbitMQ with the stomp plugin). The second entry is only tried when the
    // first one refuses the connection.
    let config = SessionConfig::new("failover://(tcp://127.0.0.1:61613,tcp://127.0.0.1:61614)")
        .credentials("guest", "guest");
    let mut session = SessionAdapter::open(config).await?;

    session.subscribe("/queue/test").await?;
    session
        .send("/queue/test", "hello from stomp-session", &[])
        .await?;
    println!("message confirmed by the broker");

    // Poll for up to 5s. A dropped link is healed inside get_next_message.
    for _ in 0..50 {
        if let Some(frame) = session.get_next_message().await? {
            println!("received frame:\n{}", frame);
            session.ack(&frame).await?;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    session.close().await;
    Ok(())
}

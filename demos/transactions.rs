use stomp_session::{DeliveryMode, SessionAdapter, SessionConfig, SessionError};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // This example expects a STOMP broker on localhost:61613 (e.g. ActiveMQ or
    // RabbitMQ with the stomp plugin).
    let config = SessionConfig::new("tcp://127.0.0.1:61613")
        .credentials("guest", "guest")
        .delivery_mode(DeliveryMode::Transactional);
    let mut session = SessionAdapter::open(config).await?;

    // Each send runs BEGIN, SEND, COMMIT under its own transaction id and
    // is aborted if any step fails.
    for n in 1..=3 {
        match session
            .send("/queue/test", format!("message {} in its own transaction", n), &[])
            .await
        {
            Ok(()) => println!("message {} committed", n),
            Err(SessionError::Delivery(reason)) => {
                println!("message {} rolled back: {}", n, reason)
            }
            Err(other) => return Err(other.into()),
        }
    }

    session.close().await;
    Ok(())
}

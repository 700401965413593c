use std::time::Duration;
use stompwire::{Client, ConnectOptions, Frame};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // This demo expects a STOMP broker on localhost:61613 (e.g. ActiveMQ or
    // RabbitMQ with the stomp plugin).
    let opts = ConnectOptions::default()
        .address("127.0.0.1", 61613)
        .credentials("guest", "guest")
        .reliable(true);
    let client = Client::open(opts).await?;

    // Listeners run on the client's background task; hand frames back here.
    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    client
        .subscribe(
            "/queue/demo",
            vec![("ack".into(), "client".into())],
            move |msg| {
                println!("received {:?}", String::from_utf8_lossy(&msg.body));
                let _ = tx.send(msg.clone());
            },
        )
        .await?;

    client.send("/queue/demo", "work item", Vec::new()).await?;
    let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await?
        .ok_or("listener dropped")?;

    // Acknowledge inside a transaction, then abort: the message is handed
    // to the listener again.
    let tx_id = "tx-demo-1";
    client.begin(tx_id, Vec::new()).await?;
    client
        .acknowledge(&message, vec![("transaction".into(), tx_id.into())])
        .await?;
    client.abort(tx_id, Vec::new()).await?;
    println!("Transaction {} aborted", tx_id);

    // This time commit, so nothing is replayed.
    let replayed = rx.recv().await.ok_or("listener dropped")?;
    let tx_id = "tx-demo-2";
    client.begin(tx_id, Vec::new()).await?;
    client
        .acknowledge(&replayed, vec![("transaction".into(), tx_id.into())])
        .await?;
    client.commit(tx_id, Vec::new()).await?;
    println!("Transaction {} committed", tx_id);

    let receipt = client
        .send_with_receipt("/queue/demo", "with receipt", Vec::new(), |r| {
            println!("broker confirmed receipt {:?}", r.get_header("receipt-id"));
        })
        .await?;
    println!("requested receipt {}", receipt);

    client.close().await?;
    client.join().await;
    Ok(())
}

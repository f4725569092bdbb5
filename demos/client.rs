use measures::{Check, Client, ClientConfig, Status};

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
pub async fn main() {
    std::env::set_var(measures::client::STATSD_HOST_ENV, "0.0.0.0");
    let config = ClientConfig::from_env()
        .expect("Failed to build config!")
        .with_prefix("measures.demo")
        .with_tags(["name1:value1", "outcome:success"]);
    let client = Client::new(config, tokio::runtime::Handle::current());
    loop {
        client.incr("incr", 1);
        let elapsed = client.timer("sleep").time_future(async {
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        });
        elapsed.await;
        client.check(Check::new("measures.demo.alive", Status::Ok));
        match client.flush().await {
            Ok(sent) => println!("Emitted {sent} bytes of metrics!"),
            Err(err) => println!("Failed to emit metrics: {err}"),
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(3000)).await;
    }
}

use heartwire_outlet::Inlet;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("print_inlet=info")
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:16571".to_string());

    info!("connecting to outlet at {}", addr);

    let mut inlet = match Inlet::connect(&addr).await {
        Ok(inlet) => inlet,
        Err(e) => {
            error!("failed to connect to outlet: {}", e);
            std::process::exit(1);
        }
    };

    let stream = inlet.info();
    let labels: Vec<&str> = stream.channels.iter().map(|c| c.label.as_str()).collect();
    info!(
        name = %stream.name,
        rate = stream.nominal_rate,
        channels = ?labels,
        "stream resolved"
    );

    loop {
        match inlet.next_sample().await {
            Ok(Some(sample)) => println!("{} {:?}", sample.timestamp_us, sample.values),
            Ok(None) => {
                info!("outlet closed the stream");
                break;
            }
            Err(e) => {
                error!("failed to read sample: {}", e);
                std::process::exit(1);
            }
        }
    }
}

extern crate tello_link;

use tello_link::{next_sample, DroneLink, LinkOptions, Result};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    fly().await.unwrap();
}

async fn fly() -> Result<()> {
    let link = DroneLink::new(LinkOptions::default());
    link.connect().await?;

    let mut telemetry = link.watch_telemetry();
    tokio::spawn(async move {
        while let Some(sample) = next_sample(&mut telemetry).await {
            println!(
                "battery {:?}% flight time {:?}s",
                sample.battery_percent, sample.flight_time_seconds
            );
        }
    });

    link.take_off().await?;
    link.land().await?;

    link.disconnect().await;
    Ok(())
}
